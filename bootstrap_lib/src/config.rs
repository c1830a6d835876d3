use std::ffi::OsString;

pub const DEFAULT_PROGRAM: &str = "go";
pub const DEFAULT_TARGET: &str = "disallowInternal";
/// Large enough to cover the text and runtime tables of a Go toolchain
/// binary.
pub const DEFAULT_WINDOW_SIZE: u64 = 0x1000_0000;

/// Everything one run needs, after arguments and environment are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Binary to spawn, looked up on `PATH` if it has no slash.
    pub program: OsString,
    /// Arguments forwarded verbatim to `program`.
    pub args: Vec<OsString>,
    /// Function in this process whose code replaces the target.
    pub stub_symbol: String,
    /// Function in the child to replace, matched by substring.
    pub target_symbol: String,
    /// How many bytes of each image to capture starting at its base.
    pub window_size: u64,
    pub verbose: bool,
}

impl Config {
    pub fn new(program: impl Into<OsString>, stub_symbol: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
            stub_symbol: stub_symbol.into(),
            target_symbol: DEFAULT_TARGET.into(),
            window_size: DEFAULT_WINDOW_SIZE,
            verbose: false,
        }
    }
}

/// Parses a window size given in decimal or `0x` prefixed hex.
pub fn parse_window_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    match parsed {
        Ok(0) => Err("window size must not be zero".into()),
        Ok(size) => Ok(size),
        Err(err) => Err(format!("invalid window size {:?}: {}", s, err)),
    }
}
