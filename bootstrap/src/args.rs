use std::ffi::OsString;

use bootstrap_lib::{config, Config};

/// Every option is hidden and comes with an environment variable, so a
/// plain invocation passes its whole command line through to the child.
#[derive(clap::Parser)]
#[command(name = "bootstrap", disable_help_flag = true, disable_version_flag = true)]
pub struct Args {
    #[arg(
        long = "bootstrap-go",
        env = "BOOTSTRAP_GO",
        default_value = config::DEFAULT_PROGRAM,
        hide = true
    )]
    pub program: OsString,
    /// Any non-empty value turns on verbose diagnostics.
    #[arg(long = "bootstrap-debug", env = "BOOTSTRAP_DEBUG", hide = true)]
    pub debug: Option<String>,
    #[arg(
        long = "bootstrap-target",
        env = "BOOTSTRAP_TARGET",
        default_value = config::DEFAULT_TARGET,
        hide = true
    )]
    pub target_symbol: String,
    #[arg(
        long = "bootstrap-window",
        env = "BOOTSTRAP_WINDOW",
        default_value = "0x10000000",
        value_parser = config::parse_window_size,
        hide = true
    )]
    pub window_size: u64,
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub forwarded: Vec<OsString>,
}

impl Args {
    pub fn into_config(self, stub_symbol: &str) -> Config {
        let mut config = Config::new(self.program, stub_symbol);
        config.args = self.forwarded;
        config.target_symbol = self.target_symbol;
        config.window_size = self.window_size;
        config.verbose = self.debug.map_or(false, |debug| !debug.is_empty());
        config
    }
}
