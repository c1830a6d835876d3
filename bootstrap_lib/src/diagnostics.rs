use std::fmt;

use env_logger::{Builder, Logger, Target};
use log::{Level, LevelFilter, Log, Record};

const TARGET: &str = "bootstrap";

/// Built once from the configuration and passed down by reference in place
/// of a global logger.
pub struct Diagnostics {
    logger: Logger,
}

impl Diagnostics {
    /// Verbose diagnostics go to stdout. Otherwise only warnings are
    /// reported, on stderr.
    pub fn new(verbose: bool) -> Self {
        let (level, target) = if verbose {
            (LevelFilter::Debug, Target::Stdout)
        } else {
            (LevelFilter::Warn, Target::Stderr)
        };
        let logger = Builder::new()
            .filter_level(level)
            .target(target)
            .format_timestamp(None)
            .build();
        Self { logger }
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        self.logger.log(
            &Record::builder()
                .args(args)
                .level(level)
                .target(TARGET)
                .build(),
        );
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }
}

/// Formats bytes as space separated hex pairs.
pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
