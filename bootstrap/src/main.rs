use std::{
    os::unix::process::ExitStatusExt,
    process::{ExitCode, ExitStatus},
};

use bootstrap_lib::{controller, Diagnostics};
use clap::Parser;

mod args;
use args::Args;

mod stub;

fn main() -> ExitCode {
    let config = Args::parse().into_config(stub::SYMBOL);
    let diag = Diagnostics::new(config.verbose);

    match controller::run(&config, &diag) {
        Ok(status) => exit_code(status),
        Err(err) => {
            eprintln!("bootstrap: {}", err);
            ExitCode::FAILURE
        }
    }
}

/// Mirrors the child's exit: its code, or 128 plus the signal that killed it.
fn exit_code(status: ExitStatus) -> ExitCode {
    let code = status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1);
    ExitCode::from(code as u8)
}
