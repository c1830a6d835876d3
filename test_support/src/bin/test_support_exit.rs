//! This binary is built to act as a child with nothing to patch.

use std::{thread, time::Duration};

fn main() {
    let code = std::env::args()
        .nth(1)
        .and_then(|arg_string| arg_string.parse().ok())
        .unwrap_or(0);

    // Stay alive long enough to be stopped.
    thread::sleep(Duration::from_millis(500));

    println!("exiting with {}", code);
    std::process::exit(code);
}
