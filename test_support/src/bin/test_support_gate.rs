//! This binary is built to act as a patch target for bootstrap. It reports
//! whether its `disallowInternal` still denies access.

use std::{hint::black_box, thread, time::Duration};

/// Returns non-zero to deny.
#[no_mangle]
#[inline(never)]
#[allow(non_snake_case)]
pub extern "C" fn disallowInternal(_src_dir: usize) -> usize {
    1
}

fn main() {
    let code = std::env::args()
        .nth(1)
        .and_then(|arg_string| arg_string.parse().ok())
        .unwrap_or(0);

    // bootstrap stops and patches the process during this window.
    thread::sleep(Duration::from_millis(500));

    // Called through a pointer so the constant result is not folded in.
    let gate = black_box(disallowInternal as extern "C" fn(usize) -> usize);
    if gate(black_box(0)) == 0 {
        println!("internal: allowed");
    } else {
        println!("internal: denied");
    }

    std::process::exit(code);
}
