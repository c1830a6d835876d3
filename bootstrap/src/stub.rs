//! The code written over the child's target function.

pub const SYMBOL: &str = "disallow_internal_replacer";

/// Replacement for the child's `disallowInternal`. It returns zero in the
/// first result register, which the child reads as "allowed".
///
/// Only its machine code is used, copied out of this process at run time,
/// so it must stay free of calls and relocations.
#[no_mangle]
#[inline(never)]
pub extern "C" fn disallow_internal_replacer() -> usize {
    0
}

// Nothing calls the replacer; this keeps the linker from discarding it.
#[used]
static KEEP_REPLACER: extern "C" fn() -> usize = disallow_internal_replacer;
