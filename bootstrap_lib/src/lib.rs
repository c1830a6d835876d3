//! Launches a program with one of its functions replaced by a function of
//! the launcher itself.
//!
//! The child is stopped right after it is spawned. Its load base comes from
//! procfs, a window of its memory is captured and parsed for a symbol table,
//! and the target function is overwritten through `/proc/<pid>/mem` with
//! code harvested the same way from this process. Then the child is
//! resumed and waited for.

pub mod config;
pub mod controller;
pub mod diagnostics;
pub mod error;
pub mod image;
pub mod memory;
pub mod patch;
pub mod resolve;
pub mod symbols;

mod pclntab;
mod words;

#[cfg(test)]
mod fixture;

pub use config::Config;
pub use controller::{run, ChildState, RunningChild, SuspendedChild};
pub use diagnostics::Diagnostics;
pub use error::Error;
pub use memory::{AddressSpaceWindow, ProcessId, ProcessMemory};
pub use patch::PatchSpec;
pub use resolve::{ResolvedFunction, Stub};
pub use symbols::{FunctionSymbol, SymbolTable};

pub type Result<T> = std::result::Result<T, Error>;
