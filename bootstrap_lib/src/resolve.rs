use std::io;

use crate::{
    diagnostics::{hex, Diagnostics},
    image,
    memory::{base_address, AddressSpaceWindow, ProcessId, ProcessMemory},
    Error, Result,
};

/// A function located in a specific process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFunction {
    pub name: String,
    /// The virtual address where this function was loaded.
    pub entry: u64,
    /// Size of the function's code in bytes.
    pub length: usize,
}

/// A function of this process together with its machine code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stub {
    pub function: ResolvedFunction,
    pub code: Vec<u8>,
}

/// Finds `name` in this process and harvests its code from live memory.
pub fn resolve_stub(name: &str, window_size: u64, diag: &Diagnostics) -> Result<Stub> {
    let base = base_address(ProcessId::Myself)?;
    let memory = ProcessMemory::open_read_only(ProcessId::Myself)?;
    let window = memory.capture_image(base, window_size)?;

    let function = lookup(&window, name, diag)?;
    let code = memory.read_at(function.entry, function.length)?;
    if code.len() < function.length {
        return Err(Error::ReadFault {
            address: function.entry + code.len() as u64,
            source: io::ErrorKind::UnexpectedEof.into(),
        });
    }

    diag.debug(format_args!(
        "stub {} at {:#x}, {} bytes: {}",
        function.name,
        function.entry,
        function.length,
        hex(&code)
    ));
    Ok(Stub { function, code })
}

/// Finds `name` in the process behind `memory`, which must be stopped.
pub fn resolve_target(
    memory: &ProcessMemory,
    name: &str,
    window_size: u64,
    diag: &Diagnostics,
) -> Result<ResolvedFunction> {
    let base = base_address(memory.pid())?;
    diag.debug(format_args!("process {} loaded at {:#x}", memory.pid(), base));

    let window = memory.capture_image(base, window_size)?;
    diag.debug(format_args!(
        "captured {:#x} of {:#x} bytes",
        window.len(),
        window_size
    ));

    let function = lookup(&window, name, diag)?;
    diag.debug(format_args!(
        "target {} at {:#x}, {} bytes",
        function.name, function.entry, function.length
    ));
    if let Some(original) = window.slice(function.entry, function.length) {
        diag.debug(format_args!("original bytes: {}", hex(original)));
    }
    Ok(function)
}

/// The first function in `window` whose name contains `name`.
pub fn lookup(
    window: &AddressSpaceWindow,
    name: &str,
    diag: &Diagnostics,
) -> Result<ResolvedFunction> {
    let table = image::parse_window(window)?;
    let found = table.find(name)?;

    let matches = table.matching(name).count();
    if matches > 1 {
        diag.warn(format_args!(
            "{} functions match {:?}, using {}",
            matches, name, found.name
        ));
    }

    Ok(ResolvedFunction {
        name: found.name.clone(),
        entry: found.entry,
        length: usize::try_from(found.len()).map_err(|_| {
            Error::MalformedImage(format!("{} claims {:#x} bytes", found.name, found.len()))
        })?,
    })
}
