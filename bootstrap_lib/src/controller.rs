use std::{
    ffi::{OsStr, OsString},
    process::{Child, Command, ExitStatus},
};

use nix::{
    errno::Errno,
    sys::{
        signal::{kill, Signal},
        wait::{waitpid, WaitPidFlag, WaitStatus},
    },
    unistd::Pid,
};

use crate::{
    config::{Config, DEFAULT_WINDOW_SIZE},
    diagnostics::Diagnostics,
    memory::{ProcessId, ProcessMemory},
    patch::{self, PatchSpec},
    resolve::{resolve_stub, resolve_target, Stub},
    Error, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    Created,
    Suspended,
    Patched,
    Resumed,
    Exited,
}

/// Sends SIGCONT when dropped while armed, so no exit path leaves the
/// child stopped.
struct ResumeOnDrop {
    pid: Pid,
    armed: bool,
}

impl Drop for ResumeOnDrop {
    fn drop(&mut self) {
        if self.armed {
            // The child may already be gone.
            let _ = kill(self.pid, Signal::SIGCONT);
        }
    }
}

/// A child that was stopped right after it was spawned.
pub struct SuspendedChild<'d> {
    child: Child,
    pid: Pid,
    state: ChildState,
    /// Opened on first use, closed on resume.
    memory: Option<ProcessMemory>,
    guard: ResumeOnDrop,
    diag: &'d Diagnostics,
}

impl<'d> SuspendedChild<'d> {
    /// Spawns `program` with the caller's stdio and stops it.
    pub fn spawn(program: &OsStr, args: &[OsString], diag: &'d Diagnostics) -> Result<Self> {
        let child = Command::new(program)
            .args(args)
            .spawn()
            .map_err(|source| Error::SpawnFailed {
                program: program.to_string_lossy().into_owned(),
                source,
            })?;
        let pid = Pid::from_raw(child.id() as i32);
        diag.debug(format_args!(
            "spawned {} {:?} as pid {}",
            program.to_string_lossy(),
            args,
            pid
        ));

        let mut suspended = Self {
            child,
            pid,
            state: ChildState::Created,
            memory: None,
            guard: ResumeOnDrop { pid, armed: false },
            diag,
        };
        suspended.suspend()?;
        Ok(suspended)
    }

    fn suspend(&mut self) -> Result<()> {
        let pid = self.pid;
        let failed = |source| Error::SignalFailed {
            pid: pid.as_raw(),
            signal: "SIGSTOP",
            source,
        };

        kill(pid, Signal::SIGSTOP).map_err(failed)?;
        self.guard.armed = true;

        // The stop is asynchronous; nothing may touch the child's memory
        // until it has taken effect.
        loop {
            match waitpid(pid, Some(WaitPidFlag::WUNTRACED)).map_err(failed)? {
                WaitStatus::Stopped(_, _) => break,
                WaitStatus::Exited(_, _) | WaitStatus::Signaled(_, _, _) => {
                    self.guard.armed = false;
                    self.state = ChildState::Exited;
                    return Err(failed(Errno::ESRCH));
                }
                _ => continue,
            }
        }

        self.state = ChildState::Suspended;
        self.diag.debug(format_args!("pid {} stopped", pid));
        Ok(())
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn state(&self) -> ChildState {
        self.state
    }

    pub fn memory(&mut self) -> Result<&ProcessMemory> {
        let memory = match self.memory.take() {
            Some(memory) => memory,
            None => ProcessMemory::open(ProcessId::Child(self.pid))?,
        };
        Ok(self.memory.insert(memory))
    }

    /// Replaces the start of the child's `target_symbol` with the stub's
    /// code, returning how many bytes were written.
    pub fn patch(&mut self, stub: &Stub, target_symbol: &str, window_size: u64) -> Result<usize> {
        let diag = self.diag;
        let memory = self.memory()?;

        let target = resolve_target(memory, target_symbol, window_size, diag)?;
        let spec = PatchSpec::new(&target, stub.code.clone())?;
        let written = patch::apply(memory, &spec)?;
        diag.debug(format_args!(
            "wrote {} bytes at {:#x} over {}",
            written,
            spec.target(),
            target.name
        ));

        self.state = ChildState::Patched;
        Ok(written)
    }

    /// Lets the child run. Failing to signal it is only reported: whatever
    /// was written stays written.
    pub fn resume(self) -> RunningChild<'d> {
        let SuspendedChild {
            child,
            pid,
            memory,
            mut guard,
            diag,
            ..
        } = self;
        drop(memory);

        match kill(pid, Signal::SIGCONT) {
            Ok(()) => diag.debug(format_args!("pid {} resumed", pid)),
            Err(err) => diag.warn(format_args!("failed to resume pid {}: {}", pid, err)),
        }
        guard.armed = false;

        RunningChild {
            child,
            pid,
            state: ChildState::Resumed,
            diag,
        }
    }
}

pub struct RunningChild<'d> {
    child: Child,
    pid: Pid,
    state: ChildState,
    diag: &'d Diagnostics,
}

impl RunningChild<'_> {
    pub fn state(&self) -> ChildState {
        self.state
    }

    /// Blocks until the child exits. There is no timeout.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        let status = self.child.wait().map_err(|source| Error::WaitFailed {
            pid: self.pid.as_raw(),
            source,
        })?;
        self.state = ChildState::Exited;
        self.diag.debug(format_args!("pid {} exited: {}", self.pid, status));
        Ok(status)
    }
}

/// Runs `config.program` with its target function replaced by the stub.
///
/// If anything fails once the child is stopped, the child is still resumed
/// and waited for before the error is returned.
pub fn run(config: &Config, diag: &Diagnostics) -> Result<ExitStatus> {
    let mut child = SuspendedChild::spawn(&config.program, &config.args, diag)?;

    // The configured window bounds the child's capture only.
    let patched = resolve_stub(&config.stub_symbol, DEFAULT_WINDOW_SIZE, diag)
        .and_then(|stub| child.patch(&stub, &config.target_symbol, config.window_size));

    let mut running = child.resume();
    let status = running.wait();
    patched?;
    status
}
