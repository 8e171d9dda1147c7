//! Syscall tracer (the `synctrace` companion binary):
//! attaches to (or execs) a tracee and reports each syscall entry/exit via
//! `PTRACE_SYSCALL` stops, resolving syscall numbers to names through the
//! published `syscalls` crate -- distinct from the interactive debugger's
//! own ELF-derived symbol table (`symtab.rs`), which has no notion of
//! kernel syscall numbers at all.
//!
//! Reuses [`Tracee`]'s attach/exec bootstrap for the pid setup, but drives
//! its own `PTRACE_SYSCALL` loop directly: syscall entry/exit stops are a
//! different kind of trap than the breakpoint/watchpoint stops
//! `Tracee::run`/`wait_event` are built to classify.

use nix::sys::ptrace;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use syscalls::Sysno;

use crate::error::{err, Result};
use crate::tracee::Tracee;

pub struct SyscallTracer {
    pid: Pid,
    in_call: bool,
}

impl SyscallTracer {
    /// Arms `PTRACE_O_TRACESYSGOOD` so syscall-stop `SIGTRAP`s are
    /// unambiguously reported as `WaitStatus::PtraceSyscall`.
    pub fn new(tracee: &Tracee) -> Result<Self> {
        ptrace::setoptions(tracee.pid, ptrace::Options::PTRACE_O_TRACESYSGOOD)
            .map_err(|e| err(format!("ptrace setoptions failed: {}", e)))?;
        Ok(SyscallTracer {
            pid: tracee.pid,
            in_call: false,
        })
    }

    /// Runs the tracee to completion, printing the syscall name on entry
    /// and its return value on exit. Returns the tracee's exit code.
    pub fn run_to_completion(&mut self) -> Result<i32> {
        loop {
            ptrace::syscall(self.pid, None)
                .map_err(|e| err(format!("PTRACE_SYSCALL failed: {}", e)))?;

            let status = waitpid(self.pid, None).map_err(|e| err(format!("waitpid failed: {}", e)))?;
            match status {
                WaitStatus::Exited(_, code) => return Ok(code),
                WaitStatus::Signaled(_, sig, _) => return Ok(128 + sig as i32),
                WaitStatus::PtraceSyscall(pid) => self.report(pid)?,
                WaitStatus::Stopped(pid, Signal::SIGTRAP) => self.report(pid)?,
                other => log::debug!("unhandled wait status: {:?}", other),
            }
        }
    }

    fn report(&mut self, pid: Pid) -> Result<()> {
        let regs = ptrace::getregs(pid).map_err(|e| err(format!("GETREGS failed: {}", e)))?;

        if !self.in_call {
            let nr = regs.orig_rax as usize;
            let name = Sysno::new(nr)
                .map(|s| s.name().to_string())
                .unwrap_or_else(|| format!("sys_{}", nr));
            println!("{}(...)", name);
        } else {
            println!("  = {:#x}", regs.rax as i64);
        }
        self.in_call = !self.in_call;
        Ok(())
    }
}
