//! Tracee controller: owns the ptrace session, the breakpoint/watchpoint
//! tables, the symbol table and the linker bridge, and classifies every
//! stop into the next state for the event loop.

use std::io::Read as _;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::PathBuf;

use nix::sys::ptrace;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};

use crate::breakpoint::{BreakpointEvent, BreakpointTable};
use crate::elf;
use crate::error::{err, Result};
use crate::linker::LinkerBridge;
use crate::procmap::{self, MemMap};
use crate::symtab::SymbolTable;
use crate::watchpoint::WatchpointSet;

/// `si_code` for a `SIGTRAP` delivered by `PTRACE_SINGLESTEP`, as opposed
/// to one delivered by a planted `0xCC`.
const TRAP_TRACE: i32 = 2;
const PTRACE_EVENT_EXEC: i64 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceeState {
    Running,
    Stopped,
    Killed,
    Exited(i32),
    Err,
}

pub struct Tracee {
    pub pid: Pid,
    pub name: String,
    pub exe_path: PathBuf,
    pub va_base: u64,
    pub symtab: SymbolTable,
    pub breakpoints: BreakpointTable,
    pub watchpoints: WatchpointSet,
    pub linker: LinkerBridge,
}

fn attach_and_stop(pid: Pid, set_exec_opts: bool) -> Result<()> {
    ptrace::attach(pid).map_err(|e| err(format!("ptrace attach failed: {}", e)))?;
    log::debug!("ptrace attach");

    waitpid(pid, None).map_err(|e| err(format!("waitpid err: {}", e)))?;
    log::debug!("waitpid attach");

    if set_exec_opts {
        let opts = ptrace::Options::PTRACE_O_EXITKILL | ptrace::Options::PTRACE_O_TRACEEXEC;
        if let Err(e) = ptrace::setoptions(pid, opts) {
            let _ = ptrace::detach(pid, None);
            return Err(err(format!("ptrace setoptions failed: {}", e)));
        }
        log::debug!("ptrace setoptions");
    }
    Ok(())
}

impl Tracee {
    /// Attaches to an already-running process, which is left stopped.
    pub fn attach_pid(pid: Pid) -> Result<Self> {
        let name = procmap::read_pid_comm(pid).unwrap_or_default();
        let exe_path = procmap::read_pid_exe(pid)?;
        attach_and_stop(pid, false)?;

        Ok(Tracee {
            pid,
            name,
            exe_path,
            va_base: 0,
            symtab: SymbolTable::new(Vec::new()),
            breakpoints: BreakpointTable::new(),
            watchpoints: WatchpointSet::new(),
            linker: LinkerBridge::new(),
        })
    }

    /// Forks, lets the child wait on a pipe before `execvp`, attaches
    /// once the pid is known, then releases the child and rides the
    /// `PTRACE_EVENT_EXEC` stop.
    pub fn attach_exec(argv: &[String]) -> Result<Self> {
        if argv.is_empty() {
            return Err(err("attach_exec requires a program and arguments"));
        }

        let (read_fd, write_fd) = nix::unistd::pipe()
            .map_err(|e| err(format!("pipe failed: {}", e)))?;

        match unsafe { unistd::fork() } {
            Ok(ForkResult::Child) => {
                drop_write_end_in_child(write_fd);
                wait_for_parent_signal(read_fd);
                exec_child(argv);
                unsafe { libc::_exit(1) };
            }
            Ok(ForkResult::Parent { child }) => {
                drop(read_fd);

                if let Err(e) = attach_and_stop(child, true) {
                    let _ = signal::kill(child, Signal::SIGKILL);
                    return Err(e);
                }

                let flag: i32 = 0;
                let buf = flag.to_ne_bytes();
                if unistd::write(&write_fd, &buf).is_err() {
                    let _ = signal::kill(child, Signal::SIGKILL);
                    return Err(err("error signalling child to exec"));
                }

                ptrace::cont(child, None)
                    .map_err(|e| err(format!("ptrace continue for child failed: {}", e)))?;

                let status = waitpid(child, None)
                    .map_err(|e| err(format!("waitpid err: {}", e)))?;

                let execed = match status {
                    WaitStatus::PtraceEvent(_, Signal::SIGTRAP, event) => {
                        event == PTRACE_EVENT_EXEC as i32
                    }
                    _ => false,
                };
                if !execed {
                    let _ = signal::kill(child, Signal::SIGKILL);
                    return Err(err(format!("child did not reach exec, got {:?}", status)));
                }
                log::debug!("child execed");

                let name = procmap::read_pid_comm(child).unwrap_or_default();
                let exe_path = procmap::read_pid_exe(child)?;

                Ok(Tracee {
                    pid: child,
                    name,
                    exe_path,
                    va_base: 0,
                    symtab: SymbolTable::new(Vec::new()),
                    breakpoints: BreakpointTable::new(),
                    watchpoints: WatchpointSet::new(),
                    linker: LinkerBridge::new(),
                })
            }
            Err(e) => Err(err(format!("fork failed: {}", e))),
        }
    }

    /// One-shot ELF parse plus dynamic-linker bridge bootstrap. Called
    /// once after attach/exec, with the tracee in a stopped state.
    pub fn setup_symbols(&mut self) -> Result<()> {
        let maps = procmap::decode_proc_maps(self.pid)?;
        let va_guess = procmap::find_load_base(&maps, &self.exe_path).unwrap_or(0);

        let analysis = elf::analyze(&self.exe_path, va_guess, self.pid)?;
        self.va_base = analysis.va_base;

        let mut symtab = SymbolTable::new(analysis.sections);
        symtab.set_maps(maps);
        symtab.extend(analysis.symbols);
        self.symtab = symtab;

        if let Some(dt_debug_addr) = analysis.dt_debug_addr {
            if let Err(e) =
                self.linker
                    .setup(self.pid, dt_debug_addr, &mut self.watchpoints, &self.breakpoints)
            {
                log::warn!(
                    "error in parsing .dynamic section, some features like breakpointing \
                     dynamic lib functions may get affected: {}",
                    e
                );
            }
        }
        Ok(())
    }

    pub fn getregs(&self) -> Result<libc::user_regs_struct> {
        ptrace::getregs(self.pid).map_err(|e| err(format!("GETREGS failed: {}", e)))
    }

    pub fn setregs(&self, regs: libc::user_regs_struct) -> Result<()> {
        ptrace::setregs(self.pid, regs).map_err(|e| err(format!("SETREGS failed: {}", e)))
    }

    pub fn peek(&self, addr: u64) -> Result<i64> {
        ptrace::read(self.pid, addr as *mut std::ffi::c_void)
            .map_err(|e| err(format!("PEEKDATA at {:#x} failed: {}", addr, e)))
    }

    /// Re-arms any pending breakpoint, then `PTRACE_CONT`s.
    pub fn run(&mut self) -> Result<()> {
        self.breakpoints.resolve_pending(self.pid)?;
        ptrace::cont(self.pid, None).map_err(|e| err(format!("ptrace continue failed: {}", e)))
    }

    /// Re-arms any pending breakpoint, then single-steps.
    pub fn step(&mut self) -> Result<()> {
        self.breakpoints.resolve_pending(self.pid)?;
        ptrace::step(self.pid, None).map_err(|e| err(format!("singlestep failed: {}", e)))
    }

    pub fn kill(&self) -> Result<()> {
        signal::kill(self.pid, Signal::SIGKILL).map_err(|e| err(format!("kill failed: {}", e)))
    }

    /// Blocks for the next wait-status and classifies it. A `SIGTRAP` is
    /// routed to the watchpoint machinery first: checking DR6 directly
    /// tells a hardware watchpoint stop apart from a software breakpoint
    /// stop.
    pub fn wait_event(&mut self) -> Result<TraceeState> {
        let status = waitpid(self.pid, None).map_err(|e| err(format!("waitpid err: {}", e)))?;

        match status {
            WaitStatus::Exited(_, code) => {
                log::info!("tracee exited");
                Ok(TraceeState::Exited(code))
            }
            WaitStatus::Signaled(_, sig, _) => {
                log::info!("tracee killed by signal: {}", sig);
                Ok(TraceeState::Exited(128 + sig as i32))
            }
            WaitStatus::Stopped(_, Signal::SIGTRAP) => self.handle_trap(),
            WaitStatus::Stopped(_, sig) => {
                log::info!("tracee received signal: {}", sig);
                Ok(TraceeState::Stopped)
            }
            other => {
                log::debug!("unhandled wait status: {:?}", other);
                Ok(TraceeState::Stopped)
            }
        }
    }

    fn handle_trap(&mut self) -> Result<TraceeState> {
        if let Some(hit) = self.watchpoints.check(self.pid)? {
            if self.linker.on_watch_hit(
                self.pid,
                hit.addr,
                hit.new_val,
                &mut self.watchpoints,
                &self.breakpoints,
            )? {
                ptrace::cont(self.pid, None)
                    .map_err(|e| err(format!("ptrace continue failed: {}", e)))?;
                return Ok(TraceeState::Running);
            }

            let old_val = self.watchpoints.old_value(hit.idx).unwrap_or(0);
            self.watchpoints.record_hit(hit.idx, hit.new_val);
            let regs = self.getregs()?;
            log::info!(
                "Watchpoint {}, old_val={:#x}, new_val={:#x}, rw_instr={:#x}",
                hit.idx, old_val, hit.new_val, regs.rip
            );
            return Ok(TraceeState::Stopped);
        }

        let siginfo_single_step = self.getsiginfo_code().map(|c| c == TRAP_TRACE).unwrap_or(false);
        if siginfo_single_step {
            return Ok(TraceeState::Stopped);
        }

        match self.breakpoints.handle(self.pid, self.linker.r_brk())? {
            BreakpointEvent::LinkerBridge => {
                let relocated = self.linker.handle_bridge_hit(self.pid, &mut self.symtab)?;
                for r in relocated {
                    self.breakpoints.update_for_symbol(self.pid, &r.name, r.new_addr)?;
                }
                ptrace::cont(self.pid, None)
                    .map_err(|e| err(format!("ptrace continue failed: {}", e)))?;
                Ok(TraceeState::Running)
            }
            BreakpointEvent::UserBreakpoint {
                addr,
                is_plt_bp,
                symbol_name,
                ..
            } => {
                if is_plt_bp {
                    if let Some(name) = symbol_name {
                        self.resolve_plt_breakpoint(&name, addr)?;
                    }
                }
                Ok(TraceeState::Stopped)
            }
            BreakpointEvent::NotOurs { .. } => {
                log::info!("tracee received signal: SIGTRAP");
                Ok(TraceeState::Stopped)
            }
        }
    }

    fn resolve_plt_breakpoint(&mut self, name: &str, addr: u64) -> Result<()> {
        let got = match self.symtab.lookup_by_name(name).and_then(|s| s.got) {
            Some(g) => g,
            None => return Ok(()),
        };
        let new_addr = self.breakpoints.resolve_plt_hit(self.pid, addr, got.addr, got.val)?;

        if let Some(sym) = self.symtab.lookup_by_name_mut(name) {
            sym.addr = new_addr;
        }
        self.symtab.sort_by_addr_desc();
        Ok(())
    }

    fn getsiginfo_code(&self) -> Result<i32> {
        let siginfo = ptrace::getsiginfo(self.pid)
            .map_err(|e| err(format!("GETSIGINFO failed: {}", e)))?;
        Ok(siginfo.si_code)
    }

    pub fn find_region(&self, addr: u64, size: u64) -> Option<MemMap> {
        let maps = procmap::decode_proc_maps(self.pid).ok()?;
        procmap::find_region(&maps, addr, size).cloned()
    }
}

fn exec_child(argv: &[String]) {
    use std::ffi::CString;
    let cargs: Result<Vec<CString>> = argv
        .iter()
        .map(|a| CString::new(a.as_str()).map_err(|e| err(format!("argument contains a NUL byte: {}", e))))
        .collect();
    let cargs = match cargs {
        Ok(c) => c,
        Err(_) => return,
    };
    let _ = unistd::execvp(&cargs[0], &cargs);
}

fn drop_write_end_in_child(write_fd: std::os::fd::OwnedFd) {
    drop(write_fd);
}

fn wait_for_parent_signal(read_fd: std::os::fd::OwnedFd) {
    let mut buf = [0u8; 4];
    let fd: RawFd = read_fd.as_raw_fd();
    let mut file = unsafe { <std::fs::File as std::os::fd::FromRawFd>::from_raw_fd(fd) };
    let _ = file.read_exact(&mut buf);
    std::mem::forget(file);
}
