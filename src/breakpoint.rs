//! Software breakpoints. A breakpoint is a single `0xCC` (INT3) byte
//! patched over the low byte of the instruction word at its address;
//! hitting it rewinds `rip` by one and restores the original byte so
//! the tracee can single-step over the real instruction before the
//! `0xCC` is reinstalled.

use std::sync::Arc;

use nix::sys::ptrace;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;

use crate::error::{err, is_inaccessible, Result};

const INT3: i64 = 0xCC;

fn patch_low_byte(word: i64) -> i64 {
    (word & !0xFFi64) | INT3
}

fn poke_int3(pid: Pid, addr: u64, original: i64) -> Result<()> {
    let patched = patch_low_byte(original);
    ptrace::write(pid, addr as *mut std::ffi::c_void, patched)
        .map_err(|e| err(format!("POKETEXT at {:#x} failed: {}", addr, e)))
}

fn restore_original(pid: Pid, addr: u64, original: i64) -> Result<()> {
    ptrace::write(pid, addr as *mut std::ffi::c_void, original)
        .map_err(|e| err(format!("POKETEXT at {:#x} failed: {}", addr, e)))
}

fn single_step_and_wait(pid: Pid) -> Result<()> {
    ptrace::step(pid, None).map_err(|e| err(format!("SINGLESTEP failed: {}", e)))?;
    match waitpid(pid, None) {
        Ok(WaitStatus::Stopped(_, _)) => Ok(()),
        Ok(other) => Err(err(format!("expected a stop after single-step, got {:?}", other))),
        Err(e) => Err(err(format!("waitpid failed: {}", e))),
    }
}

#[derive(Clone, Debug)]
pub struct Breakpoint {
    pub idx: u32,
    pub addr: u64,
    pub value: i64,
    pub symbol_name: Option<Arc<str>>,
    pub is_plt_bp: bool,
    pub counter: u32,
}

/// Outcome of [`BreakpointTable::handle`]: either an ordinary user
/// breakpoint was hit and the tracee should stay stopped, or the hit was
/// on the internal `r_brk` linker breakpoint and the caller already
/// resumed the tracee.
pub enum BreakpointEvent {
    UserBreakpoint {
        idx: u32,
        addr: u64,
        is_plt_bp: bool,
        symbol_name: Option<Arc<str>>,
    },
    LinkerBridge,
    NotOurs {
        rip: u64,
    },
}

#[derive(Default)]
pub struct BreakpointTable {
    list: Vec<Breakpoint>,
    next_idx: u32,
    pending: Option<u64>,
}

impl BreakpointTable {
    pub fn new() -> Self {
        BreakpointTable {
            list: Vec::new(),
            next_idx: 1,
            pending: None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.list.iter()
    }

    pub fn find_by_addr(&self, addr: u64) -> Option<&Breakpoint> {
        self.list.iter().find(|bp| bp.addr == addr)
    }

    fn find_by_addr_mut(&mut self, addr: u64) -> Option<&mut Breakpoint> {
        self.list.iter_mut().find(|bp| bp.addr == addr)
    }

    /// Reads the existing word, patches in `0xCC`, and records the
    /// breakpoint. Returns `Ok(None)` for the non-critical "address not
    /// accessible" case -- a warning, not a hard failure.
    pub fn add(
        &mut self,
        pid: Pid,
        addr: u64,
        symbol_name: Option<Arc<str>>,
        is_plt_bp: bool,
    ) -> Result<Option<u32>> {
        if addr == 0 {
            return Err(err("invalid address passed to breakpoint add"));
        }

        let data = match ptrace::read(pid, addr as *mut std::ffi::c_void) {
            Ok(v) => v,
            Err(e) if is_inaccessible(e) => {
                log::info!("the requested memory address({:#x}) is not accessible", addr);
                return Ok(None);
            }
            Err(e) => return Err(err(format!("reading address {:#x} failed: {}", addr, e))),
        };

        poke_int3(pid, addr, data)?;

        let idx = self.next_idx;
        self.next_idx += 1;
        self.list.push(Breakpoint {
            idx,
            addr,
            value: data,
            symbol_name,
            is_plt_bp,
            counter: 0,
        });

        log::info!("Breakpoint {} added at address={:#x}", idx, addr);
        Ok(Some(idx))
    }

    /// Removes a breakpoint record from the table.
    pub fn delete(&mut self, idx: u32) {
        self.list.retain(|bp| bp.idx != idx);
    }

    /// The symbol that owned this breakpoint relocated (PLT stub
    /// resolved to its real address); move the planted `0xCC` over.
    pub fn update_addr(&mut self, pid: Pid, old_addr: u64, new_addr: u64) -> Result<()> {
        if old_addr != 0 {
            if let Some(bp) = self.find_by_addr(old_addr) {
                restore_original(pid, old_addr, bp.value)?;
            }
        }

        let data = ptrace::read(pid, new_addr as *mut std::ffi::c_void)
            .map_err(|e| err(format!("reading address {:#x} failed: {}", new_addr, e)))?;
        poke_int3(pid, new_addr, data)?;

        if let Some(bp) = self.find_by_addr_mut(old_addr) {
            bp.addr = new_addr;
            bp.value = data;
        }
        Ok(())
    }

    /// Finds the breakpoint planted on `symbol_name` (if any) and moves
    /// it to `new_addr`, used when a dynamic symbol relocates.
    pub fn update_for_symbol(&mut self, pid: Pid, symbol_name: &str, new_addr: u64) -> Result<()> {
        let old_addr = match self.list.iter().find(|bp| bp.symbol_name.as_deref() == Some(symbol_name)) {
            Some(bp) => bp.addr,
            None => return Ok(()),
        };
        self.update_addr(pid, old_addr, new_addr)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Re-arms a breakpoint that was stepped over on the previous stop,
    /// now that the tracee is about to be resumed again.
    pub fn resolve_pending(&mut self, pid: Pid) -> Result<()> {
        let addr = match self.pending.take() {
            Some(a) => a,
            None => return Ok(()),
        };
        let value = self
            .find_by_addr(addr)
            .map(|bp| bp.value)
            .ok_or_else(|| err("pending breakpoint vanished from the table"))?;

        single_step_and_wait(pid)?;
        poke_int3(pid, addr, value)
    }

    /// Called on a non-single-step SIGTRAP.
    /// Rewinds `rip`, restores the original instruction byte, and leaves
    /// the breakpoint queued in `pending` for re-arming on the next
    /// resume. `r_brk_addr`/`r_brk_value` identify the special internal
    /// linker-bridge breakpoint, which is restored, handled, and
    /// re-armed immediately rather than surfaced to the user.
    pub fn handle(
        &mut self,
        pid: Pid,
        r_brk: Option<(u64, i64)>,
    ) -> Result<BreakpointEvent> {
        let mut regs = ptrace::getregs(pid).map_err(|e| err(format!("GETREGS failed: {}", e)))?;
        regs.rip -= 1;

        if let Some((r_brk_addr, r_brk_value)) = r_brk {
            if regs.rip == r_brk_addr {
                restore_original(pid, r_brk_addr, r_brk_value)?;
                ptrace::setregs(pid, regs)
                    .map_err(|e| err(format!("SETREGS failed: {}", e)))?;
                single_step_and_wait(pid)?;
                poke_int3(pid, r_brk_addr, r_brk_value)?;
                return Ok(BreakpointEvent::LinkerBridge);
            }
        }

        let rip = regs.rip;
        let bp_value = match self.find_by_addr(rip) {
            Some(bp) => bp.value,
            None => {
                log::debug!("no breakpoint found for addr: {:#x}", rip);
                return Ok(BreakpointEvent::NotOurs { rip });
            }
        };

        restore_original(pid, rip, bp_value)?;
        ptrace::setregs(pid, regs).map_err(|e| err(format!("SETREGS failed: {}", e)))?;

        if let Some(bp) = self.find_by_addr_mut(rip) {
            bp.counter += 1;
        }
        self.pending = Some(rip);

        if let Some(bp) = self.find_by_addr(rip) {
            log::info!(
                "Breakpoint {}, '{}' () at {:#x}",
                bp.idx,
                bp.symbol_name.as_deref().unwrap_or("??"),
                bp.addr
            );
            return Ok(BreakpointEvent::UserBreakpoint {
                idx: bp.idx,
                addr: bp.addr,
                is_plt_bp: bp.is_plt_bp,
                symbol_name: bp.symbol_name.clone(),
            });
        }
        Ok(BreakpointEvent::NotOurs { rip })
    }

    /// After stepping
    /// off a `.plt` breakpoint, single-steps until the GOT slot the PLT
    /// stub jumps through has been filled by the resolver, then moves
    /// the breakpoint to the real, resolved address.
    pub fn resolve_plt_hit(&mut self, pid: Pid, addr: u64, got_addr: u64, got_old: i64) -> Result<u64> {
        let mut new_val = got_old;
        loop {
            single_step_and_wait(pid)?;
            new_val = ptrace::read(pid, got_addr as *mut std::ffi::c_void)
                .map_err(|e| err(format!("PEEKDATA on GOT slot failed: {}", e)))?;
            if new_val != got_old {
                break;
            }
        }

        let new_addr = new_val as u64;
        let new_data = ptrace::read(pid, new_addr as *mut std::ffi::c_void)
            .map_err(|e| err(format!("PEEKDATA at resolved address failed: {}", e)))?;

        if let Some(bp) = self.find_by_addr_mut(addr) {
            bp.addr = new_addr;
            bp.value = new_data;
            bp.is_plt_bp = false;
        }

        // `handle()` queued the stub address as pending-reinstall before
        // calling here; follow the migration so the next resume re-arms
        // the `0xCC` at the resolved address instead of the vacated stub.
        if self.pending == Some(addr) {
            self.pending = Some(new_addr);
        }

        let mut regs = ptrace::getregs(pid).map_err(|e| err(format!("GETREGS failed: {}", e)))?;
        while regs.rip != new_addr {
            single_step_and_wait(pid)?;
            regs = ptrace::getregs(pid).map_err(|e| err(format!("GETREGS failed: {}", e)))?;
        }

        Ok(new_addr)
    }

    /// Plants a raw `0xCC` without registering a user-visible breakpoint
    /// entry -- used for the internal `r_brk` linker-bridge trap.
    pub fn plant_raw(&self, pid: Pid, addr: u64, original: i64) -> Result<()> {
        poke_int3(pid, addr, original)
    }

    pub fn print_all(&self) {
        for bp in &self.list {
            log::info!(
                "[{}]: name={}, address={:#x}, hit_count={}",
                bp.idx,
                bp.symbol_name.as_deref().unwrap_or("??"),
                bp.addr,
                bp.counter
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_low_byte_only_touches_the_low_byte() {
        let word = 0x1122_3344_5566_7788u64 as i64;
        let patched = patch_low_byte(word);
        assert_eq!(patched as u64 & 0xFF, 0xCC);
        assert_eq!(patched as u64 & !0xFFu64, word as u64 & !0xFFu64);
    }

    #[test]
    fn patch_low_byte_is_idempotent() {
        let word = 0xAABB_CCDDu64 as i64;
        let once = patch_low_byte(word);
        let twice = patch_low_byte(once);
        assert_eq!(once, twice);
    }

    #[test]
    fn find_by_addr_and_delete_round_trip() {
        let mut table = BreakpointTable::new();
        table.list.push(Breakpoint {
            idx: 1,
            addr: 0x1000,
            value: 0x9090_9090,
            symbol_name: Some(Arc::from("foo")),
            is_plt_bp: false,
            counter: 0,
        });
        assert!(table.find_by_addr(0x1000).is_some());
        table.delete(1);
        assert!(table.find_by_addr(0x1000).is_none());
    }

    #[test]
    fn next_idx_is_monotone_across_deletes() {
        let mut table = BreakpointTable::new();
        table.list.push(Breakpoint {
            idx: table.next_idx,
            addr: 0x1000,
            value: 0,
            symbol_name: None,
            is_plt_bp: false,
            counter: 0,
        });
        table.next_idx += 1;
        table.delete(1);
        table.list.push(Breakpoint {
            idx: table.next_idx,
            addr: 0x2000,
            value: 0,
            symbol_name: None,
            is_plt_bp: false,
            counter: 0,
        });
        assert_eq!(table.list[0].idx, 2);
    }
}
