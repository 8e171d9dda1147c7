//! Dynamic-linker bridge.
//!
//! The loader exposes its view of loaded shared objects through the
//! `r_debug` structure pointed to by the `DT_DEBUG` dynamic entry. Before
//! the loader has run, that slot is zero; a write-only watchpoint on the
//! slot catches the moment it's populated, after which a software
//! breakpoint on `r_debug.r_brk` fires on every subsequent link-map
//! change so the symbol table can be rescanned.

use nix::sys::ptrace;
use nix::unistd::Pid;

use crate::breakpoint::BreakpointTable;
use crate::error::{err, Result};
use crate::symtab::{Relocated, SymbolTable};
use crate::watchpoint::{WatchKind, WatchpointSet};

const RT_CONSISTENT: i32 = 0;

#[derive(Clone, Copy, Debug, Default)]
struct RDebug {
    r_map: u64,
    r_brk: u64,
    r_state: i32,
    r_ldbase: u64,
}

fn read_word(pid: Pid, addr: u64) -> Result<i64> {
    ptrace::read(pid, addr as *mut std::ffi::c_void)
        .map_err(|e| err(format!("PEEKDATA at {:#x} failed: {}", addr, e)))
}

/// Reads `struct r_debug` at `addr` (glibc `<link.h>` ABI: `r_version`
/// int, `r_map` pointer, `r_brk` address, `r_state` enum, `r_ldbase`
/// address -- 8-byte aligned fields on x86-64).
fn read_r_debug(pid: Pid, addr: u64) -> Result<RDebug> {
    let r_map = read_word(pid, addr + 8)? as u64;
    let r_brk = read_word(pid, addr + 16)? as u64;
    let r_state = read_word(pid, addr + 24)? as i32;
    let r_ldbase = read_word(pid, addr + 32)? as u64;
    Ok(RDebug {
        r_map,
        r_brk,
        r_state,
        r_ldbase,
    })
}

#[derive(Default)]
pub struct LinkerBridge {
    need_watch: bool,
    watch_slot: Option<usize>,
    r_debug_addr: u64,
    r_brk_addr: u64,
    r_brk_value: i64,
}

impl LinkerBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `(addr, original_byte)` of the internal `r_brk` breakpoint, if
    /// the bridge has reached that stage. Consulted by the event loop to
    /// tell a linker-bridge trap apart from a user breakpoint.
    pub fn r_brk(&self) -> Option<(u64, i64)> {
        if self.r_brk_addr != 0 {
            Some((self.r_brk_addr, self.r_brk_value))
        } else {
            None
        }
    }

    pub fn watched_addr(&self) -> Option<u64> {
        self.need_watch.then_some(self.r_debug_addr)
    }

    /// If the `DT_DEBUG` slot is already populated (tracee attached to
    /// an already-running process), jump straight to planting the
    /// `r_brk` breakpoint; otherwise arm a write-only watchpoint and
    /// wait for the loader to fill it in.
    pub fn setup(
        &mut self,
        pid: Pid,
        dt_debug_addr: u64,
        watchpoints: &mut WatchpointSet,
        breakpoints: &BreakpointTable,
    ) -> Result<()> {
        let data = read_word(pid, dt_debug_addr)?;

        if data != 0 {
            self.need_watch = false;
            self.r_debug_addr = data as u64;
            return self.populate(pid, breakpoints);
        }

        self.watch_slot = watchpoints.add(pid, dt_debug_addr, WatchKind::Write)?;
        self.r_debug_addr = dt_debug_addr;
        self.need_watch = true;
        Ok(())
    }

    /// Returns `true` if the hit belonged to this bridge (caller should
    /// resume the tracee without surfacing a user-facing watchpoint hit).
    pub fn on_watch_hit(
        &mut self,
        pid: Pid,
        hit_addr: u64,
        hit_val: i64,
        watchpoints: &mut WatchpointSet,
        breakpoints: &BreakpointTable,
    ) -> Result<bool> {
        if !self.need_watch || hit_addr != self.r_debug_addr {
            return Ok(false);
        }

        self.need_watch = false;
        self.r_debug_addr = hit_val as u64;
        if let Err(e) = self.populate(pid, breakpoints) {
            log::warn!(
                "issue setting up linker debugger interaction, symbol debugging may be affected: {}",
                e
            );
        }

        if let Some(slot) = self.watch_slot.take() {
            watchpoints.delete(pid, slot)?;
        }
        Ok(true)
    }

    fn populate(&mut self, pid: Pid, breakpoints: &BreakpointTable) -> Result<()> {
        let rdebug = read_r_debug(pid, self.r_debug_addr)?;
        if rdebug.r_brk == 0 {
            return Err(err("r_debug.r_brk is still zero, linker hasn't run yet"));
        }

        let data = read_word(pid, rdebug.r_brk)?;
        breakpoints.plant_raw(pid, rdebug.r_brk, data)?;

        self.r_brk_addr = rdebug.r_brk;
        self.r_brk_value = data;
        log::debug!("linker bridge armed at r_brk={:#x}", rdebug.r_brk);
        Ok(())
    }

    /// Re-scans the symbol table's unresolved dynamic symbols only
    /// when the link map is consistent (no add/delete transaction in
    /// flight).
    pub fn handle_bridge_hit(&self, pid: Pid, symtab: &mut SymbolTable) -> Result<Vec<Relocated>> {
        let rdebug = read_r_debug(pid, self.r_debug_addr)?;
        if rdebug.r_state != RT_CONSISTENT {
            log::debug!("link map not consistent yet (r_state={}), deferring rescan", rdebug.r_state);
            return Ok(Vec::new());
        }
        symtab.resolve_dynamic(pid)
    }
}
