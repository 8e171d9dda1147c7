//! Hardware watchpoints, backed by the four x86-64 debug registers
//! DR0-DR3, their shared status register DR6 and control register DR7.

use nix::sys::ptrace;
use nix::unistd::Pid;

use crate::error::{err, is_inaccessible, Result};

const NUM_SLOTS: usize = 4;
const DR_STATUS: usize = 6;
const DR_CTRL: usize = 7;

fn dr_offset(idx: usize) -> i64 {
    let debugreg_offset = std::mem::offset_of!(libc::user, u_debugreg) as i64;
    debugreg_offset + (idx as i64) * std::mem::size_of::<libc::c_long>() as i64
}

fn dr7_local_bit(idx: usize) -> u64 {
    1u64 << (idx * 2)
}

fn dr7_on(dr7: u64, idx: usize) -> bool {
    dr7 & dr7_local_bit(idx) != 0
}

fn dr7_rw_shift(idx: usize) -> u32 {
    (16 + idx * 4) as u32
}

fn dr7_len_shift(idx: usize) -> u32 {
    (18 + idx * 4) as u32
}

/// nix does not wrap `PTRACE_PEEKUSER`/`PTRACE_POKEUSER` (the debug
/// register file isn't part of its safe ptrace surface), so these two go
/// through raw `libc::ptrace` directly.
fn peek_user(pid: Pid, offset: i64) -> Result<i64> {
    nix::errno::Errno::clear();
    let ret = unsafe {
        libc::ptrace(libc::PTRACE_PEEKUSER, pid.as_raw(), offset as *mut libc::c_void, 0)
    };
    if ret == -1 {
        let errno = nix::errno::Errno::last();
        if errno != nix::errno::Errno::UnknownErrno {
            return Err(err(format!("PEEKUSER at offset {} failed: {}", offset, errno)));
        }
    }
    Ok(ret)
}

fn poke_user(pid: Pid, offset: i64, data: i64) -> Result<()> {
    let ret = unsafe {
        libc::ptrace(
            libc::PTRACE_POKEUSER,
            pid.as_raw(),
            offset as *mut libc::c_void,
            data as *mut libc::c_void,
        )
    };
    if ret == -1 {
        return Err(err(format!(
            "POKEUSER at offset {} failed: {}",
            offset,
            nix::errno::Errno::last()
        )));
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchKind {
    Write,
    ReadWrite,
}

/// A check result from [`WatchpointSet::check`]: which slot fired, the
/// watched address, and the freshly re-read value at that address.
pub struct WatchHit {
    pub idx: usize,
    pub addr: u64,
    pub new_val: i64,
}

#[derive(Clone, Copy, Debug, Default)]
struct Slot {
    old_value: i64,
}

pub struct WatchpointSet {
    slots: [Slot; NUM_SLOTS],
}

impl Default for WatchpointSet {
    fn default() -> Self {
        WatchpointSet {
            slots: [Slot::default(); NUM_SLOTS],
        }
    }
}

impl WatchpointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn old_value(&self, idx: usize) -> Option<i64> {
        self.slots.get(idx).map(|s| s.old_value)
    }

    /// Installs the first free DR slot, 4-byte aligned, watching either
    /// writes only or reads-and-writes.
    pub fn add(&mut self, pid: Pid, addr: u64, kind: WatchKind) -> Result<Option<usize>> {
        if addr == 0 {
            return Err(err("invalid address passed to watchpoint add"));
        }
        if addr % 4 != 0 {
            log::info!("address must be 4-byte aligned");
            return Ok(None);
        }

        let dr7 = peek_user(pid, dr_offset(DR_CTRL))? as u64;

        for idx in 0..NUM_SLOTS {
            if dr7_on(dr7, idx) {
                continue;
            }

            let old_val = match ptrace::read(pid, addr as *mut std::ffi::c_void) {
                Ok(v) => v,
                Err(e) if is_inaccessible(e) => {
                    log::info!("the requested memory address({:#x}) is not accessible", addr);
                    return Err(err(format!("address {:#x} is not accessible", addr)));
                }
                Err(e) => return Err(err(format!("reading address {:#x} failed: {}", addr, e))),
            };
            self.slots[idx].old_value = old_val;

            let mut new_dr7 = dr7 | dr7_local_bit(idx);
            new_dr7 &= !(0b11u64 << dr7_len_shift(idx));
            new_dr7 |= 0b11u64 << dr7_len_shift(idx);
            new_dr7 &= !(0b11u64 << dr7_rw_shift(idx));
            let rw_bits = match kind {
                WatchKind::Write => 0b01u64,
                WatchKind::ReadWrite => 0b11u64,
            };
            new_dr7 |= rw_bits << dr7_rw_shift(idx);

            poke_user(pid, dr_offset(idx), addr as i64)?;
            poke_user(pid, dr_offset(DR_CTRL), new_dr7 as i64)?;

            return Ok(Some(idx));
        }

        log::info!("cannot add more watchpoint/hardware breakpoints");
        Ok(None)
    }

    /// Clears the DR7 local-enable bit and the slot's address register.
    pub fn delete(&mut self, pid: Pid, idx: usize) -> Result<()> {
        if idx >= NUM_SLOTS {
            return Ok(());
        }
        self.slots[idx].old_value = 0;

        let dr7 = peek_user(pid, dr_offset(DR_CTRL))? as u64;
        if !dr7_on(dr7, idx) {
            return Ok(());
        }

        let mut new_dr7 = dr7 & !(0b11u64 << dr7_len_shift(idx));
        new_dr7 &= !(0b11u64 << dr7_rw_shift(idx));
        new_dr7 &= !dr7_local_bit(idx);

        poke_user(pid, dr_offset(DR_CTRL), new_dr7 as i64)?;
        poke_user(pid, dr_offset(idx), 0)?;
        Ok(())
    }

    /// Reads DR6, uses the trailing-zero count to pick the firing slot,
    /// then re-reads the watched address.
    pub fn check(&self, pid: Pid) -> Result<Option<WatchHit>> {
        let status = peek_user(pid, dr_offset(DR_STATUS))? as u64;
        if status & 0xf == 0 {
            return Ok(None);
        }
        let idx = status.trailing_zeros() as usize;

        let addr = peek_user(pid, dr_offset(idx))? as u64;
        let new_val = match ptrace::read(pid, addr as *mut std::ffi::c_void) {
            Ok(v) => v,
            Err(e) if is_inaccessible(e) => {
                return Ok(Some(WatchHit { idx, addr, new_val: 0 }));
            }
            Err(e) => return Err(err(format!("reading address {:#x} failed: {}", addr, e))),
        };

        Ok(Some(WatchHit { idx, addr, new_val }))
    }

    pub fn record_hit(&mut self, idx: usize, new_val: i64) {
        if let Some(slot) = self.slots.get_mut(idx) {
            slot.old_value = new_val;
        }
    }

    /// Prints each armed slot.
    pub fn print_all(&self, pid: Pid) -> Result<()> {
        let dr7 = peek_user(pid, dr_offset(DR_CTRL))? as u64;
        for idx in 0..NUM_SLOTS {
            if !dr7_on(dr7, idx) {
                continue;
            }
            let addr = peek_user(pid, dr_offset(idx))?;
            let rw = match (dr7 >> dr7_rw_shift(idx)) & 0b11 {
                0b01 => "W",
                0b11 => "RW",
                _ => "?",
            };
            let len = match (dr7 >> dr7_len_shift(idx)) & 0b11 {
                0b00 => 1,
                0b01 => 2,
                0b10 => 8,
                0b11 => 4,
                _ => 1,
            };
            log::info!(
                "[{}] address={:#x}, R/W={}, Len={}, old_val={:#x}",
                idx, addr, rw, len, self.slots[idx].old_value
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dr7_local_bit_is_distinct_per_slot() {
        for idx in 0..NUM_SLOTS {
            let bit = dr7_local_bit(idx);
            assert_eq!(bit.count_ones(), 1);
            for other in 0..NUM_SLOTS {
                if other != idx {
                    assert_eq!(bit & dr7_local_bit(other), 0);
                }
            }
        }
    }

    #[test]
    fn dr7_on_reads_back_the_bit_just_set() {
        let dr7 = dr7_local_bit(0) | dr7_local_bit(2);
        assert!(dr7_on(dr7, 0));
        assert!(!dr7_on(dr7, 1));
        assert!(dr7_on(dr7, 2));
        assert!(!dr7_on(dr7, 3));
    }

    #[test]
    fn dr7_rw_and_len_shifts_dont_overlap_the_enable_bits() {
        for idx in 0..NUM_SLOTS {
            assert!(dr7_rw_shift(idx) >= 16);
            assert!(dr7_len_shift(idx) > dr7_rw_shift(idx));
        }
    }

    #[test]
    fn dr_offset_is_monotonic_per_register() {
        assert!(dr_offset(1) > dr_offset(0));
        assert_eq!(dr_offset(DR_CTRL) - dr_offset(0), 7 * std::mem::size_of::<libc::c_long>() as i64);
    }
}
