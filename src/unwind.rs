//! Backtrace bridge over `libunwind-ptrace`: `_UPT_create` for the
//! `PTRACE` accessors, `unw_init_remote` for a cursor into the tracee's
//! register state, then `unw_get_reg`/`unw_get_proc_name`/`unw_step` to
//! walk frames. The `unwind` crate is the safe Rust binding over the
//! same `libunwind-ptrace` C library: one [`AddressSpace`] per debugging
//! session, a fresh [`PTraceState`]/[`Cursor`] per `backtrace` invocation.

use nix::unistd::Pid;
use unwind::{Accessors, AddressSpace, Byteorder, Cursor, PTraceState, RegNum};

use crate::error::{err, Result};

pub struct Unwinder {
    space: AddressSpace,
}

/// One frame of a walked backtrace: the program counter, and the owning
/// procedure's name plus the byte offset into it, when libunwind can
/// resolve one.
pub struct Frame {
    pub pc: u64,
    pub proc_name: Option<String>,
    pub offset: u64,
}

impl Unwinder {
    /// Calls `unw_create_addr_space(&_UPT_accessors, 0)`; called once
    /// after the tracee is attached.
    pub fn new() -> Result<Self> {
        let space = AddressSpace::new(Accessors::ptrace(), Byteorder::DEFAULT)
            .map_err(|e| err(format!("unw_create_addr_space failed: {:?}", e)))?;
        Ok(Unwinder { space })
    }

    /// Walks every frame reachable from the tracee's current register
    /// state via `unw_step`.
    pub fn backtrace(&self, pid: Pid) -> Result<Vec<Frame>> {
        let state = PTraceState::new(pid.as_raw() as u32)
            .map_err(|e| err(format!("_UPT_create failed: {:?}", e)))?;
        let mut cursor = Cursor::remote(&self.space, &state)
            .map_err(|e| err(format!("cannot initialize cursor for remote unwinding: {:?}", e)))?;

        let mut frames = Vec::new();
        loop {
            let pc = cursor
                .register(RegNum::IP)
                .map_err(|e| err(format!("cannot read program counter: {:?}", e)))?;

            let (proc_name, offset) = match cursor.procedure_name() {
                Ok(name) => (Some(name.name().to_string()), name.offset()),
                Err(_) => (None, 0),
            };
            frames.push(Frame { pc, proc_name, offset });

            match cursor.step() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(_) => break,
            }
        }
        Ok(frames)
    }
}
