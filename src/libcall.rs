//! Library-call tracer (the `libtrace` companion binary): attaches to
//! (or execs) a tracee, plants a breakpoint on every resolved dynamic
//! symbol, then free-runs the tracee reporting each call as its
//! breakpoint is hit. Built entirely on the same [`crate::tracee::Tracee`]
//! the interactive debugger uses -- planting breakpoints the same way
//! the `break func <name>` action does (`crate::actions::breakcmd`),
//! and reading the hit address the same way `breakpoint::handle` leaves
//! it: rewound onto the breakpoint's own address.

use std::sync::Arc;

use crate::error::{err, Result};
use crate::tracee::{Tracee, TraceeState};

pub struct LibCallTracer {
    pub tracee: Tracee,
}

impl LibCallTracer {
    pub fn new(tracee: Tracee) -> Self {
        LibCallTracer { tracee }
    }

    /// Plants a breakpoint on every dynamic symbol whose address is
    /// already known (its PLT stub, until the linker resolves it).
    pub fn arm_all(&mut self) -> Result<()> {
        let pid = self.tracee.pid;
        let targets: Vec<(Arc<str>, u64, bool)> = self
            .tracee
            .symtab
            .iter()
            .filter(|s| s.dyn_sym && s.addr != 0)
            .map(|s| {
                let is_plt_bp = self
                    .tracee
                    .symtab
                    .addr_section(s.addr, 1)
                    .map(|sec| crate::elf::is_plt_section(&sec.name))
                    .unwrap_or(false);
                (s.name.clone(), s.addr, is_plt_bp)
            })
            .collect();

        for (name, addr, is_plt_bp) in targets {
            if self.tracee.breakpoints.find_by_addr(addr).is_some() {
                continue;
            }
            let _ = self.tracee.breakpoints.add(pid, addr, Some(name), is_plt_bp)?;
        }
        Ok(())
    }

    /// Runs the tracee to completion, printing one line per library call
    /// hit and resuming past it each time. Returns the tracee's exit code.
    pub fn run_to_completion(&mut self) -> Result<i32> {
        self.tracee.run()?;
        loop {
            match self.tracee.wait_event()? {
                TraceeState::Exited(code) => return Ok(code),
                TraceeState::Killed => return Ok(137),
                TraceeState::Err => return Err(err("tracee entered an error state")),
                TraceeState::Running => continue,
                TraceeState::Stopped => {
                    let regs = self.tracee.getregs()?;
                    if let Some(bp) = self.tracee.breakpoints.find_by_addr(regs.rip) {
                        println!(
                            "{}() @ {:#x}",
                            bp.symbol_name.as_deref().unwrap_or("??"),
                            bp.addr
                        );
                    }
                    self.tracee.run()?;
                }
            }
        }
    }
}
