//! `delete`/`del` action: removes a breakpoint or watchpoint by its
//! printed index.

use crate::dispatch::{Action, Entity};
use crate::error::Result;
use crate::session::Session;
use crate::tracee::TraceeState;

fn delete_breakpoint(session: &mut Session, arg: Option<&str>) -> Result<TraceeState> {
    let idx: u32 = match arg.and_then(|a| a.parse().ok()) {
        Some(idx) if idx != 0 => idx,
        _ => {
            log::error!("invalid breakpoint number passed");
            return Ok(TraceeState::Stopped);
        }
    };
    session.tracee.breakpoints.delete(idx);
    Ok(TraceeState::Stopped)
}

fn delete_watchpoint(session: &mut Session, arg: Option<&str>) -> Result<TraceeState> {
    let idx: usize = match arg.and_then(|a| a.parse().ok()) {
        Some(idx) => idx,
        None => {
            log::error!("invalid watchpoint number passed");
            return Ok(TraceeState::Stopped);
        }
    };
    session.tracee.watchpoints.delete(session.tracee.pid, idx)?;
    Ok(TraceeState::Stopped)
}

pub const ACTION: Action = Action {
    name: "delete",
    aliases: &["del"],
    handlers: &[
        (Entity::Breakpoint, delete_breakpoint),
        (Entity::Watchpoint, delete_watchpoint),
    ],
    help_text: "delete,del break <id>\ndelete,del watch <id>\n",
};
