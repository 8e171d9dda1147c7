//! `backtrace`/`bt` action: walks the tracee's call stack via the
//! remote-unwind bridge.

use crate::dispatch::{Action, Entity};
use crate::error::Result;
use crate::session::Session;
use crate::tracee::TraceeState;

fn backtrace(session: &mut Session, _arg: Option<&str>) -> Result<TraceeState> {
    let frames = match session.unwinder.backtrace(session.tracee.pid) {
        Ok(f) => f,
        Err(e) => {
            log::error!("{}", e);
            return Ok(TraceeState::Stopped);
        }
    };

    for frame in frames {
        match frame.proc_name {
            Some(name) => println!("{:#x}: ({}+{:#x})", frame.pc, name, frame.offset),
            None => println!("{:#x}: -- no symbol name found", frame.pc),
        }
    }
    Ok(TraceeState::Stopped)
}

pub const ACTION: Action = Action {
    name: "backtrace",
    aliases: &["bt"],
    handlers: &[(Entity::None_, backtrace)],
    help_text: "backtrace,bt\n",
};
