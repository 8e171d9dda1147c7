//! `watch`/`w` and `rwatch`/`rw` actions. `watch` arms a write-only
//! hardware watchpoint, `rwatch` a read-and-write one.

use crate::dispatch::{parse_addr, Action, Entity};
use crate::error::Result;
use crate::session::Session;
use crate::tracee::TraceeState;
use crate::watchpoint::WatchKind;

fn add_watch(session: &mut Session, arg: Option<&str>, kind: WatchKind) -> Result<TraceeState> {
    let addr = match arg.and_then(parse_addr) {
        Some(a) if a != 0 => a,
        _ => {
            log::error!("invalid address passed, non-zero decimal/hex supported");
            return Ok(TraceeState::Stopped);
        }
    };

    if let Err(e) = session.tracee.watchpoints.add(session.tracee.pid, addr, kind) {
        log::error!("error in adding watchpoint: {}", e);
    }
    Ok(TraceeState::Stopped)
}

fn watch_addr(session: &mut Session, arg: Option<&str>) -> Result<TraceeState> {
    add_watch(session, arg, WatchKind::Write)
}

fn rwatch_addr(session: &mut Session, arg: Option<&str>) -> Result<TraceeState> {
    add_watch(session, arg, WatchKind::ReadWrite)
}

pub const ACTION: Action = Action {
    name: "watch",
    aliases: &["w"],
    handlers: &[(Entity::Address, watch_addr)],
    help_text: "watch,w addr <0xaddress>\n",
};

pub const RACTION: Action = Action {
    name: "rwatch",
    aliases: &["rw"],
    handlers: &[(Entity::Address, rwatch_addr)],
    help_text: "rwatch,rw addr <0xaddress>\n",
};
