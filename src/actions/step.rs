//! `step` action: a single `PTRACE_SINGLESTEP`. Re-arming a breakpoint
//! stepped over on the previous stop happens inside
//! [`crate::tracee::Tracee::step`] itself.

use crate::dispatch::{Action, Entity};
use crate::error::Result;
use crate::session::Session;
use crate::tracee::TraceeState;

fn step(session: &mut Session, _arg: Option<&str>) -> Result<TraceeState> {
    session.tracee.step()?;
    Ok(TraceeState::Running)
}

pub const ACTION: Action = Action {
    name: "step",
    aliases: &["s"],
    handlers: &[(Entity::None_, step)],
    help_text: "step,s\n",
};
