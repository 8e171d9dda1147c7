//! `run` action: a bare `PTRACE_CONT`.

use crate::dispatch::{Action, Entity};
use crate::error::Result;
use crate::session::Session;
use crate::tracee::TraceeState;

fn run(session: &mut Session, _arg: Option<&str>) -> Result<TraceeState> {
    session.tracee.run()?;
    Ok(TraceeState::Running)
}

pub const ACTION: Action = Action {
    name: "run",
    aliases: &[],
    handlers: &[(Entity::None_, run)],
    help_text: "run\n",
};
