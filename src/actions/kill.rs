//! `kill` action: confirms, then `SIGKILL`s the tracee.

use crate::dispatch::{Action, Entity};
use crate::error::Result;
use crate::prompt;
use crate::session::Session;
use crate::tracee::TraceeState;

fn kill_tracee(session: &mut Session, _arg: Option<&str>) -> Result<TraceeState> {
    if prompt::confirm("Do you really want to kill the tracee")? {
        session.tracee.kill()?;
        Ok(TraceeState::Killed)
    } else {
        Ok(TraceeState::Stopped)
    }
}

pub const ACTION: Action = Action {
    name: "kill",
    aliases: &[],
    handlers: &[(Entity::None_, kill_tracee)],
    help_text: "kill\n",
};
