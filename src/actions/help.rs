//! `help`/`h` action: with no argument, prints every
//! registered action's help text; with an argument, prints just that
//! action's.

use crate::dispatch::{Action, Entity};
use crate::error::Result;
use crate::session::Session;
use crate::tracee::TraceeState;

fn help_handler(session: &mut Session, arg: Option<&str>) -> Result<TraceeState> {
    match arg {
        None => {
            println!("Supported commands are: ");
            for a in &session.actions {
                a.print_help();
            }
        }
        Some(name) => match session.actions.iter().find(|a| a.matches(name)) {
            Some(a) => {
                println!("Supported commands are: ");
                a.print_help();
            }
            None => log::error!("invalid arg to help: '{}'", name),
        },
    }
    Ok(TraceeState::Stopped)
}

pub const ACTION: Action = Action {
    name: "help",
    aliases: &["h"],
    handlers: &[(Entity::None_, help_handler)],
    help_text: "help,h\nhelp,h <action>\n",
};
