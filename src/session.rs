//! The process-wide debugging session: bundles the tracee controller,
//! the backtrace bridge and the action registry into one explicit
//! object instead of a handful of file-scoped globals.

use crate::actions;
use crate::dispatch::Action;
use crate::error::Result;
use crate::tracee::{Tracee, TraceeState};
use crate::unwind::Unwinder;

pub struct Session {
    pub tracee: Tracee,
    pub unwinder: Unwinder,
    pub actions: Vec<Action>,
}

impl Session {
    pub fn new(tracee: Tracee) -> Result<Self> {
        Ok(Session {
            tracee,
            unwinder: Unwinder::new()?,
            actions: actions::register_all(),
        })
    }

    /// Tokenizes and routes one line of input, returning the tracee's
    /// next state.
    pub fn dispatch_line(&mut self, line: &str) -> Result<TraceeState> {
        crate::dispatch::dispatch(self, line)
    }
}
