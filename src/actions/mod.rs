//! Built-in action handlers, one module per command. [`register_all`]
//! builds one explicit dispatch table at startup rather than relying on
//! load-time constructors to populate it.

mod backtrace;
mod breakcmd;
mod delete;
mod help;
mod info;
mod kill;
mod print;
mod run;
mod step;
mod watch;

pub use crate::dispatch::Action;

pub fn register_all() -> Vec<Action> {
    vec![
        run::ACTION,
        step::ACTION,
        breakcmd::ACTION,
        kill::ACTION,
        print::ACTION,
        info::ACTION,
        backtrace::ACTION,
        watch::ACTION,
        watch::RACTION,
        delete::ACTION,
        help::ACTION,
    ]
}
