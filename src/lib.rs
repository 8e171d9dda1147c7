//! A minimal interactive ptrace-based debugger for a single Linux x86-64
//! tracee, plus two companion tracers built on the same core: a
//! library-call tracer and a syscall tracer.
//!
//! The module layout splits the tracee core (attach/exec, breakpoints,
//! watchpoints, symbol resolution) from the action dispatcher that
//! drives it interactively; see each module's header comment for
//! details.

pub mod actions;
pub mod breakpoint;
pub mod dispatch;
pub mod elf;
pub mod error;
pub mod libcall;
pub mod linker;
pub mod logging;
pub mod procmap;
pub mod prompt;
pub mod session;
pub mod symtab;
pub mod syscall_trace;
pub mod tracee;
pub mod unwind;
pub mod watchpoint;
