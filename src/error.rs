//! Error plumbing shared by every module.
//!
//! The rest of the crate follows the convention already established by
//! the process/map reader: plain `std::io::Result`, with `io::Error::new`
//! used to attach context. [`ErrorClass`] exists only to let the event
//! loop classify a failure into one of four categories (user error,
//! inaccessible tracee memory, transient kernel error, invariant
//! violation) without inventing a second error type for the rest of the
//! crate to thread through.

use std::fmt;
use std::io;

pub type Result<T> = io::Result<T>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input from the user (unknown symbol, malformed command).
    User,
    /// The tracee's memory is unmapped or the access would fault.
    Inaccessible,
    /// `ESRCH`/`EPERM`/`EFAULT` on a ptrace primitive: the debugger can
    /// no longer trust its view of the tracee.
    Transient,
    /// An event arrived that violates an assumed invariant (e.g. expected
    /// a single-step completion but got something else).
    Invariant,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorClass::User => "user error",
            ErrorClass::Inaccessible => "tracee memory inaccessible",
            ErrorClass::Transient => "transient kernel error",
            ErrorClass::Invariant => "invariant violation",
        };
        write!(f, "{}", s)
    }
}

pub fn err(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::Other, msg.into())
}

pub fn invalid_input(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg.into())
}

/// True for the errno values nix reports when a ptrace memory access
/// targets an address that isn't mapped or isn't accessible to us.
pub fn is_inaccessible(errno: nix::Error) -> bool {
    matches!(errno, nix::Error::EIO | nix::Error::EFAULT)
}

/// True for the errno values that mean "the tracee is gone, or we never
/// had permission" -- the debugger can no longer trust its view and the
/// caller should treat this as fatal.
pub fn is_transient_kernel_error(errno: nix::Error) -> bool {
    matches!(errno, nix::Error::ESRCH | nix::Error::EPERM)
}
