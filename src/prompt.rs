//! Interactive line reader for the debugger prompt.
//!
//! Deliberately thin: reads one line of stdin at a time. Line
//! editing/history is out of scope.

use std::io::{self, Write};

pub const PROMPT: &str = "dbg> ";

pub fn read_line(prompt: &str) -> io::Result<Option<String>> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut line = String::new();
    let n = io::stdin().read_line(&mut line)?;
    if n == 0 {
        return Ok(None);
    }

    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Some(line))
}

/// Prompts `message` and reads a single y/N confirmation; defaults to `no`
/// on anything other than a leading 'y'/'Y'.
pub fn confirm(message: &str) -> io::Result<bool> {
    print!("{} (y or [n]) ", message);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let first = line.trim().chars().next();
    Ok(matches!(first, Some('y') | Some('Y')))
}
