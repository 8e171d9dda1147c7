//! `break`/`br` action. `break addr <hex>` plants a breakpoint at a raw
//! address; `break func <name>` resolves a symbol first and, if the
//! symbol isn't loaded yet, offers to make the breakpoint pending --
//! accepting the confirmation but not yet implementing the deferred
//! installation (see DESIGN.md). A `func` symbol known to the dynamic
//! linker's own relocation table (the common case: a PLT/GOT entry for
//! a not-yet-`dlopen`ed library function) resolves immediately and
//! doesn't hit this path at all; it becomes active the moment the
//! linker bridge reports the GOT slot filled in.

use crate::dispatch::{parse_addr, Action, Entity};
use crate::elf;
use crate::error::Result;
use crate::prompt;
use crate::session::Session;
use crate::symtab::Symbol;
use crate::tracee::TraceeState;

/// Several symbols share `func`'s name (e.g. same-named `static` functions
/// in different translation units). Lists them indexed from 1 and reads
/// back the user's pick; any empty or unparsable input cancels.
fn prompt_for_choice(matches: &[&Symbol]) -> Result<Option<Symbol>> {
    println!("Multiple matches for that function name:");
    for (i, sym) in matches.iter().enumerate() {
        println!(
            "  [{}] {} at {:#x} ({})",
            i + 1,
            sym.name,
            sym.addr,
            sym.file_name.as_deref().unwrap_or("??")
        );
    }

    let line = match prompt::read_line("Pick one (blank to cancel): ")? {
        Some(l) => l,
        None => return Ok(None),
    };
    let choice: usize = match line.trim().parse() {
        Ok(n) => n,
        Err(_) => return Ok(None),
    };

    Ok(matches.get(choice.wrapping_sub(1)).map(|s| (*s).clone()))
}

fn breakpoint_addr(session: &mut Session, arg: Option<&str>) -> Result<TraceeState> {
    let addr = match arg.and_then(parse_addr) {
        Some(a) if a != 0 => a,
        _ => {
            log::error!("invalid address passed");
            return Ok(TraceeState::Stopped);
        }
    };

    log::debug!("breaking address: {:#x}", addr);
    let _ = session.tracee.breakpoints.add(session.tracee.pid, addr, None, false)?;
    Ok(TraceeState::Stopped)
}

fn breakpoint_func(session: &mut Session, arg: Option<&str>) -> Result<TraceeState> {
    let func = match arg {
        Some(f) if !f.is_empty() => f,
        _ => {
            log::error!("invalid name to breakpoint");
            return Ok(TraceeState::Stopped);
        }
    };

    let matches = session.tracee.symtab.lookup_all_by_name(func);
    let sym = match matches.len() {
        0 => {
            let pending = prompt::confirm(&format!(
                "function '{}' is not yet defined.\nMake breakpoint pending on future shared library load?",
                func
            ))?;
            if !pending {
                log::info!("not adding breakpoint");
            } else {
                log::warn!("feature not implemented yet");
            }
            return Ok(TraceeState::Stopped);
        }
        1 => matches[0].clone(),
        _ => match prompt_for_choice(&matches)? {
            Some(sym) => sym,
            None => {
                log::info!("not adding breakpoint");
                return Ok(TraceeState::Stopped);
            }
        },
    };

    if session.tracee.breakpoints.find_by_addr(sym.addr).is_some() {
        log::info!("already a breakpoint for '{}' present", func);
        return Ok(TraceeState::Stopped);
    }

    let section_name = session.tracee.symtab.addr_section(sym.addr, 1).map(|s| s.name.as_ref());
    let is_plt_bp = sym.dyn_sym && section_name.map(elf::is_plt_section).unwrap_or(false);

    let name = sym.name.clone();
    let _ = session
        .tracee
        .breakpoints
        .add(session.tracee.pid, sym.addr, Some(name), is_plt_bp)?;
    Ok(TraceeState::Stopped)
}

pub const ACTION: Action = Action {
    name: "break",
    aliases: &["br"],
    handlers: &[
        (Entity::Address, breakpoint_addr),
        (Entity::Function, breakpoint_func),
    ],
    help_text: "break,br func <function_name>\nbreak,br addr <0xaddress>\n",
};
