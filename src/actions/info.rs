//! `info`/`inf` action. Delegates register printing to `print`'s
//! handler directly rather than duplicating the register dump.

use crate::dispatch::{self, parse_addr, Action, Entity};
use crate::error::Result;
use crate::session::Session;
use crate::tracee::TraceeState;

fn info_addr(session: &mut Session, arg: Option<&str>) -> Result<TraceeState> {
    let addr = match arg.and_then(parse_addr) {
        Some(a) if a != 0 => a,
        _ => {
            log::error!("invalid address passed, only decimal/hex supported");
            return Ok(TraceeState::Stopped);
        }
    };

    let sym = match session.tracee.symtab.lookup_by_addr(addr) {
        Some(s) => s,
        None => {
            println!("No symbol matches {:#x}", addr);
            return Ok(TraceeState::Stopped);
        }
    };

    let section_name = session
        .tracee
        .symtab
        .addr_section(sym.addr, 1)
        .map(|s| s.name.as_ref())
        .unwrap_or("??");
    let file_name = sym.file_name.as_deref().unwrap_or("??");

    if addr == sym.addr {
        println!("{} in section {} of {}", sym.name, section_name, file_name);
    } else {
        println!(
            "{} + {} in section {} of {}",
            sym.name,
            addr - sym.addr,
            section_name,
            file_name
        );
    }
    Ok(TraceeState::Stopped)
}

fn info_func(session: &mut Session, arg: Option<&str>) -> Result<TraceeState> {
    let func = arg.unwrap_or("");
    let sym = match session.tracee.symtab.lookup_by_name(func) {
        Some(s) => s,
        None => {
            println!("The symbol '{}' is not present or loaded yet", func);
            return Ok(TraceeState::Stopped);
        }
    };
    println!(
        "Symbol '{}' is at '{:#x}' in {}",
        func,
        sym.addr,
        sym.file_name.as_deref().unwrap_or("??")
    );
    Ok(TraceeState::Stopped)
}

fn info_funcs(session: &mut Session, _arg: Option<&str>) -> Result<TraceeState> {
    for sym in session.tracee.symtab.iter() {
        println!(
            "{:#x} {} ({})",
            sym.addr,
            sym.name,
            sym.file_name.as_deref().unwrap_or("??")
        );
    }
    Ok(TraceeState::Stopped)
}

fn info_breakpoints(session: &mut Session, _arg: Option<&str>) -> Result<TraceeState> {
    session.tracee.breakpoints.print_all();
    Ok(TraceeState::Stopped)
}

fn info_watchpoints(session: &mut Session, _arg: Option<&str>) -> Result<TraceeState> {
    session.tracee.watchpoints.print_all(session.tracee.pid)?;
    Ok(TraceeState::Stopped)
}

fn info_regs(session: &mut Session, _arg: Option<&str>) -> Result<TraceeState> {
    dispatch::dispatch(session, "print reg all")
}

pub const ACTION: Action = Action {
    name: "info",
    aliases: &["inf"],
    handlers: &[
        (Entity::Breakpoint, info_breakpoints),
        (Entity::Register, info_regs),
        (Entity::Function, info_func),
        (Entity::Functions, info_funcs),
        (Entity::Address, info_addr),
        (Entity::Watchpoint, info_watchpoints),
    ],
    help_text: "info,inf func <function_name>\ninfo,inf addr <0xaddress>\ninfo,inf break\ninfo,inf reg\ninfo,inf funcs\ninfo,inf watch\n",
};
