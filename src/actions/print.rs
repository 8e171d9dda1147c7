//! `print`/`p` action: prints a raw tracee memory word or one (or all)
//! general-purpose registers.

use crate::dispatch::{parse_addr, Action, Entity};
use crate::error::{is_inaccessible, Result};
use crate::session::Session;
use crate::tracee::TraceeState;

fn print_addr(session: &mut Session, arg: Option<&str>) -> Result<TraceeState> {
    let raddr = match arg.and_then(parse_addr) {
        Some(a) if a != 0 => a,
        _ => {
            log::error!("invalid address passed, only decimal/hex supported");
            return Ok(TraceeState::Stopped);
        }
    };

    match nix::sys::ptrace::read(session.tracee.pid, raddr as *mut std::ffi::c_void) {
        Ok(data) => {
            println!("{:#018x}", data);
            Ok(TraceeState::Stopped)
        }
        Err(e) if is_inaccessible(e) => {
            log::info!("the requested memory address({:#x}) is not accessible", raddr);
            Ok(TraceeState::Stopped)
        }
        Err(e) => {
            log::error!("reading the address({:#x}) failed: {}", raddr, e);
            Ok(TraceeState::Stopped)
        }
    }
}

macro_rules! match_reg {
    ($regs:expr, $reg:expr, $target:ident) => {
        if $reg == stringify!($target) {
            println!("{}={}", stringify!($target), $regs.$target);
            return Ok(TraceeState::Stopped);
        }
    };
}

macro_rules! match_reg_addr {
    ($regs:expr, $reg:expr, $target:ident) => {
        if $reg == stringify!($target) {
            println!("{}={:#x}", stringify!($target), $regs.$target);
            return Ok(TraceeState::Stopped);
        }
    };
}

fn print_regs(regs: &libc::user_regs_struct) {
    println!("cs={}", regs.cs);
    println!("ds={}", regs.ds);
    println!("es={}", regs.es);
    println!("fs={}", regs.fs);
    println!("gs={}", regs.gs);
    println!("ss={}", regs.ss);
    println!("eflags={}", regs.eflags);
    println!("rax={}", regs.rax);
    println!("rbx={}", regs.rbx);
    println!("rcx={}", regs.rcx);
    println!("rdx={}", regs.rdx);
    println!("rsi={}", regs.rsi);
    println!("rdi={}", regs.rdi);
    println!("rsp={:#x}", regs.rsp);
    println!("rbp={:#x}", regs.rbp);
    println!("rip={:#x}", regs.rip);
    println!("r8={}", regs.r8);
    println!("r9={}", regs.r9);
    println!("r10={}", regs.r10);
    println!("r11={}", regs.r11);
    println!("r12={}", regs.r12);
    println!("r13={}", regs.r13);
    println!("r14={}", regs.r14);
    println!("r15={}", regs.r15);
}

fn print_reg(session: &mut Session, arg: Option<&str>) -> Result<TraceeState> {
    let reg = match arg {
        Some(r) => r,
        None => {
            log::error!("invalid register: (none)");
            return Ok(TraceeState::Stopped);
        }
    };

    let regs = session.tracee.getregs()?;

    if reg == "all" {
        print_regs(&regs);
        return Ok(TraceeState::Stopped);
    }

    match_reg!(regs, reg, cs);
    match_reg!(regs, reg, ds);
    match_reg!(regs, reg, es);
    match_reg!(regs, reg, fs);
    match_reg!(regs, reg, gs);
    match_reg!(regs, reg, ss);
    match_reg!(regs, reg, eflags);
    match_reg!(regs, reg, rax);
    match_reg!(regs, reg, rbx);
    match_reg!(regs, reg, rcx);
    match_reg!(regs, reg, rdx);
    match_reg!(regs, reg, rsi);
    match_reg!(regs, reg, rdi);
    match_reg_addr!(regs, reg, rsp);
    match_reg_addr!(regs, reg, rbp);
    match_reg_addr!(regs, reg, rip);
    match_reg!(regs, reg, r8);
    match_reg!(regs, reg, r9);
    match_reg!(regs, reg, r10);
    match_reg!(regs, reg, r11);
    match_reg!(regs, reg, r12);
    match_reg!(regs, reg, r13);
    match_reg!(regs, reg, r14);
    match_reg!(regs, reg, r15);

    log::error!("invalid register: {}", reg);
    Ok(TraceeState::Stopped)
}

pub const ACTION: Action = Action {
    name: "print",
    aliases: &["p"],
    handlers: &[(Entity::Register, print_reg), (Entity::Address, print_addr)],
    help_text: "print,p reg <register_name>\nprint,p addr <0xaddress>\n",
};
