//! ELF analyzer.
//!
//! One-shot parse of the executable on disk via `goblin`. Produces the
//! section list, the static and dynamic symbol sets, and the tracee
//! address of the dynamic linker's `DT_DEBUG` slot. Symbol and section
//! names are copied out of the parsed `goblin::elf::Elf` into owned
//! `Arc<str>`s before it (and the backing file bytes) are dropped --
//! nothing downstream borrows from the ELF handle, so its lifetime
//! never leaks into `Symbol`/`Section`.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use goblin::elf::dynamic::DT_DEBUG;
use goblin::elf::header::{ET_DYN, ET_EXEC};
use goblin::elf::reloc::{R_X86_64_GLOB_DAT, R_X86_64_JUMP_SLOT};
use goblin::elf::sym::{STB_LOCAL, STT_FILE, STT_FUNC};
use goblin::elf::Elf;
use nix::sys::ptrace;
use nix::unistd::Pid;

use crate::error::{err, Result};
use crate::symtab::{GotSlot, Section, Symbol};

pub struct ElfAnalysis {
    pub va_base: u64,
    pub sections: Vec<Section>,
    pub symbols: Vec<Symbol>,
    /// Tracee address of the `d_un` slot of the `DT_DEBUG` entry, if the
    /// binary is dynamically linked.
    pub dt_debug_addr: Option<u64>,
}

const PLT_PREFIX: &str = ".plt";

fn peek_word(pid: Pid, addr: u64) -> Result<i64> {
    ptrace::read(pid, addr as *mut std::ffi::c_void)
        .map_err(|e| err(format!("PEEKTEXT at {:#x} failed: {}", addr, e)))
}

/// Parses the executable at `exe_path` and ingests the tracee's current
/// GOT contents via `pid`. `va_base_guess` is the load base already
/// observed from `/proc/PID/maps` (only used for `ET_DYN`;
/// `ET_EXEC` forces it back to zero).
pub fn analyze(exe_path: &Path, va_base_guess: u64, pid: Pid) -> Result<ElfAnalysis> {
    let bytes = fs::read(exe_path)
        .map_err(|e| err(format!("reading {:?} failed: {}", exe_path, e)))?;
    let elf = Elf::parse(&bytes).map_err(|e| err(format!("ELF parse failed: {}", e)))?;

    let va_base = if elf.header.e_type == ET_EXEC {
        0
    } else if elf.header.e_type == ET_DYN {
        va_base_guess
    } else {
        return Err(err("binary is neither ET_EXEC nor ET_DYN, unsupported"));
    };

    let mut sections = Vec::new();
    let mut plt_ent_start: Option<u64> = None;
    let mut plt_entsize: u64 = 0;
    let mut plt_sec_seen = false;
    let mut dynamic_sh_addr: Option<u64> = None;

    for shdr in &elf.section_headers {
        let name = elf.shdr_strtab.get_at(shdr.sh_name).unwrap_or("");

        if name == ".dynamic" {
            dynamic_sh_addr = Some(shdr.sh_addr);
        }

        if name == ".plt.sec" {
            plt_sec_seen = true;
            plt_entsize = shdr.sh_entsize;
            plt_ent_start = Some(va_base + shdr.sh_addr);
        } else if name == ".plt" && !plt_sec_seen {
            // the first .plt entry is the resolver trampoline; skip it.
            plt_entsize = shdr.sh_entsize;
            plt_ent_start = Some(va_base + shdr.sh_addr + shdr.sh_entsize);
        }

        if shdr.sh_addr == 0 || shdr.sh_size == 0 {
            continue;
        }

        sections.push(Section {
            start: va_base + shdr.sh_addr,
            end: va_base + shdr.sh_addr + shdr.sh_size,
            name: Arc::from(name),
        });
    }

    let mut symbols = Vec::new();

    // Static symbols from .symtab.
    let mut last_file_name: Option<Arc<str>> = None;
    for sym in elf.syms.iter() {
        if sym.st_type() == STT_FILE {
            let name = elf.strtab.get_at(sym.st_name).filter(|s| !s.is_empty());
            last_file_name = name.map(Arc::from);
            continue;
        }

        if sym.st_type() != STT_FUNC || sym.st_value == 0 {
            continue;
        }
        if sym.st_shndx == 0 {
            // SHN_UNDEF
            continue;
        }

        let name = match elf.strtab.get_at(sym.st_name).filter(|s| !s.is_empty()) {
            Some(n) => n,
            None => continue,
        };

        let addr = va_base + sym.st_value;
        let file_name = if sym.st_bind() == STB_LOCAL {
            last_file_name.clone()
        } else {
            None
        };

        symbols.push(Symbol {
            name: Arc::from(name),
            dyn_sym: false,
            addr,
            base: va_base,
            size: sym.st_size,
            got: None,
            needs_resolve: false,
            file_name,
            section: None,
            map: None,
            bp_id: None,
        });
    }

    // Dynamic symbols from .rela.dyn and .rela.plt.
    for (i, reloc) in elf.dynrelas.iter().enumerate() {
        if let Some(sym) = dynamic_symbol_from_reloc(
            &elf,
            reloc.r_sym,
            reloc.r_type,
            reloc.r_offset,
            va_base,
            None,
            i,
            pid,
        )? {
            symbols.push(sym);
        }
    }
    for (i, reloc) in elf.pltrelocs.iter().enumerate() {
        if let Some(sym) = dynamic_symbol_from_reloc(
            &elf,
            reloc.r_sym,
            reloc.r_type,
            reloc.r_offset,
            va_base,
            plt_ent_start.map(|start| (start, plt_entsize)),
            i,
            pid,
        )? {
            symbols.push(sym);
        }
    }

    let dt_debug_addr = match (&elf.dynamic, dynamic_sh_addr) {
        (Some(dynamic), Some(sh_addr)) => dynamic
            .dyns
            .iter()
            .position(|d| d.d_tag == DT_DEBUG)
            .map(|idx| {
                let entsize = std::mem::size_of::<goblin::elf64::dynamic::Dyn>() as u64;
                let d_un_offset = 8u64; // offsetof(Elf64_Dyn, d_un)
                va_base + sh_addr + (idx as u64 * entsize) + d_un_offset
            }),
        _ => None,
    };

    Ok(ElfAnalysis {
        va_base,
        sections,
        symbols,
        dt_debug_addr,
    })
}

#[allow(clippy::too_many_arguments)]
fn dynamic_symbol_from_reloc(
    elf: &Elf,
    sym_idx: usize,
    r_type: u32,
    r_offset: u64,
    va_base: u64,
    plt: Option<(u64, u64)>,
    reloc_index: usize,
    pid: Pid,
) -> Result<Option<Symbol>> {
    let sym = match elf.dynsyms.get(sym_idx) {
        Some(s) => s,
        None => return Ok(None),
    };
    if sym.st_type() != STT_FUNC {
        return Ok(None);
    }

    let name = match elf.dynstrtab.get_at(sym.st_name).filter(|s| !s.is_empty()) {
        Some(n) => n,
        None => return Ok(None),
    };

    let got_addr = va_base + r_offset;
    let addr = match r_type {
        R_X86_64_JUMP_SLOT => match plt {
            Some((start, entsize)) => start + entsize * reloc_index as u64,
            None => return Ok(None),
        },
        R_X86_64_GLOB_DAT => 0,
        _ => {
            log::debug!("relocation type {} not implemented, skipping {}", r_type, name);
            return Ok(None);
        }
    };

    let got_val = peek_word(pid, got_addr)?;

    Ok(Some(Symbol {
        name: Arc::from(name),
        dyn_sym: true,
        addr,
        base: 0,
        size: 0,
        got: Some(GotSlot {
            addr: got_addr,
            val: got_val,
        }),
        needs_resolve: true,
        file_name: None,
        section: None,
        map: None,
        bp_id: None,
    }))
}

pub fn is_plt_section(name: &str) -> bool {
    name.starts_with(PLT_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_plt_section_matches_plt_and_plt_sec() {
        assert!(is_plt_section(".plt"));
        assert!(is_plt_section(".plt.sec"));
        assert!(!is_plt_section(".text"));
        assert!(!is_plt_section(".dynamic"));
    }
}
