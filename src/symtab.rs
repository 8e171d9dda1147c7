//! Symbol table.
//!
//! A flat store of `Symbol`/`Section` records kept sorted in descending
//! address order -- this lets address lookup return the first symbol
//! whose range contains the query by a plain linear scan, without
//! needing a separate interval tree.

use std::collections::HashMap;
use std::sync::Arc;

use nix::sys::ptrace;
use nix::unistd::Pid;

use crate::error::{err, Result};
use crate::procmap::MemMap;

#[derive(Clone, Debug)]
pub struct Section {
    pub start: u64,
    pub end: u64,
    pub name: Arc<str>,
}

#[derive(Clone, Copy, Debug)]
pub struct GotSlot {
    pub addr: u64,
    pub val: i64,
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: Arc<str>,
    pub dyn_sym: bool,
    /// `elf_addr = va_base + rel_addr`; for a `GLOB_DAT` dynamic symbol
    /// this is 0 until the dynamic linker has resolved it.
    pub addr: u64,
    pub base: u64,
    pub size: u64,
    pub got: Option<GotSlot>,
    pub needs_resolve: bool,
    pub file_name: Option<Arc<str>>,
    pub section: Option<usize>,
    pub map: Option<usize>,
    /// Id of the breakpoint planted on this symbol, if any (set by the
    /// breakpoint engine, consulted when a dynamic symbol relocates).
    pub bp_id: Option<u32>,
}

/// A resolved dynamic symbol, returned by [`SymbolTable::resolve_dynamic`]
/// so the caller (the tracee controller) can re-plant any breakpoint
/// that was sitting on the old PLT/GOT address.
pub struct Relocated {
    pub name: Arc<str>,
    pub new_addr: u64,
    pub bp_id: Option<u32>,
}

pub struct SymbolTable {
    symbols: Vec<Symbol>,
    by_name: HashMap<Arc<str>, usize>,
    sections: Vec<Section>,
    maps: Vec<MemMap>,
}

impl SymbolTable {
    pub fn new(sections: Vec<Section>) -> Self {
        SymbolTable {
            symbols: Vec::new(),
            by_name: HashMap::new(),
            sections,
            maps: Vec::new(),
        }
    }

    pub fn set_maps(&mut self, maps: Vec<MemMap>) {
        self.maps = maps;
    }

    pub fn extend(&mut self, syms: impl IntoIterator<Item = Symbol>) {
        for sym in syms {
            self.insert(sym);
        }
    }

    pub fn insert(&mut self, mut sym: Symbol) {
        sym.section = self.section_index_for(sym.addr, sym.size);
        if sym.file_name.is_none() {
            if let Some(idx) = self.map_index_for(sym.addr, sym.size) {
                sym.map = Some(idx);
                sym.file_name = Some(Arc::from(self.maps[idx].path.to_string_lossy().as_ref()));
            }
        }

        let idx = self.symbols.len();
        self.by_name.insert(sym.name.clone(), idx);
        self.symbols.push(sym);
        self.sort_by_addr_desc();
    }

    /// Sorts symbols into descending address order.
    pub fn sort_by_addr_desc(&mut self) {
        self.symbols.sort_by(|a, b| b.addr.cmp(&a.addr));
        self.by_name.clear();
        for (idx, sym) in self.symbols.iter().enumerate() {
            self.by_name.insert(sym.name.clone(), idx);
        }
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<&Symbol> {
        self.by_name.get(name).map(|&idx| &self.symbols[idx])
    }

    pub fn lookup_by_name_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        let idx = *self.by_name.get(name)?;
        self.symbols.get_mut(idx)
    }

    /// Every symbol sharing `name` -- `by_name` only remembers the last one
    /// inserted, but local static symbols with the same name can coexist
    /// across translation units, so callers that need to offer the user a
    /// choice (`break func <name>`) scan the full list instead.
    pub fn lookup_all_by_name(&self, name: &str) -> Vec<&Symbol> {
        self.symbols.iter().filter(|s| s.name.as_ref() == name).collect()
    }

    /// Static symbols match `[addr, addr+size]`,
    /// dynamic symbols (size 0) match `addr` up to the end of their
    /// containing section.
    pub fn lookup_by_addr(&self, addr: u64) -> Option<&Symbol> {
        if addr == 0 {
            return None;
        }
        self.symbols.iter().find(|sym| {
            if !sym.dyn_sym {
                addr >= sym.addr && addr <= sym.addr + sym.size
            } else {
                match sym.section.map(|i| &self.sections[i]) {
                    Some(section) => addr >= sym.addr && addr < section.end,
                    None => false,
                }
            }
        })
    }

    pub fn addr_section(&self, addr: u64, size: u64) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| addr >= s.start && addr + size <= s.end)
    }

    fn section_index_for(&self, addr: u64, size: u64) -> Option<usize> {
        self.sections
            .iter()
            .position(|s| addr >= s.start && addr + size <= s.end)
    }

    fn map_index_for(&self, addr: u64, size: u64) -> Option<usize> {
        self.maps
            .iter()
            .position(|m| m.contains(addr, size.max(1)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Re-reads every unresolved dynamic symbol's GOT slot, and for
    /// slots whose value changed, updates the symbol's recorded
    /// address. A `JUMP_SLOT` symbol keeps its PLT stub address as long
    /// as it is nonzero; only a `GLOB_DAT` symbol (recorded with
    /// `addr == 0`) is promoted to the resolved address.
    pub fn resolve_dynamic(&mut self, pid: Pid) -> Result<Vec<Relocated>> {
        let mut relocated = Vec::new();

        for idx in 0..self.symbols.len() {
            let (dyn_sym, needs_resolve, got) = {
                let s = &self.symbols[idx];
                (s.dyn_sym, s.needs_resolve, s.got)
            };
            if !dyn_sym || !needs_resolve {
                continue;
            }
            let got = match got {
                Some(g) => g,
                None => continue,
            };

            let res = ptrace::read(pid, got.addr as *mut std::ffi::c_void)
                .map_err(|e| err(format!("PEEKDATA on GOT slot {:#x} failed: {}", got.addr, e)))?;
            if res == 0 {
                continue;
            }
            if res == got.val {
                continue;
            }

            let sym = &mut self.symbols[idx];
            sym.got = Some(GotSlot {
                addr: got.addr,
                val: res,
            });

            // a nonzero `addr` at this point means a JUMP_SLOT stub; keep
            // pointing at the PLT entry, only the GOT value changed.
            if sym.addr != 0 {
                continue;
            }

            let new_addr = res as u64;
            sym.addr = new_addr;
            sym.section = self.sections.iter().position(|s| new_addr >= s.start && new_addr < s.end);
            let name = sym.name.clone();
            let bp_id = sym.bp_id;

            relocated.push(Relocated {
                name,
                new_addr,
                bp_id,
            });
        }

        self.sort_by_addr_desc();
        Ok(relocated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_sym(name: &str, addr: u64, size: u64) -> Symbol {
        Symbol {
            name: Arc::from(name),
            dyn_sym: false,
            addr,
            base: 0,
            size,
            got: None,
            needs_resolve: false,
            file_name: None,
            section: None,
            map: None,
            bp_id: None,
        }
    }

    fn dyn_sym(name: &str, addr: u64, section: usize) -> Symbol {
        Symbol {
            name: Arc::from(name),
            dyn_sym: true,
            addr,
            base: 0,
            size: 0,
            got: Some(GotSlot { addr: 0x9000, val: 0 }),
            needs_resolve: true,
            file_name: None,
            section: Some(section),
            map: None,
            bp_id: None,
        }
    }

    #[test]
    fn lookup_by_name_finds_inserted_symbol() {
        let mut table = SymbolTable::new(Vec::new());
        table.insert(static_sym("foo", 0x1000, 16));
        assert_eq!(table.lookup_by_name("foo").unwrap().addr, 0x1000);
        assert!(table.lookup_by_name("bar").is_none());
    }

    #[test]
    fn lookup_by_addr_matches_static_symbol_interval() {
        let mut table = SymbolTable::new(Vec::new());
        table.insert(static_sym("foo", 0x1000, 0x10));
        assert_eq!(table.lookup_by_addr(0x1000).unwrap().name.as_ref(), "foo");
        assert_eq!(table.lookup_by_addr(0x1010).unwrap().name.as_ref(), "foo");
        assert!(table.lookup_by_addr(0x1011).is_none());
        assert!(table.lookup_by_addr(0x0fff).is_none());
    }

    #[test]
    fn lookup_by_addr_for_dynamic_symbol_extends_to_section_end() {
        let sections = vec![Section {
            start: 0x2000,
            end: 0x2100,
            name: Arc::from(".plt.sec"),
        }];
        let mut table = SymbolTable::new(sections);
        table.symbols.push(dyn_sym("puts", 0x2010, 0));
        table.sort_by_addr_desc();
        assert_eq!(table.lookup_by_addr(0x2010).unwrap().name.as_ref(), "puts");
        assert_eq!(table.lookup_by_addr(0x2050).unwrap().name.as_ref(), "puts");
        assert!(table.lookup_by_addr(0x2100).is_none());
    }

    #[test]
    fn lookup_by_addr_rejects_zero() {
        let table = SymbolTable::new(Vec::new());
        assert!(table.lookup_by_addr(0).is_none());
    }

    #[test]
    fn symbols_stay_sorted_descending_by_address() {
        let mut table = SymbolTable::new(Vec::new());
        table.insert(static_sym("low", 0x1000, 4));
        table.insert(static_sym("high", 0x3000, 4));
        table.insert(static_sym("mid", 0x2000, 4));
        let addrs: Vec<u64> = table.iter().map(|s| s.addr).collect();
        assert_eq!(addrs, vec![0x3000, 0x2000, 0x1000]);
    }
}
