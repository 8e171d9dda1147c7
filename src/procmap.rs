//! Process/Map reader.
//!
//! Parses `/proc/PID/maps`, `/proc/PID/comm` and `/proc/PID/exe`. Only
//! `/proc/PID/maps` lines with a path are retained -- anonymous
//! mappings carry no symbol information and are never useful as a load
//! base or region lookup target.

use std::fs;
use std::path::PathBuf;

use combine::parser::char::{char, digit, hex_digit, spaces};
use combine::parser::choice::choice;
use combine::{count, many1, none_of, optional, parser, Parser, Stream};
use nix::unistd::Pid;

use crate::error::{err, Result};

#[derive(Clone, Debug)]
pub struct MemMap {
    pub start: u64,
    pub end: u64,
    pub perms: (bool, bool, bool),
    pub offset: u64,
    pub path: PathBuf,
}

impl MemMap {
    pub fn contains(&self, addr: u64, size: u64) -> bool {
        addr >= self.start && addr.saturating_add(size) <= self.end
    }
}

parser! {
    fn hex_value[Input]()(Input) -> u64
    where [Input: Stream<Token = char>]
    {
        many1::<String, _, _>(hex_digit()).map(|s| u64::from_str_radix(&s, 16).unwrap_or(0))
    }
}

parser! {
    fn dec_value[Input]()(Input) -> u64
    where [Input: Stream<Token = char>]
    {
        many1::<String, _, _>(digit()).map(|s| s.parse::<u64>().unwrap_or(0))
    }
}

parser! {
    fn dev_field[Input]()(Input) -> ()
    where [Input: Stream<Token = char>]
    {
        (
            spaces(),
            count::<String, _, _>(2, hex_digit()),
            char(':'),
            count::<String, _, _>(2, hex_digit()),
        )
            .map(|_| ())
    }
}

parser! {
    fn perms_field[Input]()(Input) -> (bool, bool, bool)
    where [Input: Stream<Token = char>]
    {
        (
            spaces(),
            choice((char('-'), char('r'))),
            choice((char('-'), char('w'))),
            choice((char('-'), char('x'))),
            choice((char('-'), char('s'), char('p'))),
        )
            .map(|(_, r, w, x, _)| (r == 'r', w == 'w', x == 'x'))
    }
}

parser! {
    fn filepath_field[Input]()(Input) -> Option<PathBuf>
    where [Input: Stream<Token = char>]
    {
        (
            spaces(),
            optional(many1::<String, _, _>(none_of("\r\n".chars()))),
        )
            .map(|(_, path): (_, Option<String>)| path.map(PathBuf::from))
    }
}

parser! {
    fn maps_line[Input]()(Input) -> (u64, u64, (bool, bool, bool), Option<PathBuf>)
    where [Input: Stream<Token = char>]
    {
        (
            hex_value(),
            char('-'),
            hex_value(),
            perms_field(),
            spaces(),
            hex_value(),
            dev_field(),
            spaces(),
            dec_value(),
            filepath_field(),
        )
            .map(|(start, _, end, perms, _, offset, _, _, _inode, path)| {
                (start, end, perms, offset, path)
            })
    }
}

fn parse_maps_line(line: &str) -> Option<MemMap> {
    let (result, _) = maps_line().parse(line).ok()?;
    let (start, end, perms, offset, path) = result;
    let path = path?;
    Some(MemMap {
        start,
        end,
        perms,
        offset,
        path,
    })
}

pub fn decode_proc_maps(pid: Pid) -> Result<Vec<MemMap>> {
    let contents = fs::read_to_string(format!("/proc/{}/maps", pid))?;
    Ok(contents.lines().filter_map(parse_maps_line).collect())
}

pub fn read_pid_comm(pid: Pid) -> Result<String> {
    let s = fs::read_to_string(format!("/proc/{}/comm", pid))?;
    Ok(s.trim_end().to_string())
}

pub fn read_pid_exe(pid: Pid) -> Result<PathBuf> {
    fs::read_link(format!("/proc/{}/exe", pid))
        .map_err(|e| err(format!("readlink /proc/{}/exe failed: {}", pid, e)))
}

/// Finds the memory region containing `[addr, addr+size)`.
pub fn find_region(maps: &[MemMap], addr: u64, size: u64) -> Option<&MemMap> {
    maps.iter().find(|m| m.contains(addr, size))
}

/// Picks the tracee's load base: the first file-backed mapping whose path
/// equals `exe_path` and whose file offset is 0. For `ET_EXEC` binaries
/// this should stay 0 since the caller forces `va_base = 0` before ever
/// consulting the map.
pub fn find_load_base(maps: &[MemMap], exe_path: &std::path::Path) -> Option<u64> {
    maps.iter()
        .find(|m| m.offset == 0 && m.path == exe_path)
        .map(|m| m.start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_maps_line_with_path() {
        let line = "55a1f2a0e000-55a1f2a10000 r-xp 00001000 08:01 123456  /usr/bin/cat";
        let m = parse_maps_line(line).expect("should parse");
        assert_eq!(m.start, 0x55a1f2a0e000);
        assert_eq!(m.end, 0x55a1f2a10000);
        assert_eq!(m.path, PathBuf::from("/usr/bin/cat"));
        assert!(m.perms.0 && m.perms.2 && !m.perms.1);
    }

    #[test]
    fn drops_lines_without_a_path() {
        let line = "7ffd835f1000-7ffd8361c000 rw-p 00000000 00:00 0";
        assert!(parse_maps_line(line).is_none());
    }

    #[test]
    fn find_region_picks_containing_map() {
        let maps = vec![
            MemMap { start: 0x1000, end: 0x2000, perms: (true, false, true), offset: 0, path: PathBuf::from("/bin/a") },
            MemMap { start: 0x2000, end: 0x3000, perms: (true, true, false), offset: 0x1000, path: PathBuf::from("/bin/a") },
        ];
        let region = find_region(&maps, 0x2500, 4).unwrap();
        assert_eq!(region.start, 0x2000);
        assert!(find_region(&maps, 0x5000, 4).is_none());
    }

    #[test]
    fn find_load_base_requires_zero_offset() {
        let maps = vec![
            MemMap { start: 0x1000, end: 0x2000, perms: (true, false, true), offset: 0x1000, path: PathBuf::from("/bin/a") },
            MemMap { start: 0x4000, end: 0x5000, perms: (true, false, true), offset: 0, path: PathBuf::from("/bin/a") },
        ];
        assert_eq!(find_load_base(&maps, std::path::Path::new("/bin/a")), Some(0x4000));
    }
}
