//! DWARF v4 line-number programs.
//!
//! A [`LineTable`] wraps one unit's program from `.debug_line`; iterating
//! it runs the state machine of DWARF v4 §6.2 and yields one
//! [`LineEntry`] per emitted row.

use std::cell::RefCell;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::error::{Result, TalonError};
use crate::types::FileAddr;

use super::cursor::Cursor;
use super::encoding::*;
use super::{CompileUnit, Dwarf};

/// DWARF v4 default lengths for standard opcodes 1..12; any deviation is
/// fatal.
const EXPECTED_OPCODE_LENGTHS: [u8; 12] = [0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1];

/// One file referenced by a line table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineFile
{
    pub path: PathBuf,
    pub modification_time: u64,
    pub file_length: u64,
}

/// One emitted row of a line-number program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEntry
{
    pub address: FileAddr,
    pub file_index: u64,
    pub line: u64,
    pub column: u64,
    pub is_stmt: bool,
    pub basic_block_start: bool,
    pub prologue_end: bool,
    pub epilogue_begin: bool,
    pub end_sequence: bool,
    pub discriminator: u64,
    /// Path of the row's file, resolved at emission time.
    pub file: PathBuf,
}

impl LineEntry
{
    fn initial(default_is_stmt: bool) -> Self
    {
        LineEntry {
            address: FileAddr::NULL,
            file_index: 1,
            line: 1,
            column: 0,
            is_stmt: default_is_stmt,
            basic_block_start: false,
            prologue_end: false,
            epilogue_begin: false,
            end_sequence: false,
            discriminator: 0,
            file: PathBuf::new(),
        }
    }
}

/// One compile unit's line table.
pub struct LineTable
{
    cu: usize,
    program: Range<usize>,
    default_is_stmt: bool,
    line_base: i8,
    line_range: u8,
    opcode_base: u8,
    include_directories: Vec<PathBuf>,
    // DW_LNE_define_file may append entries mid-program.
    file_names: RefCell<Vec<LineFile>>,
}

impl LineTable
{
    /// Index of the owning compile unit.
    pub fn cu_index(&self) -> usize
    {
        self.cu
    }

    /// The files currently known to the table.
    pub fn file_names(&self) -> Vec<LineFile>
    {
        self.file_names.borrow().clone()
    }

    /// Path of the 1-based file `index`.
    pub fn file_path(&self, index: u64) -> Result<PathBuf>
    {
        self.file_names
            .borrow()
            .get((index as usize).wrapping_sub(1))
            .map(|f| f.path.clone())
            .ok_or_else(|| TalonError::Dwarf(format!("bad file index {index} in line table")))
    }

    /// Run the line program from the start.
    pub fn iter<'d>(&'d self, dwarf: &'d Dwarf) -> LineTableIter<'d>
    {
        LineTableIter {
            dwarf,
            table: self,
            pos: self.program.start,
            registers: LineEntry::initial(self.default_is_stmt),
            failed: false,
        }
    }

    /// The row `prev` with `prev.address <= address < next.address` where
    /// `prev` is not an end-sequence row.
    pub fn get_entry_by_address(&self, dwarf: &Dwarf, address: FileAddr)
        -> Result<Option<LineEntry>>
    {
        let mut iter = self.iter(dwarf);
        let Some(first) = iter.next() else {
            return Ok(None);
        };
        let mut prev = first?;
        for next in iter {
            let next = next?;
            if prev.address <= address && address < next.address && !prev.end_sequence {
                return Ok(Some(prev));
            }
            prev = next;
        }
        Ok(None)
    }

    /// The row immediately following the one that covers `address`.
    /// Used for prologue skipping.
    pub fn get_entry_after_address(&self, dwarf: &Dwarf, address: FileAddr)
        -> Result<Option<LineEntry>>
    {
        let mut iter = self.iter(dwarf);
        let Some(first) = iter.next() else {
            return Ok(None);
        };
        let mut prev = first?;
        for next in iter {
            let next = next?;
            if prev.address <= address && address < next.address && !prev.end_sequence {
                return Ok(Some(next));
            }
            prev = next;
        }
        Ok(None)
    }

    /// All rows matching `path` (absolute, or a suffix of the row's path)
    /// and `line`.
    pub fn get_entries_by_line(&self, dwarf: &Dwarf, path: &Path, line: u64)
        -> Result<Vec<LineEntry>>
    {
        let mut entries = Vec::new();
        for entry in self.iter(dwarf) {
            let entry = entry?;
            if entry.line != line || entry.end_sequence {
                continue;
            }
            let matches = if path.is_absolute() {
                entry.file == path
            } else {
                entry.file.ends_with(path)
            };
            if matches {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}

/// Parse the line-table header of `cu`; `Ok(None)` when the unit has no
/// `DW_AT_stmt_list`.
pub(super) fn parse_line_table(dwarf: &Dwarf, cu: &CompileUnit) -> Result<Option<LineTable>>
{
    let root = cu.root(dwarf)?;
    if !root.contains(DW_AT_stmt_list) {
        return Ok(None);
    }
    let offset = root.attr(DW_AT_stmt_list)?.as_section_offset(dwarf)? as usize;
    let section = dwarf.line();
    let mut cur = Cursor::at(section, offset);

    let unit_length = cur.u32()?;
    let end = cur.pos() + unit_length as usize;
    if end > section.len() {
        return Err(TalonError::Dwarf("line program overruns .debug_line".into()));
    }

    let version = cur.u16()?;
    if version != 4 {
        return Err(TalonError::Dwarf(format!(
            "only DWARF version 4 line tables are supported, found {version}"
        )));
    }
    let _header_length = cur.u32()?;

    let minimum_instruction_length = cur.u8()?;
    if minimum_instruction_length != 1 {
        return Err(TalonError::Dwarf("invalid minimum instruction length".into()));
    }
    let maximum_operations_per_instruction = cur.u8()?;
    if maximum_operations_per_instruction != 1 {
        return Err(TalonError::Dwarf("invalid maximum operations per instruction".into()));
    }

    let default_is_stmt = cur.u8()? != 0;
    let line_base = cur.s8()?;
    let line_range = cur.u8()?;
    let opcode_base = cur.u8()?;

    for i in 0..opcode_base.saturating_sub(1) as usize {
        let expected = EXPECTED_OPCODE_LENGTHS
            .get(i)
            .ok_or_else(|| TalonError::Dwarf("unexpected opcode length".into()))?;
        if cur.u8()? != *expected {
            return Err(TalonError::Dwarf("unexpected opcode length".into()));
        }
    }

    let compilation_dir = PathBuf::from(root.attr(DW_AT_comp_dir)?.as_string(dwarf)?);

    let mut include_directories = Vec::new();
    loop {
        let dir = cur.string()?;
        if dir.is_empty() {
            break;
        }
        include_directories.push(resolve_path(dir, &compilation_dir));
    }

    let mut file_names = Vec::new();
    loop {
        let name = cur.string()?;
        if name.is_empty() {
            break;
        }
        file_names.push(parse_file_entry(
            &mut cur,
            name,
            &compilation_dir,
            &include_directories,
        )?);
    }

    Ok(Some(LineTable {
        cu: cu.index(),
        program: cur.pos()..end,
        default_is_stmt,
        line_base,
        line_range,
        opcode_base,
        include_directories,
        file_names: RefCell::new(file_names),
    }))
}

fn resolve_path(path: &str, base: &Path) -> PathBuf
{
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Parse one file entry: name, directory index, modification time, file
/// length. The name has already been read by the caller.
fn parse_file_entry(
    cur: &mut Cursor<'_>,
    name: &str,
    compilation_dir: &Path,
    include_directories: &[PathBuf],
) -> Result<LineFile>
{
    let dir_index = cur.uleb128()?;
    let modification_time = cur.uleb128()?;
    let file_length = cur.uleb128()?;

    let path = if Path::new(name).is_absolute() {
        PathBuf::from(name)
    } else if dir_index == 0 {
        compilation_dir.join(name)
    } else {
        let dir = include_directories
            .get(dir_index as usize - 1)
            .ok_or_else(|| TalonError::Dwarf(format!("bad directory index {dir_index}")))?;
        dir.join(name)
    };
    Ok(LineFile {
        path,
        modification_time,
        file_length,
    })
}

/// Iterator running a line program to completion.
pub struct LineTableIter<'d>
{
    dwarf: &'d Dwarf,
    table: &'d LineTable,
    pos: usize,
    registers: LineEntry,
    failed: bool,
}

impl LineTableIter<'_>
{
    fn emit(&mut self) -> Result<LineEntry>
    {
        let mut entry = self.registers.clone();
        entry.file = self.table.file_path(entry.file_index)?;
        Ok(entry)
    }

    /// Execute a single instruction; `Ok(Some)` when it emitted a row.
    fn execute_instruction(&mut self) -> Result<Option<LineEntry>>
    {
        let section = self.dwarf.line();
        let mut cur = Cursor::at(&section[..self.table.program.end], self.pos);
        let opcode = cur.u8()?;
        let mut emitted = None;

        if opcode > 0 && opcode < self.table.opcode_base {
            match opcode {
                DW_LNS_copy => {
                    emitted = Some(self.emit()?);
                    self.registers.basic_block_start = false;
                    self.registers.prologue_end = false;
                    self.registers.epilogue_begin = false;
                    self.registers.discriminator = 0;
                }
                DW_LNS_advance_pc => {
                    self.registers.address = self.registers.address + cur.uleb128()?;
                }
                DW_LNS_advance_line => {
                    let delta = cur.sleb128()?;
                    self.registers.line = (self.registers.line as i64 + delta) as u64;
                }
                DW_LNS_set_file => {
                    self.registers.file_index = cur.uleb128()?;
                }
                DW_LNS_set_column => {
                    self.registers.column = cur.uleb128()?;
                }
                DW_LNS_negate_stmt => {
                    self.registers.is_stmt = !self.registers.is_stmt;
                }
                DW_LNS_set_basic_block => {
                    self.registers.basic_block_start = true;
                }
                DW_LNS_const_add_pc => {
                    let advance = (255 - self.table.opcode_base) / self.table.line_range;
                    self.registers.address = self.registers.address + u64::from(advance);
                }
                DW_LNS_fixed_advance_pc => {
                    self.registers.address = self.registers.address + u64::from(cur.u16()?);
                }
                DW_LNS_set_prologue_end => {
                    self.registers.prologue_end = true;
                }
                DW_LNS_set_epilogue_begin => {
                    self.registers.epilogue_begin = true;
                }
                DW_LNS_set_isa => {
                    cur.uleb128()?;
                }
                _ => return Err(TalonError::Dwarf("unexpected standard opcode".into())),
            }
        } else if opcode == 0 {
            let _length = cur.uleb128()?;
            let extended = cur.u8()?;
            match extended {
                DW_LNE_end_sequence => {
                    self.registers.end_sequence = true;
                    emitted = Some(self.emit()?);
                    self.registers = LineEntry::initial(self.table.default_is_stmt);
                }
                DW_LNE_set_address => {
                    self.registers.address = FileAddr::new(cur.u64()?);
                }
                DW_LNE_define_file => {
                    let root = self.dwarf.compile_units()[self.table.cu].root(self.dwarf)?;
                    let compilation_dir =
                        PathBuf::from(root.attr(DW_AT_comp_dir)?.as_string(self.dwarf)?);
                    let name = cur.string()?;
                    let file = parse_file_entry(
                        &mut cur,
                        name,
                        &compilation_dir,
                        &self.table.include_directories,
                    )?;
                    self.table.file_names.borrow_mut().push(file);
                }
                DW_LNE_set_discriminator => {
                    self.registers.discriminator = cur.uleb128()?;
                }
                _ => return Err(TalonError::Dwarf("unexpected extended opcode".into())),
            }
        } else {
            let adjusted = opcode - self.table.opcode_base;
            let addr_advance = adjusted / self.table.line_range;
            let line_advance =
                self.table.line_base as i64 + i64::from(adjusted % self.table.line_range);
            self.registers.address = self.registers.address + u64::from(addr_advance);
            self.registers.line = (self.registers.line as i64 + line_advance) as u64;
            emitted = Some(self.emit()?);
            self.registers.basic_block_start = false;
            self.registers.prologue_end = false;
            self.registers.epilogue_begin = false;
            self.registers.discriminator = 0;
        }

        self.pos = cur.pos();
        Ok(emitted)
    }
}

impl Iterator for LineTableIter<'_>
{
    type Item = Result<LineEntry>;

    fn next(&mut self) -> Option<Self::Item>
    {
        if self.failed {
            return None;
        }
        while self.pos < self.table.program.end {
            match self.execute_instruction() {
                Ok(Some(entry)) => return Some(Ok(entry)),
                Ok(None) => continue,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}
