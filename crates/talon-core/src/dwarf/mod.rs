//! # DWARF Engine
//!
//! Hand-rolled DWARF v4 reader: abbreviation tables, compile units, DIE
//! traversal, attribute decoding, range lists, line tables, and the
//! function index used for breakpoint resolution and inline stacks.
//!
//! The engine works on offsets rather than pointers: DIE positions and
//! attribute locations are byte offsets into a shared copy of
//! `.debug_info`, so handles stay `Copy`-cheap and never borrow the ELF
//! mmap. Compile-unit headers are parsed eagerly when [`Dwarf::new`]
//! runs; everything else (abbrev tables, line tables, the function
//! index) is built lazily and memoized.

pub mod cursor;
pub mod encoding;
pub mod line;
pub mod ranges;

use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use once_cell::unsync::OnceCell;
use tracing::{debug, warn};

use crate::elf::Elf;
use crate::error::{Result, TalonError};
use crate::types::FileAddr;

use cursor::Cursor;
use encoding::*;
use line::{parse_line_table, LineTable};
use ranges::RangeList;

/// One attribute slot of an abbreviation: which attribute, in which form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrSpec
{
    pub attr: u64,
    pub form: u64,
}

/// A DIE schema from `.debug_abbrev`, shared by every DIE that names its
/// code.
#[derive(Debug, Clone)]
pub struct Abbrev
{
    pub code: u64,
    pub tag: u64,
    pub has_children: bool,
    pub attr_specs: Vec<AttrSpec>,
}

/// One abbreviation table, keyed by code.
pub type AbbrevTable = HashMap<u64, Arc<Abbrev>>;

/// A compilation unit: a borrowed byte range of `.debug_info` plus the
/// offset of its abbreviation table and a lazily built line table.
pub struct CompileUnit
{
    index: usize,
    data: Range<usize>,
    abbrev_offset: usize,
    line_table: OnceCell<Option<LineTable>>,
}

impl CompileUnit
{
    /// Position of this unit's range within `.debug_info`.
    pub fn data(&self) -> Range<usize>
    {
        self.data.clone()
    }

    /// Index of this unit within [`Dwarf::compile_units`].
    pub fn index(&self) -> usize
    {
        self.index
    }

    /// The root DIE (always a `DW_TAG_compile_unit`).
    pub fn root(&self, dwarf: &Dwarf) -> Result<Die>
    {
        // The fixed unit header is 11 bytes: length, version, abbrev
        // offset, address size.
        parse_die(dwarf, self.index, self.data.start + COMPILE_UNIT_HEADER_SIZE)
    }

    /// The unit's line table, parsed on first use. `Ok(None)` when the
    /// root DIE carries no `DW_AT_stmt_list`.
    pub fn lines(&self, dwarf: &Dwarf) -> Result<Option<&LineTable>>
    {
        let table = self
            .line_table
            .get_or_try_init(|| parse_line_table(dwarf, self))?;
        Ok(table.as_ref())
    }

    /// Whether the unit's root DIE covers `address`.
    pub fn contains_address(&self, dwarf: &Dwarf, address: FileAddr) -> Result<bool>
    {
        self.root(dwarf)?.contains_address(dwarf, address)
    }
}

const COMPILE_UNIT_HEADER_SIZE: usize = 11;

#[derive(Clone, Copy)]
struct IndexEntry
{
    cu: usize,
    pos: usize,
}

/// Parsed DWARF data of one ELF object.
pub struct Dwarf
{
    info: Arc<[u8]>,
    abbrev: Arc<[u8]>,
    strings: Arc<[u8]>,
    line: Arc<[u8]>,
    ranges: Arc<[u8]>,
    compile_units: Vec<CompileUnit>,
    abbrev_tables: RefCell<HashMap<usize, Arc<AbbrevTable>>>,
    function_index: OnceCell<HashMap<String, Vec<IndexEntry>>>,
}

impl Dwarf
{
    /// Copy the debug sections out of `elf` and parse every compile-unit
    /// header.
    ///
    /// An object without `.debug_info` yields an engine with zero compile
    /// units; symbol-only debugging still works in that case.
    pub fn new(elf: &Elf) -> Result<Self>
    {
        let mut dwarf = Dwarf {
            info: Arc::from(elf.get_section_contents(".debug_info")),
            abbrev: Arc::from(elf.get_section_contents(".debug_abbrev")),
            strings: Arc::from(elf.get_section_contents(".debug_str")),
            line: Arc::from(elf.get_section_contents(".debug_line")),
            ranges: Arc::from(elf.get_section_contents(".debug_ranges")),
            compile_units: Vec::new(),
            abbrev_tables: RefCell::new(HashMap::new()),
            function_index: OnceCell::new(),
        };
        dwarf.parse_compile_units()?;
        debug!(units = dwarf.compile_units.len(), "parsed DWARF compile unit headers");
        Ok(dwarf)
    }

    fn parse_compile_units(&mut self) -> Result<()>
    {
        let mut cur = Cursor::new(&self.info);
        while !cur.finished() {
            let start = cur.pos();
            let size = cur.u32()?;
            let version = cur.u16()?;
            let abbrev_offset = cur.u32()?;
            let address_size = cur.u8()?;
            if size == 0xffff_ffff {
                return Err(TalonError::Dwarf("only DWARF32 is supported".into()));
            }
            if version != 4 {
                return Err(TalonError::Dwarf(format!(
                    "only DWARF version 4 is supported, found {version}"
                )));
            }
            if address_size != 8 {
                return Err(TalonError::Dwarf(format!(
                    "invalid address size {address_size} for DWARF"
                )));
            }
            let end = start + size as usize + std::mem::size_of::<u32>();
            if end > self.info.len() {
                return Err(TalonError::Dwarf("compile unit overruns .debug_info".into()));
            }
            let index = self.compile_units.len();
            self.compile_units.push(CompileUnit {
                index,
                data: start..end,
                abbrev_offset: abbrev_offset as usize,
                line_table: OnceCell::new(),
            });
            cur = Cursor::at(&self.info, end);
        }
        Ok(())
    }

    /// Raw `.debug_line` bytes.
    pub(crate) fn line(&self) -> &[u8]
    {
        &self.line
    }

    /// All compile units, in section order.
    pub fn compile_units(&self) -> &[CompileUnit]
    {
        &self.compile_units
    }

    /// The abbreviation table at `offset` in `.debug_abbrev`, parsed on
    /// first use and memoized.
    pub fn get_abbrev_table(&self, offset: usize) -> Result<Arc<AbbrevTable>>
    {
        if let Some(table) = self.abbrev_tables.borrow().get(&offset) {
            return Ok(Arc::clone(table));
        }
        let table = Arc::new(parse_abbrev_table(&self.abbrev, offset)?);
        self.abbrev_tables
            .borrow_mut()
            .insert(offset, Arc::clone(&table));
        Ok(table)
    }

    /// The compile unit whose root DIE covers `address`.
    pub fn compile_unit_containing_address(&self, address: FileAddr)
        -> Result<Option<&CompileUnit>>
    {
        for cu in &self.compile_units {
            if cu.contains_address(self, address)? {
                return Ok(Some(cu));
            }
        }
        Ok(None)
    }

    /// The `DW_TAG_subprogram` DIE covering `address`, if any.
    pub fn function_containing_address(&self, address: FileAddr) -> Result<Option<Die>>
    {
        let index = self.index()?;
        for entries in index.values() {
            for entry in entries {
                let die = parse_die(self, entry.cu, entry.pos)?;
                if die.abbrev().map(|a| a.tag) == Some(DW_TAG_subprogram)
                    && die.contains_address(self, address)?
                {
                    return Ok(Some(die));
                }
            }
        }
        Ok(None)
    }

    /// Every indexed function DIE named `name` (subprograms and inlined
    /// subroutines alike).
    pub fn find_functions(&self, name: &str) -> Result<Vec<Die>>
    {
        let index = self.index()?;
        let mut found = Vec::new();
        if let Some(entries) = index.get(name) {
            for entry in entries {
                found.push(parse_die(self, entry.cu, entry.pos)?);
            }
        }
        Ok(found)
    }

    /// The inline stack covering `address`, outermost first.
    ///
    /// Starts at the containing subprogram, then repeatedly descends into
    /// the unique `DW_TAG_inlined_subroutine` child whose range contains
    /// the address.
    pub fn inline_stack_at_address(&self, address: FileAddr) -> Result<Vec<Die>>
    {
        let mut stack = Vec::new();
        let Some(func) = self.function_containing_address(address)? else {
            return Ok(stack);
        };
        stack.push(func);
        loop {
            let top = stack.last().unwrap().clone();
            let mut next = None;
            for child in top.children(self) {
                let child = child?;
                if child.abbrev().map(|a| a.tag) == Some(DW_TAG_inlined_subroutine)
                    && child.contains_address(self, address)?
                {
                    next = Some(child);
                    break;
                }
            }
            match next {
                Some(die) => stack.push(die),
                None => break,
            }
        }
        Ok(stack)
    }

    fn index(&self) -> Result<&HashMap<String, Vec<IndexEntry>>>
    {
        self.function_index.get_or_try_init(|| {
            let mut index = HashMap::<String, Vec<IndexEntry>>::new();
            for cu in &self.compile_units {
                // A corrupt unit is dropped with a diagnostic; the rest
                // of the index stays usable.
                let result = cu
                    .root(self)
                    .and_then(|root| self.index_die(&mut index, &root));
                if let Err(e) = result {
                    warn!(unit = cu.index, error = %e, "dropping compile unit from function index");
                }
            }
            Ok(index)
        })
    }

    fn index_die(&self, index: &mut HashMap<String, Vec<IndexEntry>>, die: &Die) -> Result<()>
    {
        let Some(abbrev) = die.abbrev() else {
            return Ok(());
        };
        let has_range = die.contains(DW_AT_low_pc) || die.contains(DW_AT_ranges);
        let is_function =
            abbrev.tag == DW_TAG_subprogram || abbrev.tag == DW_TAG_inlined_subroutine;
        if has_range && is_function {
            if let Some(name) = die.name(self)? {
                index.entry(name).or_default().push(IndexEntry {
                    cu: die.cu,
                    pos: die.pos,
                });
            }
        }
        for child in die.children(self) {
            self.index_die(index, &child?)?;
        }
        Ok(())
    }
}

fn parse_abbrev_table(section: &[u8], offset: usize) -> Result<AbbrevTable>
{
    let mut cur = Cursor::at(section, offset);
    let mut table = AbbrevTable::new();
    loop {
        let code = cur.uleb128()?;
        if code == 0 {
            break;
        }
        let tag = cur.uleb128()?;
        let has_children = cur.u8()? != 0;

        let mut attr_specs = Vec::new();
        loop {
            let attr = cur.uleb128()?;
            let form = cur.uleb128()?;
            if attr == 0 && form == 0 {
                break;
            }
            attr_specs.push(AttrSpec { attr, form });
        }
        table.insert(
            code,
            Arc::new(Abbrev {
                code,
                tag,
                has_children,
                attr_specs,
            }),
        );
    }
    Ok(table)
}

/// Parse the DIE at byte offset `pos` of `.debug_info`.
pub(crate) fn parse_die(dwarf: &Dwarf, cu: usize, pos: usize) -> Result<Die>
{
    let unit = &dwarf.compile_units[cu];
    let mut cur = Cursor::at(&dwarf.info[..unit.data.end], pos);
    let code = cur.uleb128()?;

    if code == 0 {
        return Ok(Die {
            pos,
            cu,
            abbrev: None,
            attr_locs: Vec::new(),
            next: cur.pos(),
        });
    }

    let table = dwarf.get_abbrev_table(unit.abbrev_offset)?;
    let abbrev = table
        .get(&code)
        .ok_or_else(|| TalonError::Dwarf(format!("unknown abbreviation code {code}")))?
        .clone();

    let mut attr_locs = Vec::with_capacity(abbrev.attr_specs.len());
    for spec in &abbrev.attr_specs {
        attr_locs.push(cur.pos());
        cur.skip_form(spec.form)?;
    }
    Ok(Die {
        pos,
        cu,
        abbrev: Some(abbrev),
        attr_locs,
        next: cur.pos(),
    })
}

/// A handle to one debugging information entry.
///
/// A terminator DIE (abbreviation code zero) carries only its `next`
/// position and reports `is_null()`.
#[derive(Clone)]
pub struct Die
{
    pos: usize,
    cu: usize,
    abbrev: Option<Arc<Abbrev>>,
    attr_locs: Vec<usize>,
    next: usize,
}

impl Die
{
    /// Byte offset of this DIE within `.debug_info`.
    pub fn position(&self) -> usize
    {
        self.pos
    }

    /// Byte offset just past this DIE's attributes.
    pub fn next(&self) -> usize
    {
        self.next
    }

    /// Index of the owning compile unit.
    pub fn cu_index(&self) -> usize
    {
        self.cu
    }

    /// The DIE's schema, absent on a terminator.
    pub fn abbrev(&self) -> Option<&Abbrev>
    {
        self.abbrev.as_deref()
    }

    /// The DIE's tag, zero on a terminator.
    pub fn tag(&self) -> u64
    {
        self.abbrev().map_or(0, |a| a.tag)
    }

    /// Whether this is a terminator (or past-the-end) DIE.
    pub fn is_null(&self) -> bool
    {
        self.abbrev.is_none()
    }

    /// Whether the schema declares the given attribute.
    pub fn contains(&self, attribute: u64) -> bool
    {
        self.abbrev()
            .is_some_and(|a| a.attr_specs.iter().any(|s| s.attr == attribute))
    }

    /// The named attribute; a [`TalonError::Lookup`] if the schema does
    /// not declare it.
    pub fn attr(&self, attribute: u64) -> Result<Attr>
    {
        let abbrev = self
            .abbrev()
            .ok_or_else(|| TalonError::lookup("attribute lookup on a null DIE"))?;
        for (i, spec) in abbrev.attr_specs.iter().enumerate() {
            if spec.attr == attribute {
                return Ok(Attr {
                    cu: self.cu,
                    name: spec.attr,
                    form: spec.form,
                    location: self.attr_locs[i],
                });
            }
        }
        Err(TalonError::lookup(format!("DIE has no attribute 0x{attribute:x}")))
    }

    /// Iterate over this DIE's children. Empty when the schema declares
    /// no children.
    pub fn children<'d>(&self, dwarf: &'d Dwarf) -> Children<'d>
    {
        let first = match self.abbrev() {
            Some(abbrev) if abbrev.has_children => {
                Some(parse_die(dwarf, self.cu, self.next))
            }
            _ => None,
        };
        Children { dwarf, next: first }
    }

    /// The DIE's name, following `DW_AT_specification` and
    /// `DW_AT_abstract_origin` when `DW_AT_name` is absent.
    pub fn name(&self, dwarf: &Dwarf) -> Result<Option<String>>
    {
        if self.contains(DW_AT_name) {
            return Ok(Some(self.attr(DW_AT_name)?.as_string(dwarf)?.to_string()));
        }
        if self.contains(DW_AT_specification) {
            return self.attr(DW_AT_specification)?.as_reference(dwarf)?.name(dwarf);
        }
        if self.contains(DW_AT_abstract_origin) {
            return self
                .attr(DW_AT_abstract_origin)?
                .as_reference(dwarf)?
                .name(dwarf);
        }
        Ok(None)
    }

    /// Lowest PC covered by this DIE, from `DW_AT_ranges` or
    /// `DW_AT_low_pc`.
    pub fn low_pc(&self, dwarf: &Dwarf) -> Result<FileAddr>
    {
        if self.contains(DW_AT_ranges) {
            let list = self.attr(DW_AT_ranges)?.as_range_list(dwarf)?;
            let first = list
                .iter()
                .next()
                .transpose()?
                .ok_or_else(|| TalonError::lookup("DIE has an empty range list"))?;
            return Ok(first.low);
        }
        if self.contains(DW_AT_low_pc) {
            return self.attr(DW_AT_low_pc)?.as_address(dwarf);
        }
        Err(TalonError::lookup("DIE does not have a low PC"))
    }

    /// One past the highest PC covered by this DIE.
    ///
    /// `DW_AT_high_pc` is either an absolute address or an offset from
    /// the low PC, depending on its form.
    pub fn high_pc(&self, dwarf: &Dwarf) -> Result<FileAddr>
    {
        if self.contains(DW_AT_ranges) {
            let list = self.attr(DW_AT_ranges)?.as_range_list(dwarf)?;
            let mut last = None;
            for range in list.iter() {
                last = Some(range?);
            }
            return last
                .map(|r| r.high)
                .ok_or_else(|| TalonError::lookup("DIE has an empty range list"));
        }
        if self.contains(DW_AT_high_pc) {
            let attr = self.attr(DW_AT_high_pc)?;
            if attr.form() == DW_FORM_addr {
                return attr.as_address(dwarf);
            }
            return Ok(self.low_pc(dwarf)? + attr.as_int(dwarf)?);
        }
        Err(TalonError::lookup("DIE does not have a high PC"))
    }

    /// Whether the DIE's range information covers `address`, preferring
    /// `DW_AT_ranges` over the low/high PC pair.
    pub fn contains_address(&self, dwarf: &Dwarf, address: FileAddr) -> Result<bool>
    {
        if self.contains(DW_AT_ranges) {
            return self.attr(DW_AT_ranges)?.as_range_list(dwarf)?.contains(address);
        }
        if self.contains(DW_AT_low_pc) {
            return Ok(self.low_pc(dwarf)? <= address && self.high_pc(dwarf)? > address);
        }
        Ok(false)
    }

    /// The source file this DIE refers to: the call site for inlined
    /// subroutines, the declaration site otherwise.
    pub fn file(&self, dwarf: &Dwarf) -> Result<std::path::PathBuf>
    {
        let attr = if self.tag() == DW_TAG_inlined_subroutine {
            DW_AT_call_file
        } else {
            DW_AT_decl_file
        };
        let index = self.attr(attr)?.as_int(dwarf)?;
        let unit = &dwarf.compile_units()[self.cu];
        let table = unit
            .lines(dwarf)?
            .ok_or_else(|| TalonError::lookup("compile unit has no line table"))?;
        table.file_path(index)
    }

    /// The source line this DIE refers to (call line for inlined
    /// subroutines, declaration line otherwise).
    pub fn line(&self, dwarf: &Dwarf) -> Result<u64>
    {
        let attr = if self.tag() == DW_TAG_inlined_subroutine {
            DW_AT_call_line
        } else {
            DW_AT_decl_line
        };
        self.attr(attr)?.as_int(dwarf)
    }

    /// Bitfield geometry of a member DIE: `(bit_size, storage_byte_size,
    /// bit_offset)`, or `None` for an ordinary member.
    pub fn get_bitfield_information(&self, dwarf: &Dwarf, storage_byte_size: u64)
        -> Result<Option<(u64, u64, u64)>>
    {
        if !self.contains(DW_AT_bit_size) {
            return Ok(None);
        }
        let bit_size = self.attr(DW_AT_bit_size)?.as_int(dwarf)?;
        if self.contains(DW_AT_data_bit_offset) {
            let offset = self.attr(DW_AT_data_bit_offset)?.as_int(dwarf)?;
            return Ok(Some((bit_size, storage_byte_size, offset % 8)));
        }
        if self.contains(DW_AT_bit_offset) {
            // Legacy big-endian-order description; flip for x86-64.
            let offset = self.attr(DW_AT_bit_offset)?.as_int(dwarf)?;
            let storage = if self.contains(DW_AT_byte_size) {
                self.attr(DW_AT_byte_size)?.as_int(dwarf)?
            } else {
                storage_byte_size
            };
            let flipped = storage * 8 - offset - bit_size;
            return Ok(Some((bit_size, storage, flipped)));
        }
        Ok(Some((bit_size, storage_byte_size, 0)))
    }
}

impl PartialEq for Die
{
    fn eq(&self, other: &Self) -> bool
    {
        self.cu == other.cu && self.pos == other.pos && self.next == other.next
    }
}

/// Forward iterator over the children of a DIE.
pub struct Children<'d>
{
    dwarf: &'d Dwarf,
    next: Option<Result<Die>>,
}

impl Iterator for Children<'_>
{
    type Item = Result<Die>;

    fn next(&mut self) -> Option<Self::Item>
    {
        match self.next.take() {
            None => None,
            Some(Err(e)) => Some(Err(e)),
            Some(Ok(die)) => {
                if die.is_null() {
                    return None;
                }
                self.next = Some(next_sibling(self.dwarf, &die));
                Some(Ok(die))
            }
        }
    }
}

/// Parse the sibling following `die`: jump through `DW_AT_sibling` when
/// present, otherwise walk the subtree to its terminator.
fn next_sibling(dwarf: &Dwarf, die: &Die) -> Result<Die>
{
    let has_children = die.abbrev().is_some_and(|a| a.has_children);
    if !has_children {
        return parse_die(dwarf, die.cu, die.next);
    }
    if die.contains(DW_AT_sibling) {
        return die.attr(DW_AT_sibling)?.as_reference(dwarf);
    }
    let mut sub = parse_die(dwarf, die.cu, die.next)?;
    while !sub.is_null() {
        sub = next_sibling(dwarf, &sub)?;
    }
    parse_die(dwarf, die.cu, sub.next)
}

/// A DIE attribute, decoded on demand according to its form.
#[derive(Clone, Copy)]
pub struct Attr
{
    cu: usize,
    name: u64,
    form: u64,
    location: usize,
}

impl Attr
{
    /// The attribute's name code (`DW_AT_*`).
    pub fn name(&self) -> u64
    {
        self.name
    }

    /// The attribute's form code (`DW_FORM_*`).
    pub fn form(&self) -> u64
    {
        self.form
    }

    fn cursor<'d>(&self, dwarf: &'d Dwarf) -> Cursor<'d>
    {
        let end = dwarf.compile_units[self.cu].data.end;
        Cursor::at(&dwarf.info[..end], self.location)
    }

    /// Decode as a file address (`DW_FORM_addr` only).
    pub fn as_address(&self, dwarf: &Dwarf) -> Result<FileAddr>
    {
        if self.form != DW_FORM_addr {
            return Err(TalonError::Dwarf(format!(
                "form 0x{:x} is not an address", self.form
            )));
        }
        Ok(FileAddr::new(self.cursor(dwarf).u64()?))
    }

    /// Decode as a section offset (`DW_FORM_sec_offset` only).
    pub fn as_section_offset(&self, dwarf: &Dwarf) -> Result<u32>
    {
        if self.form != DW_FORM_sec_offset {
            return Err(TalonError::Dwarf(format!(
                "form 0x{:x} is not a section offset", self.form
            )));
        }
        self.cursor(dwarf).u32()
    }

    /// Decode as an unsigned integer (the `data*`, `udata`, and `sdata`
    /// forms).
    pub fn as_int(&self, dwarf: &Dwarf) -> Result<u64>
    {
        let mut cur = self.cursor(dwarf);
        match self.form {
            DW_FORM_data1 => Ok(u64::from(cur.u8()?)),
            DW_FORM_data2 => Ok(u64::from(cur.u16()?)),
            DW_FORM_data4 => Ok(u64::from(cur.u32()?)),
            DW_FORM_data8 => cur.u64(),
            DW_FORM_udata => cur.uleb128(),
            DW_FORM_sdata => Ok(cur.sleb128()? as u64),
            _ => Err(TalonError::Dwarf(format!("form 0x{:x} is not an integer", self.form))),
        }
    }

    /// Decode as a byte span (the `block*` and `exprloc` forms).
    pub fn as_block<'d>(&self, dwarf: &'d Dwarf) -> Result<&'d [u8]>
    {
        let mut cur = self.cursor(dwarf);
        let size = match self.form {
            DW_FORM_block1 => u64::from(cur.u8()?),
            DW_FORM_block2 => u64::from(cur.u16()?),
            DW_FORM_block4 => u64::from(cur.u32()?),
            DW_FORM_block | DW_FORM_exprloc => cur.uleb128()?,
            _ => {
                return Err(TalonError::Dwarf(format!(
                    "form 0x{:x} is not a block", self.form
                )))
            }
        };
        let start = cur.pos();
        dwarf
            .info
            .get(start..start + size as usize)
            .ok_or_else(|| TalonError::Dwarf("block overruns .debug_info".into()))
    }

    /// Decode as a reference to another DIE.
    ///
    /// The `ref*` forms resolve relative to the owning compile unit;
    /// `ref_addr` resolves through whichever unit contains the absolute
    /// offset.
    pub fn as_reference(&self, dwarf: &Dwarf) -> Result<Die>
    {
        let mut cur = self.cursor(dwarf);
        let offset = match self.form {
            DW_FORM_ref1 => u64::from(cur.u8()?),
            DW_FORM_ref2 => u64::from(cur.u16()?),
            DW_FORM_ref4 => u64::from(cur.u32()?),
            DW_FORM_ref8 => cur.u64()?,
            DW_FORM_ref_udata => cur.uleb128()?,
            DW_FORM_ref_addr => {
                let pos = cur.u32()? as usize;
                let cu = dwarf
                    .compile_units
                    .iter()
                    .position(|cu| cu.data.start <= pos && pos < cu.data.end)
                    .ok_or_else(|| {
                        TalonError::Dwarf("reference outside every compile unit".into())
                    })?;
                return parse_die(dwarf, cu, pos);
            }
            _ => {
                return Err(TalonError::Dwarf(format!(
                    "form 0x{:x} is not a reference", self.form
                )))
            }
        };
        let start = dwarf.compile_units[self.cu].data.start;
        parse_die(dwarf, self.cu, start + offset as usize)
    }

    /// Decode as a string (`DW_FORM_string` inline or `DW_FORM_strp`
    /// through `.debug_str`).
    pub fn as_string<'d>(&self, dwarf: &'d Dwarf) -> Result<&'d str>
    {
        match self.form {
            DW_FORM_string => self.cursor(dwarf).string(),
            DW_FORM_strp => {
                let offset = self.cursor(dwarf).u32()? as usize;
                Cursor::at(&dwarf.strings, offset).string()
            }
            _ => Err(TalonError::Dwarf(format!("form 0x{:x} is not a string", self.form))),
        }
    }

    /// Decode as a range list over `.debug_ranges`.
    ///
    /// The list's base address starts as the owning unit's `DW_AT_low_pc`
    /// (when present) and may be replaced by base-selector entries.
    pub fn as_range_list<'d>(&self, dwarf: &'d Dwarf) -> Result<RangeList<'d>>
    {
        let offset = self.as_section_offset(dwarf)? as usize;
        let data = dwarf
            .ranges
            .get(offset..)
            .ok_or_else(|| TalonError::Dwarf("range list offset out of bounds".into()))?;
        let root = dwarf.compile_units[self.cu].root(dwarf)?;
        let base = if root.contains(DW_AT_low_pc) {
            root.attr(DW_AT_low_pc)?.as_address(dwarf)?
        } else {
            FileAddr::NULL
        };
        Ok(RangeList::new(data, base))
    }
}
