//! # ELF Loader
//!
//! Maps ELF64 object files and indexes their sections and symbols.
//!
//! An [`Elf`] owns a read-only mmap of the object file and never copies
//! section contents; queries hand out slices into the map. The only
//! mutable piece of state after construction is the load bias, which the
//! target records once it learns where the object landed in the tracee's
//! address space.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use once_cell::unsync::OnceCell;
use rustc_demangle::demangle;
use tracing::debug;

use crate::dwarf::Dwarf;
use crate::error::{Result, TalonError};
use crate::types::{from_bytes, FileAddr, FileOffset, VirtAddr};

pub const ELFCLASS64: u8 = 2;
pub const ELFDATA2LSB: u8 = 1;
pub const ET_EXEC: u16 = 2;
pub const ET_DYN: u16 = 3;
pub const EM_X86_64: u16 = 62;
pub const SHT_SYMTAB: u32 = 2;
pub const SHT_DYNSYM: u32 = 11;
pub const SHT_NOBITS: u32 = 8;
pub const PT_DYNAMIC: u32 = 2;
pub const DT_NULL: i64 = 0;
pub const DT_DEBUG: i64 = 21;
pub const STT_FUNC: u8 = 2;

/// ELF64 file header.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Elf64Ehdr
{
    pub e_ident: [u8; 16],
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u64,
    pub e_phoff: u64,
    pub e_shoff: u64,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

/// ELF64 section header.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Elf64Shdr
{
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u64,
    pub sh_addr: u64,
    pub sh_offset: u64,
    pub sh_size: u64,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u64,
    pub sh_entsize: u64,
}

/// ELF64 symbol table entry.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Elf64Sym
{
    pub st_name: u32,
    pub st_info: u8,
    pub st_other: u8,
    pub st_shndx: u16,
    pub st_value: u64,
    pub st_size: u64,
}

/// ELF64 program header.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Elf64Phdr
{
    pub p_type: u32,
    pub p_flags: u32,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_paddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
    pub p_align: u64,
}

/// ELF64 dynamic section entry.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Elf64Dyn
{
    pub d_tag: i64,
    pub d_val: u64,
}

/// Extract the type nibble from a symbol's `st_info` field.
pub const fn elf64_st_type(info: u8) -> u8
{
    info & 0xf
}

/// A mapped and indexed ELF64 object file.
///
/// Unique per object; not clonable. All address-flavored queries exist in
/// a [`FileAddr`] and a [`VirtAddr`] variant, the latter translating
/// through the recorded load bias first.
pub struct Elf
{
    path: PathBuf,
    data: Mmap,
    header: Elf64Ehdr,
    section_headers: Vec<Elf64Shdr>,
    program_headers: Vec<Elf64Phdr>,
    section_map: HashMap<String, usize>,
    symbols: Vec<Elf64Sym>,
    symbol_name_map: HashMap<String, Vec<usize>>,
    // Keyed by [st_value, st_value + st_size); ordered so containment
    // queries can probe the nearest candidates.
    symbol_addr_map: BTreeMap<(u64, u64), usize>,
    load_bias: VirtAddr,
    dwarf: OnceCell<Dwarf>,
}

impl Elf
{
    /// Map and index the object file at `path`.
    ///
    /// Validates the identification bytes (magic, 64-bit class,
    /// little-endian data, x86-64 machine), reads the section and program
    /// header tables, and builds the name and address indices over the
    /// symbol table (`.symtab` preferred, `.dynsym` as fallback).
    ///
    /// Any I/O or structural failure is a fatal [`TalonError::Loader`]
    /// naming the path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self>
    {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .map_err(|e| TalonError::loader(&path, format!("could not open file: {e}")))?;
        let data = unsafe { Mmap::map(&file) }
            .map_err(|e| TalonError::loader(&path, format!("could not mmap file: {e}")))?;

        if data.len() < std::mem::size_of::<Elf64Ehdr>() {
            return Err(TalonError::loader(&path, "file too small for an ELF header"));
        }
        let header: Elf64Ehdr = from_bytes(&data)?;
        if &header.e_ident[0..4] != b"\x7fELF" {
            return Err(TalonError::loader(&path, "bad ELF magic"));
        }
        if header.e_ident[4] != ELFCLASS64 {
            return Err(TalonError::loader(&path, "only 64-bit objects are supported"));
        }
        if header.e_ident[5] != ELFDATA2LSB {
            return Err(TalonError::loader(&path, "only little-endian objects are supported"));
        }
        if header.e_machine != EM_X86_64 {
            return Err(TalonError::loader(&path, "only x86-64 objects are supported"));
        }

        let mut elf = Elf {
            path,
            data,
            header,
            section_headers: Vec::new(),
            program_headers: Vec::new(),
            section_map: HashMap::new(),
            symbols: Vec::new(),
            symbol_name_map: HashMap::new(),
            symbol_addr_map: BTreeMap::new(),
            load_bias: VirtAddr::NULL,
            dwarf: OnceCell::new(),
        };
        elf.parse_section_headers()?;
        elf.parse_program_headers()?;
        elf.build_section_map()?;
        elf.parse_symbol_table()?;
        elf.build_symbol_maps();
        debug!(
            path = %elf.path.display(),
            sections = elf.section_headers.len(),
            symbols = elf.symbols.len(),
            "loaded ELF object"
        );
        Ok(elf)
    }

    fn parse_section_headers(&mut self) -> Result<()>
    {
        let count = self.header.e_shnum as usize;
        let entsize = self.header.e_shentsize as usize;
        if entsize < std::mem::size_of::<Elf64Shdr>() && count != 0 {
            return Err(TalonError::loader(&self.path, "section header entries too small"));
        }
        let mut headers = Vec::with_capacity(count);
        for i in 0..count {
            let offset = self.header.e_shoff as usize + i * entsize;
            let bytes = self
                .data
                .get(offset..offset + std::mem::size_of::<Elf64Shdr>())
                .ok_or_else(|| TalonError::loader(&self.path, "section header out of bounds"))?;
            headers.push(from_bytes::<Elf64Shdr>(bytes)?);
        }
        self.section_headers = headers;
        Ok(())
    }

    fn parse_program_headers(&mut self) -> Result<()>
    {
        let count = self.header.e_phnum as usize;
        let entsize = self.header.e_phentsize as usize;
        if entsize < std::mem::size_of::<Elf64Phdr>() && count != 0 {
            return Err(TalonError::loader(&self.path, "program header entries too small"));
        }
        let mut headers = Vec::with_capacity(count);
        for i in 0..count {
            let offset = self.header.e_phoff as usize + i * entsize;
            let bytes = self
                .data
                .get(offset..offset + std::mem::size_of::<Elf64Phdr>())
                .ok_or_else(|| TalonError::loader(&self.path, "program header out of bounds"))?;
            headers.push(from_bytes::<Elf64Phdr>(bytes)?);
        }
        self.program_headers = headers;
        Ok(())
    }

    fn build_section_map(&mut self) -> Result<()>
    {
        for index in 0..self.section_headers.len() {
            let name = self.get_section_name(index)?.to_string();
            self.section_map.insert(name, index);
        }
        Ok(())
    }

    fn parse_symbol_table(&mut self) -> Result<()>
    {
        let table = self
            .section_headers
            .iter()
            .find(|sh| sh.sh_type == SHT_SYMTAB)
            .or_else(|| self.section_headers.iter().find(|sh| sh.sh_type == SHT_DYNSYM));
        let Some(table) = table else {
            return Ok(());
        };

        let entsize = std::mem::size_of::<Elf64Sym>();
        let count = table.sh_size as usize / entsize;
        let start = table.sh_offset as usize;
        let mut symbols = Vec::with_capacity(count);
        for i in 0..count {
            let offset = start + i * entsize;
            let bytes = self
                .data
                .get(offset..offset + entsize)
                .ok_or_else(|| TalonError::loader(&self.path, "symbol table out of bounds"))?;
            symbols.push(from_bytes::<Elf64Sym>(bytes)?);
        }
        self.symbols = symbols;
        Ok(())
    }

    fn build_symbol_maps(&mut self)
    {
        for (index, sym) in self.symbols.iter().enumerate() {
            let Ok(mangled) = self.get_string(sym.st_name as usize) else {
                continue;
            };
            if mangled.is_empty() {
                continue;
            }
            let mangled = mangled.to_string();
            let demangled = demangle(&mangled).to_string();
            if demangled != mangled {
                self.symbol_name_map
                    .entry(demangled)
                    .or_default()
                    .push(index);
            }
            self.symbol_name_map
                .entry(mangled)
                .or_default()
                .push(index);

            if sym.st_value != 0 && sym.st_name != 0 {
                self.symbol_addr_map
                    .insert((sym.st_value, sym.st_value + sym.st_size), index);
            }
        }
    }

    /// Path the object was loaded from.
    pub fn path(&self) -> &Path
    {
        &self.path
    }

    /// The parsed file header.
    pub fn header(&self) -> &Elf64Ehdr
    {
        &self.header
    }

    /// The parsed program header table.
    pub fn program_headers(&self) -> &[Elf64Phdr]
    {
        &self.program_headers
    }

    /// Name of the section at `index`, resolved through the section
    /// header string table.
    pub fn get_section_name(&self, index: usize) -> Result<&str>
    {
        let shstrtab = self
            .section_headers
            .get(self.header.e_shstrndx as usize)
            .ok_or_else(|| TalonError::loader(&self.path, "missing section name string table"))?;
        let sh = self
            .section_headers
            .get(index)
            .ok_or_else(|| TalonError::loader(&self.path, "section index out of bounds"))?;
        self.string_at(shstrtab, sh.sh_name as usize)
    }

    /// Look up a section header by name.
    pub fn get_section(&self, name: &str) -> Option<&Elf64Shdr>
    {
        self.section_map
            .get(name)
            .map(|&index| &self.section_headers[index])
    }

    /// Contents of the named section, or an empty slice when the section
    /// is absent or occupies no file bytes.
    pub fn get_section_contents(&self, name: &str) -> &[u8]
    {
        match self.get_section(name) {
            Some(sh) if sh.sh_type != SHT_NOBITS => self
                .data
                .get(sh.sh_offset as usize..(sh.sh_offset + sh.sh_size) as usize)
                .unwrap_or(&[]),
            _ => &[],
        }
    }

    /// Declared start address of the named section.
    pub fn get_section_start_address(&self, name: &str) -> Option<FileAddr>
    {
        self.get_section(name).map(|sh| FileAddr::new(sh.sh_addr))
    }

    /// String at `index` in the object's string table (`.strtab`
    /// preferred, `.dynstr` as fallback).
    pub fn get_string(&self, index: usize) -> Result<&str>
    {
        let strtab = self
            .get_section(".strtab")
            .or_else(|| self.get_section(".dynstr"))
            .ok_or_else(|| TalonError::lookup("object has no string table"))?;
        self.string_at(strtab, index)
    }

    fn string_at(&self, strtab: &Elf64Shdr, index: usize) -> Result<&str>
    {
        let contents = self
            .data
            .get(strtab.sh_offset as usize..(strtab.sh_offset + strtab.sh_size) as usize)
            .ok_or_else(|| TalonError::loader(&self.path, "string table out of bounds"))?;
        let tail = contents
            .get(index..)
            .ok_or_else(|| TalonError::lookup(format!("string index {index} out of bounds")))?;
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| TalonError::loader(&self.path, "unterminated string table entry"))?;
        std::str::from_utf8(&tail[..end])
            .map_err(|_| TalonError::loader(&self.path, "non-UTF-8 string table entry"))
    }

    /// The recorded load bias (`virt = file + bias`).
    pub fn load_bias(&self) -> VirtAddr
    {
        self.load_bias
    }

    /// Record where the object landed in the tracee.
    ///
    /// The caller computes the bias: `AT_ENTRY - e_entry` for the main
    /// executable, the link-map `l_addr` for shared objects.
    pub fn notify_loaded(&mut self, bias: VirtAddr)
    {
        self.load_bias = bias;
    }

    /// Translate a data slice handed out by this object back into a file
    /// offset.
    pub fn data_pointer_as_file_offset(&self, ptr: &[u8]) -> FileOffset
    {
        let base = self.data.as_ptr() as u64;
        FileOffset::new(ptr.as_ptr() as u64 - base)
    }

    /// Slice of the mapped file starting at `offset`.
    pub fn file_offset_as_data_pointer(&self, offset: FileOffset) -> &[u8]
    {
        &self.data[offset.off() as usize..]
    }

    /// Section whose declared address range contains `addr`, if any.
    pub fn get_section_containing_file_addr(&self, addr: FileAddr) -> Option<&Elf64Shdr>
    {
        self.section_headers.iter().find(|sh| {
            sh.sh_type != SHT_NOBITS
                && sh.sh_addr != 0
                && sh.sh_addr <= addr.addr()
                && addr.addr() < sh.sh_addr + sh.sh_size
        })
    }

    /// Virtual-address flavor of
    /// [`get_section_containing_file_addr`](Self::get_section_containing_file_addr).
    pub fn get_section_containing_virt_addr(&self, addr: VirtAddr) -> Option<&Elf64Shdr>
    {
        let unbiased = FileAddr::new(addr.addr().wrapping_sub(self.load_bias.addr()));
        self.get_section_containing_file_addr(unbiased)
    }

    /// All symbols matching `name` (mangled or demangled).
    pub fn get_symbols_by_name(&self, name: &str) -> Vec<&Elf64Sym>
    {
        match self.symbol_name_map.get(name) {
            Some(indices) => indices.iter().map(|&i| &self.symbols[i]).collect(),
            None => Vec::new(),
        }
    }

    /// Symbol whose value is exactly `addr`.
    pub fn get_symbol_at_file_addr(&self, addr: FileAddr) -> Option<&Elf64Sym>
    {
        let key = (addr.addr(), 0);
        self.symbol_addr_map
            .range(key..)
            .next()
            .filter(|((low, _), _)| *low == addr.addr())
            .map(|(_, &index)| &self.symbols[index])
    }

    /// Symbol whose `[st_value, st_value + st_size)` range contains
    /// `addr`.
    ///
    /// Probes the nearest interval at or before the address; on an exact
    /// start match the entry with the widest extent that still contains
    /// the address wins.
    pub fn get_symbol_containing_file_addr(&self, addr: FileAddr) -> Option<&Elf64Sym>
    {
        let exact = self
            .symbol_addr_map
            .range((addr.addr(), 0)..=(addr.addr(), u64::MAX))
            .filter(|((_, high), _)| *high > addr.addr())
            .last();
        if let Some((_, &index)) = exact {
            return Some(&self.symbols[index]);
        }

        let key = (addr.addr(), 0);
        if let Some(((low, high), &index)) = self.symbol_addr_map.range(..key).next_back() {
            if *low <= addr.addr() && addr.addr() < *high {
                return Some(&self.symbols[index]);
            }
        }
        None
    }

    /// Virtual-address flavor of
    /// [`get_symbol_at_file_addr`](Self::get_symbol_at_file_addr).
    pub fn get_symbol_at_virt_addr(&self, addr: VirtAddr) -> Option<&Elf64Sym>
    {
        self.get_symbol_at_file_addr(FileAddr::new(addr.addr().wrapping_sub(self.load_bias.addr())))
    }

    /// Virtual-address flavor of
    /// [`get_symbol_containing_file_addr`](Self::get_symbol_containing_file_addr).
    pub fn get_symbol_containing_virt_addr(&self, addr: VirtAddr) -> Option<&Elf64Sym>
    {
        self.get_symbol_containing_file_addr(FileAddr::new(
            addr.addr().wrapping_sub(self.load_bias.addr()),
        ))
    }

    /// The object's DWARF data, parsed on first use.
    ///
    /// Compile-unit headers are read eagerly at that point; bodies stay
    /// lazy. Fails with [`TalonError::Dwarf`] when the debug sections are
    /// structurally invalid.
    pub fn dwarf(&self) -> Result<&Dwarf>
    {
        self.dwarf.get_or_try_init(|| Dwarf::new(self))
    }
}

/// The set of ELF objects currently mapped into the tracee.
///
/// The main executable is pushed first and is never removed; shared
/// objects come and go with the dynamic linker's link map.
#[derive(Default)]
pub struct ElfCollection
{
    elves: Vec<Elf>,
}

impl ElfCollection
{
    /// Add an object and return its index.
    pub fn push(&mut self, elf: Elf) -> usize
    {
        self.elves.push(elf);
        self.elves.len() - 1
    }

    /// Number of loaded objects.
    pub fn len(&self) -> usize
    {
        self.elves.len()
    }

    /// Whether no objects are loaded.
    pub fn is_empty(&self) -> bool
    {
        self.elves.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Elf>
    {
        self.elves.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Elf>
    {
        self.elves.iter_mut()
    }

    pub fn get(&self, index: usize) -> Option<&Elf>
    {
        self.elves.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Elf>
    {
        self.elves.get_mut(index)
    }

    /// Object with a section covering `addr`, if any.
    pub fn get_elf_containing_address(&self, addr: VirtAddr) -> Option<&Elf>
    {
        self.elves
            .iter()
            .find(|elf| elf.get_section_containing_virt_addr(addr).is_some())
    }

    /// Index flavor of
    /// [`get_elf_containing_address`](Self::get_elf_containing_address).
    pub fn index_of_elf_containing_address(&self, addr: VirtAddr) -> Option<usize>
    {
        self.elves
            .iter()
            .position(|elf| elf.get_section_containing_virt_addr(addr).is_some())
    }

    pub fn get_elf_by_path(&self, path: &Path) -> Option<&Elf>
    {
        self.elves.iter().find(|elf| elf.path() == path)
    }

    pub fn get_elf_by_filename(&self, name: &str) -> Option<&Elf>
    {
        self.elves
            .iter()
            .find(|elf| elf.path().file_name().is_some_and(|f| f == name))
    }

    /// Drop every object whose path is not in `keep`, except the entry at
    /// index 0 (the main executable).
    pub fn retain_paths(&mut self, keep: &[PathBuf])
    {
        let mut index = 0;
        self.elves.retain(|elf| {
            let first = index == 0;
            index += 1;
            first || keep.iter().any(|p| p == elf.path())
        });
    }
}
