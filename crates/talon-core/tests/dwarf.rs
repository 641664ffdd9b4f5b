//! Tests for the DWARF engine against hand-assembled debug sections.

mod common;

use std::path::Path;

use common::{build_elf, push_u16, push_u32, push_u64, uleb, write_temp_elf, SectionSpec, SHT_PROGBITS};
use talon_core::dwarf::encoding::*;
use talon_core::types::FileAddr;
use talon_core::Elf;

const LOW_PC: u64 = 0x401000;
const HIGH_PC: u64 = 0x401100;
const MAIN_SIZE: u64 = 0x30;

// .debug_str layout.
const STR_TEST_C: u32 = 0;
const STR_COMP_DIR: u32 = 7;
const STR_MAIN: u32 = 12;
const STR_SPLIT: u32 = 17;
const STR_INT: u32 = 23;
const STR_CHAR: u32 = 27;
const STR_MYINT: u32 = 32;

fn debug_abbrev() -> Vec<u8>
{
    let mut out = Vec::new();
    let spec = |attr: u64, form: u64| {
        let mut bytes = uleb(attr);
        bytes.extend(uleb(form));
        bytes
    };

    // Abbrev 1: compile unit with children.
    out.extend(uleb(1));
    out.extend(uleb(DW_TAG_compile_unit));
    out.push(1);
    out.extend(spec(DW_AT_name, DW_FORM_strp));
    out.extend(spec(DW_AT_comp_dir, DW_FORM_strp));
    out.extend(spec(DW_AT_low_pc, DW_FORM_addr));
    out.extend(spec(DW_AT_high_pc, DW_FORM_addr));
    out.extend(spec(DW_AT_stmt_list, DW_FORM_sec_offset));
    out.extend([0, 0]);

    // Abbrev 2: subprogram with a low/high PC pair (high as offset).
    out.extend(uleb(2));
    out.extend(uleb(DW_TAG_subprogram));
    out.push(0);
    out.extend(spec(DW_AT_name, DW_FORM_strp));
    out.extend(spec(DW_AT_low_pc, DW_FORM_addr));
    out.extend(spec(DW_AT_high_pc, DW_FORM_data8));
    out.extend([0, 0]);

    // Abbrev 3: subprogram described by a range list.
    out.extend(uleb(3));
    out.extend(uleb(DW_TAG_subprogram));
    out.push(0);
    out.extend(spec(DW_AT_name, DW_FORM_strp));
    out.extend(spec(DW_AT_ranges, DW_FORM_sec_offset));
    out.extend([0, 0]);

    // Abbrev 4: base type.
    out.extend(uleb(4));
    out.extend(uleb(DW_TAG_base_type));
    out.push(0);
    out.extend(spec(DW_AT_name, DW_FORM_strp));
    out.extend(spec(DW_AT_byte_size, DW_FORM_data1));
    out.extend(spec(DW_AT_encoding, DW_FORM_data1));
    out.extend([0, 0]);

    // Abbrev 5: typedef.
    out.extend(uleb(5));
    out.extend(uleb(DW_TAG_typedef));
    out.push(0);
    out.extend(spec(DW_AT_name, DW_FORM_strp));
    out.extend(spec(DW_AT_type, DW_FORM_ref4));
    out.extend([0, 0]);

    // Abbrev 6: const qualifier.
    out.extend(uleb(6));
    out.extend(uleb(DW_TAG_const_type));
    out.push(0);
    out.extend(spec(DW_AT_type, DW_FORM_ref4));
    out.extend([0, 0]);

    out.push(0); // table terminator
    out
}

fn debug_info() -> Vec<u8>
{
    let mut body = Vec::new();

    // Root: DW_TAG_compile_unit.
    body.extend(uleb(1));
    push_u32(&mut body, STR_TEST_C);
    push_u32(&mut body, STR_COMP_DIR);
    push_u64(&mut body, LOW_PC);
    push_u64(&mut body, HIGH_PC);
    push_u32(&mut body, 0); // stmt_list offset

    // Child: main.
    body.extend(uleb(2));
    push_u32(&mut body, STR_MAIN);
    push_u64(&mut body, LOW_PC);
    push_u64(&mut body, MAIN_SIZE);

    // Child: split, covered by a range list.
    body.extend(uleb(3));
    push_u32(&mut body, STR_SPLIT);
    push_u32(&mut body, 0); // .debug_ranges offset

    // Type DIEs; reference offsets are relative to the unit start,
    // which has an 11-byte header.
    let int_offset = 11 + body.len() as u32;
    body.extend(uleb(4));
    push_u32(&mut body, STR_INT);
    body.push(4);
    body.push(DW_ATE_signed as u8);

    body.extend(uleb(4));
    push_u32(&mut body, STR_CHAR);
    body.push(1);
    body.push(DW_ATE_signed_char as u8);

    let typedef_offset = 11 + body.len() as u32;
    body.extend(uleb(5));
    push_u32(&mut body, STR_MYINT);
    push_u32(&mut body, int_offset);

    body.extend(uleb(6));
    push_u32(&mut body, typedef_offset);

    body.extend(uleb(0)); // terminator

    let mut out = Vec::new();
    push_u32(&mut out, 7 + body.len() as u32); // unit_length
    push_u16(&mut out, 4); // version
    push_u32(&mut out, 0); // debug_abbrev_offset
    out.push(8); // address_size
    out.extend(body);
    out
}

fn debug_ranges() -> Vec<u8>
{
    let mut out = Vec::new();
    // Base address selector.
    push_u64(&mut out, !0u64);
    push_u64(&mut out, 0x400000);
    // Two ranges relative to the selected base.
    push_u64(&mut out, 0x2000);
    push_u64(&mut out, 0x2010);
    push_u64(&mut out, 0x3000);
    push_u64(&mut out, 0x3008);
    // Terminator.
    push_u64(&mut out, 0);
    push_u64(&mut out, 0);
    out
}

fn debug_line() -> Vec<u8>
{
    let mut header = Vec::new();
    header.push(1); // minimum_instruction_length
    header.push(1); // maximum_operations_per_instruction
    header.push(1); // default_is_stmt
    header.push((-5i8) as u8); // line_base
    header.push(14); // line_range
    header.push(13); // opcode_base
    header.extend([0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]); // standard opcode lengths
    header.push(0); // no include directories
    header.extend(b"test.c\0");
    header.extend(uleb(0)); // dir index
    header.extend(uleb(0)); // mtime
    header.extend(uleb(0)); // length
    header.push(0); // end of file table

    let mut program = Vec::new();
    // DW_LNE_set_address LOW_PC.
    program.push(0);
    program.extend(uleb(9));
    program.push(DW_LNE_set_address);
    push_u64(&mut program, LOW_PC);
    // Special opcode: +0 bytes, line 1 -> 3.
    program.push(13 + 7);
    // Special opcode: +0x10 bytes, line +1 (twice).
    program.push(243);
    program.push(243);
    // Advance past the function, then end the sequence.
    program.push(DW_LNS_advance_pc);
    program.extend(uleb(0x10));
    program.push(0);
    program.extend(uleb(1));
    program.push(DW_LNE_end_sequence);

    let mut out = Vec::new();
    push_u32(
        &mut out,
        2 + 4 + header.len() as u32 + program.len() as u32,
    );
    push_u16(&mut out, 4); // version
    push_u32(&mut out, header.len() as u32); // header_length
    out.extend(header);
    out.extend(program);
    out
}

fn test_object() -> std::path::PathBuf
{
    let sections = [
        SectionSpec {
            name: ".text",
            sh_type: SHT_PROGBITS,
            addr: LOW_PC,
            data: vec![0x90; 0x100],
        },
        SectionSpec {
            name: ".debug_info",
            sh_type: SHT_PROGBITS,
            addr: 0,
            data: debug_info(),
        },
        SectionSpec {
            name: ".debug_abbrev",
            sh_type: SHT_PROGBITS,
            addr: 0,
            data: debug_abbrev(),
        },
        SectionSpec {
            name: ".debug_str",
            sh_type: SHT_PROGBITS,
            addr: 0,
            data: b"test.c\0/src\0main\0split\0int\0char\0myint\0".to_vec(),
        },
        SectionSpec {
            name: ".debug_line",
            sh_type: SHT_PROGBITS,
            addr: 0,
            data: debug_line(),
        },
        SectionSpec {
            name: ".debug_ranges",
            sh_type: SHT_PROGBITS,
            addr: 0,
            data: debug_ranges(),
        },
    ];
    write_temp_elf("dwarf", &build_elf(LOW_PC, &sections))
}

#[test]
fn test_compile_unit_header()
{
    let path = test_object();
    let elf = Elf::new(&path).unwrap();
    let dwarf = elf.dwarf().unwrap();

    assert_eq!(dwarf.compile_units().len(), 1);
    let root = dwarf.compile_units()[0].root(dwarf).unwrap();
    assert_eq!(root.tag(), DW_TAG_compile_unit);
    assert_eq!(root.name(dwarf).unwrap().as_deref(), Some("test.c"));
    assert_eq!(
        root.attr(DW_AT_comp_dir).unwrap().as_string(dwarf).unwrap(),
        "/src"
    );
    assert_eq!(root.low_pc(dwarf).unwrap(), FileAddr::new(LOW_PC));
    assert_eq!(root.high_pc(dwarf).unwrap(), FileAddr::new(HIGH_PC));

    std::fs::remove_file(path).ok();
}

#[test]
fn test_die_children_and_attributes()
{
    let path = test_object();
    let elf = Elf::new(&path).unwrap();
    let dwarf = elf.dwarf().unwrap();
    let root = dwarf.compile_units()[0].root(dwarf).unwrap();

    let children: Vec<_> = root
        .children(dwarf)
        .collect::<talon_core::Result<Vec<_>>>()
        .unwrap();
    assert_eq!(children.len(), 6);

    let main = &children[0];
    assert_eq!(main.tag(), DW_TAG_subprogram);
    assert_eq!(main.name(dwarf).unwrap().as_deref(), Some("main"));
    assert_eq!(main.low_pc(dwarf).unwrap(), FileAddr::new(LOW_PC));
    // high_pc in a data form is an offset from the low PC.
    assert_eq!(main.high_pc(dwarf).unwrap(), FileAddr::new(LOW_PC + MAIN_SIZE));
    assert!(main.contains_address(dwarf, FileAddr::new(LOW_PC + 0x10)).unwrap());
    assert!(!main
        .contains_address(dwarf, FileAddr::new(LOW_PC + MAIN_SIZE))
        .unwrap());

    // Attribute decoding is pure: repeated decodes agree.
    let high = main.attr(DW_AT_high_pc).unwrap();
    assert_eq!(high.as_int(dwarf).unwrap(), MAIN_SIZE);
    assert_eq!(high.as_int(dwarf).unwrap(), MAIN_SIZE);

    // Missing attributes are reported, not invented.
    assert!(main.attr(DW_AT_ranges).is_err());

    std::fs::remove_file(path).ok();
}

#[test]
fn test_range_lists()
{
    let path = test_object();
    let elf = Elf::new(&path).unwrap();
    let dwarf = elf.dwarf().unwrap();
    let root = dwarf.compile_units()[0].root(dwarf).unwrap();

    let children: Vec<_> = root
        .children(dwarf)
        .collect::<talon_core::Result<Vec<_>>>()
        .unwrap();
    let split = &children[1];
    assert_eq!(split.name(dwarf).unwrap().as_deref(), Some("split"));

    // The explicit base selector overrides the unit's low PC.
    assert_eq!(split.low_pc(dwarf).unwrap(), FileAddr::new(0x402000));
    assert_eq!(split.high_pc(dwarf).unwrap(), FileAddr::new(0x403008));
    assert!(split.contains_address(dwarf, FileAddr::new(0x402008)).unwrap());
    assert!(!split.contains_address(dwarf, FileAddr::new(0x402010)).unwrap());
    assert!(split.contains_address(dwarf, FileAddr::new(0x403004)).unwrap());
    assert!(!split.contains_address(dwarf, FileAddr::new(0x2008)).unwrap());

    std::fs::remove_file(path).ok();
}

#[test]
fn test_function_index()
{
    let path = test_object();
    let elf = Elf::new(&path).unwrap();
    let dwarf = elf.dwarf().unwrap();

    let main = dwarf.find_functions("main").unwrap();
    assert_eq!(main.len(), 1);
    assert!(dwarf.find_functions("absent").unwrap().is_empty());

    let containing = dwarf
        .function_containing_address(FileAddr::new(LOW_PC + 0x10))
        .unwrap()
        .unwrap();
    assert_eq!(containing.name(dwarf).unwrap().as_deref(), Some("main"));
    // Past main but still inside the unit.
    assert!(dwarf
        .function_containing_address(FileAddr::new(LOW_PC + 0x90))
        .unwrap()
        .is_none());

    let stack = dwarf
        .inline_stack_at_address(FileAddr::new(LOW_PC + 0x10))
        .unwrap();
    assert_eq!(stack.len(), 1);

    std::fs::remove_file(path).ok();
}

#[test]
fn test_type_model()
{
    use talon_core::Type;

    let path = test_object();
    let elf = Elf::new(&path).unwrap();
    let dwarf = elf.dwarf().unwrap();
    let root = dwarf.compile_units()[0].root(dwarf).unwrap();
    let children: Vec<_> = root
        .children(dwarf)
        .collect::<talon_core::Result<Vec<_>>>()
        .unwrap();

    let int_type = Type::new(children[2].clone());
    let char_type = Type::new(children[3].clone());
    let typedef_type = Type::new(children[4].clone());
    let const_type = Type::new(children[5].clone());

    assert_eq!(int_type.get_die().tag(), DW_TAG_base_type);
    assert_eq!(int_type.byte_size(dwarf).unwrap(), 4);
    // Memoized: a second query agrees.
    assert_eq!(int_type.byte_size(dwarf).unwrap(), 4);
    assert_eq!(char_type.byte_size(dwarf).unwrap(), 1);

    // Size computations follow DW_AT_type through wrappers.
    assert_eq!(typedef_type.byte_size(dwarf).unwrap(), 4);
    assert_eq!(const_type.byte_size(dwarf).unwrap(), 4);

    // Stripping const and typedef reaches the base type.
    let stripped = const_type.strip_cv_typedef(dwarf).unwrap();
    assert_eq!(stripped.get_die().tag(), DW_TAG_base_type);
    assert_eq!(stripped.get_die().name(dwarf).unwrap().as_deref(), Some("int"));

    assert!(char_type.is_char_type(dwarf).unwrap());
    assert!(!int_type.is_char_type(dwarf).unwrap());
    assert!(!const_type.is_char_type(dwarf).unwrap());

    std::fs::remove_file(path).ok();
}

#[test]
fn test_line_table_rows()
{
    let path = test_object();
    let elf = Elf::new(&path).unwrap();
    let dwarf = elf.dwarf().unwrap();
    let cu = &dwarf.compile_units()[0];
    let table = cu.lines(dwarf).unwrap().unwrap();

    let rows: Vec<_> = table
        .iter(dwarf)
        .collect::<talon_core::Result<Vec<_>>>()
        .unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].address, FileAddr::new(LOW_PC));
    assert_eq!(rows[0].line, 3);
    assert_eq!(rows[1].address, FileAddr::new(LOW_PC + 0x10));
    assert_eq!(rows[1].line, 4);
    assert_eq!(rows[2].address, FileAddr::new(LOW_PC + 0x20));
    assert_eq!(rows[2].line, 5);
    assert!(rows[3].end_sequence);
    assert_eq!(rows[3].address, FileAddr::new(LOW_PC + 0x30));
    assert_eq!(rows[0].file, std::path::PathBuf::from("/src/test.c"));

    // Addresses are non-decreasing within a sequence.
    for pair in rows.windows(2) {
        assert!(pair[0].address <= pair[1].address);
    }

    std::fs::remove_file(path).ok();
}

#[test]
fn test_line_lookup_by_address()
{
    let path = test_object();
    let elf = Elf::new(&path).unwrap();
    let dwarf = elf.dwarf().unwrap();
    let table = dwarf.compile_units()[0].lines(dwarf).unwrap().unwrap();

    let entry = table
        .get_entry_by_address(dwarf, FileAddr::new(LOW_PC + 0x15))
        .unwrap()
        .unwrap();
    assert_eq!(entry.line, 4);

    let entry = table
        .get_entry_by_address(dwarf, FileAddr::new(LOW_PC))
        .unwrap()
        .unwrap();
    assert_eq!(entry.line, 3);

    // Before the sequence, nothing matches.
    assert!(table
        .get_entry_by_address(dwarf, FileAddr::new(LOW_PC - 1))
        .unwrap()
        .is_none());

    let next = table
        .get_entry_after_address(dwarf, FileAddr::new(LOW_PC))
        .unwrap()
        .unwrap();
    assert_eq!(next.line, 4);

    std::fs::remove_file(path).ok();
}

#[test]
fn test_line_lookup_by_line()
{
    let path = test_object();
    let elf = Elf::new(&path).unwrap();
    let dwarf = elf.dwarf().unwrap();
    let table = dwarf.compile_units()[0].lines(dwarf).unwrap().unwrap();

    // Suffix match.
    let entries = table
        .get_entries_by_line(dwarf, Path::new("test.c"), 5)
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].address, FileAddr::new(LOW_PC + 0x20));

    // Absolute match.
    let entries = table
        .get_entries_by_line(dwarf, Path::new("/src/test.c"), 3)
        .unwrap();
    assert_eq!(entries.len(), 1);

    // Wrong file.
    assert!(table
        .get_entries_by_line(dwarf, Path::new("other.c"), 5)
        .unwrap()
        .is_empty());

    std::fs::remove_file(path).ok();
}
