//! Tests for the ELF loader against a synthetic object file.

mod common;

use common::{build_elf, symbol, write_temp_elf, SectionSpec, SHT_PROGBITS, SHT_STRTAB, SHT_SYMTAB};
use talon_core::types::{FileAddr, VirtAddr};
use talon_core::Elf;

const TEXT_ADDR: u64 = 0x401000;

fn test_object() -> std::path::PathBuf
{
    let mut strtab = vec![0u8];
    let main_name = strtab.len() as u32;
    strtab.extend(b"main\0");
    let helper_name = strtab.len() as u32;
    strtab.extend(b"helper\0");

    let mut symtab = symbol(0, 0, 0, 0); // null symbol
    symtab.extend(symbol(main_name, 0x12, TEXT_ADDR, 0x20));
    symtab.extend(symbol(helper_name, 0x12, TEXT_ADDR + 0x20, 0x10));

    let sections = [
        SectionSpec {
            name: ".text",
            sh_type: SHT_PROGBITS,
            addr: TEXT_ADDR,
            data: vec![0x90; 0x100],
        },
        SectionSpec {
            name: ".symtab",
            sh_type: SHT_SYMTAB,
            addr: 0,
            data: symtab,
        },
        SectionSpec {
            name: ".strtab",
            sh_type: SHT_STRTAB,
            addr: 0,
            data: strtab,
        },
    ];
    write_temp_elf("elf", &build_elf(TEXT_ADDR, &sections))
}

#[test]
fn test_parses_header_and_sections()
{
    let path = test_object();
    let elf = Elf::new(&path).unwrap();

    assert_eq!(elf.header().e_entry, TEXT_ADDR);
    assert!(elf.get_section(".text").is_some());
    assert!(elf.get_section(".symtab").is_some());
    assert!(elf.get_section(".missing").is_none());
    assert_eq!(
        elf.get_section_start_address(".text"),
        Some(FileAddr::new(TEXT_ADDR))
    );
    assert_eq!(elf.get_section_contents(".text").len(), 0x100);
    assert!(elf.get_section_contents(".missing").is_empty());

    std::fs::remove_file(path).ok();
}

#[test]
fn test_rejects_garbage()
{
    let path = write_temp_elf("garbage", b"not an elf file at all");
    assert!(Elf::new(&path).is_err());
    std::fs::remove_file(path).ok();
}

#[test]
fn test_symbol_lookup_by_name()
{
    let path = test_object();
    let elf = Elf::new(&path).unwrap();

    let main = elf.get_symbols_by_name("main");
    assert_eq!(main.len(), 1);
    assert_eq!(main[0].st_value, TEXT_ADDR);
    assert!(elf.get_symbols_by_name("nonexistent").is_empty());

    std::fs::remove_file(path).ok();
}

#[test]
fn test_symbol_containment()
{
    let path = test_object();
    let elf = Elf::new(&path).unwrap();

    // Interior of main.
    let sym = elf
        .get_symbol_containing_file_addr(FileAddr::new(TEXT_ADDR + 0x10))
        .unwrap();
    assert_eq!(sym.st_value, TEXT_ADDR);

    // main's range is half-open, so its end belongs to helper.
    let sym = elf
        .get_symbol_containing_file_addr(FileAddr::new(TEXT_ADDR + 0x20))
        .unwrap();
    assert_eq!(sym.st_value, TEXT_ADDR + 0x20);

    // Past every symbol.
    assert!(elf
        .get_symbol_containing_file_addr(FileAddr::new(TEXT_ADDR + 0x80))
        .is_none());

    // Exact-value lookup.
    let sym = elf.get_symbol_at_file_addr(FileAddr::new(TEXT_ADDR)).unwrap();
    assert_eq!(sym.st_size, 0x20);

    std::fs::remove_file(path).ok();
}

#[test]
fn test_address_translation_round_trip()
{
    let path = test_object();
    let mut elf = Elf::new(&path).unwrap();
    elf.notify_loaded(VirtAddr::new(0x10000));

    let file = FileAddr::new(TEXT_ADDR + 0x40);
    let virt = file.to_virt_addr(&elf);
    assert_eq!(virt, VirtAddr::new(TEXT_ADDR + 0x40 + 0x10000));
    assert_eq!(virt.to_file_addr(&elf), Some(file));

    // An address outside every section does not translate back.
    assert_eq!(VirtAddr::new(0x10).to_file_addr(&elf), None);

    std::fs::remove_file(path).ok();
}

#[test]
fn test_section_containment()
{
    let path = test_object();
    let mut elf = Elf::new(&path).unwrap();
    elf.notify_loaded(VirtAddr::new(0x2000));

    let section = elf
        .get_section_containing_file_addr(FileAddr::new(TEXT_ADDR + 0xff))
        .unwrap();
    assert_eq!(section.sh_addr, TEXT_ADDR);
    assert!(elf
        .get_section_containing_file_addr(FileAddr::new(TEXT_ADDR + 0x100))
        .is_none());
    assert!(elf
        .get_section_containing_virt_addr(VirtAddr::new(TEXT_ADDR + 0x2000))
        .is_some());

    std::fs::remove_file(path).ok();
}

#[test]
fn test_parses_own_test_binary()
{
    // A real-world object: the running test binary itself.
    let elf = Elf::new("/proc/self/exe").unwrap();
    assert!(elf.get_section(".text").is_some());
    assert!(!elf.get_symbols_by_name("main").is_empty());
}
