//! Tests for the register metadata table.

use std::collections::HashSet;

use talon_core::registers::{
    register_info_by_dwarf_id, register_info_by_id, register_info_by_name, RegisterFormat,
    RegisterId, RegisterType, REGISTER_INFOS,
};

#[test]
fn test_table_names_are_unique()
{
    let mut names = HashSet::new();
    for info in REGISTER_INFOS {
        assert!(names.insert(info.name), "duplicate register name {}", info.name);
    }
}

#[test]
fn test_table_is_in_id_order()
{
    for (index, info) in REGISTER_INFOS.iter().enumerate() {
        assert_eq!(info.id as usize, index, "table out of order at {}", info.name);
    }
}

#[test]
fn test_lookup_by_id_and_name()
{
    let rip = register_info_by_id(RegisterId::Rip);
    assert_eq!(rip.name, "rip");
    assert_eq!(rip.size, 8);
    assert_eq!(rip.reg_type, RegisterType::Gpr);

    let by_name = register_info_by_name("rsi").unwrap();
    assert_eq!(by_name.id, RegisterId::Rsi);
    assert!(register_info_by_name("not_a_register").is_err());
}

#[test]
fn test_lookup_by_dwarf_id()
{
    // System V AMD64 DWARF register numbering.
    assert_eq!(register_info_by_dwarf_id(0).unwrap().id, RegisterId::Rax);
    assert_eq!(register_info_by_dwarf_id(5).unwrap().id, RegisterId::Rdi);
    assert_eq!(register_info_by_dwarf_id(16).unwrap().id, RegisterId::Rip);
    assert_eq!(register_info_by_dwarf_id(17).unwrap().id, RegisterId::Xmm0);
    assert!(register_info_by_dwarf_id(-1).is_err());
    assert!(register_info_by_dwarf_id(1000).is_err());
}

#[test]
fn test_sub_registers_share_their_parents_word()
{
    let pairs = [
        (RegisterId::Rax, RegisterId::Eax),
        (RegisterId::Rax, RegisterId::Ax),
        (RegisterId::Rax, RegisterId::Al),
        (RegisterId::R15, RegisterId::R15b),
        (RegisterId::Rsp, RegisterId::Spl),
    ];
    for (parent, sub) in pairs {
        let parent = register_info_by_id(parent);
        let sub = register_info_by_id(sub);
        assert_eq!(sub.reg_type, RegisterType::SubGpr);
        assert_eq!(sub.offset & !7, parent.offset, "{} not inside {}", sub.name, parent.name);
        assert!(sub.size < parent.size);
    }

    // High-byte views sit one byte into the containing word.
    let ah = register_info_by_id(RegisterId::Ah);
    let rax = register_info_by_id(RegisterId::Rax);
    assert_eq!(ah.offset, rax.offset + 1);
}

#[test]
fn test_format_families()
{
    assert_eq!(register_info_by_id(RegisterId::St3).format, RegisterFormat::LongDouble);
    assert_eq!(register_info_by_id(RegisterId::Xmm9).format, RegisterFormat::Vector);
    assert_eq!(register_info_by_id(RegisterId::Mm2).format, RegisterFormat::Vector);
    assert_eq!(register_info_by_id(RegisterId::Dr6).format, RegisterFormat::Uint);

    // MMX registers alias the x87 stack slots.
    assert_eq!(
        register_info_by_id(RegisterId::Mm0).offset,
        register_info_by_id(RegisterId::St0).offset
    );
}

#[test]
fn test_debug_registers_are_contiguous()
{
    let dr0 = register_info_by_id(RegisterId::Dr0);
    let dr7 = register_info_by_id(RegisterId::Dr7);
    assert_eq!(dr7.offset - dr0.offset, 7 * 8);
    for id in [RegisterId::Dr0, RegisterId::Dr1, RegisterId::Dr2, RegisterId::Dr3] {
        assert_eq!(register_info_by_id(id).reg_type, RegisterType::Dr);
    }
}
