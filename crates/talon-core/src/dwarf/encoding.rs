//! DWARF v4 encoding constants.
//!
//! Only the values the engine actually consumes are listed; the names
//! follow the spelling of the DWARF specification so they can be grepped
//! against it.

#![allow(non_upper_case_globals)]

// Tags.
pub const DW_TAG_array_type: u64 = 0x01;
pub const DW_TAG_class_type: u64 = 0x02;
pub const DW_TAG_enumeration_type: u64 = 0x04;
pub const DW_TAG_member: u64 = 0x0d;
pub const DW_TAG_pointer_type: u64 = 0x0f;
pub const DW_TAG_reference_type: u64 = 0x10;
pub const DW_TAG_compile_unit: u64 = 0x11;
pub const DW_TAG_structure_type: u64 = 0x13;
pub const DW_TAG_typedef: u64 = 0x16;
pub const DW_TAG_union_type: u64 = 0x17;
pub const DW_TAG_inlined_subroutine: u64 = 0x1d;
pub const DW_TAG_ptr_to_member_type: u64 = 0x1f;
pub const DW_TAG_subrange_type: u64 = 0x21;
pub const DW_TAG_base_type: u64 = 0x24;
pub const DW_TAG_const_type: u64 = 0x26;
pub const DW_TAG_subprogram: u64 = 0x2e;
pub const DW_TAG_variable: u64 = 0x34;
pub const DW_TAG_volatile_type: u64 = 0x35;
pub const DW_TAG_rvalue_reference_type: u64 = 0x42;

// Attributes.
pub const DW_AT_sibling: u64 = 0x01;
pub const DW_AT_name: u64 = 0x03;
pub const DW_AT_byte_size: u64 = 0x0b;
pub const DW_AT_bit_offset: u64 = 0x0c;
pub const DW_AT_bit_size: u64 = 0x0d;
pub const DW_AT_stmt_list: u64 = 0x10;
pub const DW_AT_low_pc: u64 = 0x11;
pub const DW_AT_high_pc: u64 = 0x12;
pub const DW_AT_comp_dir: u64 = 0x1b;
pub const DW_AT_upper_bound: u64 = 0x2f;
pub const DW_AT_abstract_origin: u64 = 0x31;
pub const DW_AT_count: u64 = 0x37;
pub const DW_AT_data_member_location: u64 = 0x38;
pub const DW_AT_decl_file: u64 = 0x3a;
pub const DW_AT_decl_line: u64 = 0x3b;
pub const DW_AT_encoding: u64 = 0x3e;
pub const DW_AT_specification: u64 = 0x47;
pub const DW_AT_type: u64 = 0x49;
pub const DW_AT_ranges: u64 = 0x55;
pub const DW_AT_call_file: u64 = 0x58;
pub const DW_AT_call_line: u64 = 0x59;
pub const DW_AT_data_bit_offset: u64 = 0x6b;

// Forms.
pub const DW_FORM_addr: u64 = 0x01;
pub const DW_FORM_block2: u64 = 0x03;
pub const DW_FORM_block4: u64 = 0x04;
pub const DW_FORM_data2: u64 = 0x05;
pub const DW_FORM_data4: u64 = 0x06;
pub const DW_FORM_data8: u64 = 0x07;
pub const DW_FORM_string: u64 = 0x08;
pub const DW_FORM_block: u64 = 0x09;
pub const DW_FORM_block1: u64 = 0x0a;
pub const DW_FORM_data1: u64 = 0x0b;
pub const DW_FORM_flag: u64 = 0x0c;
pub const DW_FORM_sdata: u64 = 0x0d;
pub const DW_FORM_strp: u64 = 0x0e;
pub const DW_FORM_udata: u64 = 0x0f;
pub const DW_FORM_ref_addr: u64 = 0x10;
pub const DW_FORM_ref1: u64 = 0x11;
pub const DW_FORM_ref2: u64 = 0x12;
pub const DW_FORM_ref4: u64 = 0x13;
pub const DW_FORM_ref8: u64 = 0x14;
pub const DW_FORM_ref_udata: u64 = 0x15;
pub const DW_FORM_indirect: u64 = 0x16;
pub const DW_FORM_sec_offset: u64 = 0x17;
pub const DW_FORM_exprloc: u64 = 0x18;
pub const DW_FORM_flag_present: u64 = 0x19;

// Base type encodings.
pub const DW_ATE_boolean: u64 = 0x02;
pub const DW_ATE_float: u64 = 0x04;
pub const DW_ATE_signed: u64 = 0x05;
pub const DW_ATE_signed_char: u64 = 0x06;
pub const DW_ATE_unsigned: u64 = 0x07;
pub const DW_ATE_unsigned_char: u64 = 0x08;
pub const DW_ATE_UTF: u64 = 0x10;

// Line number program standard opcodes.
pub const DW_LNS_copy: u8 = 0x01;
pub const DW_LNS_advance_pc: u8 = 0x02;
pub const DW_LNS_advance_line: u8 = 0x03;
pub const DW_LNS_set_file: u8 = 0x04;
pub const DW_LNS_set_column: u8 = 0x05;
pub const DW_LNS_negate_stmt: u8 = 0x06;
pub const DW_LNS_set_basic_block: u8 = 0x07;
pub const DW_LNS_const_add_pc: u8 = 0x08;
pub const DW_LNS_fixed_advance_pc: u8 = 0x09;
pub const DW_LNS_set_prologue_end: u8 = 0x0a;
pub const DW_LNS_set_epilogue_begin: u8 = 0x0b;
pub const DW_LNS_set_isa: u8 = 0x0c;

// Line number program extended opcodes.
pub const DW_LNE_end_sequence: u8 = 0x01;
pub const DW_LNE_set_address: u8 = 0x02;
pub const DW_LNE_define_file: u8 = 0x03;
pub const DW_LNE_set_discriminator: u8 = 0x04;
