//! Tests for the primitive value types.

use talon_core::types::{from_bytes, memcpy_bits, FileAddr, FileOffset, VirtAddr};

#[test]
fn test_address_arithmetic()
{
    let addr = VirtAddr::new(0x1000);
    assert_eq!((addr + 0x100).addr(), 0x1100);
    assert_eq!((addr - 0x100).addr(), 0xf00);
    assert_eq!(addr + 0x10 - addr, 0x10);

    let file = FileAddr::new(0x2000);
    assert_eq!((file + 8).addr(), 0x2008);

    let offset = FileOffset::new(0x40);
    assert_eq!((offset + 0x10).off(), 0x50);
}

#[test]
fn test_address_ordering_and_display()
{
    assert!(VirtAddr::new(0x1000) < VirtAddr::new(0x1001));
    assert_eq!(VirtAddr::new(0xdeadbeef).to_string(), "0x00000000deadbeef");
    assert_eq!(FileAddr::NULL, FileAddr::new(0));
}

#[test]
fn test_from_bytes()
{
    let bytes = [0xef, 0xbe, 0xad, 0xde, 0, 0, 0, 0];
    let value: u64 = from_bytes(&bytes).unwrap();
    assert_eq!(value, 0xdeadbeef);

    let value: u32 = from_bytes(&bytes).unwrap();
    assert_eq!(value, 0xdeadbeef);

    assert!(from_bytes::<u64>(&bytes[..4]).is_err());
}

#[test]
fn test_memcpy_bits_aligned()
{
    let src = [0b1010_1100u8];
    let mut dest = [0u8];
    memcpy_bits(&mut dest, 0, &src, 0, 8);
    assert_eq!(dest[0], 0b1010_1100);
}

#[test]
fn test_memcpy_bits_offset_extract()
{
    // Extract a 3-bit field starting at bit 2.
    let src = [0b0101_1100u8];
    let mut dest = [0u8];
    memcpy_bits(&mut dest, 0, &src, 2, 3);
    assert_eq!(dest[0], 0b111);
}

#[test]
fn test_memcpy_bits_cross_byte()
{
    // A 8-bit field straddling a byte boundary.
    let src = [0b1100_0000u8, 0b0000_1101];
    let mut dest = [0u8];
    memcpy_bits(&mut dest, 0, &src, 6, 8);
    assert_eq!(dest[0], 0b0011_0111);
}

#[test]
fn test_memcpy_bits_clears_stale_bits()
{
    let src = [0x00u8];
    let mut dest = [0xffu8];
    memcpy_bits(&mut dest, 0, &src, 0, 4);
    assert_eq!(dest[0], 0xf0);
}
