//! Tagged memory address types.

use std::fmt;
use std::ops::{Add, Sub};

use crate::elf::Elf;

/// Address as observed in the tracee's virtual memory
///
/// This wrapper around `u64` provides type safety when working with
/// addresses read from registers or handed to ptrace. It prevents
/// accidentally mixing virtual addresses with file-relative addresses
/// (see [`FileAddr`]) or plain counters.
///
/// ## Why three address types?
///
/// A debugger juggles addresses from three coordinate systems at once:
///
/// - **Virtual addresses** ([`VirtAddr`]): what the CPU and ptrace see
/// - **File addresses** ([`FileAddr`]): what an ELF object declares
/// - **File offsets** ([`FileOffset`]): byte positions in the mapped file
///
/// The invariant tying the first two together is
/// `virt = file + load_bias`, where the load bias belongs to one specific
/// ELF object. Conversions therefore always take the owning [`Elf`] as an
/// argument; there is no implicit conversion between the three types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtAddr(u64);

impl VirtAddr
{
    /// The null address (0x0)
    pub const NULL: Self = VirtAddr(0);

    /// Create a new virtual address from a raw `u64` value.
    pub const fn new(value: u64) -> Self
    {
        VirtAddr(value)
    }

    /// Get the raw `u64` value of this address.
    pub const fn addr(self) -> u64
    {
        self.0
    }

    /// Translate into the file-address space of `elf`.
    ///
    /// Returns `None` when no section of `elf` covers this address, so a
    /// stray pointer into another object cannot silently produce a bogus
    /// file address.
    pub fn to_file_addr(self, elf: &Elf) -> Option<FileAddr>
    {
        let unbiased = FileAddr::new(self.0.wrapping_sub(elf.load_bias().addr()));
        elf.get_section_containing_file_addr(unbiased)?;
        Some(unbiased)
    }
}

/// Address as laid out in an ELF object file
///
/// File addresses come from symbol tables, DWARF attributes, and line
/// tables. They only become meaningful in the running process after the
/// owning object's load bias is applied; see [`FileAddr::to_virt_addr`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileAddr(u64);

impl FileAddr
{
    /// The null address (0x0)
    pub const NULL: Self = FileAddr(0);

    /// Create a new file address from a raw `u64` value.
    pub const fn new(value: u64) -> Self
    {
        FileAddr(value)
    }

    /// Get the raw `u64` value of this address.
    pub const fn addr(self) -> u64
    {
        self.0
    }

    /// Translate into the tracee's virtual address space using the load
    /// bias recorded on `elf`.
    pub fn to_virt_addr(self, elf: &Elf) -> VirtAddr
    {
        VirtAddr(self.0.wrapping_add(elf.load_bias().addr()))
    }
}

/// Byte offset into a mapped ELF file
///
/// Distinct from [`FileAddr`]: sections are placed at file offsets that
/// generally differ from their declared addresses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileOffset(u64);

impl FileOffset
{
    /// Create a new file offset from a raw `u64` value.
    pub const fn new(value: u64) -> Self
    {
        FileOffset(value)
    }

    /// Get the raw `u64` value of this offset.
    pub const fn off(self) -> u64
    {
        self.0
    }
}

macro_rules! address_arithmetic {
    ($ty:ident) => {
        impl Add<u64> for $ty
        {
            type Output = $ty;

            fn add(self, rhs: u64) -> Self::Output
            {
                $ty(self.0.wrapping_add(rhs))
            }
        }

        impl Sub<u64> for $ty
        {
            type Output = $ty;

            fn sub(self, rhs: u64) -> Self::Output
            {
                $ty(self.0.wrapping_sub(rhs))
            }
        }

        impl Sub<$ty> for $ty
        {
            type Output = u64;

            fn sub(self, rhs: $ty) -> Self::Output
            {
                self.0.wrapping_sub(rhs.0)
            }
        }

        impl fmt::Display for $ty
        {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
            {
                write!(f, "0x{:016x}", self.0)
            }
        }
    };
}

address_arithmetic!(VirtAddr);
address_arithmetic!(FileAddr);
address_arithmetic!(FileOffset);
