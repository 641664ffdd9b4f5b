//! Core value types shared across the debugger.

pub mod address;
pub mod bytes;

pub use address::{FileAddr, FileOffset, VirtAddr};
pub use bytes::{from_bytes, memcpy_bits, FromBytes};
