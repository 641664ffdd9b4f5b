//! Raw byte reinterpretation and bit-granular copies.

use std::mem;

use crate::error::{Result, TalonError};

/// Types that can be reconstructed from a little-endian byte slice.
///
/// Implemented for the plain-old-data types the debugger reads out of
/// tracee memory and register caches. The blanket [`from_bytes`] helper
/// performs the same reinterpretation for any `Copy` type when the exact
/// layout is already known to be sound.
pub trait FromBytes: Sized + Copy
{
    /// Reinterpret `bytes` as `Self`, checking the length.
    fn from_bytes(bytes: &[u8]) -> Result<Self>;
}

macro_rules! impl_from_bytes {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromBytes for $ty
            {
                fn from_bytes(bytes: &[u8]) -> Result<Self>
                {
                    let array = bytes.try_into().map_err(|_| {
                        TalonError::InvalidArgument(format!(
                            "expected {} bytes, got {}",
                            mem::size_of::<$ty>(),
                            bytes.len()
                        ))
                    })?;
                    Ok(<$ty>::from_le_bytes(array))
                }
            }
        )*
    };
}

impl_from_bytes!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl<const N: usize> FromBytes for [u8; N]
{
    fn from_bytes(bytes: &[u8]) -> Result<Self>
    {
        bytes.try_into().map_err(|_| {
            TalonError::InvalidArgument(format!("expected {} bytes, got {}", N, bytes.len()))
        })
    }
}

/// Reinterpret the start of `bytes` as a `T` by bitwise copy.
///
/// Unlike [`FromBytes::from_bytes`] this accepts longer slices and is the
/// tool of choice for reading packed C structures (ELF headers, `r_debug`,
/// link-map entries) out of larger buffers.
pub fn from_bytes<T: Copy>(bytes: &[u8]) -> Result<T>
{
    if bytes.len() < mem::size_of::<T>() {
        return Err(TalonError::InvalidArgument(format!(
            "expected at least {} bytes, got {}",
            mem::size_of::<T>(),
            bytes.len()
        )));
    }
    let mut value = mem::MaybeUninit::<T>::uninit();
    unsafe {
        std::ptr::copy_nonoverlapping(
            bytes.as_ptr(),
            value.as_mut_ptr() as *mut u8,
            mem::size_of::<T>(),
        );
        Ok(value.assume_init())
    }
}

/// Copy `n_bits` bits from `src` starting at bit `src_offset` into `dest`
/// starting at bit `dest_offset`.
///
/// Bit offsets count from the least significant bit of the first byte.
/// Used to left-align bitfield storage when visualizing member data.
pub fn memcpy_bits(dest: &mut [u8], dest_offset: usize, src: &[u8], src_offset: usize, n_bits: usize)
{
    for i in 0..n_bits {
        let src_bit = src_offset + i;
        let dest_bit = dest_offset + i;
        let bit = (src[src_bit / 8] >> (src_bit % 8)) & 1;
        if bit != 0 {
            dest[dest_bit / 8] |= 1 << (dest_bit % 8);
        } else {
            dest[dest_bit / 8] &= !(1 << (dest_bit % 8));
        }
    }
}
