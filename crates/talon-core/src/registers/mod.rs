//! # Registers
//!
//! Typed access to the tracee's register state.
//!
//! A [`Registers`] value caches the whole kernel `user` area (GPRs, the
//! i387/SSE block, and the eight debug registers) as of the most recent
//! stop. Reads are served from the cache; writes go through
//! [`write_register`], which updates the cache and immediately flushes
//! the affected word to the tracee (`POKEUSER` for GPRs and debug
//! registers, `SETFPREGS` for the floating-point block), so nothing is
//! stale by the time the process resumes.

pub mod info;

use std::mem;

use nix::unistd::Pid;

pub use info::{
    register_info_by_dwarf_id, register_info_by_id, register_info_by_name, RegisterFormat,
    RegisterId, RegisterInfo, RegisterType, REGISTER_INFOS,
};

use crate::error::{Result, TalonError};
use crate::types::from_bytes;

/// A typed register value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegisterValue
{
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Bytes8([u8; 8]),
    Bytes16([u8; 16]),
}

impl RegisterValue
{
    /// Size of the value in bytes.
    pub fn size(&self) -> usize
    {
        match self {
            RegisterValue::U8(_) | RegisterValue::I8(_) => 1,
            RegisterValue::U16(_) | RegisterValue::I16(_) => 2,
            RegisterValue::U32(_) | RegisterValue::I32(_) | RegisterValue::F32(_) => 4,
            RegisterValue::U64(_) | RegisterValue::I64(_) | RegisterValue::F64(_) => 8,
            RegisterValue::Bytes8(_) => 8,
            RegisterValue::Bytes16(_) => 16,
        }
    }

    /// The value as an unsigned 64-bit integer, when it is an integer.
    pub fn as_u64(&self) -> Option<u64>
    {
        match *self {
            RegisterValue::U8(v) => Some(u64::from(v)),
            RegisterValue::U16(v) => Some(u64::from(v)),
            RegisterValue::U32(v) => Some(u64::from(v)),
            RegisterValue::U64(v) => Some(v),
            RegisterValue::I8(v) => Some(v as u64),
            RegisterValue::I16(v) => Some(v as u64),
            RegisterValue::I32(v) => Some(v as u64),
            RegisterValue::I64(v) => Some(v as u64),
            _ => None,
        }
    }

    /// Encode the value for storage in `info`'s slot, checking the format
    /// and widening integers to the register's size.
    ///
    /// A value wider than the register, or of the wrong format family, is
    /// an [`TalonError::InvalidArgument`].
    fn widen_to(&self, info: &RegisterInfo) -> Result<Vec<u8>>
    {
        let mismatch = || {
            TalonError::InvalidArgument(format!(
                "value of size {} cannot be written to register {} of size {}",
                self.size(),
                info.name,
                info.size
            ))
        };

        match info.format {
            RegisterFormat::Uint => {
                if self.size() > info.size {
                    return Err(mismatch());
                }
                let wide = match *self {
                    RegisterValue::I8(v) => i64::from(v) as u64,
                    RegisterValue::I16(v) => i64::from(v) as u64,
                    RegisterValue::I32(v) => i64::from(v) as u64,
                    RegisterValue::I64(v) => v as u64,
                    other => other.as_u64().ok_or_else(mismatch)?,
                };
                Ok(wide.to_le_bytes()[..info.size].to_vec())
            }
            RegisterFormat::DoubleFloat => match *self {
                RegisterValue::F64(v) => Ok(v.to_le_bytes().to_vec()),
                RegisterValue::F32(v) => Ok(f64::from(v).to_le_bytes().to_vec()),
                _ => Err(mismatch()),
            },
            RegisterFormat::LongDouble => match *self {
                RegisterValue::Bytes16(v) => Ok(v.to_vec()),
                _ => Err(mismatch()),
            },
            RegisterFormat::Vector => match *self {
                RegisterValue::Bytes8(v) if info.size == 8 => Ok(v.to_vec()),
                RegisterValue::Bytes16(v) if info.size == 16 => Ok(v.to_vec()),
                _ => Err(mismatch()),
            },
        }
    }
}

/// Cache of the tracee's whole `user` area as of the last stop.
pub struct Registers
{
    data: libc::user,
}

impl Registers
{
    /// An all-zero cache, used before the first stop populates it.
    pub fn zeroed() -> Self
    {
        Registers {
            data: unsafe { mem::zeroed() },
        }
    }

    pub(crate) fn user(&self) -> &libc::user
    {
        &self.data
    }

    pub(crate) fn user_mut(&mut self) -> &mut libc::user
    {
        &mut self.data
    }

    fn bytes(&self) -> &[u8]
    {
        unsafe {
            std::slice::from_raw_parts(
                &self.data as *const libc::user as *const u8,
                mem::size_of::<libc::user>(),
            )
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8]
    {
        unsafe {
            std::slice::from_raw_parts_mut(
                &mut self.data as *mut libc::user as *mut u8,
                mem::size_of::<libc::user>(),
            )
        }
    }

    /// Read the register described by `info` from the cache.
    pub fn read(&self, info: &RegisterInfo) -> Result<RegisterValue>
    {
        let bytes = &self.bytes()[info.offset..info.offset + info.size];
        match info.format {
            RegisterFormat::Uint => match info.size {
                1 => Ok(RegisterValue::U8(from_bytes(bytes)?)),
                2 => Ok(RegisterValue::U16(from_bytes(bytes)?)),
                4 => Ok(RegisterValue::U32(from_bytes(bytes)?)),
                8 => Ok(RegisterValue::U64(from_bytes(bytes)?)),
                size => Err(TalonError::InvalidArgument(format!(
                    "unexpected integer register size {size}"
                ))),
            },
            RegisterFormat::DoubleFloat => Ok(RegisterValue::F64(from_bytes(bytes)?)),
            RegisterFormat::LongDouble => Ok(RegisterValue::Bytes16(from_bytes(bytes)?)),
            RegisterFormat::Vector => match info.size {
                8 => Ok(RegisterValue::Bytes8(from_bytes(bytes)?)),
                16 => Ok(RegisterValue::Bytes16(from_bytes(bytes)?)),
                size => Err(TalonError::InvalidArgument(format!(
                    "unexpected vector register size {size}"
                ))),
            },
        }
    }

    /// Read a register by id.
    pub fn read_by_id(&self, id: RegisterId) -> Result<RegisterValue>
    {
        self.read(register_info_by_id(id))
    }

    /// Read an integer register by id, widened to `u64`.
    pub fn read_by_id_as_u64(&self, id: RegisterId) -> Result<u64>
    {
        self.read_by_id(id)?.as_u64().ok_or_else(|| {
            TalonError::InvalidArgument(format!(
                "register {} does not hold an integer",
                register_info_by_id(id).name
            ))
        })
    }

    /// Read a register by its DWARF register number.
    pub fn read_by_dwarf_id(&self, dwarf_id: i32) -> Result<RegisterValue>
    {
        self.read(register_info_by_dwarf_id(dwarf_id)?)
    }

    /// Update the cached bytes for `info` without touching the tracee.
    pub(crate) fn set_cached(&mut self, info: &RegisterInfo, value: RegisterValue) -> Result<()>
    {
        let bytes = value.widen_to(info)?;
        self.bytes_mut()[info.offset..info.offset + bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }

    /// The 8-byte-aligned word of the user area containing `info`,
    /// as currently cached.
    pub(crate) fn cached_word(&self, info: &RegisterInfo) -> u64
    {
        let aligned = info.offset & !7;
        u64::from_le_bytes(self.bytes()[aligned..aligned + 8].try_into().unwrap())
    }
}

/// Write one 8-byte word of the tracee's user area via `POKEUSER`.
pub(crate) fn write_user_area(pid: Pid, offset: usize, word: u64) -> Result<()>
{
    let ret = unsafe {
        libc::ptrace(
            libc::PTRACE_POKEUSER,
            pid.as_raw(),
            offset as *mut libc::c_void,
            word as *mut libc::c_void,
        )
    };
    if ret < 0 {
        return Err(TalonError::os_last("could not write to user area"));
    }
    Ok(())
}

/// Read one 8-byte word of the tracee's user area via `PEEKUSER`.
///
/// `PEEKUSER` returns the data in the call's return value, so errno must
/// be cleared first to tell a legitimate `-1` word from a failure.
pub(crate) fn read_user_area(pid: Pid, offset: usize) -> Result<u64>
{
    unsafe {
        *libc::__errno_location() = 0;
    }
    let data = unsafe {
        libc::ptrace(
            libc::PTRACE_PEEKUSER,
            pid.as_raw(),
            offset as *mut libc::c_void,
            std::ptr::null_mut::<libc::c_void>(),
        )
    };
    let errno = unsafe { *libc::__errno_location() };
    if data == -1 && errno != 0 {
        return Err(TalonError::os(
            "could not read from user area",
            nix::errno::Errno::from_raw(errno),
        ));
    }
    Ok(data as u64)
}

/// Flush the whole floating-point block to the tracee via `SETFPREGS`.
pub(crate) fn write_fprs(pid: Pid, fprs: &libc::user_fpregs_struct) -> Result<()>
{
    let ret = unsafe {
        libc::ptrace(
            libc::PTRACE_SETFPREGS,
            pid.as_raw(),
            std::ptr::null_mut::<libc::c_void>(),
            fprs as *const libc::user_fpregs_struct as *mut libc::c_void,
        )
    };
    if ret < 0 {
        return Err(TalonError::os_last("could not write floating point registers"));
    }
    Ok(())
}

/// Write a register: update the cache, then flush to the tracee.
///
/// Sub-register writes naturally read-modify-write the containing 64-bit
/// word, since the cache holds the full word and only the sub-register's
/// bytes are overwritten before the flush.
pub(crate) fn write_register(
    pid: Pid,
    registers: &mut Registers,
    info: &RegisterInfo,
    value: RegisterValue,
) -> Result<()>
{
    registers.set_cached(info, value)?;
    match info.reg_type {
        RegisterType::Gpr | RegisterType::SubGpr | RegisterType::Dr => {
            let aligned = info.offset & !7;
            write_user_area(pid, aligned, registers.cached_word(info))
        }
        RegisterType::Fpr => write_fprs(pid, &registers.user().i387),
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_cache_round_trip_by_format()
    {
        let mut registers = Registers::zeroed();

        let cases = [
            (RegisterId::Rax, RegisterValue::U64(0xdead_beef_cafe_f00d)),
            (RegisterId::Fcw, RegisterValue::U16(0x037f)),
            (RegisterId::Mxcsr, RegisterValue::U32(0x1f80)),
            (RegisterId::Mm3, RegisterValue::Bytes8([1, 2, 3, 4, 5, 6, 7, 8])),
            (RegisterId::Xmm11, RegisterValue::Bytes16([0xaa; 16])),
            (RegisterId::Dr7, RegisterValue::U64(0x0000_0000_0005_0101)),
        ];
        for (id, value) in cases {
            let info = register_info_by_id(id);
            registers.set_cached(info, value).unwrap();
            assert_eq!(registers.read(info).unwrap(), value, "register {}", info.name);
        }
    }

    #[test]
    fn test_sub_register_views_share_storage()
    {
        let mut registers = Registers::zeroed();
        let rax = register_info_by_id(RegisterId::Rax);
        registers
            .set_cached(rax, RegisterValue::U64(0x1122_3344_5566_7788))
            .unwrap();

        assert_eq!(
            registers.read_by_id(RegisterId::Eax).unwrap(),
            RegisterValue::U32(0x5566_7788)
        );
        assert_eq!(registers.read_by_id(RegisterId::Ax).unwrap(), RegisterValue::U16(0x7788));
        assert_eq!(registers.read_by_id(RegisterId::Al).unwrap(), RegisterValue::U8(0x88));
        assert_eq!(registers.read_by_id(RegisterId::Ah).unwrap(), RegisterValue::U8(0x77));

        // Writing a sub-register only touches its bytes.
        let al = register_info_by_id(RegisterId::Al);
        registers.set_cached(al, RegisterValue::U8(0xff)).unwrap();
        assert_eq!(
            registers.read_by_id_as_u64(RegisterId::Rax).unwrap(),
            0x1122_3344_5566_77ff
        );
    }

    #[test]
    fn test_integer_widening_and_sign_extension()
    {
        let mut registers = Registers::zeroed();
        let rbx = register_info_by_id(RegisterId::Rbx);

        registers.set_cached(rbx, RegisterValue::U8(0x7f)).unwrap();
        assert_eq!(registers.read_by_id_as_u64(RegisterId::Rbx).unwrap(), 0x7f);

        registers.set_cached(rbx, RegisterValue::I8(-1)).unwrap();
        assert_eq!(
            registers.read_by_id_as_u64(RegisterId::Rbx).unwrap(),
            u64::MAX
        );
    }

    #[test]
    fn test_format_mismatches_are_rejected()
    {
        let mut registers = Registers::zeroed();

        // A 16-byte value cannot land in an 8-byte integer register.
        let rax = register_info_by_id(RegisterId::Rax);
        assert!(registers.set_cached(rax, RegisterValue::Bytes16([0; 16])).is_err());

        // A u64 does not fit a two-byte register.
        let fcw = register_info_by_id(RegisterId::Fcw);
        assert!(registers.set_cached(fcw, RegisterValue::U64(1)).is_err());

        // Vector registers only accept matching byte widths.
        let xmm = register_info_by_id(RegisterId::Xmm0);
        assert!(registers.set_cached(xmm, RegisterValue::Bytes8([0; 8])).is_err());
        assert!(registers.set_cached(xmm, RegisterValue::U64(5)).is_err());
    }

    #[test]
    fn test_dwarf_id_reads()
    {
        let mut registers = Registers::zeroed();
        let rdx = register_info_by_id(RegisterId::Rdx);
        registers.set_cached(rdx, RegisterValue::U64(0x42)).unwrap();

        // DWARF register 1 is rdx in the System V numbering.
        assert_eq!(registers.read_by_dwarf_id(1).unwrap(), RegisterValue::U64(0x42));
        assert!(registers.read_by_dwarf_id(999).is_err());
    }
}
