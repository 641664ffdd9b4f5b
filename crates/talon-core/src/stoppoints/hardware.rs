//! Hardware debug register slot allocation.
//!
//! x86-64 exposes four address slots (`dr0..dr3`), a status register
//! (`dr6`), and a control register (`dr7`). DR7 holds a local-enable bit
//! per slot in its low byte and a 4-bit mode/length field per slot
//! starting at bit 16.

use nix::unistd::Pid;

use crate::error::{Result, TalonError};
use crate::registers::info::DEBUG_ADDRESS_REGISTER_IDS;
use crate::registers::{
    register_info_by_id, write_register, RegisterId, RegisterValue, Registers,
};
use crate::types::VirtAddr;

use super::StoppointMode;

/// DR7 mode bits: 00 = execute, 01 = write, 11 = read/write.
pub(crate) fn encode_hardware_stoppoint_mode(mode: StoppointMode) -> u64
{
    match mode {
        StoppointMode::Execute => 0b00,
        StoppointMode::Write => 0b01,
        StoppointMode::ReadWrite => 0b11,
    }
}

/// DR7 length bits: 00 = 1 byte, 01 = 2, 11 = 4, 10 = 8.
pub(crate) fn encode_hardware_stoppoint_size(size: usize) -> Result<u64>
{
    match size {
        1 => Ok(0b00),
        2 => Ok(0b01),
        4 => Ok(0b11),
        8 => Ok(0b10),
        _ => Err(TalonError::InvalidArgument(format!(
            "invalid hardware stoppoint size {size}"
        ))),
    }
}

/// Program a free debug register slot with `address` and return its
/// index.
pub(crate) fn set_hardware_stoppoint(
    pid: Pid,
    registers: &mut Registers,
    address: VirtAddr,
    mode: StoppointMode,
    size: usize,
) -> Result<usize>
{
    let control = registers.read_by_id_as_u64(RegisterId::Dr7)?;

    let free_slot = (0..DEBUG_ADDRESS_REGISTER_IDS.len())
        .find(|&slot| control & (0b11 << (slot * 2)) == 0)
        .ok_or_else(|| {
            TalonError::ResourceExhausted("no remaining hardware debug registers".into())
        })?;

    let address_register = register_info_by_id(DEBUG_ADDRESS_REGISTER_IDS[free_slot]);
    write_register(
        pid,
        registers,
        address_register,
        RegisterValue::U64(address.addr()),
    )?;

    let mode_flag = encode_hardware_stoppoint_mode(mode);
    let size_flag = encode_hardware_stoppoint_size(size)?;

    let enable_bit = 1u64 << (free_slot * 2);
    let control_bits = (mode_flag << (free_slot * 4 + 16)) | (size_flag << (free_slot * 4 + 18));

    let clear_mask = (0b11u64 << (free_slot * 2)) | (0b1111u64 << (free_slot * 4 + 16));
    let mut masked = control & !clear_mask;
    masked |= enable_bit | control_bits;

    write_register(
        pid,
        registers,
        register_info_by_id(RegisterId::Dr7),
        RegisterValue::U64(masked),
    )?;
    Ok(free_slot)
}

/// Release a debug register slot, clearing its enable and mode bits.
pub(crate) fn clear_hardware_stoppoint(
    pid: Pid,
    registers: &mut Registers,
    slot: usize,
) -> Result<()>
{
    let address_register = register_info_by_id(DEBUG_ADDRESS_REGISTER_IDS[slot]);
    write_register(pid, registers, address_register, RegisterValue::U64(0))?;

    let control = registers.read_by_id_as_u64(RegisterId::Dr7)?;
    let clear_mask = (0b11u64 << (slot * 2)) | (0b1111u64 << (slot * 4 + 16));
    write_register(
        pid,
        registers,
        register_info_by_id(RegisterId::Dr7),
        RegisterValue::U64(control & !clear_mask),
    )
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_mode_encoding()
    {
        assert_eq!(encode_hardware_stoppoint_mode(StoppointMode::Execute), 0b00);
        assert_eq!(encode_hardware_stoppoint_mode(StoppointMode::Write), 0b01);
        assert_eq!(encode_hardware_stoppoint_mode(StoppointMode::ReadWrite), 0b11);
    }

    #[test]
    fn test_size_encoding()
    {
        assert_eq!(encode_hardware_stoppoint_size(1).unwrap(), 0b00);
        assert_eq!(encode_hardware_stoppoint_size(2).unwrap(), 0b01);
        assert_eq!(encode_hardware_stoppoint_size(4).unwrap(), 0b11);
        assert_eq!(encode_hardware_stoppoint_size(8).unwrap(), 0b10);
        assert!(encode_hardware_stoppoint_size(3).is_err());
        assert!(encode_hardware_stoppoint_size(16).is_err());
    }
}
