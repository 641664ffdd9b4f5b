//! Hardware watchpoints.

use std::fmt;

use nix::unistd::Pid;

use crate::error::{Result, TalonError};
use crate::registers::Registers;
use crate::types::VirtAddr;

use super::hardware::{clear_hardware_stoppoint, set_hardware_stoppoint};
use super::{Stoppoint, StoppointMode};

/// Identifier of one watchpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchpointId(i32);

impl WatchpointId
{
    pub const fn from_raw(raw: i32) -> Self
    {
        WatchpointId(raw)
    }

    pub const fn raw(self) -> i32
    {
        self.0
    }
}

impl fmt::Display for WatchpointId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// A hardware watchpoint over `size` bytes at `address`.
///
/// Tracks the watched memory's previous and current contents so a stop
/// can report the transition that triggered it.
pub struct Watchpoint
{
    id: WatchpointId,
    pid: Pid,
    address: VirtAddr,
    mode: StoppointMode,
    size: usize,
    is_enabled: bool,
    hardware_register_index: Option<usize>,
    data: u64,
    previous_data: u64,
}

impl Watchpoint
{
    /// Validates geometry: size must be 1, 2, 4, or 8, and the address
    /// aligned to it, per the debug register architecture.
    pub(crate) fn new(
        id: WatchpointId,
        pid: Pid,
        address: VirtAddr,
        mode: StoppointMode,
        size: usize,
    ) -> Result<Self>
    {
        if !matches!(size, 1 | 2 | 4 | 8) {
            return Err(TalonError::InvalidArgument(format!(
                "invalid watchpoint size {size}"
            )));
        }
        if address.addr() & (size as u64 - 1) != 0 {
            return Err(TalonError::InvalidArgument(format!(
                "watchpoint address {address} is not aligned to its size {size}"
            )));
        }
        Ok(Watchpoint {
            id,
            pid,
            address,
            mode,
            size,
            is_enabled: false,
            hardware_register_index: None,
            data: 0,
            previous_data: 0,
        })
    }

    pub fn address(&self) -> VirtAddr
    {
        self.address
    }

    pub fn mode(&self) -> StoppointMode
    {
        self.mode
    }

    pub fn size(&self) -> usize
    {
        self.size
    }

    /// Contents of the watched memory as of the latest stop.
    pub fn data(&self) -> u64
    {
        self.data
    }

    /// Contents of the watched memory before the latest stop.
    pub fn previous_data(&self) -> u64
    {
        self.previous_data
    }

    /// Program a debug register slot for this watchpoint. Idempotent.
    pub fn enable(&mut self, registers: &mut Registers) -> Result<()>
    {
        if self.is_enabled {
            return Ok(());
        }
        let slot =
            set_hardware_stoppoint(self.pid, registers, self.address, self.mode, self.size)?;
        self.hardware_register_index = Some(slot);
        self.is_enabled = true;
        Ok(())
    }

    /// Release the debug register slot. Idempotent.
    pub fn disable(&mut self, registers: &mut Registers) -> Result<()>
    {
        if !self.is_enabled {
            return Ok(());
        }
        if let Some(slot) = self.hardware_register_index.take() {
            clear_hardware_stoppoint(self.pid, registers, slot)?;
        }
        self.is_enabled = false;
        Ok(())
    }

    /// Record the watched memory's contents at a stop, shifting the old
    /// value into `previous_data`.
    pub(crate) fn update_data(&mut self, bytes: &[u8])
    {
        let mut word = [0u8; 8];
        let len = bytes.len().min(8);
        word[..len].copy_from_slice(&bytes[..len]);
        self.previous_data = self.data;
        self.data = u64::from_le_bytes(word);
    }
}

impl Stoppoint for Watchpoint
{
    type Id = WatchpointId;

    fn id(&self) -> WatchpointId
    {
        self.id
    }

    fn at_address(&self, address: VirtAddr) -> bool
    {
        self.address == address
    }

    fn in_range(&self, low: VirtAddr, high: VirtAddr) -> bool
    {
        low <= self.address && self.address < high
    }

    fn is_enabled(&self) -> bool
    {
        self.is_enabled
    }
}
