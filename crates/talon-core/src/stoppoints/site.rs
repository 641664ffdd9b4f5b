//! Physical breakpoint installation sites.

use std::fmt;

use nix::unistd::Pid;

use crate::error::{Result, TalonError};
use crate::registers::Registers;
use crate::types::VirtAddr;

use super::breakpoint::BreakpointId;
use super::hardware::{clear_hardware_stoppoint, set_hardware_stoppoint};
use super::{Stoppoint, StoppointMode};

/// The x86 `int3` opcode.
const INT3: u8 = 0xcc;

/// Identifier of one breakpoint site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SiteId(i32);

impl SiteId
{
    pub const fn from_raw(raw: i32) -> Self
    {
        SiteId(raw)
    }

    pub const fn raw(self) -> i32
    {
        self.0
    }
}

impl fmt::Display for SiteId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// One physical breakpoint installation location.
///
/// A software site saves the byte it replaces with `int3`; a hardware
/// site records the debug register slot it occupies. The installation
/// invariant: a site is enabled exactly when its trap is present in the
/// tracee.
pub struct BreakpointSite
{
    id: SiteId,
    pid: Pid,
    address: VirtAddr,
    is_enabled: bool,
    saved_data: u8,
    is_hardware: bool,
    is_internal: bool,
    hardware_register_index: Option<usize>,
    parent: Option<BreakpointId>,
}

impl BreakpointSite
{
    pub(crate) fn new(
        id: SiteId,
        pid: Pid,
        address: VirtAddr,
        is_hardware: bool,
        is_internal: bool,
        parent: Option<BreakpointId>,
    ) -> Self
    {
        BreakpointSite {
            id,
            pid,
            address,
            is_enabled: false,
            saved_data: 0,
            is_hardware,
            is_internal,
            hardware_register_index: None,
            parent,
        }
    }

    pub fn address(&self) -> VirtAddr
    {
        self.address
    }

    pub fn is_hardware(&self) -> bool
    {
        self.is_hardware
    }

    pub fn is_internal(&self) -> bool
    {
        self.is_internal
    }

    /// The breakpoint this site materializes, if any.
    pub fn parent(&self) -> Option<BreakpointId>
    {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: BreakpointId)
    {
        self.parent = Some(parent);
    }

    /// The byte the software trap replaced; only meaningful while
    /// enabled.
    pub fn saved_data(&self) -> u8
    {
        self.saved_data
    }

    /// Install the trap. Idempotent.
    pub fn enable(&mut self, registers: &mut Registers) -> Result<()>
    {
        if self.is_enabled {
            return Ok(());
        }

        if self.is_hardware {
            let slot = set_hardware_stoppoint(
                self.pid,
                registers,
                self.address,
                StoppointMode::Execute,
                1,
            )?;
            self.hardware_register_index = Some(slot);
        } else {
            let word = peek_data(self.pid, self.address)?;
            self.saved_data = (word & 0xff) as u8;
            let patched = (word & !0xff) | u64::from(INT3);
            poke_data(self.pid, self.address, patched)?;
        }
        self.is_enabled = true;
        Ok(())
    }

    /// Remove the trap and restore the original byte. Idempotent.
    pub fn disable(&mut self, registers: &mut Registers) -> Result<()>
    {
        if !self.is_enabled {
            return Ok(());
        }

        if self.is_hardware {
            if let Some(slot) = self.hardware_register_index.take() {
                clear_hardware_stoppoint(self.pid, registers, slot)?;
            }
        } else {
            let word = peek_data(self.pid, self.address)?;
            let restored = (word & !0xff) | u64::from(self.saved_data);
            poke_data(self.pid, self.address, restored)?;
        }
        self.is_enabled = false;
        Ok(())
    }
}

impl Stoppoint for BreakpointSite
{
    type Id = SiteId;

    fn id(&self) -> SiteId
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

pub(crate) fn peek_data(pid: Pid, address: VirtAddr) -> Result<u64>
{
    unsafe {
        *libc::__errno_location() = 0;
    }
    let data = unsafe {
        libc::ptrace(
            libc::PTRACE_PEEKDATA,
            pid.as_raw(),
            address.addr() as *mut libc::c_void,
            std::ptr::null_mut::<libc::c_void>(),
        )
    };
    let errno = unsafe { *libc::__errno_location() };
    if data == -1 && errno != 0 {
        return Err(TalonError::os(
            format!("could not read memory at {address}"),
            nix::errno::Errno::from_raw(errno),
        ));
    }
    Ok(data as u64)
}

pub(crate) fn poke_data(pid: Pid, address: VirtAddr, word: u64) -> Result<()>
{
    let ret = unsafe {
        libc::ptrace(
            libc::PTRACE_POKEDATA,
            pid.as_raw(),
            address.addr() as *mut libc::c_void,
            word as *mut libc::c_void,
        )
    };
    if ret < 0 {
        return Err(TalonError::os_last(format!("could not write memory at {address}")));
    }
    Ok(())
}
