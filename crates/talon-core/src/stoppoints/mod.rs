//! # Stop-points
//!
//! Breakpoint sites, watchpoints, and logical breakpoints, plus the
//! insertion-ordered collection that indexes them by id and address.
//!
//! A *site* is one physical installation location (an `0xCC` byte or a
//! debug-register slot). A *breakpoint* is the user-facing object — an
//! address, function name, or source line — that owns one site per
//! materialized address and survives library loads and unloads.

pub mod breakpoint;
pub mod hardware;
pub mod site;
pub mod watchpoint;

use std::fmt;

pub use breakpoint::{Breakpoint, BreakpointId, BreakpointKind};
pub use site::{BreakpointSite, SiteId};
pub use watchpoint::{Watchpoint, WatchpointId};

use crate::error::{Result, TalonError};
use crate::types::VirtAddr;

/// What accesses trigger a hardware stop-point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoppointMode
{
    Write,
    ReadWrite,
    Execute,
}

/// Common surface of everything a [`StoppointCollection`] can hold.
pub trait Stoppoint
{
    type Id: Copy + PartialEq + fmt::Display;

    fn id(&self) -> Self::Id;
    fn at_address(&self, address: VirtAddr) -> bool;
    fn in_range(&self, low: VirtAddr, high: VirtAddr) -> bool;
    fn is_enabled(&self) -> bool;
}

/// Insertion-ordered collection of stop-points, queryable by id, by
/// address, and by address range.
pub struct StoppointCollection<T: Stoppoint>
{
    stoppoints: Vec<T>,
}

impl<T: Stoppoint> Default for StoppointCollection<T>
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl<T: Stoppoint> StoppointCollection<T>
{
    pub fn new() -> Self
    {
        StoppointCollection { stoppoints: Vec::new() }
    }

    /// Append a stop-point and return a handle to it.
    pub fn push(&mut self, point: T) -> &mut T
    {
        self.stoppoints.push(point);
        self.stoppoints.last_mut().unwrap()
    }

    pub fn contains_id(&self, id: T::Id) -> bool
    {
        self.stoppoints.iter().any(|p| p.id() == id)
    }

    pub fn contains_address(&self, address: VirtAddr) -> bool
    {
        self.stoppoints.iter().any(|p| p.at_address(address))
    }

    /// Whether an enabled stop-point covers `address`.
    pub fn enabled_stoppoint_at_address(&self, address: VirtAddr) -> bool
    {
        self.stoppoints
            .iter()
            .any(|p| p.at_address(address) && p.is_enabled())
    }

    pub fn get_by_id(&self, id: T::Id) -> Result<&T>
    {
        self.stoppoints
            .iter()
            .find(|p| p.id() == id)
            .ok_or_else(|| TalonError::lookup(format!("invalid stoppoint id {id}")))
    }

    pub fn get_by_id_mut(&mut self, id: T::Id) -> Result<&mut T>
    {
        self.stoppoints
            .iter_mut()
            .find(|p| p.id() == id)
            .ok_or_else(|| TalonError::lookup(format!("invalid stoppoint id {id}")))
    }

    pub fn get_by_address(&self, address: VirtAddr) -> Result<&T>
    {
        self.stoppoints
            .iter()
            .find(|p| p.at_address(address))
            .ok_or_else(|| TalonError::lookup(format!("no stoppoint at {address}")))
    }

    pub fn get_by_address_mut(&mut self, address: VirtAddr) -> Result<&mut T>
    {
        self.stoppoints
            .iter_mut()
            .find(|p| p.at_address(address))
            .ok_or_else(|| TalonError::lookup(format!("no stoppoint at {address}")))
    }

    /// Remove the stop-point with `id`, returning it to the caller (who
    /// is responsible for having disabled it first).
    pub fn remove_by_id(&mut self, id: T::Id) -> Result<T>
    {
        let index = self
            .stoppoints
            .iter()
            .position(|p| p.id() == id)
            .ok_or_else(|| TalonError::lookup(format!("invalid stoppoint id {id}")))?;
        Ok(self.stoppoints.remove(index))
    }

    /// Remove the stop-point covering `address`.
    pub fn remove_by_address(&mut self, address: VirtAddr) -> Result<T>
    {
        let index = self
            .stoppoints
            .iter()
            .position(|p| p.at_address(address))
            .ok_or_else(|| TalonError::lookup(format!("no stoppoint at {address}")))?;
        Ok(self.stoppoints.remove(index))
    }

    /// All stop-points overlapping `[low, high)`.
    pub fn get_in_region(&self, low: VirtAddr, high: VirtAddr) -> Vec<&T>
    {
        self.stoppoints
            .iter()
            .filter(|p| p.in_range(low, high))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T>
    {
        self.stoppoints.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T>
    {
        self.stoppoints.iter_mut()
    }

    pub fn len(&self) -> usize
    {
        self.stoppoints.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.stoppoints.is_empty()
    }
}
