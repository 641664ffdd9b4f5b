//! Logical breakpoints.
//!
//! A breakpoint names *where* to stop — an address, a function, or a
//! source line — and owns the sites that materialize it. Resolution (the
//! step that turns the kind into concrete addresses) needs the loaded
//! objects and the process, so it lives on the target; this type keeps
//! the bookkeeping.

use std::fmt;
use std::path::PathBuf;

use crate::types::VirtAddr;

use super::site::SiteId;
use super::Stoppoint;

/// Identifier of one logical breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BreakpointId(i32);

impl BreakpointId
{
    pub const fn from_raw(raw: i32) -> Self
    {
        BreakpointId(raw)
    }

    pub const fn raw(self) -> i32
    {
        self.0
    }
}

impl fmt::Display for BreakpointId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// The three resolution strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointKind
{
    /// One site at a fixed virtual address.
    Address(VirtAddr),
    /// Sites at the entry of every function (and inlined copy) with this
    /// name; DWARF first, ELF symbols as fallback.
    Function(String),
    /// Sites at every line-table row matching the file (absolute or
    /// suffix) and line.
    Line
    {
        file: PathBuf,
        line: u64,
    },
}

/// A logical breakpoint and its materialized sites.
pub struct Breakpoint
{
    id: BreakpointId,
    kind: BreakpointKind,
    is_enabled: bool,
    is_hardware: bool,
    is_internal: bool,
    sites: Vec<(SiteId, VirtAddr)>,
}

impl Breakpoint
{
    pub(crate) fn new(
        id: BreakpointId,
        kind: BreakpointKind,
        is_hardware: bool,
        is_internal: bool,
    ) -> Self
    {
        Breakpoint {
            id,
            kind,
            is_enabled: false,
            is_hardware,
            is_internal,
            sites: Vec::new(),
        }
    }

    pub fn kind(&self) -> &BreakpointKind
    {
        &self.kind
    }

    pub fn is_hardware(&self) -> bool
    {
        self.is_hardware
    }

    pub fn is_internal(&self) -> bool
    {
        self.is_internal
    }

    /// Ids of the sites this breakpoint owns.
    pub fn site_ids(&self) -> Vec<SiteId>
    {
        self.sites.iter().map(|(id, _)| *id).collect()
    }

    /// Addresses this breakpoint has materialized at.
    pub fn addresses(&self) -> Vec<VirtAddr>
    {
        self.sites.iter().map(|(_, addr)| *addr).collect()
    }

    /// The owned sites with their addresses.
    pub(crate) fn sites(&self) -> &[(SiteId, VirtAddr)]
    {
        &self.sites
    }

    pub(crate) fn record_site(&mut self, id: SiteId, address: VirtAddr)
    {
        self.sites.push((id, address));
    }

    pub(crate) fn forget_site(&mut self, id: SiteId)
    {
        self.sites.retain(|(site, _)| *site != id);
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool)
    {
        self.is_enabled = enabled;
    }
}

impl Stoppoint for Breakpoint
{
    type Id = BreakpointId;

    fn id(&self) -> BreakpointId
    {
        self.id
    }

    fn at_address(&self, address: VirtAddr) -> bool
    {
        self.sites.iter().any(|(_, addr)| *addr == address)
    }

    fn in_range(&self, low: VirtAddr, high: VirtAddr) -> bool
    {
        self.sites
            .iter()
            .any(|(_, addr)| low <= *addr && *addr < high)
    }

    fn is_enabled(&self) -> bool
    {
        self.is_enabled
    }
}
