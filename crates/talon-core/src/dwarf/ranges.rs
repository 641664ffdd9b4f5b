//! DWARF range lists (`.debug_ranges`).

use crate::error::Result;
use crate::types::FileAddr;

use super::cursor::Cursor;

/// One contiguous address range described by a range list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange
{
    pub low: FileAddr,
    pub high: FileAddr,
}

impl AddressRange
{
    /// Whether `address` falls inside `[low, high)`.
    pub fn contains(&self, address: FileAddr) -> bool
    {
        self.low <= address && address < self.high
    }
}

/// A non-contiguous set of address ranges.
///
/// Entries are `(u64, u64)` pairs. A pair whose first value is `!0` is a
/// base-address selector: its second value replaces the current base.
/// `(0, 0)` terminates the list. Every other pair is emitted relative to
/// the current base.
pub struct RangeList<'d>
{
    data: &'d [u8],
    base_address: FileAddr,
}

impl<'d> RangeList<'d>
{
    pub(crate) fn new(data: &'d [u8], base_address: FileAddr) -> Self
    {
        RangeList { data, base_address }
    }

    /// Iterate over the ranges, honoring base-address selectors.
    pub fn iter(&self) -> RangeListIter<'d>
    {
        RangeListIter {
            cursor: Cursor::new(self.data),
            base_address: self.base_address,
            done: false,
        }
    }

    /// Whether any entry contains `address`.
    pub fn contains(&self, address: FileAddr) -> Result<bool>
    {
        for range in self.iter() {
            if range?.contains(address) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Iterator over the entries of a [`RangeList`].
pub struct RangeListIter<'d>
{
    cursor: Cursor<'d>,
    base_address: FileAddr,
    done: bool,
}

impl Iterator for RangeListIter<'_>
{
    type Item = Result<AddressRange>;

    fn next(&mut self) -> Option<Self::Item>
    {
        const BASE_ADDRESS_FLAG: u64 = !0u64;

        if self.done {
            return None;
        }
        loop {
            let low = match self.cursor.u64() {
                Ok(v) => v,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            let high = match self.cursor.u64() {
                Ok(v) => v,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };

            if low == BASE_ADDRESS_FLAG {
                self.base_address = FileAddr::new(high);
            } else if low == 0 && high == 0 {
                self.done = true;
                return None;
            } else {
                return Some(Ok(AddressRange {
                    low: FileAddr::new(low) + self.base_address.addr(),
                    high: FileAddr::new(high) + self.base_address.addr(),
                }));
            }
        }
    }
}
