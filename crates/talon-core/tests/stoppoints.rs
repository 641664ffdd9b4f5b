//! Tests for the stop-point collection.

use talon_core::types::VirtAddr;
use talon_core::{Stoppoint, StoppointCollection};

/// Minimal stand-in stop-point for container behavior tests.
struct TestPoint
{
    id: i32,
    address: VirtAddr,
    enabled: bool,
}

impl Stoppoint for TestPoint
{
    type Id = i32;

    fn id(&self) -> i32
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
        self.enabled
    }
}

fn point(id: i32, address: u64, enabled: bool) -> TestPoint
{
    TestPoint {
        id,
        address: VirtAddr::new(address),
        enabled,
    }
}

#[test]
fn test_push_and_lookup()
{
    let mut collection = StoppointCollection::new();
    collection.push(point(1, 0x1000, true));
    collection.push(point(2, 0x2000, false));

    assert_eq!(collection.len(), 2);
    assert!(collection.contains_id(1));
    assert!(!collection.contains_id(3));
    assert!(collection.contains_address(VirtAddr::new(0x2000)));
    assert!(!collection.contains_address(VirtAddr::new(0x3000)));

    assert_eq!(collection.get_by_id(2).unwrap().address, VirtAddr::new(0x2000));
    assert!(collection.get_by_id(99).is_err());
    assert_eq!(collection.get_by_address(VirtAddr::new(0x1000)).unwrap().id, 1);
    assert!(collection.get_by_address(VirtAddr::new(0x9999)).is_err());
}

#[test]
fn test_enabled_at_address()
{
    let mut collection = StoppointCollection::new();
    collection.push(point(1, 0x1000, true));
    collection.push(point(2, 0x2000, false));

    assert!(collection.enabled_stoppoint_at_address(VirtAddr::new(0x1000)));
    assert!(!collection.enabled_stoppoint_at_address(VirtAddr::new(0x2000)));
    assert!(!collection.enabled_stoppoint_at_address(VirtAddr::new(0x3000)));
}

#[test]
fn test_removal()
{
    let mut collection = StoppointCollection::new();
    collection.push(point(1, 0x1000, false));
    collection.push(point(2, 0x2000, false));

    let removed = collection.remove_by_id(1).unwrap();
    assert_eq!(removed.address, VirtAddr::new(0x1000));
    assert!(!collection.contains_id(1));
    assert!(collection.remove_by_id(1).is_err());

    collection.remove_by_address(VirtAddr::new(0x2000)).unwrap();
    assert!(collection.is_empty());
}

#[test]
fn test_region_queries()
{
    let mut collection = StoppointCollection::new();
    collection.push(point(1, 0x1000, false));
    collection.push(point(2, 0x1008, false));
    collection.push(point(3, 0x2000, false));

    let region = collection.get_in_region(VirtAddr::new(0x1000), VirtAddr::new(0x1010));
    assert_eq!(region.len(), 2);

    // Half-open upper bound.
    let region = collection.get_in_region(VirtAddr::new(0x1000), VirtAddr::new(0x1008));
    assert_eq!(region.len(), 1);

    assert!(collection
        .get_in_region(VirtAddr::new(0x3000), VirtAddr::new(0x4000))
        .is_empty());
}

#[test]
fn test_insertion_order_is_preserved()
{
    let mut collection = StoppointCollection::new();
    for id in [5, 1, 9] {
        collection.push(point(id, 0x1000 + id as u64, false));
    }
    let ids: Vec<i32> = collection.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![5, 1, 9]);
}
