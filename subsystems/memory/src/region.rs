//! # Allocation Regions
//!
//! Tracks live allocations and their diagnostic labels.

use orrery_hal::GuestAddr;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

/// Live allocation descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Start address
    pub start: GuestAddr,
    /// Requested size in bytes
    pub size: u32,
    /// Number of pages reserved
    pub pages: usize,
    /// Diagnostic label
    pub label: String,
}

impl Allocation {
    /// Check if address is within the requested range
    pub fn contains(&self, addr: GuestAddr) -> bool {
        addr >= self.start && addr.as_u32() - self.start.as_u32() < self.size
    }
}

/// Allocation table keyed by start address
#[derive(Debug, Default)]
pub struct RegionTable {
    regions: BTreeMap<GuestAddr, Allocation>,
}

impl RegionTable {
    /// Create an empty table
    pub const fn new() -> Self {
        Self {
            regions: BTreeMap::new(),
        }
    }

    /// Record an allocation
    pub fn insert(&mut self, allocation: Allocation) {
        self.regions.insert(allocation.start, allocation);
    }

    /// Remove the allocation starting at `start`
    pub fn remove(&mut self, start: GuestAddr) -> Option<Allocation> {
        self.regions.remove(&start)
    }

    /// Find the allocation containing `addr`
    pub fn find(&self, addr: GuestAddr) -> Option<&Allocation> {
        self.regions
            .range(..=addr)
            .next_back()
            .map(|(_, a)| a)
            .filter(|a| a.contains(addr))
    }

    /// All live allocations, lowest address first
    pub fn all(&self) -> Vec<Allocation> {
        self.regions.values().cloned().collect()
    }

    /// Number of live allocations
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether no allocation is live
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
