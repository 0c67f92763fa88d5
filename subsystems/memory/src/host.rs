//! # Host-Backed Guest Memory
//!
//! Backs a contiguous window of the guest address space with one host
//! buffer and hands out page-granular allocations from it.

use crate::bitmap::PageBitmap;
use crate::region::{Allocation, RegionTable};
use crate::{pages_for, MemError, MemResult, MemoryStats, PAGE_SIZE};
use orrery_hal::{GuestAddr, GuestMemory, HalResult};
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use core::ops::Range;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::{Mutex, RwLock};

/// Allocator bookkeeping, guarded together
struct AllocState {
    pages: PageBitmap,
    regions: RegionTable,
}

/// Host-backed guest memory
pub struct HostMemory {
    /// First guest address of the arena
    base: GuestAddr,
    /// Arena bytes
    bytes: RwLock<Vec<u8>>,
    /// Page map and live allocations
    state: Mutex<AllocState>,
    /// Statistics
    allocations: AtomicU64,
    deallocations: AtomicU64,
}

impl HostMemory {
    /// Create an arena of `size` bytes mapped at `base`
    ///
    /// `base` must be page aligned and non-null so that a null guest
    /// pointer never names a valid allocation.
    pub fn new(base: GuestAddr, size: u32) -> MemResult<Self> {
        if base.is_null() {
            return Err(MemError::InvalidAddress);
        }
        if !base.is_aligned(PAGE_SIZE) {
            return Err(MemError::NotAligned);
        }
        if size == 0 || size % PAGE_SIZE != 0 || base.as_u32().checked_add(size).is_none() {
            return Err(MemError::InvalidSize);
        }

        let total = (size / PAGE_SIZE) as usize;
        log::debug!(
            "Guest memory arena: {}..{:#010x} ({} pages)",
            base,
            base.as_u32() + size,
            total
        );

        Ok(Self {
            base,
            bytes: RwLock::new(vec![0; size as usize]),
            state: Mutex::new(AllocState {
                pages: PageBitmap::new(total),
                regions: RegionTable::new(),
            }),
            allocations: AtomicU64::new(0),
            deallocations: AtomicU64::new(0),
        })
    }

    /// First guest address of the arena
    pub fn base(&self) -> GuestAddr {
        self.base
    }

    /// Arena size in bytes
    pub fn size(&self) -> u32 {
        self.bytes.read().len() as u32
    }

    /// Allocate guest memory
    pub fn allocate(&self, size: u32, label: &str) -> MemResult<GuestAddr> {
        let count = pages_for(size);
        let mut state = self.state.lock();

        let first = state
            .pages
            .find_contiguous(count)
            .ok_or(MemError::OutOfMemory)?;
        state.pages.set_used(first, count);

        let start = self.page_address(first);
        state.regions.insert(Allocation {
            start,
            size,
            pages: count,
            label: label.to_string(),
        });
        drop(state);

        self.allocations.fetch_add(1, Ordering::Relaxed);
        log::trace!("alloc {} bytes at {} ({})", size, start, label);
        Ok(start)
    }

    /// Release an allocation by its start address
    pub fn deallocate(&self, start: GuestAddr) -> MemResult<()> {
        let mut state = self.state.lock();
        let allocation = state.regions.remove(start).ok_or(MemError::NotAllocated)?;
        let first = self.page_index(start);
        state.pages.set_free(first, allocation.pages);
        drop(state);

        self.deallocations.fetch_add(1, Ordering::Relaxed);
        log::trace!("free {} ({})", start, allocation.label);
        Ok(())
    }

    /// Label of the allocation containing `addr`
    pub fn label_of(&self, addr: GuestAddr) -> Option<String> {
        self.state.lock().regions.find(addr).map(|a| a.label.clone())
    }

    /// All live allocations
    pub fn allocations(&self) -> Vec<Allocation> {
        self.state.lock().regions.all()
    }

    /// Get statistics
    pub fn stats(&self) -> MemoryStats {
        let state = self.state.lock();
        MemoryStats {
            total_pages: state.pages.total(),
            free_pages: state.pages.free(),
            allocations: self.allocations.load(Ordering::Relaxed),
            deallocations: self.deallocations.load(Ordering::Relaxed),
        }
    }

    fn page_address(&self, index: usize) -> GuestAddr {
        self.base.add(index as u32 * PAGE_SIZE)
    }

    fn page_index(&self, addr: GuestAddr) -> usize {
        (addr.offset_from(self.base) / PAGE_SIZE) as usize
    }

    /// Translate a guest range into arena offsets
    fn translate(&self, addr: GuestAddr, len: usize, arena: usize) -> MemResult<Range<usize>> {
        if addr < self.base {
            return Err(MemError::InvalidAddress);
        }
        let start = addr.offset_from(self.base) as usize;
        let end = start.checked_add(len).ok_or(MemError::InvalidAddress)?;
        if end > arena {
            return Err(MemError::InvalidAddress);
        }
        Ok(start..end)
    }
}

impl GuestMemory for HostMemory {
    fn alloc(&self, size: u32, label: &str) -> HalResult<GuestAddr> {
        Ok(self.allocate(size, label)?)
    }

    fn free(&self, addr: GuestAddr) {
        if let Err(err) = self.deallocate(addr) {
            log::warn!("free of {} failed: {:?}", addr, err);
        }
    }

    fn read(&self, addr: GuestAddr, buf: &mut [u8]) -> HalResult<()> {
        let bytes = self.bytes.read();
        let range = self.translate(addr, buf.len(), bytes.len())?;
        buf.copy_from_slice(&bytes[range]);
        Ok(())
    }

    fn write(&self, addr: GuestAddr, data: &[u8]) -> HalResult<()> {
        let mut bytes = self.bytes.write();
        let arena = bytes.len();
        let range = self.translate(addr, data.len(), arena)?;
        bytes[range].copy_from_slice(data);
        Ok(())
    }

    fn fill(&self, addr: GuestAddr, len: u32, byte: u8) -> HalResult<()> {
        let mut bytes = self.bytes.write();
        let arena = bytes.len();
        let range = self.translate(addr, len as usize, arena)?;
        bytes[range].fill(byte);
        Ok(())
    }

    fn copy(&self, src: GuestAddr, dst: GuestAddr, len: u32) -> HalResult<()> {
        let mut bytes = self.bytes.write();
        let arena = bytes.len();
        let from = self.translate(src, len as usize, arena)?;
        let to = self.translate(dst, len as usize, arena)?;
        bytes.copy_within(from, to.start);
        Ok(())
    }
}

impl fmt::Debug for HostMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("HostMemory")
            .field("base", &self.base)
            .field("total_pages", &stats.total_pages)
            .field("free_pages", &stats.free_pages)
            .finish()
    }
}
