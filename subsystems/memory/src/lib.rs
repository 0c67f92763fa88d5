//! # Orrery Memory Subsystem
//!
//! The memory subsystem provides:
//! - A page bitmap allocator over the emulated address space
//! - Labelled allocation tracking for diagnostics
//! - Bounds-checked guest byte access
//!
//! ## Key Principle
//!
//! The kernel only sees [`orrery_hal::GuestMemory`]. [`HostMemory`] is the
//! default implementation, backing the guest address space with one flat
//! host buffer.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod bitmap;
pub mod host;
pub mod region;

pub use host::HostMemory;

use orrery_hal::HalError;

/// Guest page size in bytes
pub const PAGE_SIZE: u32 = 4 * 1024;

static_assertions::const_assert!(PAGE_SIZE.is_power_of_two());

/// Memory subsystem result type
pub type MemResult<T> = Result<T, MemError>;

/// Memory subsystem errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemError {
    /// Out of memory
    OutOfMemory,
    /// Invalid address
    InvalidAddress,
    /// Invalid size
    InvalidSize,
    /// Address not aligned
    NotAligned,
    /// Address is not the start of a live allocation
    NotAllocated,
}

impl From<MemError> for HalError {
    fn from(err: MemError) -> Self {
        match err {
            MemError::OutOfMemory => HalError::OutOfMemory,
            MemError::InvalidAddress | MemError::NotAllocated => HalError::InvalidAddress,
            MemError::InvalidSize | MemError::NotAligned => HalError::InvalidParameter,
        }
    }
}

/// Memory statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Total pages in the arena
    pub total_pages: usize,
    /// Pages currently free
    pub free_pages: usize,
    /// Number of allocations
    pub allocations: u64,
    /// Number of deallocations
    pub deallocations: u64,
}

/// Number of pages needed to hold `size` bytes
pub const fn pages_for(size: u32) -> usize {
    let pages = size.div_ceil(PAGE_SIZE) as usize;
    if pages == 0 { 1 } else { pages }
}
