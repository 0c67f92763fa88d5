//! # Thread-Local Storage
//!
//! Per-thread TLS block. The thread pointer register points at the end of
//! the block and guest code addresses TLS slots downwards from it.

use super::GuestBlock;
use orrery_hal::{GuestAddr, GuestMemory, HalResult};
use std::sync::Arc;

/// TLS block size in bytes
pub const TLS_SIZE: u32 = 0x800;

static_assertions::const_assert!(TLS_SIZE % 16 == 0);

/// Thread-local storage block
#[derive(Debug)]
pub struct TlsBlock {
    block: GuestBlock,
}

impl TlsBlock {
    /// Allocate a TLS block
    pub fn allocate(memory: Arc<dyn GuestMemory>, label: &str) -> HalResult<Self> {
        let block = GuestBlock::allocate(memory, TLS_SIZE, label)?;
        Ok(Self { block })
    }

    /// Value for the thread pointer register
    pub fn thread_pointer(&self) -> GuestAddr {
        self.block.end()
    }

    /// Lowest address of the block
    pub fn base(&self) -> GuestAddr {
        self.block.base()
    }
}
