//! # Guest Memory Abstraction
//!
//! This module defines the guest memory allocator interface. Guest memory
//! is only reached through these accessors; no host pointer into the
//! emulated address space ever escapes the allocator.

use crate::{GuestAddr, HalResult};
use alloc::vec;
use alloc::vec::Vec;

/// Guest memory allocator and accessor
pub trait GuestMemory: Send + Sync {
    /// Allocate `size` bytes tagged with a diagnostic label
    fn alloc(&self, size: u32, label: &str) -> HalResult<GuestAddr>;

    /// Release an allocation made by [`alloc`](Self::alloc)
    fn free(&self, addr: GuestAddr);

    /// Copy guest bytes starting at `addr` into `buf`
    fn read(&self, addr: GuestAddr, buf: &mut [u8]) -> HalResult<()>;

    /// Copy `data` into guest memory starting at `addr`
    fn write(&self, addr: GuestAddr, data: &[u8]) -> HalResult<()>;

    /// Fill `len` guest bytes at `addr` with `byte`
    fn fill(&self, addr: GuestAddr, len: u32, byte: u8) -> HalResult<()> {
        self.write(addr, &vec![byte; len as usize])
    }

    /// Copy `len` bytes from `src` to `dst` (ranges may overlap)
    fn copy(&self, src: GuestAddr, dst: GuestAddr, len: u32) -> HalResult<()> {
        let mut buf = vec![0u8; len as usize];
        self.read(src, &mut buf)?;
        self.write(dst, &buf)
    }

    /// Read a little-endian 32-bit word
    fn read_u32(&self, addr: GuestAddr) -> HalResult<u32> {
        let mut word = [0u8; 4];
        self.read(addr, &mut word)?;
        Ok(u32::from_le_bytes(word))
    }

    /// Write a little-endian 32-bit word
    fn write_u32(&self, addr: GuestAddr, value: u32) -> HalResult<()> {
        self.write(addr, &value.to_le_bytes())
    }

    /// Read `len` bytes into a fresh buffer
    fn read_vec(&self, addr: GuestAddr, len: u32) -> HalResult<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        self.read(addr, &mut buf)?;
        Ok(buf)
    }
}

static_assertions::assert_obj_safe!(GuestMemory);
