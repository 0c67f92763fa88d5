//! # Orrery HAL - Backend Abstraction Layer
//!
//! This crate defines the interfaces the guest kernel consumes from the
//! emulator's backends. Backends implement these traits; the kernel never
//! touches an instruction interpreter or host memory mapping directly.
//!
//! ## Design Philosophy
//!
//! The HAL is designed to be:
//! - **Complete**: Exposes everything a guest thread needs from its CPU
//! - **Minimal**: Only register, context and run-control primitives
//! - **Safe**: Guest memory is reached through bounds-checked accessors
//! - **Pluggable**: Interpreters and recompilers sit behind the same traits

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod cpu;
pub mod mmu;

pub use cpu::{CpuBackend, CpuContext, CpuFactory, CpuInit, SvcHook};
pub use mmu::GuestMemory;

use core::fmt;

/// Result type for HAL operations
pub type HalResult<T> = Result<T, HalError>;

/// Errors that can occur in HAL operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// The operation is not supported by this backend
    NotSupported,
    /// Invalid parameter provided
    InvalidParameter,
    /// Backend reported an internal error
    HardwareError,
    /// Address is outside the guest address space
    InvalidAddress,
    /// Guest memory allocation failed
    OutOfMemory,
    /// Backend not initialized
    NotInitialized,
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            HalError::NotSupported => "operation not supported by backend",
            HalError::InvalidParameter => "invalid parameter",
            HalError::HardwareError => "backend internal error",
            HalError::InvalidAddress => "invalid guest address",
            HalError::OutOfMemory => "out of guest memory",
            HalError::NotInitialized => "backend not initialized",
        };
        f.write_str(msg)
    }
}

/// Guest address (32-bit emulated address space)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct GuestAddr(u32);

impl GuestAddr {
    /// The null guest address
    pub const NULL: Self = Self(0);

    /// Create a new guest address
    #[inline]
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    /// Get the raw address value
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Check for the null address
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Check if the address is aligned to the given alignment
    #[inline]
    pub const fn is_aligned(self, align: u32) -> bool {
        self.0 % align == 0
    }

    /// Align the address up to the given alignment
    #[inline]
    pub const fn align_up(self, align: u32) -> Self {
        Self((self.0 + align - 1) & !(align - 1))
    }

    /// Align the address down to the given alignment
    #[inline]
    pub const fn align_down(self, align: u32) -> Self {
        Self(self.0 & !(align - 1))
    }

    /// Add an offset to the address
    #[inline]
    pub const fn add(self, offset: u32) -> Self {
        Self(self.0 + offset)
    }

    /// Subtract an offset from the address
    #[inline]
    pub const fn sub(self, offset: u32) -> Self {
        Self(self.0 - offset)
    }

    /// Distance in bytes from `base` up to this address
    #[inline]
    pub const fn offset_from(self, base: GuestAddr) -> u32 {
        self.0 - base.0
    }
}

impl fmt::Display for GuestAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl From<u32> for GuestAddr {
    fn from(addr: u32) -> Self {
        Self(addr)
    }
}

static_assertions::assert_eq_size!(GuestAddr, u32);
