//! # Orrery Execution Subsystem
//!
//! The execution subsystem manages:
//! - Guest thread creation (stack, TLS, initial CPU context)
//! - Launching guest threads onto host threads
//! - The per-thread run/step/wait/exit state machine
//! - Cross-thread wake-up
//! - Stack relocation for threads cloned from a live stack
//!
//! ## Key Principle
//!
//! Every launched guest thread is backed by exactly one host thread. There
//! is no guest scheduler: waiting is host blocking on a per-record
//! condition signal, and preemption is whatever the host does.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod config;
pub mod kernel;
pub mod priority;
pub mod status;
pub mod syscall;
pub mod thread;

#[cfg(test)]
mod testing;

pub use config::{DebuggerGate, KernelConfig, TraceFlags};
pub use kernel::Kernel;
pub use priority::Priority;
pub use syscall::{ImportDispatch, ImportHook};
pub use thread::{GuestThread, HostThread, RunState, ThreadOptions};

use orrery_hal::HalError;
use core::fmt;

/// Guest thread identifier (kernel-wide unique for the process lifetime)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(u32);

impl ThreadId {
    /// Wrap a raw id
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw ID value
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Execution result type
pub type ExecResult<T> = Result<T, ExecError>;

/// Execution errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    /// Thread id is not known to the kernel (or not in the expected set)
    UnknownThread,
    /// The host refused to create a thread
    ThreadError,
    /// Backend or guest memory could not be set up for a new thread
    CreationFailed,
    /// Thread is in a state that does not allow the operation
    InvalidState,
    /// Invalid argument
    InvalidArgument,
    /// Thread id is already registered
    AlreadyExists,
    /// Guest memory access failed
    Memory(HalError),
}

impl ExecError {
    /// Kernel status code reported to guest code
    pub fn status(self) -> u32 {
        match self {
            ExecError::UnknownThread => status::SCE_KERNEL_ERROR_UNKNOWN_THREAD_ID,
            ExecError::ThreadError => status::SCE_KERNEL_ERROR_THREAD_ERROR,
            ExecError::CreationFailed | ExecError::Memory(_) => status::SCE_KERNEL_ERROR_ERROR,
            ExecError::InvalidState => status::SCE_KERNEL_ERROR_NOT_DORMANT,
            ExecError::InvalidArgument => status::SCE_KERNEL_ERROR_INVALID_ARGUMENT,
            ExecError::AlreadyExists => status::SCE_KERNEL_ERROR_ILLEGAL_THREAD_ID,
        }
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::UnknownThread => f.write_str("unknown thread id"),
            ExecError::ThreadError => f.write_str("host thread creation failed"),
            ExecError::CreationFailed => f.write_str("guest thread creation failed"),
            ExecError::InvalidState => f.write_str("invalid thread state"),
            ExecError::InvalidArgument => f.write_str("invalid argument"),
            ExecError::AlreadyExists => f.write_str("thread id already registered"),
            ExecError::Memory(err) => write!(f, "guest memory error: {}", err),
        }
    }
}

impl std::error::Error for ExecError {}

impl From<HalError> for ExecError {
    fn from(err: HalError) -> Self {
        ExecError::Memory(err)
    }
}

/// Collapse an operation result into a kernel status code
pub fn to_status<T>(result: ExecResult<T>) -> u32 {
    match result {
        Ok(_) => status::SCE_KERNEL_OK,
        Err(err) => err.status(),
    }
}
