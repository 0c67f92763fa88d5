//! # Kernel Configuration
//!
//! Process-wide switches consumed by the thread layer. Trace toggles are
//! read when a thread is created; the debugger gate is consumed by the
//! first launch after it is armed.

use bitflags::bitflags;
use core::sync::atomic::{AtomicBool, Ordering};

bitflags! {
    /// Backend tracing toggles
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TraceFlags: u32 {
        /// Log every executed instruction
        const CODE = 1 << 0;
        /// Log every guest memory access
        const MEMORY = 1 << 1;
    }
}

/// Kernel configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    /// Pause the next launched thread until a debugger resumes it
    pub wait_for_debugger: bool,
    /// Tracing toggles propagated into new backends
    pub trace: TraceFlags,
    /// First id handed out by the kernel id source
    pub uid_base: u32,
}

impl KernelConfig {
    /// Create default configuration
    pub fn new() -> Self {
        Self {
            wait_for_debugger: false,
            trace: TraceFlags::empty(),
            uid_base: 1,
        }
    }

    /// Set the debugger pause flag
    pub fn with_wait_for_debugger(mut self, wait: bool) -> Self {
        self.wait_for_debugger = wait;
        self
    }

    /// Set the tracing toggles
    pub fn with_trace(mut self, trace: TraceFlags) -> Self {
        self.trace = trace;
        self
    }

    /// Set the first thread id
    pub fn with_uid_base(mut self, base: u32) -> Self {
        self.uid_base = base;
        self
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot "pause on next launch" token
///
/// Arming is idempotent; exactly one [`take`](Self::take) observes each
/// arming, however many launches race for it.
#[derive(Debug, Default)]
pub struct DebuggerGate {
    armed: AtomicBool,
}

impl DebuggerGate {
    /// Create a gate
    pub const fn new(armed: bool) -> Self {
        Self {
            armed: AtomicBool::new(armed),
        }
    }

    /// Arm the gate for the next launch
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Consume the gate, returning whether it was armed
    pub fn take(&self) -> bool {
        self.armed.swap(false, Ordering::SeqCst)
    }

    /// Check without consuming
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}
