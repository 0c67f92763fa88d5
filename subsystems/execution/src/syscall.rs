//! # Import Dispatch
//!
//! Guest code reaches host services through import stubs: an `svc`
//! instruction followed (or, on the return path, preceded) by the 32-bit
//! identifier of the import. The hook resolves that identifier and hands
//! it to the dispatcher together with the trapping thread.

use crate::ThreadId;
use orrery_hal::{CpuBackend, GuestAddr, GuestMemory, SvcHook};
use std::fmt;
use std::sync::Arc;

/// Host implementation of guest imports
pub trait ImportDispatch: Send + Sync {
    /// Execute import `nid` on behalf of `thread`
    fn call_import(&self, cpu: &dyn CpuBackend, nid: u32, thread: ThreadId);
}

/// Per-thread supervisor-call hook
pub struct ImportHook {
    thread: ThreadId,
    memory: Arc<dyn GuestMemory>,
    imports: Arc<dyn ImportDispatch>,
}

impl ImportHook {
    /// Create the hook for `thread`
    pub fn new(
        thread: ThreadId,
        memory: Arc<dyn GuestMemory>,
        imports: Arc<dyn ImportDispatch>,
    ) -> Self {
        Self {
            thread,
            memory,
            imports,
        }
    }
}

impl SvcHook for ImportHook {
    fn call_svc(&self, cpu: &dyn CpuBackend, _imm: u32, pc: GuestAddr) {
        // Wraps at the top of the address space; the read then fails.
        let nid_addr = if cpu.is_returning() {
            pc
        } else {
            GuestAddr::new(pc.as_u32().wrapping_add(4))
        };
        match self.memory.read_u32(nid_addr) {
            Ok(nid) => self.imports.call_import(cpu, nid, self.thread),
            Err(err) => log::error!(
                "Thread {} trapped at {} but import word at {} is unreadable: {}",
                self.thread,
                pc,
                nid_addr,
                err
            ),
        }
    }
}

impl fmt::Debug for ImportHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportHook").field("thread", &self.thread).finish_non_exhaustive()
    }
}
