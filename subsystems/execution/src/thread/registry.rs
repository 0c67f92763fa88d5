//! # Thread Registry
//!
//! The kernel's table of guest threads, split into the full table, the
//! pending set (created, not yet launched) and the running set (bound to a
//! host thread). One lock guards all three.

use super::{GuestThread, HostThread};
use crate::{ExecError, ExecResult, ThreadId};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A created thread waiting for its launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingThread {
    /// Name given to the host thread on launch
    pub name: String,
}

/// Thread table
#[derive(Debug, Default)]
pub struct ThreadTable {
    /// All threads by ID
    threads: BTreeMap<ThreadId, Arc<GuestThread>>,
    /// Threads created but not launched
    waiting: BTreeMap<ThreadId, PendingThread>,
    /// Threads bound to a host thread
    running: BTreeMap<ThreadId, HostThread>,
}

impl ThreadTable {
    /// Create an empty table
    pub const fn new() -> Self {
        Self {
            threads: BTreeMap::new(),
            waiting: BTreeMap::new(),
            running: BTreeMap::new(),
        }
    }

    /// Register a freshly created thread as pending
    pub fn register(&mut self, thread: Arc<GuestThread>, pending: PendingThread) -> ExecResult<()> {
        let id = thread.id();
        if self.threads.contains_key(&id) {
            return Err(ExecError::AlreadyExists);
        }
        self.threads.insert(id, thread);
        self.waiting.insert(id, pending);
        Ok(())
    }

    /// Get a thread by ID
    pub fn get(&self, id: ThreadId) -> Option<Arc<GuestThread>> {
        self.threads.get(&id).cloned()
    }

    /// Pending entry of a thread
    pub fn pending(&self, id: ThreadId) -> Option<&PendingThread> {
        self.waiting.get(&id)
    }

    /// Move a thread from the pending set into the running set
    pub fn mark_running(&mut self, id: ThreadId, host: HostThread) {
        self.waiting.remove(&id);
        self.running.insert(id, host);
    }

    /// Detach a running-set entry
    ///
    /// The returned handle tears the thread down when dropped; drop it
    /// after releasing the table lock.
    pub fn take_running(&mut self, id: ThreadId) -> Option<HostThread> {
        self.running.remove(&id)
    }

    /// Detach every running-set entry
    pub fn take_all_running(&mut self) -> Vec<HostThread> {
        std::mem::take(&mut self.running).into_values().collect()
    }

    /// Remove a thread from the table and the pending set
    pub fn remove(&mut self, id: ThreadId) -> Option<Arc<GuestThread>> {
        self.waiting.remove(&id);
        self.threads.remove(&id)
    }

    /// Drop every table and pending entry
    pub fn clear(&mut self) {
        self.waiting.clear();
        self.threads.clear();
    }

    /// Check if a thread is pending launch
    pub fn is_pending(&self, id: ThreadId) -> bool {
        self.waiting.contains_key(&id)
    }

    /// Check if a thread is bound to a host thread
    pub fn is_running(&self, id: ThreadId) -> bool {
        self.running.contains_key(&id)
    }

    /// Get thread count
    pub fn count(&self) -> usize {
        self.threads.len()
    }

    /// Number of running-set entries
    pub fn running_count(&self) -> usize {
        self.running.len()
    }
}
