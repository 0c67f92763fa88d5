//! # Guest Thread Record
//!
//! Core guest thread data structure.

use super::{RunState, ThreadStack, TlsBlock};
use crate::{ExecError, ExecResult, Priority, ThreadId};
use orrery_hal::{CpuBackend, CpuContext, GuestAddr};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// State guarded by the record lock
#[derive(Default)]
pub(crate) struct ThreadControl {
    /// What the run loop does next
    pub(crate) state: RunState,
    /// Threads blocked until this one changes state
    pub(crate) waiters: Vec<Arc<GuestThread>>,
}

/// Guest thread record
pub struct GuestThread {
    /// Unique identifier
    id: ThreadId,
    /// Thread name
    name: String,
    /// Entry point
    entry_point: GuestAddr,
    /// Normalized priority
    priority: Priority,
    /// Guest stack
    stack: ThreadStack,
    /// Thread-local storage
    tls: TlsBlock,
    /// Owned CPU backend
    cpu: Box<dyn CpuBackend>,
    /// Context captured right after creation
    cpu_context: CpuContext,
    /// Run state and waiter set
    control: Mutex<ThreadControl>,
    /// Signalled whenever `control` changes in a way the run loop must see
    something_to_do: Condvar,
    /// Mirrors `control.state == Exit` for lock-free observers
    exited: AtomicBool,
    /// `r0` when the run loop finished
    exit_code: AtomicU32,
}

impl GuestThread {
    /// Assemble a record from its resources
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: ThreadId,
        name: impl Into<String>,
        entry_point: GuestAddr,
        priority: Priority,
        stack: ThreadStack,
        tls: TlsBlock,
        cpu: Box<dyn CpuBackend>,
        cpu_context: CpuContext,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            entry_point,
            priority,
            stack,
            tls,
            cpu,
            cpu_context,
            control: Mutex::new(ThreadControl::default()),
            something_to_do: Condvar::new(),
            exited: AtomicBool::new(false),
            exit_code: AtomicU32::new(0),
        }
    }

    /// Get thread ID
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Get thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get entry point
    pub fn entry_point(&self) -> GuestAddr {
        self.entry_point
    }

    /// Get priority
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Get stack size
    pub fn stack_size(&self) -> u32 {
        self.stack.size()
    }

    /// Get the guest stack
    pub fn stack(&self) -> &ThreadStack {
        &self.stack
    }

    /// Get the TLS block
    pub fn tls(&self) -> &TlsBlock {
        &self.tls
    }

    /// Get the CPU backend
    pub fn cpu(&self) -> &dyn CpuBackend {
        self.cpu.as_ref()
    }

    /// Context captured at creation
    pub fn cpu_context(&self) -> &CpuContext {
        &self.cpu_context
    }

    /// Lock the record, recovering from a poisoned lock
    pub(crate) fn lock(&self) -> MutexGuard<'_, ThreadControl> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block on the record's condition signal
    pub(crate) fn wait_for_change<'a>(
        &self,
        guard: MutexGuard<'a, ThreadControl>,
    ) -> MutexGuard<'a, ThreadControl> {
        self.something_to_do
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Wake every party blocked on this record
    ///
    /// The run loop and host call-site waiters share the signal, so a
    /// single waiter cannot be targeted.
    pub(crate) fn notify(&self) {
        self.something_to_do.notify_all();
    }

    /// Apply a transition under the record lock
    ///
    /// Returns `false` and leaves the state alone when the thread already
    /// exited and `next` is not `Exit`.
    pub(crate) fn transition(&self, control: &mut ThreadControl, next: RunState) -> bool {
        if !control.state.can_transition_to(next) {
            return false;
        }
        control.state = next;
        if next.is_terminated() {
            self.exited.store(true, Ordering::Release);
        }
        true
    }

    /// Get current state
    pub fn state(&self) -> RunState {
        self.lock().state
    }

    /// Check if the thread reached `Exit`
    pub fn is_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Ask the thread to run, step or wait
    ///
    /// Fails with [`ExecError::InvalidState`] once the thread exited.
    pub fn request(&self, state: RunState) -> ExecResult<()> {
        if state.is_terminated() {
            self.force_exit();
            return Ok(());
        }

        let mut control = self.lock();
        if !self.transition(&mut control, state) {
            return Err(ExecError::InvalidState);
        }
        drop(control);
        self.notify();
        Ok(())
    }

    /// Force the thread into `Exit` and wake everything blocked on it
    pub fn force_exit(&self) {
        let mut control = self.lock();
        self.transition(&mut control, RunState::Exit);
        drop(control);
        self.notify();
    }

    /// Register a thread to be woken when this one changes state
    ///
    /// Returns `false` without registering if this thread already exited.
    pub fn add_waiter(&self, waiter: Arc<GuestThread>) -> bool {
        let mut control = self.lock();
        if control.state.is_terminated() {
            return false;
        }
        control.waiters.push(waiter);
        true
    }

    /// Number of registered waiters
    pub fn waiter_count(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Detach the waiter set
    pub(crate) fn take_waiters(&self) -> Vec<Arc<GuestThread>> {
        std::mem::take(&mut self.lock().waiters)
    }

    /// Block the calling host thread until this thread exits
    pub fn wait_until_exit(&self) -> u32 {
        let mut control = self.lock();
        while !control.state.is_terminated() {
            control = self.wait_for_change(control);
        }
        self.exit_code.load(Ordering::Acquire)
    }

    /// Exit code, once the thread exited
    pub fn exit_code(&self) -> Option<u32> {
        self.is_exited().then(|| self.exit_code.load(Ordering::Acquire))
    }

    /// Record the value the thread returned with
    pub(crate) fn set_exit_code(&self, code: u32) {
        self.exit_code.store(code, Ordering::Release);
    }
}

impl fmt::Debug for GuestThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestThread")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("entry_point", &self.entry_point)
            .field("priority", &self.priority)
            .field("stack", &self.stack)
            .field("exited", &self.is_exited())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(GuestThread: Send, Sync);
