//! # Kernel Thread State
//!
//! Process-wide owner of the thread table, the id source and the backend
//! dependencies new threads are built from. Creation, launch and stack
//! relocation live next to the code that implements them under
//! [`crate::thread`].

use crate::config::{DebuggerGate, KernelConfig, TraceFlags};
use crate::syscall::ImportDispatch;
use crate::thread::{raise_waiting_threads, GuestThread, ThreadTable};
use crate::{ExecError, ExecResult, ThreadId};
use orrery_hal::{CpuFactory, GuestMemory};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Kernel thread state
pub struct Kernel {
    /// Configuration the kernel was started with
    config: KernelConfig,
    /// Current tracing toggles
    trace: AtomicU32,
    /// One-shot pause for the next launch
    debugger: DebuggerGate,
    /// Id source
    next_uid: AtomicU32,
    /// Guest memory allocator
    memory: Arc<dyn GuestMemory>,
    /// CPU backend factory
    cpu_factory: Arc<dyn CpuFactory>,
    /// Import dispatcher handed to every thread's trap hook
    imports: Arc<dyn ImportDispatch>,
    /// Thread table, pending and running sets (the kernel lock)
    threads: spin::Mutex<ThreadTable>,
}

impl Kernel {
    /// Create the kernel
    pub fn new(
        config: KernelConfig,
        memory: Arc<dyn GuestMemory>,
        cpu_factory: Arc<dyn CpuFactory>,
        imports: Arc<dyn ImportDispatch>,
    ) -> Arc<Self> {
        log::info!(
            "Kernel up: backend={} wait_for_debugger={} trace={:?}",
            cpu_factory.name(),
            config.wait_for_debugger,
            config.trace
        );
        Arc::new(Self {
            trace: AtomicU32::new(config.trace.bits()),
            debugger: DebuggerGate::new(config.wait_for_debugger),
            next_uid: AtomicU32::new(config.uid_base),
            config,
            memory,
            cpu_factory,
            imports,
            threads: spin::Mutex::new(ThreadTable::new()),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Get the guest memory allocator
    pub fn memory(&self) -> &Arc<dyn GuestMemory> {
        &self.memory
    }

    pub(crate) fn cpu_factory(&self) -> &Arc<dyn CpuFactory> {
        &self.cpu_factory
    }

    pub(crate) fn imports(&self) -> &Arc<dyn ImportDispatch> {
        &self.imports
    }

    pub(crate) fn debugger_gate(&self) -> &DebuggerGate {
        &self.debugger
    }

    /// Take the kernel lock
    pub(crate) fn table(&self) -> spin::MutexGuard<'_, ThreadTable> {
        self.threads.lock()
    }

    /// Allocate a kernel-wide unique id
    pub fn next_uid(&self) -> ThreadId {
        ThreadId::new(self.next_uid.fetch_add(1, Ordering::Relaxed))
    }

    /// Current tracing toggles
    pub fn trace(&self) -> TraceFlags {
        TraceFlags::from_bits_truncate(self.trace.load(Ordering::Relaxed))
    }

    /// Replace the tracing toggles (applies to threads created afterwards)
    pub fn set_trace(&self, trace: TraceFlags) {
        self.trace.store(trace.bits(), Ordering::Relaxed);
    }

    /// Pause the next launched thread until a debugger resumes it
    pub fn arm_debugger_gate(&self) {
        self.debugger.arm();
    }

    /// Look up a thread
    pub fn find(&self, id: ThreadId) -> Option<Arc<GuestThread>> {
        self.table().get(id)
    }

    /// Check if a thread is created but not launched
    pub fn is_pending(&self, id: ThreadId) -> bool {
        self.table().is_pending(id)
    }

    /// Check if a thread is bound to a host thread
    pub fn is_running(&self, id: ThreadId) -> bool {
        self.table().is_running(id)
    }

    /// Number of known threads
    pub fn thread_count(&self) -> usize {
        self.table().count()
    }

    /// Destroy a thread
    ///
    /// A launched thread is torn down (forced to `Exit`, waiters released,
    /// host thread joined) before its record leaves the table.
    pub fn delete_thread(&self, id: ThreadId) -> ExecResult<()> {
        let host = self.table().take_running(id);
        match host {
            // Joined outside the kernel lock: the host thread may still be
            // resolving its record.
            Some(host) => drop(host),
            None if self.table().get(id).is_none() => return Err(ExecError::UnknownThread),
            None => {}
        }

        let removed = self.table().remove(id);
        match removed {
            Some(thread) => {
                // A never-launched thread has no teardown of its own.
                thread.force_exit();
                raise_waiting_threads(&thread);
                log::debug!("Deleted thread {} {}", id, thread.name());
                Ok(())
            }
            None => Err(ExecError::UnknownThread),
        }
    }

    /// Block `waiter` until `target` exits, returning the target's exit code
    ///
    /// Runs on `waiter`'s host thread (typically from inside an import).
    pub fn wait_thread_end(&self, waiter: ThreadId, target: ThreadId) -> ExecResult<u32> {
        let waiter = self.find(waiter).ok_or(ExecError::UnknownThread)?;
        let target = self.find(target).ok_or(ExecError::UnknownThread)?;
        if Arc::ptr_eq(&waiter, &target) {
            return Err(ExecError::InvalidArgument);
        }

        // At most one record lock at a time. A raise landing between the
        // registration and the wait is not lost: `exited` is stored first and
        // the raise notifies under the waiter's lock.
        if target.add_waiter(waiter.clone()) {
            let mut control = waiter.lock();
            while !target.is_exited() && !control.state.is_terminated() {
                control = waiter.wait_for_change(control);
            }
        }

        target.exit_code().ok_or(ExecError::InvalidState)
    }

    /// Tear down every running thread and forget all records
    pub fn shutdown(&self) {
        let running = self.table().take_all_running();
        log::info!("Kernel shutdown: stopping {} running threads", running.len());
        for host in running {
            let thread = host.thread().clone();
            drop(host);
            log::debug!("Stopped thread {} {}", thread.id(), thread.name());
        }
        self.table().clear();
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        let running = self.threads.get_mut().take_all_running();
        drop(running);
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table();
        f.debug_struct("Kernel")
            .field("config", &self.config)
            .field("trace", &self.trace())
            .field("threads", &table.count())
            .field("running", &table.running_count())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(Kernel: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, MockPlan};
    use crate::RunState;
    use orrery_hal::GuestAddr;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn create(kernel: &Kernel, name: &str) -> ThreadId {
        kernel.create_thread(testing::ENTRY, name, 64, 0x1000, None).unwrap()
    }

    #[test]
    fn test_uids_start_at_base() {
        let config = KernelConfig::default().with_uid_base(0x40);
        let (kernel, _memory, _plan) = testing::kernel(config, MockPlan::new());
        assert_eq!(create(&kernel, "a"), ThreadId::new(0x40));
        assert_eq!(create(&kernel, "b"), ThreadId::new(0x41));
    }

    #[test]
    fn test_trace_toggles_read_at_creation() {
        let (kernel, _memory, plan) = testing::kernel(KernelConfig::default(), MockPlan::new());
        create(&kernel, "a");
        assert_eq!(plan.tracing(), (false, false));

        kernel.set_trace(TraceFlags::CODE | TraceFlags::MEMORY);
        create(&kernel, "b");
        assert_eq!(plan.tracing(), (true, true));
    }

    #[test]
    fn test_delete_pending_thread() {
        let (kernel, _memory, _plan) = testing::kernel(KernelConfig::default(), MockPlan::new());
        let id = create(&kernel, "a");
        let thread = kernel.find(id).unwrap();

        kernel.delete_thread(id).unwrap();
        assert!(!kernel.is_pending(id));
        assert_eq!(thread.state(), RunState::Exit);
        assert_eq!(kernel.start_thread(id, 0, GuestAddr::NULL), Err(ExecError::UnknownThread));
    }

    #[test]
    fn test_wait_thread_end_returns_exit_code() {
        let config = KernelConfig::default().with_wait_for_debugger(true);
        let plan = MockPlan::new().with_exit_code(0x77);
        let (kernel, _memory, plan) = testing::kernel(config, plan);
        let target = create(&kernel, "target");
        let waiter = create(&kernel, "waiter");
        kernel.start_thread(target, 0, GuestAddr::NULL).unwrap();
        let target_rec = kernel.find(target).unwrap();
        assert!(testing::wait_until(|| target_rec.state() == RunState::Wait, TIMEOUT));

        let blocked = {
            let kernel = kernel.clone();
            std::thread::spawn(move || kernel.wait_thread_end(waiter, target))
        };
        assert!(testing::wait_until(|| target_rec.waiter_count() == 1, TIMEOUT));

        target_rec.request(RunState::Run).unwrap();
        assert_eq!(blocked.join().unwrap(), Ok(0x77));
        assert_eq!(plan.runs(), 1);
        assert_eq!(target_rec.waiter_count(), 0);
    }

    #[test]
    fn test_wait_thread_end_on_exited_target() {
        let plan = MockPlan::new().with_exit_code(3);
        let (kernel, _memory, _plan) = testing::kernel(KernelConfig::default(), plan);
        let target = create(&kernel, "target");
        let waiter = create(&kernel, "waiter");
        kernel.start_thread(target, 0, GuestAddr::NULL).unwrap();
        kernel.find(target).unwrap().wait_until_exit();

        assert_eq!(kernel.wait_thread_end(waiter, target), Ok(3));
        assert_eq!(kernel.wait_thread_end(waiter, waiter), Err(ExecError::InvalidArgument));
        assert_eq!(
            kernel.wait_thread_end(ThreadId::new(999), target),
            Err(ExecError::UnknownThread)
        );
    }

    #[test]
    fn test_mutual_wait_thread_end_releases_both() {
        let (kernel, _memory, _plan) = testing::kernel(KernelConfig::default(), MockPlan::new());
        let a = create(&kernel, "a");
        let b = create(&kernel, "b");
        let a_rec = kernel.find(a).unwrap();
        let b_rec = kernel.find(b).unwrap();

        let a_waits = {
            let kernel = kernel.clone();
            std::thread::spawn(move || kernel.wait_thread_end(a, b))
        };
        let b_waits = {
            let kernel = kernel.clone();
            std::thread::spawn(move || kernel.wait_thread_end(b, a))
        };
        assert!(testing::wait_until(
            || a_rec.waiter_count() == 1 && b_rec.waiter_count() == 1,
            TIMEOUT
        ));

        // Both records stay lockable while each waits on the other.
        assert_eq!(a_rec.state(), RunState::Run);
        assert_eq!(b_rec.state(), RunState::Run);

        // `a` is forced out: its own wait ends without a result, while the
        // wait on it completes with its code.
        a_rec.force_exit();
        raise_waiting_threads(&a_rec);
        assert_eq!(b_waits.join().unwrap(), Ok(0));
        assert_eq!(a_waits.join().unwrap(), Err(ExecError::InvalidState));

        b_rec.force_exit();
        raise_waiting_threads(&b_rec);
        assert_eq!(a_rec.waiter_count(), 0);
        assert_eq!(b_rec.waiter_count(), 0);
        kernel.delete_thread(a).unwrap();
        kernel.delete_thread(b).unwrap();
        assert_eq!(kernel.thread_count(), 0);
    }

    #[test]
    fn test_mutual_wait_thread_end_under_contention() {
        let (kernel, _memory, _plan) = testing::kernel(KernelConfig::default(), MockPlan::new());

        for round in 0..200 {
            let a = create(&kernel, &format!("a{}", round));
            let b = create(&kernel, &format!("b{}", round));
            let waits: Vec<_> = [(a, b), (b, a)]
                .into_iter()
                .map(|(waiter, target)| {
                    let kernel = kernel.clone();
                    std::thread::spawn(move || kernel.wait_thread_end(waiter, target))
                })
                .collect();

            // Teardown must never block on a record held by a waiter.
            kernel.delete_thread(a).unwrap();
            kernel.delete_thread(b).unwrap();
            for wait in waits {
                let res = wait.join().unwrap();
                assert!(
                    matches!(
                        res,
                        Ok(0) | Err(ExecError::InvalidState) | Err(ExecError::UnknownThread)
                    ),
                    "unexpected result {:?}",
                    res
                );
            }
        }
        assert_eq!(kernel.thread_count(), 0);
    }

    #[test]
    fn test_shutdown_stops_everything() {
        let config = KernelConfig::default().with_wait_for_debugger(true);
        let (kernel, _memory, _plan) = testing::kernel(config, MockPlan::new());
        let parked = create(&kernel, "parked");
        let pending = create(&kernel, "pending");
        kernel.start_thread(parked, 0, GuestAddr::NULL).unwrap();
        let parked_rec = kernel.find(parked).unwrap();
        assert!(testing::wait_until(|| parked_rec.state() == RunState::Wait, TIMEOUT));
        assert!(format!("{:?}", kernel).contains("running: 1"));

        kernel.shutdown();
        assert!(parked_rec.is_exited());
        assert!(!kernel.is_running(parked));
        assert!(!kernel.is_pending(pending));
        assert_eq!(kernel.thread_count(), 0);
    }
}
