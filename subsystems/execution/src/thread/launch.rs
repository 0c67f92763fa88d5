//! # Thread Launch
//!
//! Binds a pending guest thread to a new host thread and owns the host
//! side of that binding.

use super::{raise_waiting_threads, run_thread, GuestThread, RunState};
use crate::{ExecError, ExecResult, Kernel, ThreadId};
use orrery_hal::cpu::{REG_ARG0, REG_ARG1, REG_RETURN};
use orrery_hal::GuestAddr;
use std::fmt;
use std::io;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Launch parameters handed to the new host thread
struct ThreadParams {
    kernel: Arc<Kernel>,
    thid: ThreadId,
    arglen: u32,
    argp: GuestAddr,
    host_may_destroy_params: mpsc::Sender<()>,
}

/// Host thread bound to a guest thread
///
/// Dropping the handle is the only way to cancel a launched thread: the
/// guest thread is forced into `Exit`, every waiter is released, and the
/// host thread is joined.
pub struct HostThread {
    thread: Arc<GuestThread>,
    handle: Option<JoinHandle<u32>>,
}

impl HostThread {
    /// Guest thread this host thread executes
    pub fn thread(&self) -> &Arc<GuestThread> {
        &self.thread
    }

    /// Whether the host thread already returned
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for HostThread {
    fn drop(&mut self) {
        self.thread.force_exit();
        self.thread.cpu().stop();
        raise_waiting_threads(&self.thread);

        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.thread().id() == std::thread::current().id() {
            log::warn!(
                "Thread {} torn down from its own host thread; not joining",
                self.thread.name()
            );
            return;
        }
        match handle.join() {
            Ok(code) => {
                log::debug!("Thread {} joined with exit code {:#x}", self.thread.name(), code)
            }
            Err(_) => log::error!("Host thread for {} panicked", self.thread.name()),
        }
    }
}

impl fmt::Debug for HostThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostThread")
            .field("thread", &self.thread.id())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Forces `Exit` and releases waiters on every path out of the trampoline
struct ExitGuard<'a>(&'a GuestThread);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.0.force_exit();
        raise_waiting_threads(self.0);
    }
}

#[cfg(test)]
thread_local! {
    /// Makes the next host spawn from this thread fail
    static REFUSE_SPAWN: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

#[cfg(test)]
fn spawn_refused() -> bool {
    REFUSE_SPAWN.with(|refuse| refuse.replace(false))
}

#[cfg(not(test))]
fn spawn_refused() -> bool {
    false
}

/// Spawn the named host thread backing a guest thread
fn spawn_host<F>(name: String, f: F) -> io::Result<JoinHandle<u32>>
where
    F: FnOnce() -> u32 + Send + 'static,
{
    if spawn_refused() {
        return Err(io::Error::new(io::ErrorKind::WouldBlock, "host thread limit"));
    }
    std::thread::Builder::new().name(name).spawn(f)
}

/// Entry point of a launched host thread
fn thread_function(params: ThreadParams) -> u32 {
    let ThreadParams {
        kernel,
        thid,
        arglen,
        argp,
        host_may_destroy_params,
    } = params;
    let _ = host_may_destroy_params.send(());

    let Some(thread) = kernel.find(thid) else {
        debug_assert!(false, "launched thread {} missing from the table", thid);
        log::error!("Launched thread {} missing from the table", thid);
        return 0;
    };

    thread.cpu().write_register(REG_ARG0, arglen);
    thread.cpu().write_register(REG_ARG1, argp.as_u32());

    if kernel.debugger_gate().take() {
        // Later launches proceed normally.
        let _ = thread.request(RunState::Wait);
        log::info!("Thread {} waiting for debugger", thread.name());
    }
    drop(kernel);

    let _exit = ExitGuard(&thread);
    let succeeded = run_thread(&thread);
    let r0 = thread.cpu().read_register(REG_RETURN);
    thread.set_exit_code(r0);
    debug_assert!(succeeded, "thread {} run loop failed", thread.name());

    r0
}

impl Kernel {
    /// Launch a pending thread onto a new host thread
    ///
    /// `arglen`/`argp` land in the first two argument registers. The call
    /// returns once the new host thread has taken ownership of its launch
    /// parameters.
    pub fn start_thread(
        self: &Arc<Self>,
        thid: ThreadId,
        arglen: u32,
        argp: GuestAddr,
    ) -> ExecResult<()> {
        let (host_may_destroy_params, params_taken) = mpsc::channel();

        let mut table = self.table();
        let name = match table.pending(thid) {
            Some(pending) => pending.name.clone(),
            None => return Err(ExecError::UnknownThread),
        };
        let thread = table.get(thid).ok_or(ExecError::UnknownThread)?;

        let params = ThreadParams {
            kernel: self.clone(),
            thid,
            arglen,
            argp,
            host_may_destroy_params,
        };

        // On failure the thread stays pending.
        let handle = spawn_host(name, move || thread_function(params)).map_err(|err| {
            log::error!("Failed to spawn host thread for {}: {}", thid, err);
            ExecError::ThreadError
        })?;

        table.mark_running(
            thid,
            HostThread {
                thread,
                handle: Some(handle),
            },
        );
        drop(table);

        log::debug!("Launched thread {} (arglen={:#x}, argp={})", thid, arglen, argp);
        let _ = params_taken.recv();
        Ok(())
    }
}
