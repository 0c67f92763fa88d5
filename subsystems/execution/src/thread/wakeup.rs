//! # Wake-Up Fan-Out
//!
//! Releases every party waiting on a thread.

use super::GuestThread;

/// Notify every waiter of `thread` once, then clear its waiter set
///
/// The set is detached under `thread`'s lock and each waiter is signalled
/// under its own lock afterwards, so at most one record lock is held at
/// any time. An empty set is a no-op. No state field is changed.
pub fn raise_waiting_threads(thread: &GuestThread) {
    let waiters = thread.take_waiters();
    for waiter in waiters {
        let _guard = waiter.lock();
        waiter.notify();
    }
}
