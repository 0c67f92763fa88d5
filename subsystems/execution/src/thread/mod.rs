//! # Guest Thread Management
//!
//! Guest thread records, creation, launch onto host threads, and the
//! per-thread execution state machine.

pub mod launch;
pub mod lifecycle;
pub mod local_storage;
pub mod registry;
pub mod run_loop;
pub mod stack;
pub mod states;
pub mod thread;
pub mod wakeup;

pub use launch::HostThread;
pub use lifecycle::ThreadOptions;
pub use local_storage::TlsBlock;
pub use registry::{PendingThread, ThreadTable};
pub use run_loop::run_thread;
pub use stack::{GuestBlock, ThreadStack};
pub use states::RunState;
pub use thread::GuestThread;
pub use wakeup::raise_waiting_threads;
