//! # CPU Execution Backend
//!
//! This module defines the interface of the component that actually
//! executes guest instructions. One backend instance models one emulated
//! register file and is owned by exactly one guest thread.

use crate::{GuestAddr, GuestMemory, HalResult};
use alloc::boxed::Box;
use alloc::sync::Arc;

/// Number of general purpose registers (r0-r15)
pub const REGISTER_COUNT: usize = 16;

/// First argument register
pub const REG_ARG0: usize = 0;
/// Second argument register
pub const REG_ARG1: usize = 1;
/// Return value register
pub const REG_RETURN: usize = 0;

/// CPU execution backend
///
/// Methods take `&self`: a backend is shared between the host thread
/// executing it and controllers inspecting it (stack relocation, debuggers),
/// so implementations synchronize their register file internally and must
/// not hold that synchronization while invoking the [`SvcHook`].
pub trait CpuBackend: Send + Sync {
    /// Read a general purpose register
    fn read_register(&self, index: usize) -> u32;

    /// Write a general purpose register
    fn write_register(&self, index: usize, value: u32);

    /// Read the stack pointer
    fn read_stack_pointer(&self) -> GuestAddr;

    /// Write the stack pointer
    fn write_stack_pointer(&self, value: GuestAddr);

    /// Snapshot the complete register state
    fn save_context(&self) -> CpuContext;

    /// Restore a previously saved register state
    fn load_context(&self, ctx: &CpuContext);

    /// Execute from `entry` until a stop condition
    ///
    /// Negative results report an internal backend failure.
    fn run(&self, entry: GuestAddr) -> i32;

    /// Execute exactly one instruction
    ///
    /// Negative results report an internal backend failure.
    fn step(&self, entry: GuestAddr) -> i32;

    /// Ask a running backend to return from [`run`](Self::run) early
    fn stop(&self) {}

    /// Whether the trapped instruction is the return half of an import stub
    fn is_returning(&self) -> bool;

    /// Enable or disable per-instruction code tracing
    fn set_code_tracing(&self, enabled: bool);

    /// Enable or disable memory access tracing
    fn set_memory_tracing(&self, enabled: bool);

    /// Whether the last execution stopped on a breakpoint
    fn breakpoint_hit(&self) -> bool;

    /// Program the user read-only thread pointer register
    fn program_thread_pointer(&self, value: GuestAddr);
}

/// Saved register state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpuContext {
    /// General purpose registers
    pub regs: [u32; REGISTER_COUNT],
    /// Stack pointer
    pub sp: u32,
    /// Program counter
    pub pc: u32,
    /// Status register
    pub cpsr: u32,
    /// Thread pointer register
    pub thread_pointer: u32,
}

impl CpuContext {
    /// Create a context that begins at `entry` with the given stack top
    pub fn new(entry: GuestAddr, stack_top: GuestAddr) -> Self {
        Self {
            regs: [0; REGISTER_COUNT],
            sp: stack_top.as_u32(),
            pc: entry.as_u32(),
            cpsr: 0,
            thread_pointer: 0,
        }
    }
}

/// Initial state requested for a new backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuInit {
    /// Owning guest thread (raw id)
    pub thread: u32,
    /// Entry point
    pub entry: GuestAddr,
    /// Initial stack pointer (top of the thread stack)
    pub stack_top: GuestAddr,
}

/// Supervisor-call trap hook
///
/// Supplied to the backend at creation; invoked on the executing host
/// thread whenever guest code traps with `svc`.
pub trait SvcHook: Send + Sync {
    /// Handle a trap raised at `pc` with immediate `imm`
    fn call_svc(&self, cpu: &dyn CpuBackend, imm: u32, pc: GuestAddr);
}

/// Backend factory
pub trait CpuFactory: Send + Sync {
    /// Backend name (for logging)
    fn name(&self) -> &'static str;

    /// Create a backend seeded with `init`
    fn create(
        &self,
        init: CpuInit,
        memory: Arc<dyn GuestMemory>,
        svc: Arc<dyn SvcHook>,
    ) -> HalResult<Box<dyn CpuBackend>>;
}

static_assertions::assert_obj_safe!(CpuBackend, SvcHook, CpuFactory);
