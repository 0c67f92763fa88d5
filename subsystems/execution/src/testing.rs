//! Test fixtures: a scripted CPU backend, a recording import dispatcher and
//! a kernel wired to a host-backed arena.

use crate::{GuestThread, ImportDispatch, Kernel, KernelConfig, ThreadId};
use orrery_hal::cpu::{REG_ARG0, REG_ARG1, REG_RETURN};
use orrery_hal::{
    CpuBackend, CpuContext, CpuFactory, CpuInit, GuestAddr, GuestMemory, HalError, HalResult,
    SvcHook,
};
use orrery_memory::HostMemory;
use spin::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Arena placement
pub const ARENA_BASE: GuestAddr = GuestAddr::new(0x8100_0000);
pub const ARENA_SIZE: u32 = 16 * 1024 * 1024;

/// Entry point handed to every test thread (never dereferenced)
pub const ENTRY: GuestAddr = GuestAddr::new(0x8000_1000);

/// Fresh guest memory arena
pub fn memory() -> Arc<HostMemory> {
    Arc::new(HostMemory::new(ARENA_BASE, ARENA_SIZE).unwrap())
}

/// Kernel over a fresh arena whose backends follow `plan`
pub fn kernel(
    config: KernelConfig,
    plan: MockPlan,
) -> (Arc<Kernel>, Arc<HostMemory>, Arc<MockPlan>) {
    let memory = memory();
    let plan = Arc::new(plan);
    let factory = Arc::new(MockCpuFactory { plan: plan.clone() });
    let kernel = Kernel::new(
        config,
        memory.clone(),
        factory,
        Arc::new(RecordingImports::default()),
    );
    (kernel, memory, plan)
}

/// Create a one-page thread at [`ENTRY`] and resolve its record
pub fn thread(kernel: &Kernel, name: &str) -> Arc<GuestThread> {
    let id = kernel.create_thread(ENTRY, name, 64, 0x1000, None).unwrap();
    kernel.find(id).unwrap()
}

/// Poll `cond` until it holds or `timeout` elapses
pub fn wait_until(cond: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}

/// Script shared by every backend a factory creates
#[derive(Debug, Default)]
pub struct MockPlan {
    results: Mutex<VecDeque<i32>>,
    exit_code: u32,
    breakpoint: bool,
    failing: bool,
    returning: AtomicBool,
    runs: AtomicUsize,
    steps: AtomicUsize,
    stops: AtomicUsize,
    launch_args: Mutex<Vec<(u32, u32)>>,
    host_names: Mutex<Vec<String>>,
    tracing: Mutex<(bool, bool)>,
}

impl MockPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Results returned by successive `run`/`step` calls (then 0)
    pub fn with_results(self, results: &[i32]) -> Self {
        *self.results.lock() = results.iter().copied().collect();
        self
    }

    /// Value left in `r0` by every successful execution
    pub fn with_exit_code(mut self, code: u32) -> Self {
        self.exit_code = code;
        self
    }

    /// Report a breakpoint after every execution
    pub fn with_breakpoint(mut self) -> Self {
        self.breakpoint = true;
        self
    }

    /// Make the factory refuse to create backends
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn set_returning(&self, returning: bool) {
        self.returning.store(returning, Ordering::SeqCst);
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn steps(&self) -> usize {
        self.steps.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// `(r0, r1)` seen at the start of each execution
    pub fn launch_args(&self) -> Vec<(u32, u32)> {
        self.launch_args.lock().clone()
    }

    /// Host thread names each execution ran on
    pub fn host_names(&self) -> Vec<String> {
        self.host_names.lock().clone()
    }

    /// `(code, memory)` tracing of the most recently created backend
    pub fn tracing(&self) -> (bool, bool) {
        *self.tracing.lock()
    }

    fn next_result(&self) -> i32 {
        self.results.lock().pop_front().unwrap_or(0)
    }
}

/// Scripted backend: executing "completes" immediately
#[derive(Debug)]
pub struct MockCpu {
    ctx: Mutex<CpuContext>,
    plan: Arc<MockPlan>,
}

impl MockCpu {
    pub fn new(init: CpuInit, plan: Arc<MockPlan>) -> Self {
        Self {
            ctx: Mutex::new(CpuContext::new(init.entry, init.stack_top)),
            plan,
        }
    }

    fn execute(&self, counter: &AtomicUsize) -> i32 {
        {
            let ctx = self.ctx.lock();
            self.plan
                .launch_args
                .lock()
                .push((ctx.regs[REG_ARG0], ctx.regs[REG_ARG1]));
        }
        if let Some(name) = std::thread::current().name() {
            self.plan.host_names.lock().push(name.to_string());
        }

        counter.fetch_add(1, Ordering::SeqCst);
        let res = self.plan.next_result();
        if res >= 0 {
            self.ctx.lock().regs[REG_RETURN] = self.plan.exit_code;
        }
        res
    }
}

impl CpuBackend for MockCpu {
    fn read_register(&self, index: usize) -> u32 {
        self.ctx.lock().regs[index]
    }

    fn write_register(&self, index: usize, value: u32) {
        self.ctx.lock().regs[index] = value;
    }

    fn read_stack_pointer(&self) -> GuestAddr {
        GuestAddr::new(self.ctx.lock().sp)
    }

    fn write_stack_pointer(&self, value: GuestAddr) {
        self.ctx.lock().sp = value.as_u32();
    }

    fn save_context(&self) -> CpuContext {
        self.ctx.lock().clone()
    }

    fn load_context(&self, ctx: &CpuContext) {
        *self.ctx.lock() = ctx.clone();
    }

    fn run(&self, entry: GuestAddr) -> i32 {
        self.ctx.lock().pc = entry.as_u32();
        self.execute(&self.plan.runs)
    }

    fn step(&self, _entry: GuestAddr) -> i32 {
        self.execute(&self.plan.steps)
    }

    fn stop(&self) {
        self.plan.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn is_returning(&self) -> bool {
        self.plan.returning.load(Ordering::SeqCst)
    }

    fn set_code_tracing(&self, enabled: bool) {
        self.plan.tracing.lock().0 = enabled;
    }

    fn set_memory_tracing(&self, enabled: bool) {
        self.plan.tracing.lock().1 = enabled;
    }

    fn breakpoint_hit(&self) -> bool {
        self.plan.breakpoint
    }

    fn program_thread_pointer(&self, value: GuestAddr) {
        self.ctx.lock().thread_pointer = value.as_u32();
    }
}

/// Factory producing [`MockCpu`]s that share one plan
#[derive(Debug)]
pub struct MockCpuFactory {
    plan: Arc<MockPlan>,
}

impl CpuFactory for MockCpuFactory {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn create(
        &self,
        init: CpuInit,
        _memory: Arc<dyn GuestMemory>,
        _svc: Arc<dyn SvcHook>,
    ) -> HalResult<Box<dyn CpuBackend>> {
        if self.plan.failing {
            return Err(HalError::NotInitialized);
        }
        *self.plan.tracing.lock() = (false, false);
        Ok(Box::new(MockCpu::new(init, self.plan.clone())))
    }
}

/// Dispatcher that only records what it was asked to do
#[derive(Debug, Default)]
pub struct RecordingImports {
    calls: Mutex<Vec<(u32, ThreadId)>>,
}

impl RecordingImports {
    pub fn calls(&self) -> Vec<(u32, ThreadId)> {
        self.calls.lock().clone()
    }
}

impl ImportDispatch for RecordingImports {
    fn call_import(&self, _cpu: &dyn CpuBackend, nid: u32, thread: ThreadId) {
        self.calls.lock().push((nid, thread));
    }
}
