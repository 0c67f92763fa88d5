//! # Thread Creation
//!
//! Builds a guest thread record: stack, backend, TLS, initial context.

use super::{GuestThread, PendingThread, ThreadStack, TlsBlock};
use crate::syscall::ImportHook;
use crate::{ExecError, ExecResult, Kernel, Priority, ThreadId, TraceFlags};
use orrery_hal::cpu::{REG_ARG0, REG_ARG1};
use orrery_hal::{CpuInit, GuestAddr};
use std::sync::Arc;

/// Optional creation parameters passed by guest code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThreadOptions {
    /// Size of the option structure
    pub size: u32,
    /// Attribute word
    pub attr: u32,
}

impl Kernel {
    /// Create a guest thread and register it as pending launch
    ///
    /// Nothing stays registered or allocated when creation fails.
    pub fn create_thread(
        &self,
        entry_point: GuestAddr,
        name: &str,
        init_priority: i32,
        stack_size: u32,
        option: Option<&ThreadOptions>,
    ) -> ExecResult<ThreadId> {
        if stack_size == 0 {
            return Err(ExecError::InvalidArgument);
        }

        let thid = self.next_uid();
        let memory = self.memory().clone();

        let stack_label = format!("Stack for thread {} ({})", name, thid);
        let stack = ThreadStack::allocate(memory.clone(), stack_size, &stack_label).map_err(|err| {
            log::error!(
                "Cannot allocate {:#x} byte stack for thread {}: {}",
                stack_size,
                name,
                err
            );
            ExecError::CreationFailed
        })?;
        let priority = Priority::normalize(init_priority);

        let init = CpuInit {
            thread: thid.as_u32(),
            entry: entry_point,
            stack_top: stack.top(),
        };
        let svc = Arc::new(ImportHook::new(thid, memory.clone(), self.imports().clone()));
        let cpu = self.cpu_factory().create(init, memory.clone(), svc).map_err(|err| {
            log::error!(
                "{} backend creation failed for thread {}: {}",
                self.cpu_factory().name(),
                name,
                err
            );
            ExecError::CreationFailed
        })?;

        let trace = self.trace();
        if trace.contains(TraceFlags::CODE) {
            cpu.set_code_tracing(true);
        }
        if trace.contains(TraceFlags::MEMORY) {
            cpu.set_memory_tracing(true);
        }

        if let Some(option) = option {
            cpu.write_register(REG_ARG0, option.attr);
            cpu.write_register(REG_ARG1, option.size);
        }

        let tls_label = format!("TLS for thread {} ({})", name, thid);
        let tls = TlsBlock::allocate(memory, &tls_label).map_err(|err| {
            log::error!("Cannot allocate TLS for thread {}: {}", name, err);
            ExecError::CreationFailed
        })?;
        cpu.program_thread_pointer(tls.thread_pointer());

        let cpu_context = cpu.save_context();

        log::debug!(
            "Created thread {} {} entry={} stack={}..{} tls={} priority={}",
            thid,
            name,
            entry_point,
            stack.base(),
            stack.top(),
            tls.thread_pointer(),
            priority.value()
        );

        let thread = Arc::new(GuestThread::new(
            thid,
            name,
            entry_point,
            priority,
            stack,
            tls,
            cpu,
            cpu_context,
        ));
        self.table().register(
            thread,
            PendingThread {
                name: name.to_string(),
            },
        )?;

        Ok(thid)
    }
}
