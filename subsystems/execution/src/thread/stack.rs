//! # Thread Stacks
//!
//! Guest stack ownership and relocation of a live stack onto another
//! thread.

use super::GuestThread;
use crate::{ExecError, ExecResult, Kernel, ThreadId};
use orrery_hal::{GuestAddr, GuestMemory, HalResult};
use std::fmt;
use std::sync::Arc;

/// Byte pattern a fresh stack is filled with
pub const STACK_FILL: u8 = 0xcc;

/// Guest allocation released when dropped
pub struct GuestBlock {
    memory: Arc<dyn GuestMemory>,
    base: GuestAddr,
    size: u32,
}

impl GuestBlock {
    /// Allocate `size` bytes of guest memory
    pub fn allocate(memory: Arc<dyn GuestMemory>, size: u32, label: &str) -> HalResult<Self> {
        let base = memory.alloc(size, label)?;
        Ok(Self { memory, base, size })
    }

    /// Lowest address
    pub fn base(&self) -> GuestAddr {
        self.base
    }

    /// One past the highest address
    pub fn end(&self) -> GuestAddr {
        self.base.add(self.size)
    }

    /// Size in bytes
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Check if address is within the block
    pub fn contains(&self, addr: GuestAddr) -> bool {
        addr >= self.base && addr < self.end()
    }

    /// Memory the block lives in
    pub fn memory(&self) -> &Arc<dyn GuestMemory> {
        &self.memory
    }
}

impl Drop for GuestBlock {
    fn drop(&mut self) {
        self.memory.free(self.base);
    }
}

impl fmt::Debug for GuestBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestBlock")
            .field("base", &self.base)
            .field("size", &self.size)
            .finish()
    }
}

/// Guest thread stack (grows down from [`top`](Self::top))
#[derive(Debug)]
pub struct ThreadStack {
    block: GuestBlock,
}

impl ThreadStack {
    /// Allocate a stack and fill it with [`STACK_FILL`]
    pub fn allocate(memory: Arc<dyn GuestMemory>, size: u32, label: &str) -> HalResult<Self> {
        let block = GuestBlock::allocate(memory, size, label)?;
        block.memory().fill(block.base(), size, STACK_FILL)?;
        Ok(Self { block })
    }

    /// Get stack base (lowest address)
    pub fn base(&self) -> GuestAddr {
        self.block.base()
    }

    /// Get stack top (one past the highest address)
    pub fn top(&self) -> GuestAddr {
        self.block.end()
    }

    /// Get stack size
    pub fn size(&self) -> u32 {
        self.block.size()
    }

    /// Check if address points into the stack
    pub fn contains(&self, addr: GuestAddr) -> bool {
        self.block.contains(addr)
    }

    /// Check if `sp` is a valid stack pointer for this stack
    pub fn holds_stack_pointer(&self, sp: GuestAddr) -> bool {
        sp >= self.base() && sp <= self.top()
    }
}

/// Copy the used part of `source`'s stack onto `dest`'s stack
///
/// The bytes between the source stack pointer and its top land at the
/// same top-relative offset in the destination, and the destination stack
/// pointer is moved to match. An `argp` pointing into the source stack is
/// re-expressed at the same offset in the destination; any other pointer
/// comes back unchanged.
pub fn relocate_stack(
    memory: &dyn GuestMemory,
    source: &GuestThread,
    dest: &GuestThread,
    argp: GuestAddr,
) -> ExecResult<GuestAddr> {
    let old_stack = source.stack();
    let new_stack = dest.stack();

    let old_sp = source.cpu().read_stack_pointer();
    if !old_stack.holds_stack_pointer(old_sp) {
        log::error!(
            "Thread {} stack pointer {} is outside its stack {}..{}",
            source.name(),
            old_sp,
            old_stack.base(),
            old_stack.top()
        );
        return Err(ExecError::InvalidState);
    }

    let used = old_stack.top().offset_from(old_sp);
    if used > new_stack.size() {
        return Err(ExecError::InvalidArgument);
    }
    let new_sp = new_stack.top().sub(used);

    memory.copy(old_sp, new_sp, used)?;
    dest.cpu().write_stack_pointer(new_sp);

    if old_stack.contains(argp) {
        let offset = old_stack.top().offset_from(argp);
        if offset > new_stack.size() {
            return Err(ExecError::InvalidArgument);
        }
        Ok(new_stack.top().sub(offset))
    } else {
        Ok(argp)
    }
}

impl Kernel {
    /// Clone the live stack of `source` onto the new thread `thid`
    ///
    /// Returns `argp` relocated into the new stack when it pointed into the
    /// source stack.
    pub fn copy_stack(
        &self,
        thid: ThreadId,
        source: ThreadId,
        argp: GuestAddr,
    ) -> ExecResult<GuestAddr> {
        let new_thread = self.find(thid).ok_or(ExecError::UnknownThread)?;
        let old_thread = self.find(source).ok_or(ExecError::UnknownThread)?;

        let _table = self.table();
        relocate_stack(self.memory().as_ref(), &old_thread, &new_thread, argp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, MockPlan};
    use crate::KernelConfig;
    use orrery_hal::GuestAddr;

    #[test]
    fn test_block_frees_on_drop() {
        let memory = testing::memory();
        let before = memory.stats().free_pages;
        let block = GuestBlock::allocate(memory.clone(), 0x2000, "block").unwrap();
        assert!(block.contains(block.base()));
        assert!(!block.contains(block.end()));
        assert_eq!(memory.stats().free_pages, before - 2);
        drop(block);
        assert_eq!(memory.stats().free_pages, before);
    }

    #[test]
    fn test_copy_stack_relocates_used_region() {
        let (kernel, memory, _plan) = testing::kernel(KernelConfig::default(), MockPlan::new());
        let parent = kernel.create_thread(testing::ENTRY, "parent", 64, 0x4000, None).unwrap();
        let child = kernel.create_thread(testing::ENTRY, "child", 64, 0x8000, None).unwrap();
        let parent_rec = kernel.find(parent).unwrap();
        let child_rec = kernel.find(child).unwrap();

        let used = 0x40u32;
        let old_top = parent_rec.stack().top();
        let old_sp = old_top.sub(used);
        let frame: Vec<u8> = (0..used as u8).collect();
        memory.write(old_sp, &frame).unwrap();
        parent_rec.cpu().write_stack_pointer(old_sp);

        let argp = old_top.sub(10);
        let moved = kernel.copy_stack(child, parent, argp).unwrap();

        let new_top = child_rec.stack().top();
        assert_eq!(moved, new_top.sub(10));
        assert_eq!(child_rec.cpu().read_stack_pointer(), new_top.sub(used));
        assert_eq!(memory.read_vec(new_top.sub(used), used).unwrap(), frame);
        // Below the copied frame the child stack keeps its fill pattern.
        assert_eq!(memory.read_vec(new_top.sub(used + 4), 4).unwrap(), [STACK_FILL; 4]);
    }

    #[test]
    fn test_copy_stack_leaves_foreign_pointer() {
        let (kernel, _memory, _plan) = testing::kernel(KernelConfig::default(), MockPlan::new());
        let parent = kernel.create_thread(testing::ENTRY, "parent", 64, 0x1000, None).unwrap();
        let child = kernel.create_thread(testing::ENTRY, "child", 64, 0x1000, None).unwrap();

        let outside = GuestAddr::new(0x1234_5678);
        assert_eq!(kernel.copy_stack(child, parent, outside).unwrap(), outside);

        // Untouched parent: sp == top, nothing to copy.
        let child_rec = kernel.find(child).unwrap();
        assert_eq!(child_rec.cpu().read_stack_pointer(), child_rec.stack().top());
    }

    #[test]
    fn test_copy_stack_rejects_oversized_frame() {
        let (kernel, _memory, _plan) = testing::kernel(KernelConfig::default(), MockPlan::new());
        let parent = kernel.create_thread(testing::ENTRY, "parent", 64, 0x4000, None).unwrap();
        let child = kernel.create_thread(testing::ENTRY, "child", 64, 0x1000, None).unwrap();
        let parent_rec = kernel.find(parent).unwrap();
        parent_rec.cpu().write_stack_pointer(parent_rec.stack().top().sub(0x2000));

        assert_eq!(
            kernel.copy_stack(child, parent, GuestAddr::NULL),
            Err(ExecError::InvalidArgument)
        );
    }

    #[test]
    fn test_copy_stack_unknown_thread() {
        let (kernel, _memory, _plan) = testing::kernel(KernelConfig::default(), MockPlan::new());
        let parent = kernel.create_thread(testing::ENTRY, "parent", 64, 0x1000, None).unwrap();
        assert_eq!(
            kernel.copy_stack(ThreadId::new(999), parent, GuestAddr::NULL),
            Err(ExecError::UnknownThread)
        );
    }
}
