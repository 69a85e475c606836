//! # Task and its kernel stack
//!
//! ```text
//!   low addresses                                       high addresses
//!  ┌──────────────────────────────┬──────────────────┬─────────────┐
//!  │ scratch (400 words)          │ ExecutionContext │  TrapFrame  │ ← esp0
//!  │ ↓ handlers run down into it  │ first resume     │ CPU pushes  │
//!  └──────────────────────────────┴──────────────────┴─────────────┘
//! ```
//!
//! Before the first entry the context's `eip` is the trampoline. Resuming the
//! context pops it, "returns" into the trampoline with the stack pointer right
//! at the trap frame, and the trampoline `iret`s through the frame into user
//! mode. From then on the trap frame is overwritten by every trap from ring 3.

use crate::context::{ContextPtr, ExecutionContext};
use crate::trap_frame::TrapFrame;
use crate::tss::TaskState;
use core::mem::{offset_of, size_of};
use core::ptr::NonNull;
use kernel_info::memory::{KERNEL_STACK_SCRATCH_WORDS, PAGE_SIZE};
use kernel_vmem::AddressSpace;

/// A task's private kernel stack with the saved context and trap frame at
/// its high end.
#[derive(Debug)]
#[repr(C)]
pub struct KernelStack {
    scratch: [u32; KERNEL_STACK_SCRATCH_WORDS],
    pub context: ExecutionContext,
    pub trap_frame: TrapFrame,
}

impl KernelStack {
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            scratch: [0; KERNEL_STACK_SCRATCH_WORDS],
            context: ExecutionContext::zeroed(),
            trap_frame: TrapFrame::zeroed(),
        }
    }

    /// Zero the whole region and arm the context to resume in `trampoline`.
    pub fn reset(&mut self, trampoline: u32) {
        *self = Self::zeroed();
        self.context.eip = trampoline;
    }

    /// One past the last byte of the stack: the initial `esp0`.
    #[inline]
    #[must_use]
    pub fn top(&self) -> *const u8 {
        core::ptr::from_ref(self).cast::<u8>().wrapping_add(size_of::<Self>())
    }

    /// The saved context, as a switch target.
    #[inline]
    #[must_use]
    pub fn context_ptr(&mut self) -> ContextPtr {
        ContextPtr::new(NonNull::from(&mut self.context))
    }
}

/// Bookkeeping for the one loaded user program.
///
/// Lives in a single page obtained from the memory manager and is reused
/// across loads; only its address space changes.
#[derive(Debug)]
#[repr(C)]
pub struct Task {
    pub tss: TaskState,
    /// Exclusively owned. `None` before the first load and after termination.
    pub space: Option<AddressSpace>,
    pub stack: KernelStack,
}

impl Task {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tss: TaskState::new(),
            space: None,
            stack: KernelStack::zeroed(),
        }
    }
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}

const _: () = {
    assert!(size_of::<Task>() <= PAGE_SIZE as usize);
    assert!(align_of::<Task>() <= PAGE_SIZE as usize);
    assert!(
        offset_of!(KernelStack, trap_frame)
            == offset_of!(KernelStack, context) + size_of::<ExecutionContext>()
    );
    assert!(offset_of!(KernelStack, trap_frame) + size_of::<TrapFrame>() == size_of::<KernelStack>());
};
