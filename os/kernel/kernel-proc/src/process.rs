//! # Process slot
//!
//! The one place that knows about the running program: the kernel's own
//! suspended context while the program runs, and the single [`Task`].
//!
//! The task page is allocated by the first successful load and never freed;
//! every later load reinitialises it. Only the address space inside it comes
//! and goes.

use crate::context::ContextPtr;
use crate::cpu::Cpu;
use crate::memory::MemoryManager;
use crate::task::Task;
use core::ptr::NonNull;
use kernel_info::memory::KERNBASE;
use kernel_memory_addresses::VirtualAddress;
use log::debug;

/// The process slot: the kernel's context while a program runs, and the one
/// task that program lives in.
///
/// Entering and killing go through raw pointers to the slot (see
/// [`enter`](Self::enter)); everything else borrows it.
pub struct Process<M: MemoryManager, C: Cpu> {
    /// Saved by the enter handoff, consumed by the leave handoff.
    pub(crate) kernel_context: Option<ContextPtr>,
    pub(crate) task: Option<NonNull<Task>>,
    pub(crate) memory: M,
    pub(crate) cpu: C,
}

impl<M: MemoryManager, C: Cpu> Process<M, C> {
    /// An empty slot. The task page is allocated by the first load.
    pub const fn new(memory: M, cpu: C) -> Self {
        Self {
            kernel_context: None,
            task: None,
            memory,
            cpu,
        }
    }

    /// The task page, once a load got far enough to allocate it.
    #[must_use]
    pub fn task(&self) -> Option<&Task> {
        // The page is ours alone and outlives the slot.
        self.task.map(|t| unsafe { t.as_ref() })
    }

    /// Whether a loaded program owns an address space right now.
    #[must_use]
    pub fn has_active_task(&self) -> bool {
        self.task().is_some_and(|t| t.space.is_some())
    }

    #[must_use]
    pub const fn kernel_context(&self) -> Option<ContextPtr> {
        self.kernel_context
    }

    #[must_use]
    pub const fn memory(&self) -> &M {
        &self.memory
    }

    pub const fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    #[must_use]
    pub const fn cpu(&self) -> &C {
        &self.cpu
    }

    pub const fn cpu_mut(&mut self) -> &mut C {
        &mut self.cpu
    }

    /// Number of contiguous bytes from `ptr` that the running program may
    /// read.
    ///
    /// Zero for kernel addresses and when no program is loaded. System-call
    /// handlers refuse a user buffer unless this covers all of it.
    #[must_use]
    pub fn user_readable_after(&self, ptr: u32) -> u32 {
        if ptr >= KERNBASE {
            return 0;
        }
        let Some(space) = self.task().and_then(|t| t.space.as_ref()) else {
            debug!("user_readable_after({ptr:#010x}) without a task");
            return 0;
        };
        self.memory.user_readable_after(space, VirtualAddress::new(ptr))
    }

    /// Tear the slot down and hand the collaborators back.
    ///
    /// An address space still held (a program that never terminated, or a
    /// load that failed after creating it) is destroyed from kernel space.
    pub fn shutdown(mut self) -> (M, C) {
        if let Some(mut task) = self.task {
            let task = unsafe { task.as_mut() };
            if let Some(space) = task.space.take() {
                debug!("shutdown: releasing address space {}", space.root_page());
                self.cpu.load_page_directory(self.memory.kernel_root());
                self.memory.destroy_address_space(space);
            }
        }
        (self.memory, self.cpu)
    }
}
