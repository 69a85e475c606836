//! # Enter and leave
//!
//! The kernel and the user program take turns on the CPU. Entering saves the
//! kernel context in the slot and resumes the task's; leaving resumes the
//! saved kernel context, which then returns out of the enter call.
//!
//! Both handoffs take the slot as a raw pointer. While the task runs, its
//! trap path uses the same slot ([`kill`](Process::kill),
//! [`user_readable_after`](Process::user_readable_after)), so the enter call
//! must not hold a `&mut` to it across the switch.

use crate::context::ContextPtr;
use crate::cpu::Cpu;
use crate::error::ProcError;
use crate::memory::MemoryManager;
use crate::process::Process;
use core::sync::atomic::{Ordering, fence};
use log::info;

impl<M: MemoryManager, C: Cpu> Process<M, C> {
    /// Hand the CPU to `to`, keeping the kernel context in the slot. Returns
    /// once the task has been killed.
    ///
    /// # Safety
    /// `this` must point at a live slot that stays put until this returns,
    /// and `to` must be the context [`load`](Self::load) prepared for it.
    pub unsafe fn enter(this: *mut Self, to: ContextPtr) {
        unsafe { C::suspend_and_save(&raw mut (*this).cpu, &raw mut (*this).kernel_context, to) };
    }

    /// The teardown half of [`kill`](Self::kill): back to kernel space,
    /// release the program's address space, and yield the context to resume.
    ///
    /// Interrupts are off while the address space goes away. The task page
    /// stays allocated for the next load.
    ///
    /// # Errors
    /// Nothing is touched if no program is loaded or no kernel context is
    /// saved.
    pub fn terminate(&mut self) -> Result<ContextPtr, ProcError> {
        let Some(mut task) = self.task else {
            return Err(ProcError::NoActiveTask);
        };
        let task = unsafe { task.as_mut() };
        if task.space.is_none() {
            return Err(ProcError::NoActiveTask);
        }
        let to = self.kernel_context.take().ok_or(ProcError::NoKernelContext)?;

        self.cpu.disable_interrupts();
        self.cpu.load_page_directory(self.memory.kernel_root());
        if let Some(space) = task.space.take() {
            self.memory.destroy_address_space(space);
        }
        fence(Ordering::SeqCst);
        self.cpu.enable_interrupts();
        info!("task terminated");
        Ok(to)
    }

    /// Terminate the running program and resume the kernel inside its
    /// [`enter`](Self::enter) call. Called from the trap path of the program
    /// itself.
    ///
    /// # Safety
    /// `this` must point at the live slot whose task is running.
    ///
    /// # Panics
    /// Without a loaded program, e.g. when called twice without a load in
    /// between. That is a caller bug.
    pub unsafe fn kill(this: *mut Self) -> ! {
        let to = match unsafe { (*this).terminate() } {
            Ok(to) => to,
            Err(e) => panic!("killproc without an active task: {e}"),
        };
        unsafe { C::resume(&raw mut (*this).cpu, to) }
    }
}
