//! Privileged machine operations the process core needs.
//!
//! [`X86Cpu`](crate::arch::x86::X86Cpu) implements this on the target; tests
//! substitute a recording double.

use crate::context::ContextPtr;
use crate::tss::TaskState;
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::address_space::RootPage;

pub trait Cpu {
    /// Make `root` the active translation context (`mov cr3`).
    fn load_page_directory(&mut self, root: RootPage);

    /// Install `tss` as the task state the CPU consults on ring changes.
    ///
    /// `tss` must stay at the same address for as long as it is installed.
    fn load_task_state(&mut self, tss: &mut TaskState);

    fn enable_interrupts(&mut self);

    fn disable_interrupts(&mut self);

    /// Address of the code a freshly prepared context resumes into; it pops
    /// the trap frame and `iret`s to user mode.
    fn entry_trampoline(&self) -> u32;

    /// Byte view of `[start, start + len)` in the *active* translation context.
    ///
    /// # Safety
    /// The range must be mapped writable in the active space and stay so for
    /// `'a`; the active space must not change while the slice is alive.
    unsafe fn user_memory<'a>(&mut self, start: VirtualAddress, len: u32) -> &'a mut [u8];

    /// Save the running context into `save` and resume `to`. Returns when
    /// something later resumes the saved context.
    ///
    /// Takes raw pointers: the code that runs before this returns (the trap
    /// path of the task) reaches the same CPU and slot, so no reference to
    /// either may be live across the call.
    ///
    /// # Safety
    /// `to` must be a valid suspended context whose stack is alive. `this`
    /// and `save` must be valid and stay so until the saved context resumes.
    unsafe fn suspend_and_save(this: *mut Self, save: *mut Option<ContextPtr>, to: ContextPtr);

    /// Resume `to`, abandoning the running context for good.
    ///
    /// # Safety
    /// `to` must be a valid suspended context whose stack is alive; `this`
    /// must be valid.
    unsafe fn resume(this: *mut Self, to: ContextPtr) -> !;
}
