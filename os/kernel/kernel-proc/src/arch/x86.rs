//! # i386 backend
//!
//! The two pieces of hand-written assembly the process core cannot do without:
//!
//! - [`swtch`] saves the callee-saved registers on the current stack, records
//!   the resulting stack pointer, loads the target stack pointer and pops the
//!   target's registers. The layout it pushes is exactly [`ExecutionContext`].
//! - [`trapret`] pops a [`TrapFrame`](crate::TrapFrame) and `iret`s. A freshly
//!   prepared task context "returns" into it.

use crate::context::{ContextPtr, ExecutionContext};
use crate::cpu::Cpu;
use crate::selectors::{GDT_TSS, TASK_STATE};
use crate::tss::{TaskState, TssDescriptor};
use core::ptr::NonNull;
use kernel_memory_addresses::VirtualAddress;
use kernel_registers::StoreRegisterUnsafe;
use kernel_registers::cr3::Cr3;
use kernel_registers::eflags::{cli_stop_interrupts, sti_enable_interrupts};
use kernel_vmem::address_space::RootPage;

/// Save the running context to `*old` and switch to `new`.
///
/// ```text
///   push ebp, ebx, esi, edi   ; ExecutionContext, lowest field first
///   *old = esp
///   esp  = new
///   pop  edi, esi, ebx, ebp
///   ret                       ; ExecutionContext::eip
/// ```
///
/// # Safety
/// `new` must point at a context saved by `swtch` or prepared by
/// [`KernelStack::reset`](crate::KernelStack::reset), on a live stack.
#[unsafe(naked)]
pub unsafe extern "C" fn swtch(old: *mut *mut ExecutionContext, new: *mut ExecutionContext) {
    core::arch::naked_asm!(
        "mov eax, [esp + 4]",
        "mov edx, [esp + 8]",
        "push ebp",
        "push ebx",
        "push esi",
        "push edi",
        "mov [eax], esp",
        "mov esp, edx",
        "pop edi",
        "pop esi",
        "pop ebx",
        "pop ebp",
        "ret",
    );
}

/// Pop a trap frame and return to the interrupted (or fresh) user context.
///
/// Entered with `esp` pointing at the frame's `gs` slot.
#[unsafe(naked)]
pub extern "C" fn trapret() {
    core::arch::naked_asm!(
        "pop gs",
        "pop fs",
        "pop es",
        "pop ds",
        "popad",
        // int_no, err_code
        "add esp, 8",
        "iretd",
    );
}

/// The running CPU.
pub struct X86Cpu {
    gdt: NonNull<u64>,
}

impl X86Cpu {
    /// # Safety
    /// `gdt` must be the loaded GDT, with at least `GDT_TSS + 1` writable
    /// descriptors, and there must be only one `X86Cpu`.
    #[must_use]
    pub const unsafe fn new(gdt: NonNull<u64>) -> Self {
        Self { gdt }
    }
}

impl Cpu for X86Cpu {
    fn load_page_directory(&mut self, root: RootPage) {
        unsafe { Cr3::from_pd_frame(root, false, false).store_unsafe() };
    }

    fn load_task_state(&mut self, tss: &mut TaskState) {
        let desc = TssDescriptor::for_task_state(tss);
        unsafe {
            // A fresh "available" descriptor; ltr refuses a busy one.
            self.gdt.add(usize::from(GDT_TSS)).write_volatile(desc.into_bits());
            core::arch::asm!(
                "ltr {0:x}",
                in(reg) TASK_STATE.encode(),
                options(nostack, preserves_flags)
            );
        }
    }

    fn enable_interrupts(&mut self) {
        sti_enable_interrupts();
    }

    fn disable_interrupts(&mut self) {
        cli_stop_interrupts();
    }

    #[allow(clippy::cast_possible_truncation)]
    fn entry_trampoline(&self) -> u32 {
        trapret as usize as u32
    }

    unsafe fn user_memory<'a>(&mut self, start: VirtualAddress, len: u32) -> &'a mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(start.as_usize() as *mut u8, len as usize) }
    }

    unsafe fn suspend_and_save(_this: *mut Self, save: *mut Option<ContextPtr>, to: ContextPtr) {
        // Option<ContextPtr> has the layout of a nullable context pointer.
        unsafe { swtch(save.cast::<*mut ExecutionContext>(), to.as_ptr()) };
    }

    unsafe fn resume(_this: *mut Self, to: ContextPtr) -> ! {
        let mut abandoned: *mut ExecutionContext = core::ptr::null_mut();
        unsafe { swtch(&raw mut abandoned, to.as_ptr()) };
        panic!("abandoned context at {abandoned:p} was resumed");
    }
}
