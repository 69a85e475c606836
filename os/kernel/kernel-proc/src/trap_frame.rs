use crate::selectors::{USER_CODE, USER_DATA};
use kernel_memory_addresses::VirtualAddress;
use kernel_registers::eflags::Eflags;

/// Register image saved on a privilege transition into the kernel and consumed
/// by the return path back into user mode.
///
/// Layout must match the interrupt stub's push order and the trampoline's pops,
/// lowest address first:
///
/// ```text
///   +0   gs, fs, es, ds            pushed by the stub / `pop` ×4 in trapret
///   +16  edi … eax                 `pusha` / `popa`
///   +48  int_no, err_code          skipped with `add esp, 8`
///   +56  eip, cs, eflags           pushed by the CPU / `iret`
///   +68  useresp, ss               only on a ring change
/// ```
///
/// The frame ends exactly at the kernel stack top, which is what the task
/// state's `esp0` points to, so the CPU's pushes land in `eip..ss`.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
#[repr(C)]
pub struct TrapFrame {
    pub gs: u32,
    pub fs: u32,
    pub es: u32,
    pub ds: u32,
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    /// Ignored by `popa`.
    pub esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub int_no: u32,
    pub err_code: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub useresp: u32,
    pub ss: u32,
}

impl TrapFrame {
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            gs: 0,
            fs: 0,
            es: 0,
            ds: 0,
            edi: 0,
            esi: 0,
            ebp: 0,
            esp: 0,
            ebx: 0,
            edx: 0,
            ecx: 0,
            eax: 0,
            int_no: 0,
            err_code: 0,
            eip: 0,
            cs: 0,
            eflags: 0,
            useresp: 0,
            ss: 0,
        }
    }

    /// Fill in what the first `iret` into ring 3 needs: user selectors
    /// everywhere, interrupts enabled, the given entry point and stack.
    ///
    /// General-purpose registers are left as they are (zero after a reset).
    pub const fn prepare_user_entry(&mut self, entry: VirtualAddress, user_sp: VirtualAddress) {
        let data = USER_DATA.encode() as u32;
        self.eip = entry.as_u32();
        self.cs = USER_CODE.encode() as u32;
        self.ds = data;
        self.es = data;
        self.fs = data;
        self.gs = data;
        self.ss = data;
        self.eflags = Eflags::user_entry().into_bits();
        self.useresp = user_sp.as_u32();
    }

    /// `true` if this frame returns to ring 3.
    #[inline]
    #[must_use]
    pub const fn returns_to_user(&self) -> bool {
        self.cs & 0b11 == 3
    }
}

const _: () = {
    assert!(size_of::<TrapFrame>() == 19 * 4);
    assert!(core::mem::offset_of!(TrapFrame, eip) == 56);
};
