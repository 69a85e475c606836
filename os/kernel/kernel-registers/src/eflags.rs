use bitfield_struct::bitfield;

/// Architectural EFLAGS model for 32-bit protected mode.
///
/// Reserved bits are modeled as private fields with their architectural
/// defaults so a freshly built value is always legal to `iret` with.
#[bitfield(u32, order = Lsb)]
pub struct Eflags {
    /// Carry Flag
    pub cf_carry: bool, // 0

    /// Always 1.
    #[bits(default = true)]
    _always1: bool, // 1

    /// Parity Flag
    pub pf_parity: bool, // 2

    #[bits(default = false)]
    _rsvd3: bool, // 3

    /// Adjust Flag
    pub af_adjust: bool, // 4

    #[bits(default = false)]
    _rsvd5: bool, // 5

    /// Zero Flag
    pub zf_zero: bool, // 6

    /// Sign Flag
    pub sf_sign: bool, // 7

    /// Trap Flag
    pub tf_trap: bool, // 8

    /// Interrupt Enable Flag
    pub if_interrupt_enable: bool, // 9

    /// Direction Flag
    pub df_direction: bool, // 10

    /// Overflow Flag
    pub of_overflow: bool, // 11

    /// I/O Privilege Level (2 bits)
    #[bits(2)]
    pub iopl: u8, // 12–13

    /// Nested Task
    pub nt_nested: bool, // 14

    #[bits(default = false)]
    _rsvd15: bool, // 15

    /// Resume Flag
    pub rf_resume: bool, // 16

    /// Virtual 8086 mode
    pub vm_virtual_8086: bool, // 17

    /// Alignment Check
    pub ac_alignment_check: bool, // 18

    /// Virtual Interrupt Flag
    pub vif_virtual_interrupt: bool, // 19

    /// Virtual Interrupt Pending
    pub vip_virtual_interrupt_pending: bool, // 20

    /// ID Flag: allows toggling CPUID.
    pub id_cpuid: bool, // 21

    #[bits(10, default = 0)]
    _reserved_rest: u16,
}

impl Eflags {
    /// Flags a fresh user task starts with: only `IF` (and the fixed bit 1) set.
    #[inline]
    #[must_use]
    pub const fn user_entry() -> Self {
        Self::new().with_if_interrupt_enable(true)
    }
}

/// Disables hardware interrupts (`cli`).
///
/// # Safety & Privilege
///
/// Must only be called in contexts where `cli` is permitted.
#[cfg(all(feature = "asm", target_arch = "x86"))]
#[inline]
pub fn cli_stop_interrupts() {
    // No `nomem`: memory accesses must not be moved out of the critical section.
    unsafe { core::arch::asm!("cli", options(nostack)) }
}

/// Enables hardware interrupts (`sti`).
///
/// # Safety & Privilege
///
/// Must only be called in contexts where `sti` is permitted.
#[cfg(all(feature = "asm", target_arch = "x86"))]
#[inline]
pub fn sti_enable_interrupts() {
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
    unsafe { core::arch::asm!("sti", options(nostack)) }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl crate::LoadRegister for Eflags {
    #[inline]
    fn load() -> Self {
        let r: u32;
        unsafe { core::arch::asm!("pushfd; pop {}", out(reg) r, options(preserves_flags)) }
        Self::from_bits(r)
    }
}
