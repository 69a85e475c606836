//! # 32-bit Task State Segment (TSS)
//!
//! The kernel never uses hardware task switching. The TSS is only consulted
//! on a privilege transition from ring 3 into ring 0 (interrupt, exception,
//! `int 0x80`): the CPU loads `ss0:esp0` from it and pushes the user's
//! `ss, esp, eflags, cs, eip` onto that stack before running the handler.
//!
//! Each [`Task`](crate::Task) embeds its own `TaskState` whose `esp0` points
//! at the top of the task's kernel stack, i.e. just past its trap frame. The
//! GDT slot for the TSS is rewritten with a fresh *available* descriptor every
//! time a task is activated, which also clears the busy bit a previous `ltr`
//! left behind.

use crate::selectors::SegmentSelector;
use bitfield_struct::bitfield;
use core::mem::size_of;

/// 32-bit Task State Segment as defined by the i386 architecture.
///
/// All selector slots are 16 bits followed by 16 reserved bits.
#[derive(Debug, Clone, Eq, PartialEq)]
#[repr(C)]
pub struct TaskState {
    pub link: u16,
    _r0: u16,
    /// Ring-0 stack pointer loaded on a privilege change into the kernel.
    pub esp0: u32,
    /// Ring-0 stack segment paired with `esp0`.
    pub ss0: u16,
    _r1: u16,
    pub esp1: u32,
    pub ss1: u16,
    _r2: u16,
    pub esp2: u32,
    pub ss2: u16,
    _r3: u16,
    pub cr3: u32,
    pub eip: u32,
    pub eflags: u32,
    pub eax: u32,
    pub ecx: u32,
    pub edx: u32,
    pub ebx: u32,
    pub esp: u32,
    pub ebp: u32,
    pub esi: u32,
    pub edi: u32,
    pub es: u16,
    _r4: u16,
    pub cs: u16,
    _r5: u16,
    pub ss: u16,
    _r6: u16,
    pub ds: u16,
    _r7: u16,
    pub fs: u16,
    _r8: u16,
    pub gs: u16,
    _r9: u16,
    pub ldt: u16,
    _r10: u16,
    /// Debug trap on task switch (bit 0).
    pub trap: u16,
    /// Offset of the I/O permission bitmap. Pointing it at the end of the
    /// segment means "no bitmap": ring 3 gets no port access.
    pub iomb: u16,
}

/// Size of the architectural TSS in bytes.
pub const TSS_SIZE: u32 = size_of::<TaskState>() as u32;

impl TaskState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            link: 0,
            _r0: 0,
            esp0: 0,
            ss0: 0,
            _r1: 0,
            esp1: 0,
            ss1: 0,
            _r2: 0,
            esp2: 0,
            ss2: 0,
            _r3: 0,
            cr3: 0,
            eip: 0,
            eflags: 0,
            eax: 0,
            ecx: 0,
            edx: 0,
            ebx: 0,
            esp: 0,
            ebp: 0,
            esi: 0,
            edi: 0,
            es: 0,
            _r4: 0,
            cs: 0,
            _r5: 0,
            ss: 0,
            _r6: 0,
            ds: 0,
            _r7: 0,
            fs: 0,
            _r8: 0,
            gs: 0,
            _r9: 0,
            ldt: 0,
            _r10: 0,
            trap: 0,
            iomb: TSS_SIZE as u16,
        }
    }

    /// Point the ring-0 stack at `ss0:esp0`.
    #[inline]
    pub const fn set_kernel_stack(&mut self, ss0: SegmentSelector, esp0: u32) {
        self.ss0 = ss0.encode();
        self.esp0 = esp0;
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::new()
    }
}

/// Type nibble of an available (not busy) 32-bit TSS.
pub const TSS_TYPE_AVAILABLE: u8 = 0x9;
/// Type nibble the CPU writes back after `ltr`.
pub const TSS_TYPE_BUSY: u8 = 0xB;

/// 8-byte GDT system-segment descriptor for a 32-bit TSS.
///
/// ```text
///  63      56 55 52 51  48 47 46 45 44 43  40 39        16 15         0
/// +----------+-----+------+--+-----+--+-----+------------+------------+
/// | base     |G 0 0|limit | P| DPL | S| type| base       | limit      |
/// | [31:24]  |  A  |[19:16]  |     | 0|     | [23:0]     | [15:0]     |
/// +----------+-----+------+--+-----+--+-----+------------+------------+
/// ```
#[bitfield(u64)]
#[derive(Eq, PartialEq)]
pub struct TssDescriptor {
    #[bits(16)]
    pub limit_low: u16,
    #[bits(24)]
    pub base_low: u32,
    /// `0x9` available, `0xB` busy.
    #[bits(4)]
    pub segment_type: u8,
    /// Descriptor type: 0 for system segments.
    pub code_or_data: bool,
    #[bits(2)]
    pub dpl: u8,
    pub present: bool,
    #[bits(4)]
    pub limit_high: u8,
    pub avl: bool,
    pub long_mode: bool,
    pub default_big: bool,
    pub granularity: bool,
    #[bits(8)]
    pub base_high: u8,
}

impl TssDescriptor {
    /// Present, DPL 0, available 32-bit TSS at `base` spanning `limit + 1` bytes.
    #[must_use]
    pub const fn available(base: u32, limit: u32) -> Self {
        Self::new()
            .with_limit_low((limit & 0xFFFF) as u16)
            .with_limit_high(((limit >> 16) & 0xF) as u8)
            .with_base_low(base & 0x00FF_FFFF)
            .with_base_high((base >> 24) as u8)
            .with_segment_type(TSS_TYPE_AVAILABLE)
            .with_present(true)
    }

    /// Descriptor for `tss` at its current address.
    #[must_use]
    pub fn for_task_state(tss: &TaskState) -> Self {
        // usize is 32 bits wide on the target.
        #[allow(clippy::cast_possible_truncation)]
        let base = core::ptr::from_ref(tss) as usize as u32;
        Self::available(base, TSS_SIZE - 1)
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> u32 {
        ((self.base_high() as u32) << 24) | self.base_low()
    }

    #[inline]
    #[must_use]
    pub const fn limit(self) -> u32 {
        ((self.limit_high() as u32) << 16) | self.limit_low() as u32
    }
}

const _: () = {
    assert!(size_of::<TaskState>() == 104);
    assert!(core::mem::offset_of!(TaskState, esp0) == 4);
    assert!(core::mem::offset_of!(TaskState, ss0) == 8);
    assert!(core::mem::offset_of!(TaskState, iomb) == 102);
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selectors::KERNEL_DATA;

    #[test]
    fn io_bitmap_is_disabled_by_default() {
        assert_eq!(TaskState::new().iomb, 104);
    }

    #[test]
    fn kernel_stack_is_set() {
        let mut tss = TaskState::new();
        tss.set_kernel_stack(KERNEL_DATA, 0x8012_3000);
        assert_eq!(tss.ss0, 0x10);
        assert_eq!(tss.esp0, 0x8012_3000);
    }

    #[test]
    fn descriptor_encoding() {
        let d = TssDescriptor::available(0x1234_5678, 103);
        assert_eq!(d.into_bits(), 0x1200_8934_5678_0067);
        assert_eq!(d.base(), 0x1234_5678);
        assert_eq!(d.limit(), 103);
        assert_eq!(d.segment_type(), TSS_TYPE_AVAILABLE);
        assert!(!d.code_or_data());
    }
}
