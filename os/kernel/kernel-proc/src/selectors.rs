//! # Segment selectors for the flat 32-bit GDT
//!
//! ```text
//!  15            3 2  1  0
//! +----------------+--+----+
//! |   Index[12:0]  |TI| RPL|
//! +----------------+--+----+  (TI=0 → GDT, TI=1 → LDT; RPL=0..3)
//! ```
//!
//! The boot code installs the GDT in this order:
//!
//! | Index | Descriptor | Selector |
//! |-------|------------|----------|
//! | 0 | null | – |
//! | 1 | kernel code | `0x08` |
//! | 2 | kernel data | `0x10` |
//! | 3 | user code (DPL 3) | `0x1B` |
//! | 4 | user data (DPL 3) | `0x23` |
//! | 5 | task state segment | `0x28` |

use bitfield_struct::bitfield;

pub const GDT_KERNEL_DATA: u16 = 2;
pub const GDT_USER_CODE: u16 = 3;
pub const GDT_USER_DATA: u16 = 4;
pub const GDT_TSS: u16 = 5;

/// Requested Privilege Level (RPL), the low two bits of a selector.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum Rpl {
    Ring0 = 0,
    Ring1 = 1,
    Ring2 = 2,
    Ring3 = 3,
}

impl Rpl {
    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u8 {
        self as u8
    }

    #[inline]
    #[must_use]
    pub const fn from_bits(value: u8) -> Self {
        match value & 0b11 {
            0 => Self::Ring0,
            1 => Self::Ring1,
            2 => Self::Ring2,
            _ => Self::Ring3,
        }
    }
}

/// Which descriptor table a selector addresses.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum Table {
    Gdt = 0,
    Ldt = 1,
}

impl Table {
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        if bits == 0 { Self::Gdt } else { Self::Ldt }
    }

    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u8 {
        self as u8
    }
}

/// 16-bit selector encoding (index/TI/RPL).
#[bitfield(u16)]
#[derive(Eq, PartialEq)]
pub struct SegmentSelector {
    /// Requested Privilege Level (bits 0..1).
    #[bits(2)]
    pub rpl: Rpl,
    /// Table Indicator (bit 2).
    #[bits(1)]
    pub ti: Table,
    /// Descriptor index (bits 3..15).
    #[bits(13)]
    pub index: u16,
}

impl SegmentSelector {
    /// A GDT selector for `index` with the given RPL.
    #[inline]
    #[must_use]
    pub const fn gdt(index: u16, rpl: Rpl) -> Self {
        Self::new().with_index(index).with_ti(Table::Gdt).with_rpl(rpl)
    }

    /// The value loaded into a segment register or written into a frame.
    #[inline]
    #[must_use]
    pub const fn encode(self) -> u16 {
        self.into_bits()
    }
}

pub const KERNEL_DATA: SegmentSelector = SegmentSelector::gdt(GDT_KERNEL_DATA, Rpl::Ring0);
pub const USER_CODE: SegmentSelector = SegmentSelector::gdt(GDT_USER_CODE, Rpl::Ring3);
pub const USER_DATA: SegmentSelector = SegmentSelector::gdt(GDT_USER_DATA, Rpl::Ring3);
/// RPL is ignored by `ltr`.
pub const TASK_STATE: SegmentSelector = SegmentSelector::gdt(GDT_TSS, Rpl::Ring0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_selectors() {
        assert_eq!(SegmentSelector::gdt(1, Rpl::Ring0).encode(), 0x08);
        assert_eq!(KERNEL_DATA.encode(), 0x10);
        assert_eq!(USER_CODE.encode(), 0x1B);
        assert_eq!(USER_DATA.encode(), 0x23);
        assert_eq!(TASK_STATE.encode(), 0x28);
    }

    #[test]
    fn decode_fields() {
        let s = SegmentSelector::from_bits(0x23);
        assert_eq!(s.index(), GDT_USER_DATA);
        assert_eq!(s.rpl(), Rpl::Ring3);
        assert_eq!(s.ti(), Table::Gdt);
    }

    #[test]
    fn rpl_bits_roundtrip() {
        for b in 0u8..=3 {
            assert_eq!(Rpl::from_bits(b).into_bits(), b);
        }
    }
}
