//! # Paging Structures
//!
//! Both levels hold 1024 four-byte entries and occupy exactly one 4 KiB frame.

pub mod pd;
pub mod pt;

use kernel_memory_addresses::VirtualAddress;
use pd::PdIndex;
use pt::PtIndex;

/// Entries per table at either level.
pub const ENTRIES: usize = 1024;

/// Split a virtual address into its directory and table indices.
#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (PdIndex, PtIndex) {
    (PdIndex::from(va), PtIndex::from(va))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_of_user_base_and_stack() {
        let (d, t) = split_indices(VirtualAddress::new(0x0040_0000));
        assert_eq!((d.as_usize(), t.as_usize()), (1, 0));

        let (d, t) = split_indices(VirtualAddress::new(0x00EF_FFFF));
        assert_eq!((d.as_usize(), t.as_usize()), (3, 0x2FF));

        let (d, t) = split_indices(VirtualAddress::new(0xFFFF_FFFF));
        assert_eq!((d.as_usize(), t.as_usize()), (1023, 1023));
    }
}
