//! # i386 Page Directory (PD)
//!
//! - [`PdIndex`]: index type for virtual-address bits `[31:22]`.
//! - [`PdEntry`]: a PD entry that is either a pointer to a PT (`PS=0`) or a
//!   4 MiB leaf (`PS=1`).
//! - [`PdEntryKind`]: decoded view of an entry.
//! - [`PageDirectory`]: a 4 KiB-aligned array of 1024 PD entries.
//!
//! TLB maintenance is the caller's responsibility after mutating active mappings.

use crate::PageEntryBits;
use crate::page_table::ENTRIES;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, Size4M, VirtualAddress};

/// Index into the Page Directory (derived from VA bits `[31:22]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PdIndex(u16);

/// A single Page Directory entry (PDE).
#[doc(alias = "PDE")]
#[repr(transparent)]
#[derive(Copy, Clone)]
pub struct PdEntry(PageEntryBits);

/// Decoded form of a present PDE.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PdEntryKind {
    /// `PS=0`: the entry points to a page table.
    NextPageTable(PhysicalPage<Size4K>, PageEntryBits),
    /// `PS=1`: the entry maps a 4 MiB page.
    Leaf4MiB(PhysicalPage<Size4M>, PageEntryBits),
}

/// The Page Directory: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PD")]
#[repr(C, align(4096))]
pub struct PageDirectory {
    entries: [PdEntry; ENTRIES],
}

impl PdIndex {
    /// Build an index from a virtual address (extracts bits `[31:22]`).
    #[inline]
    #[must_use]
    pub const fn from(va: VirtualAddress) -> Self {
        Self::new((va.as_u32() >> 22) as u16)
    }

    /// Construct from a raw `u16`.
    ///
    /// ### Debug assertions
    /// - Asserts `v < 1024` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!(v < 1024);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// First virtual address covered by this slot.
    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new((self.0 as u32) << 22)
    }
}

impl PdEntry {
    /// Create a zero (non-present) entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    /// Expose the underlying bitfield.
    #[inline]
    #[must_use]
    pub const fn flags(self) -> PageEntryBits {
        self.0
    }

    /// Decode a present entry; `None` if not present.
    #[inline]
    #[must_use]
    pub const fn kind(self) -> Option<PdEntryKind> {
        if !self.0.present() {
            return None;
        }
        if self.0.large_page() {
            let base = PhysicalAddress::new(self.0.into_bits() & !LARGE_PAGE_OFFSET_MASK);
            Some(PdEntryKind::Leaf4MiB(base.page::<Size4M>(), self.0))
        } else {
            let base = self.0.physical_address();
            Some(PdEntryKind::NextPageTable(base.page::<Size4K>(), self.0))
        }
    }

    /// The page table this entry points to, if present and not a 4 MiB leaf.
    #[inline]
    #[must_use]
    pub const fn next_table(self) -> Option<PhysicalPage<Size4K>> {
        match self.kind() {
            Some(PdEntryKind::NextPageTable(pt, _)) => Some(pt),
            _ => None,
        }
    }

    /// Create a non-leaf PDE pointing at `table` (`PS=0`, `present=1`).
    #[inline]
    #[must_use]
    pub const fn make_next(table: PhysicalPage<Size4K>, mut flags: PageEntryBits) -> Self {
        flags.set_large_page(false);
        flags.set_present(true);
        flags.set_physical_address(table.base());
        Self(flags)
    }

    /// Create a 4 MiB leaf PDE (`PS=1`, `present=1`).
    #[inline]
    #[must_use]
    pub const fn make_4m(page: PhysicalPage<Size4M>, mut flags: PageEntryBits) -> Self {
        flags.set_large_page(true);
        flags.set_present(true);
        flags.set_physical_address(page.base());
        Self(flags)
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0.into_bits()
    }

    #[inline]
    #[must_use]
    pub const fn from_raw(v: u32) -> Self {
        Self(PageEntryBits::from_bits(v))
    }
}

/// Bits 0..=21 of a 4 MiB leaf hold flags and PSE-36 extensions, not address bits.
const LARGE_PAGE_OFFSET_MASK: u32 = (1 << 22) - 1;

impl PageDirectory {
    /// Create a fully zeroed Page Directory (all entries non-present).
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PdEntry::zero(); ENTRIES],
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: PdIndex) -> PdEntry {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: PdIndex, e: PdEntry) {
        self.entries[i.as_usize()] = e;
    }

    #[inline]
    #[must_use]
    pub const fn index_of(va: VirtualAddress) -> PdIndex {
        PdIndex::from(va)
    }
}
