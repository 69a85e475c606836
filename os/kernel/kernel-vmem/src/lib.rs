//! # Virtual Memory Support
//!
//! Classic two-level i386 paging (no PAE) for the process core.
//!
//! ## What you get
//! - An [`address space`](address_space) handle owning a page-directory root.
//! - Typed page-directory and page-table entries ([`PdEntry`], [`PtEntry`])
//!   over a shared [`PageEntryBits`] layout.
//! - A tiny allocator/mapper interface ([`FrameAlloc`], [`PhysMapper`]).
//!
//! ## i386 Virtual Address → Physical Address Walk
//!
//! Each 32-bit virtual address is divided into three fields:
//!
//! ```text
//! | 31‒22 | 21‒12 | 11‒0   |
//! |   PD  |   PT  | Offset |
//! ```
//!
//! The CPU uses the first two fields as **indices** into two levels of tables,
//! each containing 1024 (2¹⁰) entries of 4 bytes.
//!
//! ```text
//!  CR3 → PD  →  PT  →  Physical Page
//!         │      │
//!         │      └───► PTE (Page Table Entry)     → maps 4 KiB page
//!         └──────────► PDE (Page Directory Entry) → PS=1 → 4 MiB page
//! ```
//!
//! ### Leaf vs. non-leaf entries
//!
//! - A **PTE** is always a leaf and maps 4 KiB.
//! - A **PDE** with `PS=1` is a leaf mapping 4 MiB (requires `CR4.PSE`).
//!   User address spaces built here never contain such entries, but walks
//!   recognise them because the shared kernel half may.
//! - A **PDE** with `PS=0` points to a page table.
//!
//! ### Kernel half
//!
//! Directory entries at and above [`KERNBASE`](info::KERNBASE) are copied from
//! the kernel's own directory into every user space and are never freed by
//! [`AddressSpace::destroy`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

pub mod address_space;
mod page_entry_bits;
pub mod page_table;

pub use crate::address_space::{AddressSpace, AddressSpaceError};
pub use crate::page_entry_bits::PageEntryBits;
pub use crate::page_table::pd::{PageDirectory, PdEntry, PdEntryKind, PdIndex};
pub use crate::page_table::pt::{PageTable, PtEntry, PtIndex};
pub use kernel_memory_addresses as addresses;

/// Re-export constants as info module.
pub use kernel_info::memory as info;

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// Minimal frame allocator handing out **physical** 4 KiB frames for page
/// tables and user pages.
///
/// The implementation decides where frames come from (bootloader pool,
/// bitmap, free list). Returned frames **must** be 4 KiB aligned.
pub trait FrameAlloc {
    /// Allocate one 4 KiB frame. Returns `None` on out-of-memory.
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>>;

    /// Return a frame obtained from [`alloc_4k`](Self::alloc_4k).
    fn free_4k(&mut self, frame: PhysicalPage<Size4K>);
}

/// Converts physical addresses to *temporarily* usable references in the
/// current virtual address space.
///
/// In the kernel this is the direct map at `KERNBASE + pa`; tests back it with
/// a vector of frames.
pub trait PhysMapper {
    /// Convert a *physical* address to a usable mutable reference.
    ///
    /// # Safety
    /// - `pa` must be mapped writable for the lifetime `'a`.
    /// - `T` must match the bytes at `pa` and no other live reference may
    ///   alias them.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

impl<T: PhysMapper + ?Sized> PhysMapper for &T {
    #[inline(always)]
    unsafe fn phys_to_mut<'a, U>(&self, pa: PhysicalAddress) -> &'a mut U {
        unsafe { (**self).phys_to_mut(pa) }
    }
}

/// Direct-map [`PhysMapper`]: `va = KERNBASE + pa`.
#[derive(Debug, Default, Copy, Clone)]
pub struct DirectMapper;

impl PhysMapper for DirectMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let va = info::p2v(pa.as_u32()) as usize;
        unsafe { &mut *(va as *mut T) }
    }
}

/// Borrow the 4 KiB frame at `frame` as raw bytes.
///
/// # Safety
/// Same contract as [`PhysMapper::phys_to_mut`].
#[inline]
pub(crate) unsafe fn frame_bytes<'a, M: PhysMapper>(
    m: &M,
    frame: PhysicalPage<Size4K>,
) -> &'a mut [u8; 4096] {
    unsafe { m.phys_to_mut::<[u8; 4096]>(frame.base()) }
}
