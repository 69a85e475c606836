//! # Address Space (i386, page-directory rooted)
//!
//! An owned handle to one user address space: the physical frame of its page
//! directory. The handle does not borrow the mapper or the allocator; every
//! operation that touches tables takes them explicitly so the handle can be
//! stored inside long-lived kernel structures.
//!
//! ## Highlights
//!
//! - [`AddressSpace::new_user`] allocates a directory sharing the kernel half.
//! - [`AddressSpace::map_user_region`] maps zero-filled user pages.
//! - [`AddressSpace::query`] translates a VA to a PA (handles 4 MiB leaves).
//! - [`AddressSpace::user_readable_after`] bounds a user pointer.
//! - [`AddressSpace::destroy`] releases every user frame, table and the root.
//!
//! ## Safety
//!
//! - The provided [`PhysMapper`] must yield **writable** references to table frames.
//! - Mutating the *active* space requires TLB maintenance; user mappings are
//!   only ever added here before the space is activated or while a reload of
//!   CR3 follows.

use crate::info::KERNBASE;
use crate::page_table::pd::{PageDirectory, PdEntry, PdEntryKind, PdIndex};
use crate::page_table::pt::{PageTable, PtEntry};
use crate::page_table::{ENTRIES, split_indices};
use crate::{FrameAlloc, PageEntryBits, PhysMapper, frame_bytes};
use kernel_memory_addresses::{
    PhysicalAddress, PhysicalPage, Size4K, Size4M, VirtualAddress, VirtualPage,
};
use log::{debug, trace};

/// The page-directory frame of an [`AddressSpace`].
pub type RootPage = PhysicalPage<Size4K>;

/// First directory slot belonging to the kernel half.
const KERNEL_PDX: usize = (KERNBASE >> 22) as usize;

/// Errors from building or extending an address space.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum AddressSpaceError {
    #[error("out of physical frames")]
    OutOfMemory,
    #[error("range {start}..{end} reaches into kernel space")]
    KernelRange {
        start: VirtualAddress,
        end: VirtualAddress,
    },
    #[error("address range overflows the 32-bit address space")]
    Overflow,
}

/// Owned handle to a single user address space.
///
/// Not `Clone`: exactly one owner may destroy it.
#[derive(Debug, Eq, PartialEq)]
pub struct AddressSpace {
    root: RootPage,
}

impl AddressSpace {
    /// Allocate a fresh, zeroed page directory whose kernel half
    /// (`KERNBASE..`) is copied from `kernel_root`.
    ///
    /// # Errors
    /// [`AddressSpaceError::OutOfMemory`] if no frame is available.
    pub fn new_user<M: PhysMapper, A: FrameAlloc>(
        mapper: &M,
        alloc: &mut A,
        kernel_root: RootPage,
    ) -> Result<Self, AddressSpaceError> {
        let root = alloc_zeroed(mapper, alloc)?;
        let pd = unsafe { mapper.phys_to_mut::<PageDirectory>(root.base()) };
        let kpd = unsafe { mapper.phys_to_mut::<PageDirectory>(kernel_root.base()) };
        for i in KERNEL_PDX..ENTRIES {
            let i = PdIndex::new(i as u16);
            pd.set(i, kpd.get(i));
        }
        debug!("new address space, root {root}");
        Ok(Self { root })
    }

    /// Wrap an existing directory frame.
    ///
    /// The caller transfers ownership of the frame (and of every user table
    /// below it) to the returned handle.
    #[inline]
    #[must_use]
    pub const fn from_root(root: RootPage) -> Self {
        Self { root }
    }

    /// Physical page of the directory.
    #[inline]
    #[must_use]
    pub const fn root_page(&self) -> RootPage {
        self.root
    }

    #[inline]
    fn pd_mut<'a, M: PhysMapper>(&self, mapper: &M) -> &'a mut PageDirectory {
        unsafe { mapper.phys_to_mut::<PageDirectory>(self.root.base()) }
    }

    /// Map every page overlapping `[start, end)` as present, writable and
    /// user-accessible, backed by fresh zero-filled frames.
    ///
    /// Pages that are already mapped are left untouched, so extending a region
    /// never clobbers data copied into it earlier. Returns the number of pages
    /// newly mapped.
    ///
    /// # Errors
    /// - [`AddressSpaceError::KernelRange`] if the range ends above `KERNBASE`.
    /// - [`AddressSpaceError::Overflow`] if rounding `end` up leaves the 32-bit space.
    /// - [`AddressSpaceError::OutOfMemory`] if a frame could not be allocated;
    ///   pages mapped before the failure stay mapped and are released by
    ///   [`destroy`](Self::destroy).
    pub fn map_user_region<M: PhysMapper, A: FrameAlloc>(
        &self,
        mapper: &M,
        alloc: &mut A,
        start: VirtualAddress,
        end: VirtualAddress,
    ) -> Result<u32, AddressSpaceError> {
        if start >= end {
            return Ok(0);
        }
        let first = start.align_down::<Size4K>();
        let last = end.align_up::<Size4K>().ok_or(AddressSpaceError::Overflow)?;
        if last.as_u32() > KERNBASE {
            return Err(AddressSpaceError::KernelRange { start, end });
        }
        debug!("map user region {first}..{last} in {}", self.root);

        let pd = self.pd_mut(mapper);
        let leaf = PageEntryBits::new_user_rw();
        let mut mapped = 0;
        let mut page = Some(VirtualPage::<Size4K>::containing_address(first));
        while let Some(p) = page.filter(|p| p.base() < last) {
            let va = p.base();
            let (di, ti) = split_indices(va);
            let pt_page = match pd.get(di).kind() {
                Some(PdEntryKind::NextPageTable(pt, _)) => Some(pt),
                Some(PdEntryKind::Leaf4MiB(..)) => None,
                None => {
                    let pt = alloc_zeroed(mapper, alloc)?;
                    pd.set(di, PdEntry::make_next(pt, leaf));
                    trace!("page table {pt} for {}", di.base());
                    Some(pt)
                }
            };
            if let Some(pt_page) = pt_page {
                let pt = unsafe { mapper.phys_to_mut::<PageTable>(pt_page.base()) };
                if !pt.get(ti).is_present() {
                    let frame = alloc_zeroed(mapper, alloc)?;
                    pt.set(ti, PtEntry::make_4k(frame, leaf));
                    trace!("map {va} -> {frame}");
                    mapped += 1;
                }
            }
            page = p.next();
        }
        Ok(mapped)
    }

    /// Translate a `VirtualAddress` to a `PhysicalAddress` if mapped.
    #[must_use]
    pub fn query<M: PhysMapper>(&self, mapper: &M, va: VirtualAddress) -> Option<PhysicalAddress> {
        let (di, ti) = split_indices(va);
        match self.pd_mut(mapper).get(di).kind()? {
            PdEntryKind::Leaf4MiB(base, _) => Some(base.join(va.offset::<Size4M>())),
            PdEntryKind::NextPageTable(pt_page, _) => {
                let pt = unsafe { mapper.phys_to_mut::<PageTable>(pt_page.base()) };
                let (base, _) = pt.get(ti).page_4k()?;
                Some(base.join(va.offset::<Size4K>()))
            }
        }
    }

    /// Number of contiguous bytes starting at `va` that are present and
    /// user-accessible, never extending to or past `KERNBASE`.
    ///
    /// Walks page by page: the directory entry must be present, and the leaf
    /// (a PTE, or a 4 MiB PDE) must be present and user-accessible. The first
    /// page that fails stops the walk; the page containing `va` counts from
    /// `va` to its end. Returns `0` for `va >= KERNBASE`.
    #[must_use]
    pub fn user_readable_after<M: PhysMapper>(&self, mapper: &M, va: VirtualAddress) -> u32 {
        if va.as_u32() >= KERNBASE {
            return 0;
        }
        let pd = self.pd_mut(mapper);
        let mut cur = va;
        while cur.as_u32() < KERNBASE {
            let (di, ti) = split_indices(cur);
            let rest = match pd.get(di).kind() {
                None => break,
                Some(PdEntryKind::Leaf4MiB(_, flags)) => {
                    if !flags.user_access() {
                        break;
                    }
                    cur.offset::<Size4M>().remaining()
                }
                Some(PdEntryKind::NextPageTable(pt_page, _)) => {
                    let pt = unsafe { mapper.phys_to_mut::<PageTable>(pt_page.base()) };
                    match pt.get(ti).page_4k() {
                        Some((_, flags)) if flags.user_access() => {
                            cur.offset::<Size4K>().remaining()
                        }
                        _ => break,
                    }
                }
            };
            // cur < KERNBASE and KERNBASE is 4 MiB aligned, so this cannot overflow.
            cur += rest;
        }
        let readable = cur.as_u32().min(KERNBASE) - va.as_u32();
        debug!("user_readable_after({va}) = {readable:#x}");
        readable
    }

    /// Release every user frame, every user page table and the directory
    /// itself. The kernel half is shared and left alone; 4 MiB leaves in the
    /// user half are not frames this space allocated and are skipped.
    ///
    /// Must not be called while this space is active. Returns the number of
    /// frames handed back to `alloc`.
    pub fn destroy<M: PhysMapper, A: FrameAlloc>(self, mapper: &M, alloc: &mut A) -> usize {
        let pd = self.pd_mut(mapper);
        let mut freed = 0;
        for i in 0..KERNEL_PDX {
            let di = PdIndex::new(i as u16);
            let Some(pt_page) = pd.get(di).next_table() else {
                continue;
            };
            let pt = unsafe { mapper.phys_to_mut::<PageTable>(pt_page.base()) };
            for frame in pt.present_pages() {
                alloc.free_4k(frame);
                freed += 1;
            }
            pd.set(di, PdEntry::zero());
            alloc.free_4k(pt_page);
            freed += 1;
        }
        alloc.free_4k(self.root);
        freed += 1;
        debug!("destroyed address space {}, {freed} frames released", self.root);
        freed
    }
}

/// Allocate one frame and fill it with zeros.
fn alloc_zeroed<M: PhysMapper, A: FrameAlloc>(
    mapper: &M,
    alloc: &mut A,
) -> Result<PhysicalPage<Size4K>, AddressSpaceError> {
    let frame = alloc.alloc_4k().ok_or(AddressSpaceError::OutOfMemory)?;
    unsafe { frame_bytes(mapper, frame) }.fill(0);
    Ok(frame)
}
