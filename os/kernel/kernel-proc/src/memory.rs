//! Memory-manager seam and its paging-backed implementation.
//!
//! Everything here is page-table bookkeeping. Nothing touches CPU state;
//! switching `CR3` is the [`Cpu`](crate::Cpu)'s job.

use core::ptr::NonNull;
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::address_space::RootPage;
use kernel_vmem::{AddressSpace, AddressSpaceError, FrameAlloc, PhysMapper};
use log::trace;

pub trait MemoryManager {
    /// One zeroed, page-aligned kernel page.
    fn alloc_page(&mut self) -> Option<NonNull<u8>>;

    /// A fresh address space sharing the kernel half and nothing else.
    ///
    /// # Errors
    /// Out of frames.
    fn new_address_space(&mut self) -> Result<AddressSpace, AddressSpaceError>;

    /// Map `[start, end)` user read/write. Newly mapped pages read as zero.
    ///
    /// # Errors
    /// Out of frames, or a range that reaches into kernel space.
    fn map_region(
        &mut self,
        space: &AddressSpace,
        start: VirtualAddress,
        end: VirtualAddress,
    ) -> Result<(), AddressSpaceError>;

    /// Release every page and table owned by `space`. It must not be active.
    fn destroy_address_space(&mut self, space: AddressSpace);

    /// The kernel's own page directory.
    fn kernel_root(&self) -> RootPage;

    /// Contiguous user-readable bytes at `va` in `space`.
    fn user_readable_after(&self, space: &AddressSpace, va: VirtualAddress) -> u32;
}

/// [`MemoryManager`] over the two-level page tables of `kernel-vmem`.
pub struct PagedMemory<M: PhysMapper, A: FrameAlloc> {
    mapper: M,
    alloc: A,
    kernel_root: RootPage,
}

impl<M: PhysMapper, A: FrameAlloc> PagedMemory<M, A> {
    pub const fn new(mapper: M, alloc: A, kernel_root: RootPage) -> Self {
        Self {
            mapper,
            alloc,
            kernel_root,
        }
    }

    #[inline]
    pub const fn allocator(&self) -> &A {
        &self.alloc
    }

    #[inline]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }
}

impl<M: PhysMapper, A: FrameAlloc> MemoryManager for PagedMemory<M, A> {
    fn alloc_page(&mut self) -> Option<NonNull<u8>> {
        let frame = self.alloc.alloc_4k()?;
        let page = unsafe { self.mapper.phys_to_mut::<[u8; 4096]>(frame.base()) };
        page.fill(0);
        trace!("kernel page {frame}");
        Some(NonNull::from(page).cast::<u8>())
    }

    fn new_address_space(&mut self) -> Result<AddressSpace, AddressSpaceError> {
        AddressSpace::new_user(&self.mapper, &mut self.alloc, self.kernel_root)
    }

    fn map_region(
        &mut self,
        space: &AddressSpace,
        start: VirtualAddress,
        end: VirtualAddress,
    ) -> Result<(), AddressSpaceError> {
        space
            .map_user_region(&self.mapper, &mut self.alloc, start, end)
            .map(|_| ())
    }

    fn destroy_address_space(&mut self, space: AddressSpace) {
        space.destroy(&self.mapper, &mut self.alloc);
    }

    fn kernel_root(&self) -> RootPage {
        self.kernel_root
    }

    fn user_readable_after(&self, space: &AddressSpace, va: VirtualAddress) -> u32 {
        space.user_readable_after(&self.mapper, va)
    }
}
