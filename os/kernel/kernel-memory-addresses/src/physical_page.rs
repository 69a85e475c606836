use crate::{MemoryAddressOffset, MemoryPage, PageSize, PhysicalAddress};
use core::fmt;

/// Physical memory page (frame) base for size `S`.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage<S: PageSize>(pub(crate) MemoryPage<S>);

impl<S: PageSize> PhysicalPage<S> {
    /// Construct from an aligned physical address.
    #[inline]
    #[must_use]
    pub fn from_addr(addr: PhysicalAddress) -> Self {
        addr.page()
    }

    /// Frame number: the base address shifted right by `S::SHIFT`.
    #[inline]
    #[must_use]
    pub const fn frame_number(self) -> u32 {
        self.0.base().as_u32() >> S::SHIFT
    }

    /// Inverse of [`frame_number`](Self::frame_number).
    #[inline]
    #[must_use]
    pub const fn from_frame_number(n: u32) -> Self {
        PhysicalAddress::new(n << S::SHIFT).page::<S>()
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0.base().as_u32())
    }

    #[inline]
    #[must_use]
    pub const fn join(self, off: MemoryAddressOffset<S>) -> PhysicalAddress {
        PhysicalAddress::new(self.0.join(off).as_u32())
    }
}

impl<S: PageSize> fmt::Debug for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage<{}>({})", S::as_str(), self.base())
    }
}

impl<S: PageSize> fmt::Display for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
