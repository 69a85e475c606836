use core::fmt;
use core::hash::Hash;

mod sealed {
    pub trait Sealed {}
}

/// Page granularities of i386 two-level paging. Sealed: only [`Size4K`] and
/// [`Size4M`] exist.
pub trait PageSize:
    sealed::Sealed + Clone + Copy + Eq + PartialEq + Ord + PartialOrd + Hash + fmt::Display + fmt::Debug
{
    /// Bytes per page, a power of two.
    const SIZE: u32;
    /// `SIZE == 1 << SHIFT`; the number of offset bits.
    const SHIFT: u32;

    fn as_str() -> &'static str;
}

macro_rules! page_size {
    ($(#[$doc:meta])* $name:ident, $shift:literal, $label:literal) => {
        $(#[$doc])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name;

        impl sealed::Sealed for $name {}

        impl PageSize for $name {
            const SIZE: u32 = 1 << $shift;
            const SHIFT: u32 = $shift;

            fn as_str() -> &'static str {
                $label
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str($label)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str($label)
            }
        }
    };
}

page_size!(
    /// 4 KiB, mapped by a page-table entry.
    Size4K, 12, "4K"
);

page_size!(
    /// 4 MiB, mapped by a page-directory entry with `PS=1`.
    Size4M, 22, "4M"
);

const _: () = {
    assert!(Size4K::SIZE == 4096);
    assert!(Size4M::SIZE == 4 * 1024 * 1024);
};
