//! # Memory Layout

/// Size of a small page and of every page-table level (1024 × 4-byte entries).
pub const PAGE_SIZE: u32 = 4096;

/// First kernel virtual address; everything below belongs to user space.
///
/// Physical memory is mapped one-to-one at `KERNBASE + pa`.
pub const KERNBASE: u32 = 0x8000_0000;

/// Where user images are loaded and where their first byte (the ELF header) lives.
pub const USER_BASE: u32 = 0x0040_0000;

/// Initial user stack pointer; the stack occupies the pages directly below it.
pub const USER_STACK_BASE: u32 = 0x00F0_0000;

/// Number of pages mapped below [`USER_STACK_BASE`] for the user stack.
pub const USER_STACK_PAGES: u32 = 2;

/// Lowest address of the user stack region.
pub const USER_STACK_BOTTOM: u32 = USER_STACK_BASE - USER_STACK_PAGES * PAGE_SIZE;

/// Scratch words at the bottom of a task's kernel stack, below the saved
/// execution context and trap frame.
pub const KERNEL_STACK_SCRATCH_WORDS: usize = 400;

/// Upper bound on the number of bytes the loader will read from an image.
pub const MAX_IMAGE_SIZE: u32 = 100 << 20;

/// Translate a physical address into its direct-mapped kernel virtual address.
#[inline]
#[must_use]
pub const fn p2v(pa: u32) -> u32 {
    KERNBASE + pa
}

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(KERNBASE.is_multiple_of(4 * 1024 * 1024));
    assert!(USER_BASE.is_multiple_of(PAGE_SIZE));
    assert!(USER_STACK_BASE.is_multiple_of(PAGE_SIZE));
    assert!(USER_BASE < USER_STACK_BOTTOM);
    assert!(USER_STACK_BASE < KERNBASE);
    assert!(USER_BASE != 0);
};
