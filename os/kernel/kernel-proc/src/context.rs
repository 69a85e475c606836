//! Saved callee-saved register state for the stack switch.

use core::ptr::NonNull;

/// Register snapshot left on a suspended stack by the switch primitive.
///
/// Layout must match the push order of the switch routine:
///
/// ```text
///   push ebp
///   push ebx
///   push esi
///   push edi      ← saved stack pointer points here
/// ```
///
/// so that from the saved stack pointer upwards memory reads `edi, esi, ebx,
/// ebp` followed by the return address the routine `ret`s to.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
#[repr(C)]
pub struct ExecutionContext {
    pub edi: u32,
    pub esi: u32,
    pub ebx: u32,
    pub ebp: u32,
    /// Where the switch routine returns to when this context is resumed.
    pub eip: u32,
}

impl ExecutionContext {
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            edi: 0,
            esi: 0,
            ebx: 0,
            ebp: 0,
            eip: 0,
        }
    }
}

/// Saved stack pointer of a suspended execution context.
///
/// Only valid while the stack it points into is alive and the context has not
/// been resumed yet. `Option<ContextPtr>` has the layout of a raw pointer, so a
/// slot of that type can be handed to the switch routine as its save slot.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ContextPtr(NonNull<ExecutionContext>);

impl ContextPtr {
    #[inline]
    #[must_use]
    pub const fn new(ptr: NonNull<ExecutionContext>) -> Self {
        Self(ptr)
    }

    #[inline]
    #[must_use]
    pub const fn as_ptr(self) -> *mut ExecutionContext {
        self.0.as_ptr()
    }

    #[inline]
    #[must_use]
    pub const fn as_non_null(self) -> NonNull<ExecutionContext> {
        self.0
    }
}

const _: () = {
    assert!(size_of::<ExecutionContext>() == 5 * 4);
    assert!(size_of::<Option<ContextPtr>>() == size_of::<*mut ExecutionContext>());
};
