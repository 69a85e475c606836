//! # Typed i386 Registers
//!
//! Bit-level models of the control registers the process core touches, plus
//! the privileged instructions that read and write them. The models are plain
//! data and test on any host; the instructions only exist when compiling for
//! `target_arch = "x86"` with the `asm` feature.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "cr3")]
pub mod cr3;

#[cfg(feature = "eflags")]
pub mod eflags;

/// Read a register whose access is privileged.
pub trait LoadRegisterUnsafe {
    /// # Safety
    /// Ring 0 only. Implementations may add requirements of their own.
    unsafe fn load_unsafe() -> Self;
}

/// Write a register whose access is privileged or changes translation.
pub trait StoreRegisterUnsafe {
    /// # Safety
    /// Ring 0 only. For `CR3` the new directory must map the running code.
    unsafe fn store_unsafe(self);
}

/// Read a register any ring may read (`pushfd`).
pub trait LoadRegister {
    fn load() -> Self;
}

impl<T: LoadRegister> LoadRegisterUnsafe for T {
    #[inline]
    unsafe fn load_unsafe() -> Self {
        <Self as LoadRegister>::load()
    }
}
