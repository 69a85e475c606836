//! # Kernel Memory Layout
//!
//! Compile-time layout constants shared by the paging code and the process
//! core. Everything here is a plain `const` so that layout mistakes surface as
//! build errors through the `const _: () = { assert!(..) }` blocks in
//! [`memory`] instead of as corrupted address spaces at runtime.
//!
//! ## Virtual Memory Architecture (i386, two-level paging)
//!
//! ```text
//! 0x0000_0000        ┌─────────────────────────────────┐
//!                    │        unmapped (null guard)    │
//! USER_BASE          ├─────────────────────────────────┤ 0x0040_0000
//!                    │   user image (text, data, bss)  │
//!                    │                ↓ grows up       │
//!                    ├ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ┤
//!                    │                ↑ grows down     │
//!                    │      user stack (2 pages)       │
//! USER_STACK_BASE    ├─────────────────────────────────┤ 0x00F0_0000
//!                    │        unmapped                 │
//! KERNBASE           ├─────────────────────────────────┤ 0x8000_0000
//!                    │   kernel + direct map of RAM    │
//!                    │   (va = KERNBASE + pa)          │
//! 0xFFFF_FFFF        └─────────────────────────────────┘
//! ```
//!
//! Every user address space shares the kernel half (page-directory entries at
//! and above `KERNBASE`) with the kernel's own directory, so switching `CR3`
//! between them never unmaps the code doing the switching.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
