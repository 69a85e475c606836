//! # Process Core
//!
//! Loads one user program at a time into a fresh address space, hands the CPU
//! to it, and takes the CPU back when the program asks to die.
//!
//! ## Pieces
//!
//! | Module | Role |
//! |--------|------|
//! | [`context`] | [`ExecutionContext`]: callee-saved registers plus resume address. |
//! | [`trap_frame`] | [`TrapFrame`]: the register image `iret` consumes on entry to ring 3. |
//! | [`task`] | [`Task`]: task state segment, address space and kernel stack. |
//! | [`process`] | [`Process`]: the single slot holding the kernel context and the task. |
//! | [`loader`] | `run_elf`, and its first half `load`: build the address space, copy the image. |
//! | [`switch`] | `enter` hands the CPU to the task; `kill` and its teardown half `terminate` take it back. |
//! | [`elf`] | Just enough ELF32 to find the entry point and the memory extent. |
//! | [`memory`], [`cpu`], [`fs`] | The collaborator seams the core is written against. |
//!
//! ## Control flow
//!
//! ```text
//!   kernel                                  user task
//!   ──────                                  ─────────
//!   run_elf(name)
//!     load: build space, copy image, fill frame
//!     enter: suspend_and_save(kernel_ctx) ──► trampoline → iret → entry
//!                                            ...
//!                                            trap into kernel → kill()
//!                                              cli, kernel CR3, destroy space, sti
//!     ◄──────────────────────────────────── resume(kernel_ctx)
//!   run_elf returns
//! ```
//!
//! Exactly two execution contexts exist at any time. There is no scheduler;
//! the handoff is a fixed two-party exchange.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod arch;
pub mod context;
pub mod cpu;
pub mod elf;
pub mod error;
pub mod fs;
pub mod loader;
pub mod memory;
pub mod process;
pub mod selectors;
pub mod switch;
pub mod task;
pub mod trap_frame;
pub mod tss;

pub use crate::context::{ContextPtr, ExecutionContext};
pub use crate::cpu::Cpu;
pub use crate::error::{LoadError, ProcError};
pub use crate::fs::{FileStat, FileSystem, FsError};
pub use crate::memory::{MemoryManager, PagedMemory};
pub use crate::process::Process;
pub use crate::task::{KernelStack, Task};
pub use crate::trap_frame::TrapFrame;
pub use crate::tss::TaskState;
