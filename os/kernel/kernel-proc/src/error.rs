use crate::elf::ElfErr;
use kernel_vmem::AddressSpaceError;

/// Why `run_elf` did not start a program.
///
/// The `Display` text is what the console shows after `"<name>: "`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum LoadError {
    /// `stat` found nothing under that name.
    #[error("file not found")]
    NotFound,
    /// The file exists but reading it produced no bytes or failed.
    #[error("file not found")]
    Unreadable,
    #[error("bad executable")]
    BadImage(#[source] ElfErr),
    #[error("image does not fit below the user stack")]
    TooLarge,
    #[error("out of memory")]
    OutOfMemory,
}

impl From<ElfErr> for LoadError {
    fn from(value: ElfErr) -> Self {
        Self::BadImage(value)
    }
}

impl From<AddressSpaceError> for LoadError {
    fn from(value: AddressSpaceError) -> Self {
        match value {
            AddressSpaceError::OutOfMemory => Self::OutOfMemory,
            AddressSpaceError::KernelRange { .. } | AddressSpaceError::Overflow => Self::TooLarge,
        }
    }
}

/// Process-slot state that makes a switch impossible.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ProcError {
    #[error("no active task")]
    NoActiveTask,
    #[error("no saved kernel context")]
    NoKernelContext,
}
