//! Machine backends for [`Cpu`](crate::Cpu).

#[cfg(target_arch = "x86")]
pub mod x86;
