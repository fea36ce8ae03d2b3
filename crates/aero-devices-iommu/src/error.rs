use thiserror::Error;

/// Errors surfaced directly to the host for malformed MMIO accesses.
///
/// These are distinct from [`crate::fault::Cause`], which is guest-visible protocol state
/// delivered through the fault queue rather than a Rust error value.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    #[error("misaligned register access at offset {offset:#x} with size {size}")]
    Misaligned { offset: u64, size: usize },
    #[error("register access at offset {offset:#x} with size {size} is out of range")]
    OutOfRange { offset: u64, size: usize },
    #[error("unsupported access size {0}")]
    BadSize(usize),
}
