/// Convenience result type used across fxscan.
pub type ScanResult<T> = Result<T, ScanError>;

/// Top-level error taxonomy used by the recoverable APIs.
///
/// Kernels never produce errors and register-allocation invariant violations panic, so only
/// allocation, argument validation and plan construction surface here.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Arithmetic overflow while computing a capacity or byte size.
    #[error("allocation size error: {0}")]
    AllocationSize(String),

    /// The allocator refused a request of the given byte size.
    #[error("out of memory: failed to allocate {0} bytes")]
    OutOfMemory(usize),

    /// Inconsistent caller-provided arguments (buffer lengths, counts, palettes).
    #[error("validation error: {0}")]
    Validation(String),

    /// A request the conversion graph or code generator cannot express.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Wrapped lower-level error from dependencies.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScanError {
    /// Build a [`ScanError::AllocationSize`] value.
    pub fn allocation_size(msg: impl Into<String>) -> Self {
        Self::AllocationSize(msg.into())
    }

    /// Build a [`ScanError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`ScanError::Unsupported`] value.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// True for the two allocation-related variants.
    pub fn is_allocation_failure(&self) -> bool {
        matches!(self, Self::AllocationSize(_) | Self::OutOfMemory(_))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
