// src/error.rs
//! Error types for pool operations with conversion support

use std::fmt;

/// Errors that can occur during pool operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The full allocation escalation ladder failed to produce a block
    Exhausted {
        /// Bytes the caller asked for
        requested: usize,
    },
    /// A pointer passed to `free` was never handed out by the pool
    UnknownPointer,
    /// Invalid pool state
    InvalidState(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted { requested } => {
                write!(f, "device memory exhausted (requested {} bytes)", requested)
            }
            Self::UnknownPointer => write!(f, "pointer not owned by the pool"),
            Self::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
        }
    }
}

impl std::error::Error for PoolError {}

// ============================================================================
// ERROR CONVERSION - Makes the pool compatible with host error types
// ============================================================================

/// Convert PoolError to std::io::Error
impl From<PoolError> for std::io::Error {
    fn from(err: PoolError) -> Self {
        use std::io::ErrorKind;
        match err {
            PoolError::Exhausted { .. } => std::io::Error::new(ErrorKind::OutOfMemory, err),
            PoolError::UnknownPointer => std::io::Error::new(ErrorKind::InvalidInput, err),
            _ => std::io::Error::other(err),
        }
    }
}

/// Convert PoolError to anyhow::Error (for host integration)
#[cfg(feature = "anyhow")]
impl From<PoolError> for anyhow::Error {
    fn from(err: PoolError) -> Self {
        anyhow::anyhow!("{}", err)
    }
}

/// Allow using ? with anyhow::Error
#[cfg(feature = "anyhow")]
impl From<anyhow::Error> for PoolError {
    fn from(err: anyhow::Error) -> Self {
        PoolError::InvalidState(err.to_string())
    }
}

// ============================================================================
// RESULT TYPE ALIASES
// ============================================================================

/// Result type alias for pool operations
///
/// Note: When using with other Result types (like anyhow::Result),
/// either qualify the type (`devpool::Result<T>`) or use the conversion traits.
pub type Result<T> = std::result::Result<T, PoolError>;

// ============================================================================
// EXTENSION TRAIT FOR EASY CONVERSION
// ============================================================================

/// Extension trait for converting Results between different error types
pub trait ResultExt<T> {
    /// Convert to anyhow::Result
    #[cfg(feature = "anyhow")]
    fn into_anyhow(self) -> anyhow::Result<T>;

    /// Convert to io::Result
    fn into_io(self) -> std::io::Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    #[cfg(feature = "anyhow")]
    fn into_anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| e.into())
    }

    fn into_io(self) -> std::io::Result<T> {
        self.map_err(|e| e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_io() {
        let pool_err = PoolError::Exhausted { requested: 4096 };
        let io_err: std::io::Error = pool_err.into();
        assert_eq!(io_err.kind(), std::io::ErrorKind::OutOfMemory);
    }

    #[test]
    fn test_result_ext() {
        let result: Result<u32> = Ok(42);
        let io_result = result.into_io();
        assert_eq!(io_result.unwrap(), 42);
    }

    #[cfg(feature = "anyhow")]
    #[test]
    fn test_anyhow_conversion() {
        let pool_err = PoolError::UnknownPointer;
        let anyhow_err: anyhow::Error = pool_err.into();
        assert!(anyhow_err.to_string().contains("not owned"));
    }
}
