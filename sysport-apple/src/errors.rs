use thiserror::Error;

use crate::kern::{KERN_SUCCESS, format_kern_return};

/// Result type alias for framework operations.
pub type AppleResult<T> = Result<T, AppleError>;

/// Centralized error enum for the macOS bindings.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppleError {
    /// A Mach or IOKit call returned a nonzero `kern_return_t`.
    ///
    /// The display form appends an actionable hint for known codes.
    #[error("Kernel error {}", format_kern_return(*.0))]
    Kern(i32),

    /// A framework call that returns an object handed back null.
    #[error("Framework returned null: {0}")]
    NullReturn(String),

    /// Errors converting between CoreFoundation and Rust values.
    #[error("Data conversion failed: {0}")]
    Conversion(String),

    /// A required service, entry, or property was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation attempted in an invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl AppleError {
    /// Converts a `kern_return_t` into a `Result`.
    pub const fn check(code: i32) -> AppleResult<()> {
        if code == KERN_SUCCESS {
            Ok(())
        } else {
            Err(Self::Kern(code))
        }
    }
}
