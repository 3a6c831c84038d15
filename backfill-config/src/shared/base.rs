use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required connection parameter is empty.
    #[error("`{0}` must not be empty")]
    MissingField(&'static str),
    /// A port was configured as zero.
    #[error("`{0}` must be a non-zero port")]
    InvalidPort(&'static str),
}
