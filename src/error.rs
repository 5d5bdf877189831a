//! Error types shared by all analysis primitives.
//!
//! Every failure in this crate is a contract violation (wrong sizes, bad
//! indices, misconfigured networks) rather than a transient condition, so
//! there is no retry machinery; the offending operation simply stops.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("size mismatch: expected {expected} bits, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("index {index} out of range for size {size}")]
    IndexOutOfRange { index: usize, size: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid cipher configuration: {0}")]
    InvalidConfig(String),

    #[error("placement is not invertible")]
    NotInvertible,

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
