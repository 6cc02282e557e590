//! Error types for the Floodgate admission layer.

use thiserror::Error;

use crate::ratelimit::{LimitCategory, Rejection};

/// Main error type for Floodgate operations.
#[derive(Error, Debug)]
pub enum FloodgateError {
    /// No quota is registered for the category. This is a wiring mistake
    /// in the host, not a transient condition; fail fast.
    #[error("no quota registered for category {0}")]
    UnknownCategory(LimitCategory),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The expected denial outcome, surfaced as an error at the
    /// `admit`/`guard` boundary.
    #[error(transparent)]
    RateLimited(#[from] Rejection),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;
