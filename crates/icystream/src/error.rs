//! Error types for the HTTP input
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// Main error type for the HTTP input.
///
/// A foreign URI scheme is deliberately not an error: [`HttpInput::open`]
/// returns `Ok(None)` in that case so another input implementation can
/// claim the URI.
///
/// [`HttpInput::open`]: crate::stream::HttpInput::open
#[derive(Error, Debug)]
pub enum InputError {
    /// A transfer or the shared HTTP client could not be set up.
    #[error("Setup error: {0}")]
    Setup(String),

    /// Transfer-level failure reported by the HTTP client (DNS, connect,
    /// TLS, I/O).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a status outside the 2xx range.
    #[error("Got HTTP status {0}")]
    HttpStatus(u16),

    /// Invalid seek request.
    #[error("Seek error: {0}")]
    Seek(String),

    /// The I/O thread has shut down while the stream was still in use.
    #[error("I/O thread has shut down")]
    ReactorClosed,
}

/// Result type alias for the HTTP input.
pub type Result<T> = std::result::Result<T, InputError>;
