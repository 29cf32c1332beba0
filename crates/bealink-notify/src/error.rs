//! Error types for the bealink-notify crate.
//!
//! None of these ever reach the code that triggered a notification; the
//! dispatcher logs them. They surface only from the synchronous helpers
//! (settings persistence, URL checks for `/test_bark`, crypto).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// Push URL missing, unparseable, or without scheme/host.
    #[error("Push URL unusable: {0}")]
    InvalidUrl(String),

    /// Key/IV problems or a cipher failure.
    #[error("Encryption error: {0}")]
    Crypto(String),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Transport-level failure (connect, TLS, timeout).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Push server answered with a non-success status.
    #[error("Push server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file could not be written.
    #[error("Settings error: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, NotifyError>;
