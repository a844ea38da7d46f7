//! Error types for PAC resolution.
//!
//! Only [`PacError::DocumentFetch`] is fatal for a resolver. Cache misses and
//! reentrancy short-circuits are not errors and never show up here.

use std::string::FromUtf8Error;
use thiserror::Error;

/// Unified error type for PAC resolution.
#[derive(Debug, Error)]
pub enum PacError {
    /// The PAC document could not be retrieved.
    #[error("Cannot open PAC url '{url}': {source}")]
    DocumentFetch {
        /// Location of the PAC document.
        url: String,
        /// What went wrong while fetching it.
        source: FetchError,
    },

    /// The script does not define the resolution function.
    #[error("'{name}' function not found in pac file")]
    MissingEntryPoint {
        /// Name of the function that was looked up.
        name: String,
    },

    /// The script called a host operation it was not granted.
    #[error("PAC script attempted a forbidden operation: {operation}")]
    SandboxViolation {
        /// The refused operation.
        operation: String,
    },

    /// The script threw, failed to parse, or hit an evaluation limit.
    #[error("PAC evaluation failed in {script}: {message}")]
    Script {
        /// Which source was being evaluated.
        script: String,
        /// Engine error message.
        message: String,
    },

    /// The destination is not a valid URL.
    #[error("Invalid destination URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl PacError {
    /// Whether the error leaves the resolver without any proxy policy.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PacError::DocumentFetch { .. })
    }
}

/// Failure while loading PAC document bytes.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport level failure (unreachable host, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("HTTP status {status}")]
    Status {
        /// The returned status code.
        status: u16,
    },

    /// Local file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Body is not valid UTF-8.
    #[error("PAC document is not valid UTF-8: {0}")]
    Decode(#[from] FromUtf8Error),

    /// The URL scheme has no loader.
    #[error("Unsupported PAC url scheme '{0}'")]
    UnsupportedScheme(String),
}

/// Result type for PAC operations.
pub type PacResult<T> = Result<T, PacError>;
