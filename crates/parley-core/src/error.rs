// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Parley session engine.

use thiserror::Error;

/// The primary error type used across the session engine.
///
/// Variants follow the failure taxonomy of the engine: transport failures are
/// retryable, protocol noise is skipped inside streams, cancellation is an
/// expected outcome, and cache failures never reach callers of the cache.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Non-success HTTP status or network failure.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        /// HTTP status code when the server answered at all.
        status: Option<u16>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Malformed wire data or a violated call precondition.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server reported an error inside an otherwise well-formed stream.
    #[error("stream error: {0}")]
    Stream(String),

    /// The operation was aborted by its owner.
    #[error("operation cancelled")]
    Cancelled,

    /// Local cache unavailable or corrupt.
    #[error("cache error: {message}")]
    Cache {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Subscription status could not be evaluated.
    #[error("access check failed: {0}")]
    AccessCheck(String),

    /// Cross-document messaging failure.
    #[error("bridge error: {0}")]
    Bridge(String),

    /// Persistent storage backend failure.
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    /// Builds a transport error without an underlying source.
    pub fn transport(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Transport {
            message: message.into(),
            status,
            source: None,
        }
    }

    /// Returns true for failures the caller may retry (network and HTTP status errors).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Returns true when the error only records that the operation was aborted.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(ParleyError::transport("down", Some(503)).is_retryable());
        assert!(!ParleyError::Stream("bad".into()).is_retryable());
        assert!(!ParleyError::Protocol("noise".into()).is_retryable());
        assert!(!ParleyError::Cancelled.is_retryable());
    }

    #[test]
    fn display_includes_message() {
        let err = ParleyError::transport("API returned 502", Some(502));
        assert_eq!(err.to_string(), "transport error: API returned 502");
        assert!(ParleyError::Cancelled.is_cancelled());
    }
}
