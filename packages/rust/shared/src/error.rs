//! Error types for Prospector.
//!
//! Library crates use [`ProspectorError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Budget denials, poll timeouts and "no relevant provider" outcomes are not
//! errors; they are reported as data on the enrichment result.

use std::path::PathBuf;

/// Top-level error type for all Prospector operations.
#[derive(Debug, thiserror::Error)]
pub enum ProspectorError {
    /// Configuration loading, validation, or provider registration error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level HTTP error.
    #[error("network error: {0}")]
    Network(String),

    /// A single provider failed (threw or returned a malformed response).
    #[error("provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    /// Upstream payload could not be parsed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid caller input (malformed entity file, bad argument, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ProspectorError>;

impl ProspectorError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a provider error attributed to `provider`.
    pub fn provider(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Message suitable for a per-provider error record, without the
    /// variant prefix when the error already names its provider.
    pub fn provider_message(&self) -> String {
        match self {
            Self::Provider { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ProspectorError::config("provider name must not be empty");
        assert_eq!(err.to_string(), "config error: provider name must not be empty");

        let err = ProspectorError::provider("state-registry", "HTTP 500");
        assert_eq!(err.to_string(), "provider state-registry failed: HTTP 500");
    }

    #[test]
    fn provider_message_strips_prefix() {
        let err = ProspectorError::provider("email-discovery", "quota exceeded");
        assert_eq!(err.provider_message(), "quota exceeded");

        let err = ProspectorError::Network("connection reset".into());
        assert_eq!(err.provider_message(), "network error: connection reset");
    }
}
