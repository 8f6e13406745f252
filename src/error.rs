//! Error types for device-trust resolution.
//!
//! Only a few operations in this crate can fail: parsing a URL pattern,
//! parsing certificates, reading the certificate store, loading
//! configuration, and talking to the native helper. Endpoint resolution and
//! transport directives are total and never return these errors.

use thiserror::Error;

/// Result type alias using [`DeviceTrustError`].
pub type Result<T> = std::result::Result<T, DeviceTrustError>;

/// Errors that can occur while resolving device trust.
#[derive(Debug, Error)]
pub enum DeviceTrustError {
    /// A URL match pattern is not of the form `scheme://host[:port][/path]`.
    #[error("Invalid URL pattern '{pattern}': {reason}")]
    PatternFormat {
        /// The offending pattern.
        pattern: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Failed to parse an X.509 certificate.
    #[error("Certificate parsing error: {0}")]
    CertificateParsing(String),

    /// The certificate store could not be read.
    #[error("Certificate store error: {0}")]
    CertificateStore(String),

    /// The native helper answered with a non-empty `error` field.
    #[error("Native helper rejected command {command_id}: {message}")]
    HelperProtocol {
        /// Command ID of the failed request.
        command_id: u32,
        /// Error message reported by the helper.
        message: String,
    },

    /// The native helper is not installed or too old.
    #[error("Native helper unavailable: {0}")]
    HelperUnavailable(String),

    /// Spawning or talking to the native helper process failed.
    #[error("Native helper I/O error: {0}")]
    HelperIo(#[source] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Platform-specific error (Windows APIs, unsupported OS).
    #[error("Platform error: {0}")]
    Platform(String),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeviceTrustError {
    /// Create a pattern format error.
    pub fn pattern_format(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PatternFormat {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Create a certificate parsing error with the given message.
    pub fn certificate_parsing(msg: impl Into<String>) -> Self {
        Self::CertificateParsing(msg.into())
    }

    /// Create a certificate store error with the given message.
    pub fn certificate_store(msg: impl Into<String>) -> Self {
        Self::CertificateStore(msg.into())
    }

    /// Create a helper protocol error.
    pub fn helper_protocol(command_id: u32, message: impl Into<String>) -> Self {
        Self::HelperProtocol {
            command_id,
            message: message.into(),
        }
    }

    /// Create a helper unavailable error.
    pub fn helper_unavailable(msg: impl Into<String>) -> Self {
        Self::HelperUnavailable(msg.into())
    }

    /// Create a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a platform error with the given message.
    pub fn platform(msg: impl Into<String>) -> Self {
        Self::Platform(msg.into())
    }

    /// Returns true if the caller may reasonably retry the operation.
    ///
    /// Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::HelperIo(_) | Self::HelperProtocol { .. })
    }

    /// Returns true if this error means the helper is simply not there.
    pub fn is_helper_unavailable(&self) -> bool {
        matches!(self, Self::HelperUnavailable(_))
    }
}
