//! Error types for message encoding, transport and consumption.

use std::time::Duration;
use thiserror::Error;

/// Errors reported by a queue or topic transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Receipt handle is invalid or expired: {receipt}")]
    InvalidReceipt { receipt: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Permission denied for operation: {operation}")]
    PermissionDenied { operation: String },

    #[error("Message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Provider error ({provider}): {code} - {message}")]
    ProviderError {
        provider: String,
        code: String,
        message: String,
    },

    #[error("Unexpected response from transport: {message}")]
    InvalidResponse { message: String },

    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),
}

impl TransportError {
    /// Check if error is transient and the operation may succeed when repeated
    pub fn is_transient(&self) -> bool {
        match self {
            Self::QueueNotFound { .. } => false,
            Self::InvalidReceipt { .. } => false,
            Self::Timeout { .. } => true,
            Self::ConnectionFailed { .. } => true,
            Self::AuthenticationFailed { .. } => false,
            Self::PermissionDenied { .. } => false,
            Self::MessageTooLarge { .. } => false,
            Self::ProviderError { .. } => true, // Throttling and 5xx land here
            Self::InvalidResponse { .. } => false,
            Self::ConfigurationError(_) => false,
            Self::ValidationError(_) => false,
        }
    }

    /// Get suggested delay before the caller polls or sends again
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Timeout { .. } => Some(Duration::from_secs(1)),
            Self::ConnectionFailed { .. } => Some(Duration::from_secs(5)),
            Self::ProviderError { .. } => Some(Duration::from_secs(5)),
            _ => None,
        }
    }
}

/// Errors converting between a typed payload and its wire string
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to decode message body: {message}")]
    Decode { message: String },

    #[error("Failed to encode payload: {message}")]
    Encode { message: String },
}

/// Failure reported by application code handling a message
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Message rejected: {reason}")]
    Rejected { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    /// Create a rejection with the given reason
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

/// Errors raised by a pre-processing stage before decoding
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Message body is not a valid topic notification: {message}")]
    MalformedNotification { message: String },

    #[error("Unexpected notification type '{notification_type}'")]
    UnexpectedNotificationType { notification_type: String },

    #[error("Notification from topic '{actual}' where '{expected}' was expected")]
    TopicMismatch { expected: String, actual: String },

    #[error("Notification signature is invalid: {message}")]
    InvalidSignature { message: String },

    #[error("Signing certificate {url} is unavailable: {message}")]
    CertificateUnavailable { url: String, message: String },
}

/// Per-message pipeline failure; every variant leads to a visibility extension
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Pre-processing failed: {0}")]
    Preprocess(#[from] PreprocessError),

    #[error("Decoding failed: {0}")]
    Decode(#[from] CodecError),

    #[error("Handler failed: {0}")]
    Handler(#[from] HandlerError),
}

impl ProcessingError {
    /// Short label for the pipeline stage that failed, used in log fields
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Preprocess(_) => "preprocess",
            Self::Decode(_) => "decode",
            Self::Handler(_) => "handler",
        }
    }
}

/// Errors publishing a payload through a distributor
#[derive(Debug, Error)]
pub enum DistributeError {
    #[error("Failed to encode payload: {0}")]
    Encode(#[from] CodecError),

    #[error("Failed to send message: {0}")]
    Transport(#[from] TransportError),
}

impl DistributeError {
    /// Check if the publish may succeed when repeated by the caller
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Encode(_) => false,
            Self::Transport(e) => e.is_transient(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
