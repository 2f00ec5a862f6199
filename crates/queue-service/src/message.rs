//! Message types and identifiers shared by transports, receivers and distributors.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Suffix marking a FIFO queue or topic
pub const FIFO_SUFFIX: &str = ".fifo";

/// Attribute carrying the FIFO ordering key on received messages
pub const MESSAGE_GROUP_ID_ATTRIBUTE: &str = "MessageGroupId";

/// Attribute carrying the transport's delivery counter on received messages
pub const RECEIVE_COUNT_ATTRIBUTE: &str = "ApproximateReceiveCount";

/// Largest publish delay accepted by SQS
pub const MAX_DELAY_SECONDS: u32 = 900;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Longest SQS queue name, `.fifo` suffix included
pub const MAX_QUEUE_NAME_LENGTH: usize = 80;

/// Longest SNS topic name, `.fifo` suffix included
pub const MAX_TOPIC_NAME_LENGTH: usize = 256;

/// Validated queue or topic name
///
/// Names are ASCII alphanumerics, hyphens and underscores, optionally followed
/// by the `.fifo` suffix. Queue names are at most 80 characters and topic names
/// at most 256, the suffix counting towards both limits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        Self::with_max_length(name, "queue_name", MAX_QUEUE_NAME_LENGTH)
    }

    /// Create a topic name, which may be longer than a queue name
    pub fn topic(name: String) -> Result<Self, ValidationError> {
        Self::with_max_length(name, "topic_name", MAX_TOPIC_NAME_LENGTH)
    }

    fn with_max_length(name: String, field: &str, max_length: usize) -> Result<Self, ValidationError> {
        if name.is_empty() || name.len() > max_length {
            return Err(ValidationError::OutOfRange {
                field: field.to_string(),
                message: format!("must be 1-{} characters, got {}", max_length, name.len()),
            });
        }

        let base = strip_fifo_suffix(&name);
        if base.is_empty() {
            return Err(ValidationError::InvalidFormat {
                field: field.to_string(),
                message: "name cannot consist of the .fifo suffix alone".to_string(),
            });
        }

        if !base
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::InvalidFormat {
                field: field.to_string(),
                message: "only ASCII alphanumeric, hyphens, underscores and a trailing .fifo allowed"
                    .to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resource kind implied by the name
    pub fn kind(&self) -> QueueKind {
        QueueKind::from_name(&self.0)
    }
}

fn strip_fifo_suffix(name: &str) -> &str {
    let split = name.len().saturating_sub(FIFO_SUFFIX.len());
    match name.get(split..) {
        Some(tail) if tail.eq_ignore_ascii_case(FIFO_SUFFIX) => &name[..split],
        _ => name,
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for QueueName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QueueName> for String {
    fn from(value: QueueName) -> Self {
        value.0
    }
}

/// Delivery semantics of a queue or topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueKind {
    /// At-least-once delivery, best-effort ordering, no group key
    Standard,
    /// Ordered delivery within a message group
    Fifo,
}

impl QueueKind {
    /// Classify a resource by name; the `.fifo` suffix is matched case-insensitively
    pub fn from_name(name: &str) -> Self {
        if strip_fifo_suffix(name).len() < name.len() {
            Self::Fifo
        } else {
            Self::Standard
        }
    }

    pub fn is_fifo(&self) -> bool {
        matches!(self, Self::Fifo)
    }
}

impl std::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Fifo => write!(f, "fifo"),
        }
    }
}

/// Identity of a queue or topic together with its kind
///
/// The kind is derived from the name once, when the reference is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueRef {
    name: QueueName,
    kind: QueueKind,
}

impl QueueRef {
    pub fn new(name: QueueName) -> Self {
        let kind = name.kind();
        Self { name, kind }
    }

    pub fn name(&self) -> &QueueName {
        &self.name
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    pub fn is_fifo(&self) -> bool {
        self.kind.is_fifo()
    }
}

impl std::fmt::Display for QueueRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl FromStr for QueueRef {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(QueueName::from_str(s)?))
    }
}

/// Unique identifier assigned to a message by the transport
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        Self(id.to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Ordering key for messages on FIFO queues and topics
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageGroupId(String);

impl MessageGroupId {
    /// Create new group ID with validation
    pub fn new(id: String) -> Result<Self, ValidationError> {
        if id.is_empty() {
            return Err(ValidationError::Required {
                field: "message_group_id".to_string(),
            });
        }

        if id.len() > 128 {
            return Err(ValidationError::OutOfRange {
                field: "message_group_id".to_string(),
                message: "maximum 128 characters".to_string(),
            });
        }

        // SQS accepts alphanumerics and punctuation only
        if !id.chars().all(|c| c.is_ascii_graphic()) {
            return Err(ValidationError::InvalidFormat {
                field: "message_group_id".to_string(),
                message: "only printable ASCII characters without whitespace allowed".to_string(),
            });
        }

        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageGroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageGroupId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Opaque token identifying one delivery of a message
///
/// Required to delete the message or change its visibility.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub fn new(handle: String) -> Result<Self, ValidationError> {
        if handle.is_empty() {
            return Err(ValidationError::Required {
                field: "receipt_handle".to_string(),
            });
        }

        Ok(Self(handle))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReceiptHandle {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

// ============================================================================
// Transport Messages
// ============================================================================

/// Message as delivered by a transport, before any decoding
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub message_id: MessageId,
    pub body: String,
    pub receipt_handle: ReceiptHandle,
    pub attributes: HashMap<String, String>,
}

impl RawMessage {
    pub fn new(message_id: MessageId, body: impl Into<String>, receipt_handle: ReceiptHandle) -> Self {
        Self {
            message_id,
            body: body.into(),
            receipt_handle,
            attributes: HashMap::new(),
        }
    }

    /// Add a transport attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Add the FIFO group attribute
    pub fn with_message_group_id(self, group_id: &MessageGroupId) -> Self {
        self.with_attribute(MESSAGE_GROUP_ID_ATTRIBUTE, group_id.as_str())
    }

    /// Replace the body, keeping identifiers and attributes
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// FIFO group key, if present and valid
    pub fn message_group_id(&self) -> Option<MessageGroupId> {
        self.attributes
            .get(MESSAGE_GROUP_ID_ATTRIBUTE)
            .and_then(|id| MessageGroupId::new(id.clone()).ok())
    }

    /// Number of times the transport has delivered this message, if reported
    pub fn receive_count(&self) -> Option<u32> {
        self.attributes
            .get(RECEIVE_COUNT_ATTRIBUTE)
            .and_then(|count| count.parse().ok())
    }
}

/// Outbound request handed to a publisher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub body: String,
    pub message_group_id: Option<MessageGroupId>,
    pub delay_seconds: Option<u32>,
}

impl SendRequest {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            message_group_id: None,
            delay_seconds: None,
        }
    }

    pub fn with_message_group_id(mut self, group_id: MessageGroupId) -> Self {
        self.message_group_id = Some(group_id);
        self
    }

    pub fn with_delay_seconds(mut self, delay_seconds: u32) -> Self {
        self.delay_seconds = Some(delay_seconds);
        self
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
