//! Queue and topic connection settings.

use crate::error::{ConfigurationError, ValidationError};
use crate::message::{QueueName, QueueRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Region used when none is configured
pub const DEFAULT_REGION: &str = "eu-central-1";

/// Longest long-poll wait SQS accepts
pub const MAX_WAIT_TIME_SECONDS: u32 = 20;

/// Largest batch a single ReceiveMessage call returns
pub const MAX_RECEIVE_BATCH: u32 = 10;

// ============================================================================
// Credentials
// ============================================================================

/// Static AWS credentials used to sign requests
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

impl AwsCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, session_token: impl Into<String>) -> Self {
        self.session_token = Some(session_token.into());
        self
    }

    /// Read the standard `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` variables
    pub fn from_env() -> Option<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").ok()?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok()?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Some(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

fn resolve_credentials(
    configured: &Option<AwsCredentials>,
) -> Result<AwsCredentials, ConfigurationError> {
    configured
        .clone()
        .or_else(AwsCredentials::from_env)
        .ok_or_else(|| ConfigurationError::Missing {
            key: "credentials".to_string(),
        })
}

fn validate_region(region: &str) -> Result<(), ConfigurationError> {
    if region.is_empty() {
        return Err(ConfigurationError::Invalid {
            message: "region cannot be empty".to_string(),
        });
    }
    Ok(())
}

fn validate_endpoint(endpoint: &Option<String>) -> Result<(), ConfigurationError> {
    if let Some(endpoint) = endpoint {
        url::Url::parse(endpoint).map_err(|e| ConfigurationError::Invalid {
            message: format!("endpoint '{}' is not a valid URL: {}", endpoint, e),
        })?;
    }
    Ok(())
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

// ============================================================================
// Queue Configuration
// ============================================================================

/// Connection and polling settings for one SQS queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfiguration {
    pub queue_name: String,

    #[serde(default = "default_region")]
    pub region: String,

    /// Overrides the regional endpoint, e.g. for LocalStack
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<AwsCredentials>,

    /// How long a received message stays hidden from other consumers
    #[serde(default = "QueueConfiguration::default_visibility_timeout")]
    pub visibility_timeout_seconds: u32,

    /// Long-poll wait for each receive call
    #[serde(default = "QueueConfiguration::default_wait_time")]
    pub wait_time_seconds: u32,

    #[serde(default = "QueueConfiguration::default_max_messages")]
    pub max_number_of_messages: u32,

    /// When false, a SHA-256 deduplication ID is sent with FIFO messages
    #[serde(default = "QueueConfiguration::default_content_based_deduplication")]
    pub content_based_deduplication: bool,

    /// HTTP timeout per request; must exceed the long-poll wait
    #[serde(default = "QueueConfiguration::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl QueueConfiguration {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            region: default_region(),
            endpoint: None,
            credentials: None,
            visibility_timeout_seconds: Self::default_visibility_timeout(),
            wait_time_seconds: Self::default_wait_time(),
            max_number_of_messages: Self::default_max_messages(),
            content_based_deduplication: Self::default_content_based_deduplication(),
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }

    fn default_visibility_timeout() -> u32 {
        300
    }

    fn default_wait_time() -> u32 {
        20
    }

    fn default_max_messages() -> u32 {
        1
    }

    fn default_content_based_deduplication() -> bool {
        true
    }

    fn default_request_timeout() -> u64 {
        30
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_credentials(mut self, credentials: AwsCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_wait_time_seconds(mut self, wait_time_seconds: u32) -> Self {
        self.wait_time_seconds = wait_time_seconds;
        self
    }

    pub fn with_max_number_of_messages(mut self, max_number_of_messages: u32) -> Self {
        self.max_number_of_messages = max_number_of_messages;
        self
    }

    pub fn with_content_based_deduplication(mut self, enabled: bool) -> Self {
        self.content_based_deduplication = enabled;
        self
    }

    /// Validated reference to the configured queue
    pub fn queue_ref(&self) -> Result<QueueRef, ValidationError> {
        Ok(QueueRef::new(QueueName::new(self.queue_name.clone())?))
    }

    /// Service endpoint, either the override or the regional default
    pub fn endpoint_url(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://sqs.{}.amazonaws.com", self.region))
    }

    /// Configured credentials, falling back to the standard environment variables
    pub fn resolve_credentials(&self) -> Result<AwsCredentials, ConfigurationError> {
        resolve_credentials(&self.credentials)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.queue_ref().map_err(|e| ConfigurationError::Invalid {
            message: format!("queue_name: {}", e),
        })?;
        validate_region(&self.region)?;
        validate_endpoint(&self.endpoint)?;

        if self.wait_time_seconds > MAX_WAIT_TIME_SECONDS {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "wait_time_seconds must be at most {}, got {}",
                    MAX_WAIT_TIME_SECONDS, self.wait_time_seconds
                ),
            });
        }

        if self.max_number_of_messages == 0 || self.max_number_of_messages > MAX_RECEIVE_BATCH {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "max_number_of_messages must be between 1 and {}, got {}",
                    MAX_RECEIVE_BATCH, self.max_number_of_messages
                ),
            });
        }

        if self.visibility_timeout_seconds > crate::retry::MAX_VISIBILITY_SECONDS {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "visibility_timeout_seconds must be at most {}",
                    crate::retry::MAX_VISIBILITY_SECONDS
                ),
            });
        }

        if self.request_timeout_seconds <= u64::from(self.wait_time_seconds) {
            return Err(ConfigurationError::Invalid {
                message: "request_timeout_seconds must exceed wait_time_seconds".to_string(),
            });
        }

        Ok(())
    }
}

// ============================================================================
// Topic Configuration
// ============================================================================

/// Connection settings for one SNS topic
///
/// Topics are addressed by ARN; creating them is left to infrastructure tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicConfiguration {
    pub topic_arn: String,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<AwsCredentials>,

    /// When false, a SHA-256 deduplication ID is sent with FIFO messages
    #[serde(default = "TopicConfiguration::default_content_based_deduplication")]
    pub content_based_deduplication: bool,

    #[serde(default = "TopicConfiguration::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl TopicConfiguration {
    pub fn new(topic_arn: impl Into<String>) -> Self {
        Self {
            topic_arn: topic_arn.into(),
            region: default_region(),
            endpoint: None,
            credentials: None,
            content_based_deduplication: Self::default_content_based_deduplication(),
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }

    fn default_content_based_deduplication() -> bool {
        true
    }

    fn default_request_timeout() -> u64 {
        30
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_credentials(mut self, credentials: AwsCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_content_based_deduplication(mut self, enabled: bool) -> Self {
        self.content_based_deduplication = enabled;
        self
    }

    /// Topic name, the last segment of the ARN
    pub fn topic_name(&self) -> Result<QueueName, ValidationError> {
        let name = topic_name_from_arn(&self.topic_arn).ok_or_else(|| {
            ValidationError::InvalidFormat {
                field: "topic_arn".to_string(),
                message: format!("'{}' is not an SNS topic ARN", self.topic_arn),
            }
        })?;
        QueueName::topic(name.to_string())
    }

    pub fn topic_ref(&self) -> Result<QueueRef, ValidationError> {
        Ok(QueueRef::new(self.topic_name()?))
    }

    pub fn endpoint_url(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://sns.{}.amazonaws.com", self.region))
    }

    pub fn resolve_credentials(&self) -> Result<AwsCredentials, ConfigurationError> {
        resolve_credentials(&self.credentials)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.topic_ref().map_err(|e| ConfigurationError::Invalid {
            message: format!("topic_arn: {}", e),
        })?;
        validate_region(&self.region)?;
        validate_endpoint(&self.endpoint)
    }
}

/// `arn:aws:sns:<region>:<account>:<name>` -> `<name>`
fn topic_name_from_arn(arn: &str) -> Option<&str> {
    let parts: Vec<&str> = arn.splitn(6, ':').collect();
    match parts.as_slice() {
        ["arn", _, "sns", _, _, name] if !name.is_empty() => Some(*name),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
