//! Topic notification envelopes and the pre-processing stage that removes them.
//!
//! When a queue subscribes to an SNS topic without raw message delivery, every
//! message body is a JSON notification whose `Message` field holds the payload
//! that was published. [`NotificationUnwrapper`] replaces the body with that
//! inner payload so the rest of the pipeline sees what the publisher sent.
//!
//! Signatures are only checked when the unwrapper is built with
//! [`NotificationUnwrapper::with_signature_verification`]; the in-memory topic
//! does not sign its notifications.

use crate::error::PreprocessError;
use crate::message::RawMessage;
use crate::signature::SignatureVerifier;
use crate::transport::MessagePreprocessor;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Notification type carried by published messages
pub const NOTIFICATION_TYPE: &str = "Notification";

/// JSON envelope added by a topic around each published message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Notification {
    #[serde(rename = "Type")]
    pub notification_type: String,
    pub message_id: String,
    pub topic_arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(
        rename = "SigningCertURL",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub signing_cert_url: Option<String>,
    #[serde(
        rename = "UnsubscribeURL",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub unsubscribe_url: Option<String>,
}

impl Notification {
    /// Wrap a published message the way a topic delivers it to subscribers
    pub fn new(topic_arn: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            notification_type: NOTIFICATION_TYPE.to_string(),
            message_id: uuid::Uuid::new_v4().to_string(),
            topic_arn: topic_arn.into(),
            subject: None,
            message: message.into(),
            timestamp: Utc::now(),
            sequence_number: None,
            signature_version: None,
            signature: None,
            signing_cert_url: None,
            unsubscribe_url: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Parse a notification from a message body
    pub fn parse(body: &str) -> Result<Self, PreprocessError> {
        serde_json::from_str(body).map_err(|e| PreprocessError::MalformedNotification {
            message: e.to_string(),
        })
    }

    /// Render the notification as a message body
    pub fn to_body(&self) -> Result<String, PreprocessError> {
        serde_json::to_string(self).map_err(|e| PreprocessError::MalformedNotification {
            message: e.to_string(),
        })
    }
}

/// Replaces a notification body with the message it carries
///
/// Message ID, receipt handle and attributes (including the FIFO group key)
/// are those of the queue delivery, not of the notification.
#[derive(Debug, Clone, Default)]
pub struct NotificationUnwrapper {
    expected_topic_arn: Option<String>,
    verifier: Option<Arc<SignatureVerifier>>,
}

impl NotificationUnwrapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject notifications that were not published to `topic_arn`
    pub fn with_expected_topic(mut self, topic_arn: impl Into<String>) -> Self {
        self.expected_topic_arn = Some(topic_arn.into());
        self
    }

    /// Reject notifications whose SNS signature does not verify
    ///
    /// Signing certificates are downloaded from the notification's
    /// `SigningCertURL` and cached.
    pub fn with_signature_verification(self) -> Result<Self, PreprocessError> {
        Ok(self.with_signature_verifier(SignatureVerifier::new()?))
    }

    pub fn with_signature_verifier(mut self, verifier: SignatureVerifier) -> Self {
        self.verifier = Some(Arc::new(verifier));
        self
    }

    pub fn verifies_signatures(&self) -> bool {
        self.verifier.is_some()
    }

    /// Strip the notification envelope from a received message
    pub fn unwrap(&self, message: RawMessage) -> Result<RawMessage, PreprocessError> {
        let notification = Notification::parse(&message.body)?;

        if notification.notification_type != NOTIFICATION_TYPE {
            return Err(PreprocessError::UnexpectedNotificationType {
                notification_type: notification.notification_type,
            });
        }

        if let Some(expected) = &self.expected_topic_arn {
            if *expected != notification.topic_arn {
                return Err(PreprocessError::TopicMismatch {
                    expected: expected.clone(),
                    actual: notification.topic_arn,
                });
            }
        }

        debug!(
            message_id = %message.message_id,
            notification_id = %notification.message_id,
            topic_arn = %notification.topic_arn,
            "Unwrapped topic notification"
        );

        Ok(message.with_body(notification.message))
    }
}

#[async_trait]
impl MessagePreprocessor for NotificationUnwrapper {
    fn name(&self) -> &str {
        "notification-unwrap"
    }

    async fn process(&self, message: RawMessage) -> Result<RawMessage, PreprocessError> {
        if let Some(verifier) = &self.verifier {
            verifier.verify(&message.body).await?;
        }
        self.unwrap(message)
    }
}

#[cfg(test)]
#[path = "notification_tests.rs"]
mod tests;
