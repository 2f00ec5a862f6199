//! AWS SNS topic publisher using the HTTP query API.
//!
//! Messages published here reach subscribed queues either raw or wrapped in a
//! notification envelope, depending on the subscription's raw message
//! delivery setting. Consumers of wrapped deliveries add a
//! [`NotificationUnwrapper`](crate::notification::NotificationUnwrapper) stage.

use super::aws::{
    check_message_size, deduplication_id, parse_message_id_response, AwsQueryClient,
};
use crate::config::TopicConfiguration;
use crate::error::TransportError;
use crate::message::{MessageId, QueueRef, SendRequest};
use crate::transport::MessagePublisher;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

#[cfg(test)]
#[path = "sns_tests.rs"]
mod tests;

const SNS_API_VERSION: &str = "2010-03-31";

/// Publisher for one SNS topic
pub struct SnsPublisher {
    client: AwsQueryClient,
    config: TopicConfiguration,
    topic: QueueRef,
}

impl SnsPublisher {
    pub fn new(config: TopicConfiguration) -> Result<Self, TransportError> {
        config.validate()?;
        let topic = config.topic_ref()?;
        let credentials = config.resolve_credentials()?;

        let client = AwsQueryClient::new(
            &config.endpoint_url(),
            &config.region,
            "sns",
            SNS_API_VERSION,
            credentials,
            std::time::Duration::from_secs(config.request_timeout_seconds),
        )?;

        Ok(Self {
            client,
            config,
            topic,
        })
    }

    pub fn topic_arn(&self) -> &str {
        &self.config.topic_arn
    }
}

impl fmt::Debug for SnsPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnsPublisher")
            .field("topic_arn", &self.config.topic_arn)
            .finish()
    }
}

#[async_trait]
impl MessagePublisher for SnsPublisher {
    fn destination(&self) -> &QueueRef {
        &self.topic
    }

    async fn send(&self, request: SendRequest) -> Result<MessageId, TransportError> {
        check_message_size(&request.body)?;

        if let Some(delay) = request.delay_seconds {
            // Topics deliver immediately; there is no publish delay
            warn!(topic = %self.topic, delay_seconds = delay, "Ignoring delay for topic publish");
        }

        let mut params = BTreeMap::new();
        params.insert("TopicArn".to_string(), self.config.topic_arn.clone());
        params.insert("Message".to_string(), request.body.clone());

        if self.topic.is_fifo() {
            if let Some(group_id) = &request.message_group_id {
                params.insert("MessageGroupId".to_string(), group_id.to_string());
            }
            if !self.config.content_based_deduplication {
                params.insert(
                    "MessageDeduplicationId".to_string(),
                    deduplication_id(&request),
                );
            }
        }

        let response = self.client.call("Publish", params).await?;
        Ok(parse_message_id_response(&response)?)
    }
}
