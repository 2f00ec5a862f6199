//! Message consumption and redelivery.
//!
//! [`MessageReceiver::receive_messages`] pulls one batch from a transport and
//! runs every message through the same pipeline:
//!
//! ```text
//! RECEIVED -> pre-process -> decode -> handler -> DELETED
//!                  \            \          \
//!                   +------------+----------+--> RETRY_SCHEDULED
//! ```
//!
//! A failure at any stage hides the message for the retry delay so the
//! transport redelivers it later. Per-message failures are logged and reported
//! in the [`BatchOutcome`]; they never fail the batch.

use crate::codec::Codec;
use crate::envelope::{EnvelopeFactory, MessageEnvelope};
use crate::error::{ConfigurationError, HandlerError, ProcessingError, TransportError};
use crate::message::{MessageId, QueueRef, RawMessage};
use crate::notification::NotificationUnwrapper;
use crate::retry::RetryPolicy;
use crate::transport::{MessagePreprocessor, QueueTransport};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "receiver_tests.rs"]
mod tests;

// ============================================================================
// Handler
// ============================================================================

/// Application callback invoked once per successfully decoded message
///
/// Returning `Ok` deletes the message; returning an error schedules it for
/// redelivery.
#[async_trait]
pub trait MessageHandler<F: Send + Sync>: Send + Sync {
    async fn on_message(
        &self,
        queue: &QueueRef,
        envelope: &MessageEnvelope<F>,
    ) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F, H> MessageHandler<F> for Arc<H>
where
    F: Send + Sync,
    H: MessageHandler<F> + ?Sized,
{
    async fn on_message(
        &self,
        queue: &QueueRef,
        envelope: &MessageEnvelope<F>,
    ) -> Result<(), HandlerError> {
        (**self).on_message(queue, envelope).await
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Receiver behaviour settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Visibility delay applied to failed messages
    pub retry_policy: RetryPolicy,

    /// Messages of one batch processed at the same time; 1 keeps delivery order
    pub max_concurrency: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            max_concurrency: 1,
        }
    }
}

impl ReceiverConfig {
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_concurrency == 0 {
            return Err(ConfigurationError::Invalid {
                message: "max_concurrency must be at least 1".to_string(),
            });
        }

        if self.retry_policy.backoff_multiplier.is_nan() || self.retry_policy.backoff_multiplier < 0.0
        {
            return Err(ConfigurationError::Invalid {
                message: "retry_policy.backoff_multiplier must be a non-negative number"
                    .to_string(),
            });
        }

        Ok(())
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Terminal action taken for one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageDisposition {
    /// Handled and removed from the queue
    Deleted,
    /// Processing failed; the message is hidden for `delay_seconds`
    RetryScheduled { delay_seconds: u32 },
    /// Handled, but the delete call failed; the transport will redeliver it
    DeleteFailed,
    /// Processing failed and the visibility change also failed
    RetryFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageOutcome {
    pub message_id: MessageId,
    pub disposition: MessageDisposition,
}

/// Result of one `receive_messages` call, in completion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub outcomes: Vec<MessageOutcome>,
}

impl BatchOutcome {
    pub fn received(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn deleted(&self) -> usize {
        self.count(|d| matches!(d, MessageDisposition::Deleted))
    }

    pub fn retried(&self) -> usize {
        self.count(|d| matches!(d, MessageDisposition::RetryScheduled { .. }))
    }

    pub fn failed_terminal_actions(&self) -> usize {
        self.count(|d| {
            matches!(
                d,
                MessageDisposition::DeleteFailed | MessageDisposition::RetryFailed
            )
        })
    }

    /// Disposition recorded for a message, if it was part of this batch
    pub fn disposition_of(&self, message_id: &MessageId) -> Option<&MessageDisposition> {
        self.outcomes
            .iter()
            .find(|o| &o.message_id == message_id)
            .map(|o| &o.disposition)
    }

    fn count(&self, predicate: impl Fn(&MessageDisposition) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|o| predicate(&o.disposition))
            .count()
    }
}

// ============================================================================
// Receiver
// ============================================================================

/// Pulls messages from a transport and dispatches them to a handler
pub struct MessageReceiver<F, C, H> {
    factory: EnvelopeFactory<F, C>,
    handler: H,
    preprocessors: Vec<Box<dyn MessagePreprocessor>>,
    config: ReceiverConfig,
}

impl<F, C, H> MessageReceiver<F, C, H>
where
    F: Send + Sync,
    C: Codec<F>,
    H: MessageHandler<F>,
{
    pub fn new(codec: C, handler: H) -> Self {
        Self {
            factory: EnvelopeFactory::new(codec),
            handler,
            preprocessors: Vec::new(),
            config: ReceiverConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ReceiverConfig) -> Self {
        self.config = config;
        self
    }

    /// Append a pre-processing stage; stages run in the order they were added
    pub fn with_preprocessor(mut self, preprocessor: impl MessagePreprocessor + 'static) -> Self {
        self.preprocessors.push(Box::new(preprocessor));
        self
    }

    /// Unwrap topic notifications before decoding
    pub fn with_notification_unwrapping(self) -> Self {
        self.with_preprocessor(NotificationUnwrapper::new())
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Pull one batch and settle every message in it
    ///
    /// Only a failure of the batch pull itself is returned; per-message
    /// failures are reported in the outcome.
    pub async fn receive_messages<T>(&self, transport: &T) -> Result<BatchOutcome, TransportError>
    where
        T: QueueTransport + ?Sized,
    {
        let queue = transport.queue().clone();
        let messages = transport.receive_batch().await?;

        if messages.is_empty() {
            debug!(queue = %queue, "No messages received");
            return Ok(BatchOutcome::default());
        }

        debug!(queue = %queue, count = messages.len(), "Received message batch");

        let concurrency = self.config.max_concurrency.max(1);
        let outcomes: Vec<MessageOutcome> = stream::iter(messages)
            .map(|message| self.settle_message(transport, &queue, message))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let outcome = BatchOutcome { outcomes };
        info!(
            queue = %queue,
            received = outcome.received(),
            deleted = outcome.deleted(),
            retried = outcome.retried(),
            "Processed message batch"
        );

        Ok(outcome)
    }

    /// Run the pre-process, decode and handle stages for one message
    pub async fn process(&self, queue: &QueueRef, message: RawMessage) -> Result<(), ProcessingError> {
        let message = self.preprocess(message).await?;
        let envelope = self.factory.from_transport_message(&message)?;
        self.handler.on_message(queue, &envelope).await?;
        Ok(())
    }

    async fn preprocess(&self, mut message: RawMessage) -> Result<RawMessage, ProcessingError> {
        for stage in &self.preprocessors {
            message = stage.process(message).await.map_err(|e| {
                debug!(stage = stage.name(), error = %e, "Pre-processing stage rejected message");
                ProcessingError::from(e)
            })?;
        }
        Ok(message)
    }

    async fn settle_message<T>(
        &self,
        transport: &T,
        queue: &QueueRef,
        message: RawMessage,
    ) -> MessageOutcome
    where
        T: QueueTransport + ?Sized,
    {
        let message_id = message.message_id.clone();
        let receipt = message.receipt_handle.clone();
        let receive_count = message.receive_count();

        let disposition = match self.process(queue, message).await {
            Ok(()) => match transport.delete_message(&receipt).await {
                Ok(()) => {
                    debug!(queue = %queue, message_id = %message_id, "Message handled and deleted");
                    MessageDisposition::Deleted
                }
                Err(e) => {
                    warn!(
                        queue = %queue,
                        message_id = %message_id,
                        error = %e,
                        "Failed to delete handled message; it will be redelivered"
                    );
                    MessageDisposition::DeleteFailed
                }
            },
            Err(error) => {
                let delay_seconds = self.config.retry_policy.calculate_delay(receive_count);
                warn!(
                    queue = %queue,
                    message_id = %message_id,
                    stage = error.stage(),
                    error = %error,
                    receive_count = receive_count.unwrap_or(1),
                    delay_seconds,
                    "Message processing failed, scheduling redelivery"
                );

                match transport.extend_visibility(&receipt, delay_seconds).await {
                    Ok(()) => MessageDisposition::RetryScheduled { delay_seconds },
                    Err(e) => {
                        warn!(
                            queue = %queue,
                            message_id = %message_id,
                            error = %e,
                            "Failed to extend message visibility"
                        );
                        MessageDisposition::RetryFailed
                    }
                }
            }
        };

        MessageOutcome {
            message_id,
            disposition,
        }
    }
}
