//! Transport seams used by the receiver and the distributor.

use crate::error::{PreprocessError, TransportError};
use crate::message::{MessageId, QueueRef, RawMessage, ReceiptHandle, SendRequest};
use async_trait::async_trait;
use std::sync::Arc;

/// Consumer side of a queue: pull, delete and reschedule messages
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Queue this transport reads from
    fn queue(&self) -> &QueueRef;

    /// Pull the next batch of messages; an empty batch is not an error
    async fn receive_batch(&self) -> Result<Vec<RawMessage>, TransportError>;

    /// Permanently remove a delivered message
    ///
    /// Deleting an already deleted message is not an error.
    async fn delete_message(&self, receipt: &ReceiptHandle) -> Result<(), TransportError>;

    /// Hide a delivered message for `delay_seconds` before it is redelivered
    async fn extend_visibility(
        &self,
        receipt: &ReceiptHandle,
        delay_seconds: u32,
    ) -> Result<(), TransportError>;
}

/// Producer side of a queue or topic
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Queue or topic this publisher writes to
    fn destination(&self) -> &QueueRef;

    /// Send one message and return the transport-assigned ID
    async fn send(&self, request: SendRequest) -> Result<MessageId, TransportError>;
}

/// Transformation applied to a received message before it is decoded
#[async_trait]
pub trait MessagePreprocessor: Send + Sync {
    /// Stage name used in log fields
    fn name(&self) -> &str;

    async fn process(&self, message: RawMessage) -> Result<RawMessage, PreprocessError>;
}

#[async_trait]
impl<T> QueueTransport for Arc<T>
where
    T: QueueTransport + ?Sized,
{
    fn queue(&self) -> &QueueRef {
        (**self).queue()
    }

    async fn receive_batch(&self) -> Result<Vec<RawMessage>, TransportError> {
        (**self).receive_batch().await
    }

    async fn delete_message(&self, receipt: &ReceiptHandle) -> Result<(), TransportError> {
        (**self).delete_message(receipt).await
    }

    async fn extend_visibility(
        &self,
        receipt: &ReceiptHandle,
        delay_seconds: u32,
    ) -> Result<(), TransportError> {
        (**self).extend_visibility(receipt, delay_seconds).await
    }
}

#[async_trait]
impl<T> MessagePublisher for Arc<T>
where
    T: MessagePublisher + ?Sized,
{
    fn destination(&self) -> &QueueRef {
        (**self).destination()
    }

    async fn send(&self, request: SendRequest) -> Result<MessageId, TransportError> {
        (**self).send(request).await
    }
}
