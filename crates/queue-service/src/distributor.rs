//! Typed publishing to a queue or topic.

use crate::codec::Codec;
use crate::envelope::EnvelopeFactory;
use crate::error::DistributeError;
use crate::message::{MessageGroupId, MessageId, QueueRef};
use crate::transport::MessagePublisher;
use tracing::{debug, error, warn};

#[cfg(test)]
#[path = "distributor_tests.rs"]
mod tests;

/// Encodes payloads and sends them through a publisher
///
/// Every call results in exactly one send. Failures are returned to the caller
/// without any retry.
pub struct Distributor<F, C, P> {
    factory: EnvelopeFactory<F, C>,
    publisher: P,
}

impl<F, C, P> Distributor<F, C, P>
where
    C: Codec<F>,
    P: MessagePublisher,
{
    pub fn new(codec: C, publisher: P) -> Self {
        Self {
            factory: EnvelopeFactory::new(codec),
            publisher,
        }
    }

    pub fn destination(&self) -> &QueueRef {
        self.publisher.destination()
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Publish a payload
    ///
    /// The group ID is forwarded only when the destination is FIFO. The delay
    /// is forwarded to the publisher as given.
    pub async fn distribute(
        &self,
        payload: F,
        message_group_id: Option<MessageGroupId>,
        delay_seconds: Option<u32>,
    ) -> Result<MessageId, DistributeError> {
        let destination = self.publisher.destination();

        let mut envelope = self.factory.from_payload(payload, message_group_id)?;
        if let Some(delay) = delay_seconds {
            envelope = envelope.with_delay_seconds(delay);
        }

        if destination.is_fifo() && envelope.message_group_id.is_none() {
            warn!(
                destination = %destination,
                "Sending to FIFO destination without a message group ID"
            );
        }

        let request = envelope.to_send_request(destination.kind());
        match self.publisher.send(request).await {
            Ok(message_id) => {
                debug!(
                    destination = %destination,
                    message_id = %message_id,
                    "Message sent successfully"
                );
                Ok(message_id)
            }
            Err(e) => {
                error!(destination = %destination, error = %e, "Failed to send message");
                Err(e.into())
            }
        }
    }

    pub async fn distribute_payload(&self, payload: F) -> Result<MessageId, DistributeError> {
        self.distribute(payload, None, None).await
    }

    pub async fn distribute_with_group(
        &self,
        payload: F,
        message_group_id: MessageGroupId,
    ) -> Result<MessageId, DistributeError> {
        self.distribute(payload, Some(message_group_id), None).await
    }

    pub async fn distribute_with_delay(
        &self,
        payload: F,
        delay_seconds: u32,
    ) -> Result<MessageId, DistributeError> {
        self.distribute(payload, None, Some(delay_seconds)).await
    }
}
