//! Tests for message receiver.

use super::*;
use crate::codec::JsonCodec;
use crate::message::{ReceiptHandle, MESSAGE_GROUP_ID_ATTRIBUTE, RECEIVE_COUNT_ATTRIBUTE};
use crate::notification::Notification;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// Test Doubles
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Order {
    id: u32,
}

/// Transport that serves one fixed batch and records terminal actions
struct MockTransport {
    queue: QueueRef,
    batch: Mutex<Vec<RawMessage>>,
    deleted: Arc<Mutex<Vec<String>>>,
    extended: Arc<Mutex<Vec<(String, u32)>>>,
    fail_receive: bool,
    fail_delete: bool,
    fail_extend: bool,
    on_delete: Option<(String, Arc<Notify>)>,
}

impl MockTransport {
    fn new(queue: &str, batch: Vec<RawMessage>) -> Self {
        Self {
            queue: QueueRef::from_str(queue).unwrap(),
            batch: Mutex::new(batch),
            deleted: Arc::new(Mutex::new(Vec::new())),
            extended: Arc::new(Mutex::new(Vec::new())),
            fail_receive: false,
            fail_delete: false,
            fail_extend: false,
            on_delete: None,
        }
    }

    fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    fn extended(&self) -> Vec<(String, u32)> {
        self.extended.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueueTransport for MockTransport {
    fn queue(&self) -> &QueueRef {
        &self.queue
    }

    async fn receive_batch(&self) -> Result<Vec<RawMessage>, TransportError> {
        if self.fail_receive {
            return Err(TransportError::ConnectionFailed {
                message: "connection reset".to_string(),
            });
        }
        Ok(std::mem::take(&mut *self.batch.lock().unwrap()))
    }

    async fn delete_message(&self, receipt: &ReceiptHandle) -> Result<(), TransportError> {
        if self.fail_delete {
            return Err(TransportError::InvalidReceipt {
                receipt: receipt.to_string(),
            });
        }
        self.deleted.lock().unwrap().push(receipt.to_string());
        if let Some((trigger, notify)) = &self.on_delete {
            if trigger == receipt.as_str() {
                notify.notify_one();
            }
        }
        Ok(())
    }

    async fn extend_visibility(
        &self,
        receipt: &ReceiptHandle,
        delay_seconds: u32,
    ) -> Result<(), TransportError> {
        if self.fail_extend {
            return Err(TransportError::ConnectionFailed {
                message: "connection reset".to_string(),
            });
        }
        self.extended
            .lock()
            .unwrap()
            .push((receipt.to_string(), delay_seconds));
        Ok(())
    }
}

/// Handler recording every envelope; orders listed in `reject` fail
#[derive(Default)]
struct RecordingHandler {
    seen: Arc<Mutex<Vec<(String, MessageEnvelope<Order>)>>>,
    reject: Vec<u32>,
    wait_for: Option<(u32, Arc<Notify>)>,
}

impl RecordingHandler {
    fn rejecting(ids: &[u32]) -> Self {
        Self {
            reject: ids.to_vec(),
            ..Default::default()
        }
    }

    fn seen_ids(&self) -> Vec<u32> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.content.id)
            .collect()
    }
}

#[async_trait]
impl MessageHandler<Order> for RecordingHandler {
    async fn on_message(
        &self,
        queue: &QueueRef,
        envelope: &MessageEnvelope<Order>,
    ) -> Result<(), HandlerError> {
        if let Some((id, notify)) = &self.wait_for {
            if *id == envelope.content.id {
                notify.notified().await;
            }
        }

        self.seen
            .lock()
            .unwrap()
            .push((queue.to_string(), envelope.clone()));

        if self.reject.contains(&envelope.content.id) {
            return Err(HandlerError::rejected(format!("order {}", envelope.content.id)));
        }
        Ok(())
    }
}

fn order_message(id: u32, receipt: &str) -> RawMessage {
    RawMessage::new(
        MessageId::from_str(&format!("m-{}", receipt)).unwrap(),
        format!(r#"{{"id":{}}}"#, id),
        ReceiptHandle::new(receipt.to_string()).unwrap(),
    )
}

fn raw_message(body: &str, receipt: &str) -> RawMessage {
    RawMessage::new(
        MessageId::from_str(&format!("m-{}", receipt)).unwrap(),
        body,
        ReceiptHandle::new(receipt.to_string()).unwrap(),
    )
}

fn receiver(
    handler: RecordingHandler,
) -> MessageReceiver<Order, JsonCodec<Order>, RecordingHandler> {
    MessageReceiver::new(JsonCodec::new(), handler)
}

// ============================================================================
// Terminal Action Tests
// ============================================================================

mod terminal_action_tests {
    use super::*;

    /// Verify a handled message is deleted once and never rescheduled
    #[tokio::test]
    async fn test_success_deletes_message() {
        // Arrange
        let transport = MockTransport::new("orders", vec![order_message(1, "r1")]);
        let receiver = receiver(RecordingHandler::default());

        // Act
        let outcome = receiver.receive_messages(&transport).await.unwrap();

        // Assert
        assert_eq!(transport.deleted(), vec!["r1".to_string()]);
        assert!(transport.extended().is_empty());
        assert_eq!(outcome.deleted(), 1);
        assert_eq!(
            outcome.disposition_of(&MessageId::from_str("m-r1").unwrap()),
            Some(&MessageDisposition::Deleted)
        );
    }

    /// Verify a handler failure extends visibility by the retry delay and never deletes
    #[tokio::test]
    async fn test_handler_failure_schedules_retry() {
        let transport = MockTransport::new("orders", vec![order_message(1, "r1")]);
        let receiver = receiver(RecordingHandler::rejecting(&[1]));

        let outcome = receiver.receive_messages(&transport).await.unwrap();

        assert!(transport.deleted().is_empty());
        assert_eq!(transport.extended(), vec![("r1".to_string(), 120)]);
        assert_eq!(outcome.retried(), 1);
    }

    /// Verify an undecodable body is retried without reaching the handler
    #[tokio::test]
    async fn test_decode_failure_schedules_retry() {
        let transport = MockTransport::new("orders", vec![raw_message("{not json", "r1")]);
        let receiver = receiver(RecordingHandler::default());

        let outcome = receiver.receive_messages(&transport).await.unwrap();

        assert!(receiver.handler().seen_ids().is_empty());
        assert!(transport.deleted().is_empty());
        assert_eq!(transport.extended(), vec![("r1".to_string(), 120)]);
        assert_eq!(
            outcome.outcomes[0].disposition,
            MessageDisposition::RetryScheduled { delay_seconds: 120 }
        );
    }

    /// Verify the configured retry delay is applied
    #[tokio::test]
    async fn test_configured_retry_delay() {
        let transport = MockTransport::new("orders", vec![order_message(1, "r1")]);
        let receiver = receiver(RecordingHandler::rejecting(&[1]))
            .with_config(ReceiverConfig::default().with_retry_policy(RetryPolicy::fixed(15)));

        receiver.receive_messages(&transport).await.unwrap();

        assert_eq!(transport.extended(), vec![("r1".to_string(), 15)]);
    }

    /// Verify exponential retry grows with the transport receive count
    #[tokio::test]
    async fn test_exponential_retry_uses_receive_count() {
        let transport = MockTransport::new(
            "orders",
            vec![order_message(1, "r1").with_attribute(RECEIVE_COUNT_ATTRIBUTE, "3")],
        );
        let receiver = receiver(RecordingHandler::rejecting(&[1])).with_config(
            ReceiverConfig::default().with_retry_policy(RetryPolicy::exponential(10, 600, 2.0)),
        );

        receiver.receive_messages(&transport).await.unwrap();

        assert_eq!(transport.extended(), vec![("r1".to_string(), 40)]);
    }
}

// ============================================================================
// Failure Isolation Tests
// ============================================================================

mod isolation_tests {
    use super::*;

    /// Verify one failing message does not affect the rest of the batch
    #[tokio::test]
    async fn test_failures_are_isolated() {
        // Arrange
        let transport = MockTransport::new(
            "orders",
            vec![
                order_message(1, "r1"),
                raw_message("garbage", "r2"),
                order_message(3, "r3"),
                order_message(4, "r4"),
            ],
        );
        let receiver = receiver(RecordingHandler::rejecting(&[4]));

        // Act
        let outcome = receiver.receive_messages(&transport).await.unwrap();

        // Assert
        assert_eq!(transport.deleted(), vec!["r1".to_string(), "r3".to_string()]);
        assert_eq!(
            transport.extended(),
            vec![("r2".to_string(), 120), ("r4".to_string(), 120)]
        );
        assert_eq!(outcome.received(), 4);
        assert_eq!(outcome.deleted(), 2);
        assert_eq!(outcome.retried(), 2);
    }

    /// Verify a failed delete is reported but does not fail the batch
    #[tokio::test]
    async fn test_delete_failure_is_swallowed() {
        let mut transport = MockTransport::new("orders", vec![order_message(1, "r1")]);
        transport.fail_delete = true;
        let receiver = receiver(RecordingHandler::default());

        let outcome = receiver.receive_messages(&transport).await.unwrap();

        assert_eq!(outcome.outcomes[0].disposition, MessageDisposition::DeleteFailed);
        assert!(transport.extended().is_empty());
        assert_eq!(outcome.failed_terminal_actions(), 1);
    }

    /// Verify a failed visibility change is reported but does not fail the batch
    #[tokio::test]
    async fn test_extend_failure_is_swallowed() {
        let mut transport = MockTransport::new("orders", vec![order_message(1, "r1")]);
        transport.fail_extend = true;
        let receiver = receiver(RecordingHandler::rejecting(&[1]));

        let outcome = receiver.receive_messages(&transport).await.unwrap();

        assert_eq!(outcome.outcomes[0].disposition, MessageDisposition::RetryFailed);
        assert!(transport.deleted().is_empty());
    }

    /// Verify a failed batch pull is returned to the caller
    #[tokio::test]
    async fn test_receive_failure_propagates() {
        let mut transport = MockTransport::new("orders", vec![order_message(1, "r1")]);
        transport.fail_receive = true;
        let receiver = receiver(RecordingHandler::default());

        let result = receiver.receive_messages(&transport).await;

        assert!(matches!(result, Err(TransportError::ConnectionFailed { .. })));
    }

    /// Verify an empty batch performs no terminal actions
    #[tokio::test]
    async fn test_empty_batch() {
        let transport = MockTransport::new("orders", Vec::new());
        let receiver = receiver(RecordingHandler::default());

        let outcome = receiver.receive_messages(&transport).await.unwrap();

        assert!(outcome.is_empty());
        assert!(transport.deleted().is_empty());
        assert!(transport.extended().is_empty());
    }
}

// ============================================================================
// Dispatch Tests
// ============================================================================

mod dispatch_tests {
    use super::*;

    /// Verify sequential processing follows delivery order
    #[tokio::test]
    async fn test_sequential_processing_preserves_order() {
        let transport = MockTransport::new(
            "orders",
            vec![
                order_message(3, "r3"),
                order_message(1, "r1"),
                order_message(2, "r2"),
            ],
        );
        let receiver = receiver(RecordingHandler::default());

        receiver.receive_messages(&transport).await.unwrap();

        assert_eq!(receiver.handler().seen_ids(), vec![3, 1, 2]);
        assert_eq!(
            transport.deleted(),
            vec!["r3".to_string(), "r1".to_string(), "r2".to_string()]
        );
    }

    /// Verify a slow message does not hold back the terminal action of another
    #[tokio::test]
    async fn test_concurrent_dispatch_does_not_block() {
        // Arrange: order 1 is only released once order 2 has been deleted
        let release = Arc::new(Notify::new());
        let mut transport = MockTransport::new(
            "orders",
            vec![order_message(1, "r1"), order_message(2, "r2")],
        );
        transport.on_delete = Some(("r2".to_string(), Arc::clone(&release)));
        let handler = RecordingHandler {
            wait_for: Some((1, Arc::clone(&release))),
            ..Default::default()
        };
        let receiver = receiver(handler)
            .with_config(ReceiverConfig::default().with_max_concurrency(2));

        // Act
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            receiver.receive_messages(&transport),
        )
        .await
        .expect("batch should complete without waiting on the slow message")
        .unwrap();

        // Assert
        assert_eq!(transport.deleted(), vec!["r2".to_string(), "r1".to_string()]);
        assert_eq!(outcome.deleted(), 2);
    }

    /// Verify the handler sees the queue reference and the message identifiers
    #[tokio::test]
    async fn test_handler_receives_queue_and_envelope() {
        let transport = MockTransport::new(
            "orders.fifo",
            vec![order_message(5, "r1").with_attribute(MESSAGE_GROUP_ID_ATTRIBUTE, "g1")],
        );
        let receiver = receiver(RecordingHandler::default());

        receiver.receive_messages(&transport).await.unwrap();

        let seen = receiver.handler().seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        let (queue, envelope) = &seen[0];
        assert_eq!(queue, "orders.fifo");
        assert_eq!(envelope.plain_content, r#"{"id":5}"#);
        assert_eq!(envelope.message_id.as_ref().unwrap().as_str(), "m-r1");
        assert_eq!(envelope.receipt_handle.as_ref().unwrap().as_str(), "r1");
        assert_eq!(envelope.message_group_id.as_ref().unwrap().as_str(), "g1");
    }
}

// ============================================================================
// Pre-processing Tests
// ============================================================================

mod preprocessing_tests {
    use super::*;

    const TOPIC_ARN: &str = "arn:aws:sns:eu-central-1:123456789012:orders";

    /// Verify topic notifications are unwrapped before decoding
    #[tokio::test]
    async fn test_notification_is_unwrapped() {
        let body = Notification::new(TOPIC_ARN, r#"{"id":8}"#).to_body().unwrap();
        let transport = MockTransport::new("orders-subscriber", vec![raw_message(&body, "r1")]);
        let receiver = receiver(RecordingHandler::default()).with_notification_unwrapping();

        receiver.receive_messages(&transport).await.unwrap();

        assert_eq!(receiver.handler().seen_ids(), vec![8]);
        let seen = receiver.handler().seen.lock().unwrap().clone();
        assert_eq!(seen[0].1.plain_content, r#"{"id":8}"#);
        assert_eq!(transport.deleted(), vec!["r1".to_string()]);
    }

    /// Verify a malformed notification takes the retry path
    #[tokio::test]
    async fn test_malformed_notification_is_retried() {
        let transport = MockTransport::new("orders-subscriber", vec![order_message(1, "r1")]);
        let receiver = receiver(RecordingHandler::default()).with_notification_unwrapping();

        receiver.receive_messages(&transport).await.unwrap();

        assert!(receiver.handler().seen_ids().is_empty());
        assert!(transport.deleted().is_empty());
        assert_eq!(transport.extended(), vec![("r1".to_string(), 120)]);
    }

    /// Verify the pipeline reports which stage failed
    #[tokio::test]
    async fn test_process_reports_failing_stage() {
        let receiver = receiver(RecordingHandler::rejecting(&[2])).with_notification_unwrapping();
        let queue = QueueRef::from_str("orders").unwrap();

        let not_notification = receiver.process(&queue, order_message(1, "r1")).await;
        assert!(matches!(not_notification, Err(ProcessingError::Preprocess(_))));

        let body = Notification::new(TOPIC_ARN, "nope").to_body().unwrap();
        let bad_payload = receiver.process(&queue, raw_message(&body, "r2")).await;
        assert!(matches!(bad_payload, Err(ProcessingError::Decode(_))));

        let body = Notification::new(TOPIC_ARN, r#"{"id":2}"#).to_body().unwrap();
        let rejected = receiver.process(&queue, raw_message(&body, "r3")).await;
        assert!(matches!(rejected, Err(ProcessingError::Handler(_))));
    }
}

// ============================================================================
// Configuration Tests
// ============================================================================

mod config_tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReceiverConfig::default();

        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.retry_policy, RetryPolicy::fixed(120));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency_is_invalid() {
        let config = ReceiverConfig::default().with_max_concurrency(0);

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_deserializes_partial_input() {
        let config: ReceiverConfig =
            serde_json::from_str(r#"{"max_concurrency": 4}"#).unwrap();

        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.retry_policy.initial_delay_seconds, 120);
    }
}
