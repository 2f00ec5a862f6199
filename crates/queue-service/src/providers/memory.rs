//! In-memory queue and topic for testing and development.
//!
//! The queue mirrors the SQS behaviour the receiver relies on:
//! - Received messages stay hidden for the visibility timeout
//! - Changing visibility reschedules redelivery
//! - Deleting with a receipt handle removes the message
//! - Every delivery increments `ApproximateReceiveCount`
//! - FIFO queues keep group order and deliver a group's messages one
//!   receive at a time
//!
//! The topic fans out to subscribed queues, wrapping each body in a
//! notification envelope unless the subscription uses raw delivery.
//!
//! Clones share state, so a test can hand one clone to a receiver and keep
//! another for inspection.

use super::aws::MAX_MESSAGE_SIZE;
use crate::error::{TransportError, ValidationError};
use crate::message::{
    MessageGroupId, MessageId, QueueName, QueueRef, RawMessage, ReceiptHandle, SendRequest,
    MAX_DELAY_SECONDS, RECEIVE_COUNT_ATTRIBUTE,
};
use crate::notification::Notification;
use crate::transport::{MessagePublisher, QueueTransport};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::{Duration, Instant};
use tracing::debug;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Window in which identical FIFO sends are treated as duplicates
const DEDUPLICATION_WINDOW: Duration = Duration::from_secs(300);

const SENT_TIMESTAMP_ATTRIBUTE: &str = "SentTimestamp";

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// A message stored in the queue with its delivery state
struct StoredMessage {
    message_id: MessageId,
    body: String,
    group_id: Option<MessageGroupId>,
    attributes: HashMap<String, String>,
    receive_count: u32,
    available_at: Instant,
    /// Set while the message is in flight
    receipt_handle: Option<String>,
}

impl StoredMessage {
    fn is_available(&self, now: Instant) -> bool {
        now >= self.available_at
    }

    fn deliver(&mut self, now: Instant, visibility_timeout: Duration) -> Result<RawMessage, TransportError> {
        self.receive_count += 1;
        self.available_at = now + visibility_timeout;
        let receipt = uuid::Uuid::new_v4().to_string();
        self.receipt_handle = Some(receipt.clone());

        let mut message = RawMessage::new(
            self.message_id.clone(),
            self.body.clone(),
            ReceiptHandle::new(receipt)?,
        )
        .with_attribute(RECEIVE_COUNT_ATTRIBUTE, self.receive_count.to_string());
        for (key, value) in &self.attributes {
            message = message.with_attribute(key.clone(), value.clone());
        }
        if let Some(group_id) = &self.group_id {
            message = message.with_message_group_id(group_id);
        }
        Ok(message)
    }
}

#[derive(Default)]
struct QueueState {
    messages: VecDeque<StoredMessage>,
    /// Body to (message, sent at) for FIFO deduplication
    deduplication: HashMap<String, (MessageId, Instant)>,
}

// ============================================================================
// InMemoryQueue
// ============================================================================

/// Queue held in process memory
#[derive(Clone)]
pub struct InMemoryQueue {
    queue: QueueRef,
    visibility_timeout: Duration,
    max_number_of_messages: usize,
    content_based_deduplication: bool,
    state: Arc<Mutex<QueueState>>,
}

impl InMemoryQueue {
    /// Create an empty queue
    ///
    /// Defaults follow SQS: 300 second visibility timeout, one message per
    /// receive, content-based deduplication on FIFO queues.
    pub fn new(queue: QueueRef) -> Self {
        Self {
            queue,
            visibility_timeout: Duration::from_secs(300),
            max_number_of_messages: 1,
            content_based_deduplication: true,
            state: Arc::new(Mutex::new(QueueState::default())),
        }
    }

    /// Create a queue from a name; the kind follows the `.fifo` suffix
    pub fn named(name: &str) -> Result<Self, ValidationError> {
        Ok(Self::new(QueueRef::new(QueueName::new(name.to_string())?)))
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Maximum messages returned by one receive, clamped to 1..=10
    pub fn with_max_number_of_messages(mut self, max: usize) -> Self {
        self.max_number_of_messages = max.clamp(1, 10);
        self
    }

    pub fn with_content_based_deduplication(mut self, enabled: bool) -> Self {
        self.content_based_deduplication = enabled;
        self
    }

    /// Number of messages held, visible or not
    pub fn len(&self) -> usize {
        self.lock().map(|s| s.messages.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of messages a receive could return right now
    pub fn visible_len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .map(|s| s.messages.iter().filter(|m| m.is_available(now)).count())
            .unwrap_or(0)
    }

    /// Bodies of all held messages in queue order
    pub fn bodies(&self) -> Vec<String> {
        self.lock()
            .map(|s| s.messages.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState>, TransportError> {
        self.state.lock().map_err(|_| TransportError::ProviderError {
            provider: "memory".to_string(),
            code: "LockPoisoned".to_string(),
            message: format!("state of queue {} is poisoned", self.queue),
        })
    }

    /// Store a message without delay validation; used for topic deliveries
    fn enqueue(
        &self,
        body: String,
        group_id: Option<MessageGroupId>,
        delay: Duration,
    ) -> Result<MessageId, TransportError> {
        let now = Instant::now();
        let mut state = self.lock()?;

        let dedup_key = if self.queue.is_fifo() && self.content_based_deduplication {
            // Queue scope, as SQS: the group does not take part in the key
            let key = body.clone();
            state
                .deduplication
                .retain(|_, (_, sent_at)| now.duration_since(*sent_at) < DEDUPLICATION_WINDOW);
            if let Some((existing, _)) = state.deduplication.get(&key) {
                debug!(queue = %self.queue, message_id = %existing, "Duplicate FIFO message dropped");
                return Ok(existing.clone());
            }
            Some(key)
        } else {
            None
        };

        let message_id = MessageId::new();
        state.messages.push_back(StoredMessage {
            message_id: message_id.clone(),
            body,
            group_id,
            attributes: HashMap::from([(
                SENT_TIMESTAMP_ATTRIBUTE.to_string(),
                chrono::Utc::now().timestamp_millis().to_string(),
            )]),
            receive_count: 0,
            available_at: now + delay,
            receipt_handle: None,
        });
        if let Some(key) = dedup_key {
            state.deduplication.insert(key, (message_id.clone(), now));
        }

        Ok(message_id)
    }
}

impl std::fmt::Debug for InMemoryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryQueue")
            .field("queue", &self.queue)
            .field("len", &self.len())
            .finish()
    }
}

#[async_trait]
impl QueueTransport for InMemoryQueue {
    fn queue(&self) -> &QueueRef {
        &self.queue
    }

    async fn receive_batch(&self) -> Result<Vec<RawMessage>, TransportError> {
        let now = Instant::now();
        let is_fifo = self.queue.is_fifo();
        let mut state = self.lock()?;

        let mut batch = Vec::new();
        let mut blocked_groups: HashSet<MessageGroupId> = HashSet::new();
        for stored in state.messages.iter_mut() {
            if batch.len() >= self.max_number_of_messages {
                break;
            }

            if is_fifo {
                if let Some(group_id) = &stored.group_id {
                    if blocked_groups.contains(group_id) {
                        continue;
                    }
                    // Later messages of the group wait for this one
                    if !stored.is_available(now) {
                        blocked_groups.insert(group_id.clone());
                        continue;
                    }
                }
            }

            if stored.is_available(now) {
                batch.push(stored.deliver(now, self.visibility_timeout)?);
            }
        }

        debug!(queue = %self.queue, count = batch.len(), "Received messages from memory");
        Ok(batch)
    }

    async fn delete_message(&self, receipt: &ReceiptHandle) -> Result<(), TransportError> {
        let mut state = self.lock()?;
        let position = state
            .messages
            .iter()
            .position(|m| m.receipt_handle.as_deref() == Some(receipt.as_str()));

        match position {
            Some(index) => {
                state.messages.remove(index);
            }
            None => {
                // Deleting twice succeeds, as it does on SQS
                debug!(queue = %self.queue, receipt = %receipt, "No message for receipt, nothing to delete");
            }
        }
        Ok(())
    }

    async fn extend_visibility(
        &self,
        receipt: &ReceiptHandle,
        delay_seconds: u32,
    ) -> Result<(), TransportError> {
        let now = Instant::now();
        let mut state = self.lock()?;
        let stored = state
            .messages
            .iter_mut()
            .find(|m| m.receipt_handle.as_deref() == Some(receipt.as_str()) && !m.is_available(now))
            .ok_or_else(|| TransportError::InvalidReceipt {
                receipt: receipt.to_string(),
            })?;

        stored.available_at = now + Duration::from_secs(u64::from(delay_seconds));
        Ok(())
    }
}

#[async_trait]
impl MessagePublisher for InMemoryQueue {
    fn destination(&self) -> &QueueRef {
        &self.queue
    }

    async fn send(&self, request: SendRequest) -> Result<MessageId, TransportError> {
        validate_send(&request)?;

        let delay = if self.queue.is_fifo() {
            if request.message_group_id.is_none() {
                return Err(ValidationError::Required {
                    field: "message_group_id".to_string(),
                }
                .into());
            }
            Duration::ZERO
        } else {
            Duration::from_secs(u64::from(request.delay_seconds.unwrap_or(0)))
        };

        self.enqueue(request.body, request.message_group_id, delay)
    }
}

fn validate_send(request: &SendRequest) -> Result<(), TransportError> {
    if request.body.len() > MAX_MESSAGE_SIZE {
        return Err(TransportError::MessageTooLarge {
            size: request.body.len(),
            max_size: MAX_MESSAGE_SIZE,
        });
    }
    if let Some(delay) = request.delay_seconds {
        if delay > MAX_DELAY_SECONDS {
            return Err(ValidationError::OutOfRange {
                field: "delay_seconds".to_string(),
                message: format!("maximum {} seconds, got {}", MAX_DELAY_SECONDS, delay),
            }
            .into());
        }
    }
    Ok(())
}

// ============================================================================
// InMemoryTopic
// ============================================================================

struct Subscription {
    queue: InMemoryQueue,
    raw_message_delivery: bool,
}

/// Topic held in process memory that fans out to subscribed queues
#[derive(Clone)]
pub struct InMemoryTopic {
    topic: QueueRef,
    topic_arn: String,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
}

impl InMemoryTopic {
    /// Create a topic with a local ARN in the default region
    pub fn new(topic: QueueRef) -> Self {
        let topic_arn = format!(
            "arn:aws:sns:{}:000000000000:{}",
            crate::config::DEFAULT_REGION,
            topic.name()
        );
        Self {
            topic,
            topic_arn,
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn named(name: &str) -> Result<Self, ValidationError> {
        Ok(Self::new(QueueRef::new(QueueName::topic(name.to_string())?)))
    }

    pub fn topic_arn(&self) -> &str {
        &self.topic_arn
    }

    /// Deliver future publishes to `queue` wrapped in a notification
    pub fn subscribe(&self, queue: InMemoryQueue) -> Result<(), TransportError> {
        self.add_subscription(queue, false)
    }

    /// Deliver future publishes to `queue` with the body unchanged
    pub fn subscribe_raw(&self, queue: InMemoryQueue) -> Result<(), TransportError> {
        self.add_subscription(queue, true)
    }

    fn add_subscription(&self, queue: InMemoryQueue, raw_message_delivery: bool) -> Result<(), TransportError> {
        self.lock()?.push(Subscription {
            queue,
            raw_message_delivery,
        });
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Subscription>>, TransportError> {
        self.subscriptions
            .lock()
            .map_err(|_| TransportError::ProviderError {
                provider: "memory".to_string(),
                code: "LockPoisoned".to_string(),
                message: format!("subscriptions of topic {} are poisoned", self.topic),
            })
    }
}

impl std::fmt::Debug for InMemoryTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTopic")
            .field("topic_arn", &self.topic_arn)
            .finish()
    }
}

#[async_trait]
impl MessagePublisher for InMemoryTopic {
    fn destination(&self) -> &QueueRef {
        &self.topic
    }

    async fn send(&self, request: SendRequest) -> Result<MessageId, TransportError> {
        validate_send(&request)?;
        if self.topic.is_fifo() && request.message_group_id.is_none() {
            return Err(ValidationError::Required {
                field: "message_group_id".to_string(),
            }
            .into());
        }

        let notification = Notification::new(self.topic_arn.clone(), request.body.clone());
        let wrapped = notification
            .to_body()
            .map_err(|e| TransportError::ProviderError {
                provider: "memory".to_string(),
                code: "SerializationFailed".to_string(),
                message: e.to_string(),
            })?;

        let subscriptions = self.lock()?;
        for subscription in subscriptions.iter() {
            let body = if subscription.raw_message_delivery {
                request.body.clone()
            } else {
                wrapped.clone()
            };
            subscription
                .queue
                .enqueue(body, request.message_group_id.clone(), Duration::ZERO)?;
        }

        debug!(
            topic = %self.topic,
            subscribers = subscriptions.len(),
            "Published message to memory topic"
        );

        // A publish is identified by its notification, not by the queue copies
        MessageId::from_str(&notification.message_id).map_err(TransportError::from)
    }
}
