// =============================================================================
// queue.rs — THE QUEUE BOUNDARY
// =============================================================================
//
// The crawl, OCR, and webhook queues are external collaborators: in
// production they are backed by whatever message broker the surrounding
// deployment runs. This module defines the boundary as a trait so the
// dispatcher, executor, and analyzer orchestrator never depend on a
// concrete broker, plus an in-memory implementation used by tests and by
// the single-process binary.
// =============================================================================

use async_trait::async_trait;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::errors::QueueError;
use crate::models::{CrawlQueueMessage, OcrQueueMessage, WebhookQueueMessage};

/// What a producer gets back for one item in a batch submission: queues
/// are free to accept some messages and reject others.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Accepted,
    Rejected(String),
}

/// A named destination for crawl-queue messages.
#[async_trait]
pub trait CrawlQueueClient: Send + Sync {
    async fn send_batch(
        &self,
        messages: Vec<CrawlQueueMessage>,
    ) -> Result<Vec<SendOutcome>, QueueError>;

    async fn send_one(&self, message: CrawlQueueMessage) -> Result<(), QueueError> {
        let outcomes = self.send_batch(vec![message]).await?;
        match outcomes.into_iter().next() {
            Some(SendOutcome::Accepted) => Ok(()),
            Some(SendOutcome::Rejected(reason)) => Err(QueueError::SendRejected {
                queue: "crawl".to_string(),
                reason,
            }),
            None => Err(QueueError::SendRejected {
                queue: "crawl".to_string(),
                reason: "queue returned no outcome".to_string(),
            }),
        }
    }
}

/// A named destination for OCR-queue messages.
#[async_trait]
pub trait OcrQueueClient: Send + Sync {
    async fn send(&self, message: OcrQueueMessage) -> Result<(), QueueError>;
}

/// A named destination for webhook-queue messages.
#[async_trait]
pub trait WebhookQueueClient: Send + Sync {
    async fn send(&self, message: WebhookQueueMessage) -> Result<(), QueueError>;
}

/// A bounded, in-process stand-in for all three queues, backed by
/// crossbeam channels. Used by the single-binary wiring in `main.rs` and
/// by every module's test suite; a real deployment swaps this for a
/// client hitting its actual broker without the orchestration code
/// changing.
pub struct InMemoryQueue<T> {
    name: String,
    sender: Sender<T>,
    receiver: Receiver<T>,
    /// Toggled by tests to exercise the rejection path.
    reject_all: Mutex<bool>,
}

impl<T: Clone + Send + 'static> InMemoryQueue<T> {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        Self {
            name: name.into(),
            sender,
            receiver,
            reject_all: Mutex::new(false),
        }
    }

    pub fn set_reject_all(&self, reject: bool) {
        *self.reject_all.lock() = reject;
    }

    pub fn try_recv(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    fn push(&self, item: T) -> Result<(), String> {
        if *self.reject_all.lock() {
            return Err("queue is in reject-all test mode".to_string());
        }
        self.sender
            .try_send(item)
            .map_err(|e| format!("queue '{}' full or closed: {e}", self.name))
    }
}

#[async_trait]
impl CrawlQueueClient for InMemoryQueue<CrawlQueueMessage> {
    async fn send_batch(
        &self,
        messages: Vec<CrawlQueueMessage>,
    ) -> Result<Vec<SendOutcome>, QueueError> {
        Ok(messages
            .into_iter()
            .map(|m| match self.push(m) {
                Ok(()) => SendOutcome::Accepted,
                Err(reason) => SendOutcome::Rejected(reason),
            })
            .collect())
    }
}

#[async_trait]
impl OcrQueueClient for InMemoryQueue<OcrQueueMessage> {
    async fn send(&self, message: OcrQueueMessage) -> Result<(), QueueError> {
        self.push(message).map_err(|reason| QueueError::SendRejected {
            queue: self.name.clone(),
            reason,
        })
    }
}

#[async_trait]
impl WebhookQueueClient for InMemoryQueue<WebhookQueueMessage> {
    async fn send(&self, message: WebhookQueueMessage) -> Result<(), QueueError> {
        self.push(message).map_err(|reason| QueueError::SendRejected {
            queue: self.name.clone(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DateRange, SpiderConfigVariant, SpiderType, TenantSlugConfig};
    use chrono::NaiveDate;

    fn sample_message() -> CrawlQueueMessage {
        CrawlQueueMessage {
            spider_id: "sp-dosp".to_string(),
            territory_id: "2927408".to_string(),
            spider_type: SpiderType::Dosp,
            config: SpiderConfigVariant::TenantSlug(TenantSlugConfig {
                base_url: "https://dosp.example.org".to_string(),
                journal: "diario".to_string(),
                section: "1".to_string(),
                tenant_id: "feira-de-santana".to_string(),
            }),
            date_range: DateRange::new(
                NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
            )
            .unwrap(),
        }
    }

    #[tokio::test]
    async fn send_batch_accepts_within_capacity() {
        let q: InMemoryQueue<CrawlQueueMessage> = InMemoryQueue::new("crawl", 10);
        let outcomes = q.send_batch(vec![sample_message(), sample_message()]).await.unwrap();
        assert_eq!(outcomes, vec![SendOutcome::Accepted, SendOutcome::Accepted]);
        assert_eq!(q.len(), 2);
    }

    #[tokio::test]
    async fn send_batch_rejects_past_capacity() {
        let q: InMemoryQueue<CrawlQueueMessage> = InMemoryQueue::new("crawl", 1);
        let outcomes = q.send_batch(vec![sample_message(), sample_message()]).await.unwrap();
        assert_eq!(outcomes[0], SendOutcome::Accepted);
        assert!(matches!(outcomes[1], SendOutcome::Rejected(_)));
    }

    #[tokio::test]
    async fn reject_all_mode_rejects_every_message() {
        let q: InMemoryQueue<CrawlQueueMessage> = InMemoryQueue::new("crawl", 10);
        q.set_reject_all(true);
        let outcomes = q.send_batch(vec![sample_message()]).await.unwrap();
        assert!(matches!(outcomes[0], SendOutcome::Rejected(_)));
    }

    #[tokio::test]
    async fn send_one_surfaces_rejection_as_queue_error() {
        let q: InMemoryQueue<CrawlQueueMessage> = InMemoryQueue::new("crawl", 10);
        q.set_reject_all(true);
        assert!(q.send_one(sample_message()).await.is_err());
    }
}
