//! In-process embedding-task topic with redelivery, backoff, and a failed-jobs list.
//!
//! Redelivery is the only retry mechanism in the pipeline: a handler failure hands the
//! delivery back with [`TaskQueue::nack`], which either schedules another attempt after an
//! exponential backoff or, once `max_attempts` is reached, records it as a [`FailedJob`].

mod worker;

pub use worker::{TaskHandler, WorkerPool};

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{Notify, mpsc};
use uuid::Uuid;

/// Retry ceiling and backoff for failed deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total delivery attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first redelivery.
    pub base_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before redelivering a task whose `attempt`-th delivery failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_backoff
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_backoff)
    }
}

/// One delivery of a task body.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Task id, stable across redeliveries.
    pub id: Uuid,
    /// Raw message body.
    pub body: Vec<u8>,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// A task that exhausted its attempts.
#[derive(Debug, Clone, Serialize)]
pub struct FailedJob {
    /// Task id.
    pub id: Uuid,
    /// Message body, lossily decoded as UTF-8.
    pub body: String,
    /// Error from the last attempt.
    pub error: String,
    /// Number of attempts made.
    pub attempts: u32,
    /// RFC 3339 timestamp of the final failure.
    pub failed_at: String,
}

/// What happened to a negatively acknowledged delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
    /// Another attempt is scheduled after the delay.
    Redeliver {
        /// Backoff before the next attempt.
        after: Duration,
    },
    /// The retry ceiling was reached.
    DeadLettered,
}

/// Failed jobs kept before the oldest entries are evicted.
pub const DEFAULT_FAILED_CAPACITY: usize = 1000;

/// Multi-consumer task topic shared by all workers.
///
/// The failed-jobs list is bounded; once full, recording a new failure evicts the oldest one.
pub struct TaskQueue {
    topic: String,
    policy: RetryPolicy,
    sender: mpsc::UnboundedSender<Delivery>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<Delivery>>,
    failed: Mutex<VecDeque<FailedJob>>,
    failed_capacity: usize,
    outstanding: AtomicUsize,
    idle: Notify,
}

impl TaskQueue {
    /// Create an empty topic.
    pub fn new(topic: impl Into<String>, policy: RetryPolicy) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            topic: topic.into(),
            policy,
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            failed: Mutex::new(VecDeque::new()),
            failed_capacity: DEFAULT_FAILED_CAPACITY,
            outstanding: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }

    /// Keep at most `capacity` failed jobs (at least one).
    pub fn with_failed_capacity(mut self, capacity: usize) -> Self {
        self.failed_capacity = capacity.max(1);
        self
    }

    /// Topic name used in logs.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish a new task and return its id.
    pub fn enqueue(&self, body: Vec<u8>) -> Uuid {
        let id = Uuid::new_v4();
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.publish(Delivery {
            id,
            body,
            attempt: 1,
        });
        tracing::debug!(topic = %self.topic, task_id = %id, "Task enqueued");
        id
    }

    /// Wait for the next delivery.
    pub async fn receive(&self) -> Option<Delivery> {
        self.receiver.lock().await.recv().await
    }

    /// The delivery was handled; forget about it.
    pub fn ack(&self, delivery: &Delivery) {
        tracing::trace!(topic = %self.topic, task_id = %delivery.id, attempt = delivery.attempt, "Task acknowledged");
        self.settle();
    }

    /// The delivery failed; redeliver later or move it to the failed-jobs list.
    pub fn nack(&self, delivery: Delivery, error: &str) -> NackOutcome {
        if delivery.attempt >= self.policy.max_attempts {
            tracing::error!(
                topic = %self.topic,
                task_id = %delivery.id,
                attempts = delivery.attempt,
                error,
                "Task exhausted retries"
            );
            let job = FailedJob {
                id: delivery.id,
                body: String::from_utf8_lossy(&delivery.body).into_owned(),
                error: error.to_string(),
                attempts: delivery.attempt,
                failed_at: current_timestamp_rfc3339(),
            };
            let mut failed = self
                .failed
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if failed.len() >= self.failed_capacity
                && let Some(evicted) = failed.pop_front()
            {
                tracing::warn!(topic = %self.topic, task_id = %evicted.id, "Failed-jobs list full; evicting oldest entry");
            }
            failed.push_back(job);
            drop(failed);
            self.settle();
            return NackOutcome::DeadLettered;
        }

        let after = self.policy.backoff(delivery.attempt);
        let next = Delivery {
            attempt: delivery.attempt + 1,
            ..delivery
        };
        let sender = self.sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if sender.send(next).is_err() {
                tracing::warn!("Task queue closed before redelivery");
            }
        });
        NackOutcome::Redeliver { after }
    }

    /// Tasks that exhausted their attempts, oldest first.
    pub fn failed_jobs(&self) -> Vec<FailedJob> {
        self.failed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Tasks enqueued but neither acknowledged nor dead-lettered.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Resolve once every enqueued task has been settled.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn publish(&self, delivery: Delivery) {
        if self.sender.send(delivery).is_err() {
            tracing::error!(topic = %self.topic, "Task queue receiver dropped");
        }
    }

    fn settle(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
