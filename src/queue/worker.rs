//! Fixed-size worker pool draining the task queue.

use crate::metrics::PipelineMetrics;
use crate::pipeline::{Disposition, EmbedTaskConsumer, PipelineError};
use crate::queue::{Delivery, NackOutcome, TaskQueue};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Processes one raw task body.
///
/// `Ok` acknowledges the delivery, `Err` hands it back for redelivery.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Handle a single message body.
    async fn handle(&self, body: &[u8]) -> Result<Disposition, PipelineError>;
}

#[async_trait]
impl TaskHandler for EmbedTaskConsumer {
    async fn handle(&self, body: &[u8]) -> Result<Disposition, PipelineError> {
        self.handle_message(body).await
    }
}

/// Workers sharing one queue, each handling one delivery at a time.
///
/// Once shutdown is signalled, workers stop taking new deliveries but finish the one in hand, so
/// an embed is never separated from its store by cancellation.
pub struct WorkerPool {
    workers: JoinSet<()>,
}

impl WorkerPool {
    /// Start `size` workers.
    pub fn spawn(
        queue: Arc<TaskQueue>,
        handler: Arc<dyn TaskHandler>,
        metrics: Arc<PipelineMetrics>,
        size: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let size = size.max(1);
        let mut workers = JoinSet::new();
        for worker_id in 0..size {
            workers.spawn(run_worker(
                worker_id,
                Arc::clone(&queue),
                Arc::clone(&handler),
                Arc::clone(&metrics),
                shutdown.clone(),
            ));
        }
        info!(topic = %queue.topic(), workers = size, "Worker pool started");
        Self { workers }
    }

    /// Wait for every worker to finish draining.
    pub async fn join(mut self) {
        while let Some(result) = self.workers.join_next().await {
            if let Err(err) = result {
                error!(error = %err, "Worker terminated abnormally");
            }
        }
        info!("Worker pool stopped");
    }
}

async fn run_worker(
    worker_id: usize,
    queue: Arc<TaskQueue>,
    handler: Arc<dyn TaskHandler>,
    metrics: Arc<PipelineMetrics>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(worker_id, "Worker started");
    loop {
        let delivery = tokio::select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => break,
            delivery = queue.receive() => match delivery {
                Some(delivery) => delivery,
                None => break,
            },
        };
        process_delivery(worker_id, &queue, handler.as_ref(), &metrics, delivery).await;
    }
    debug!(worker_id, "Worker stopped");
}

async fn process_delivery(
    worker_id: usize,
    queue: &TaskQueue,
    handler: &dyn TaskHandler,
    metrics: &PipelineMetrics,
    delivery: Delivery,
) {
    match handler.handle(&delivery.body).await {
        Ok(disposition) => {
            if let Disposition::Dropped { reason } = &disposition {
                warn!(worker_id, task_id = %delivery.id, reason = %reason, "Acknowledged unprocessable task");
            }
            queue.ack(&delivery);
        }
        Err(err) => {
            metrics.record_failed_attempt();
            let task_id = delivery.id;
            let attempt = delivery.attempt;
            warn!(
                worker_id,
                %task_id,
                attempt,
                category = ?err.category(),
                error = %err,
                "Task failed"
            );
            match queue.nack(delivery, &err.to_string()) {
                NackOutcome::Redeliver { after } => {
                    debug!(%task_id, retry_in_ms = after.as_millis() as u64, "Redelivery scheduled");
                }
                NackOutcome::DeadLettered => metrics.record_dead_lettered(),
            }
        }
    }
}
