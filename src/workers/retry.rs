//! Background delivery with per-error retry scheduling. Jobs are queued
//! on an in-process channel, dispatched concurrently under a semaphore,
//! and re-enqueued after the wait the backoff policy picks.

use crate::domain::{Device, Notification};
use crate::error::{PushError, Result};
use crate::services::delivery::{DeliveryCoordinator, DeliveryOutcome};
use crate::workers::backoff::{self, RetryDecision};
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc, watch};
use tracing::Instrument;

#[derive(Clone, Debug)]
struct Metrics {
    sent: Counter<u64>,
    errors: Counter<u64>,
    deactivated_devices: Counter<u64>,
    discarded: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("pushgate");
        Self {
            sent: meter
                .u64_counter("push_sent_total")
                .with_description("Total number of push notifications successfully delivered")
                .build(),
            errors: meter
                .u64_counter("push_errors_total")
                .with_description("Total number of push delivery errors")
                .build(),
            deactivated_devices: meter
                .u64_counter("push_deactivated_devices_total")
                .with_description("Total number of devices deactivated after token rejection")
                .build(),
            discarded: meter
                .u64_counter("push_discarded_total")
                .with_description("Total number of deliveries discarded after exhausting retries")
                .build(),
        }
    }
}

/// One delivery attempt for one device.
#[derive(Debug, Clone)]
pub struct DeliveryJob {
    pub notification: Notification,
    pub device: Arc<dyn Device>,
    pub attempt: u32,
}

/// Cheap clonable handle for enqueueing deliveries onto a running
/// [`RetryWorker`].
#[derive(Clone, Debug)]
pub struct RetryQueue {
    tx: mpsc::Sender<DeliveryJob>,
}

impl RetryQueue {
    /// Fans the notification out to every device, one job per device.
    ///
    /// # Errors
    /// Fails only when the worker has shut down.
    pub async fn deliver_later<I>(&self, notification: &Notification, devices: I) -> Result<()>
    where
        I: IntoIterator<Item = Arc<dyn Device>>,
    {
        for device in devices {
            let job = DeliveryJob { notification: notification.clone(), device, attempt: 1 };
            self.tx
                .send(job)
                .await
                .map_err(|_| PushError::InternalServer("delivery queue is closed".to_owned()))?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct RetryWorker {
    coordinator: Arc<DeliveryCoordinator>,
    rx: mpsc::Receiver<DeliveryJob>,
    tx: mpsc::Sender<DeliveryJob>,
    semaphore: Arc<Semaphore>,
    metrics: Metrics,
}

impl RetryWorker {
    #[must_use]
    pub fn new(
        coordinator: Arc<DeliveryCoordinator>,
        queue_capacity: usize,
        concurrency: usize,
    ) -> (Self, RetryQueue) {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let worker = Self {
            coordinator,
            rx,
            tx: tx.clone(),
            semaphore: Arc::new(Semaphore::new(concurrency)),
            metrics: Metrics::new(),
        };
        (worker, RetryQueue { tx })
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        while !*shutdown.borrow() {
            tokio::select! {
                job = self.rx.recv() => match job {
                    Some(job) => {
                        if let Err(e) = self.dispatch(job).await {
                            tracing::error!(error = %e, "Failed to dispatch delivery job");
                        }
                    }
                    None => break,
                },
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("Retry worker shutting down...");
    }

    async fn dispatch(&self, job: DeliveryJob) -> anyhow::Result<()> {
        // Acquire a permit before spawning.
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| anyhow::anyhow!("Semaphore closed: {e}"))?;

        let coordinator = Arc::clone(&self.coordinator);
        let tx = self.tx.clone();
        let metrics = self.metrics.clone();
        let span = tracing::debug_span!(
            "dispatch_push",
            platform = %job.device.platform(),
            attempt = job.attempt,
        );

        tokio::spawn(
            async move {
                let result = coordinator.deliver(&job.notification, job.device.as_ref()).await;
                // The wait below must not hold a concurrency slot.
                drop(permit);

                match result {
                    Ok(DeliveryOutcome::DeviceDeactivated) => {
                        metrics.deactivated_devices.add(1, &[]);
                    }
                    Ok(outcome) => {
                        tracing::debug!(?outcome, "Delivery settled");
                        if outcome == DeliveryOutcome::Delivered {
                            metrics.sent.add(1, &[]);
                        }
                    }
                    Err(error) => {
                        metrics.errors.add(1, &[KeyValue::new("kind", error.kind())]);
                        match backoff::decide(&error, job.attempt) {
                            RetryDecision::Retry { wait } => {
                                tracing::warn!(
                                    error = %error,
                                    wait_secs = wait.as_secs(),
                                    "Delivery failed, scheduling retry"
                                );
                                tokio::time::sleep(wait).await;
                                let retry =
                                    DeliveryJob { attempt: job.attempt + 1, ..job };
                                if tx.send(retry).await.is_err() {
                                    tracing::error!(
                                        error = %error,
                                        "Retry queue closed, discarding pending retry"
                                    );
                                    metrics.discarded.add(1, &[KeyValue::new("kind", error.kind())]);
                                }
                            }
                            RetryDecision::Discard => {
                                tracing::error!(error = %error, "Delivery failed permanently, discarding");
                                metrics.discarded.add(1, &[KeyValue::new("kind", error.kind())]);
                            }
                        }
                    }
                }
            }
            .instrument(span),
        );

        Ok(())
    }
}
