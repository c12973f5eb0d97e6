//! Out-of-band webhook delivery.
//!
//! The ingestion pipeline hands notifications to a [`DispatchSender`], which
//! only ever does a non-blocking `try_send` on a bounded queue. A pool of
//! workers drains the queue, delivers to every matching webhook and
//! schedules automatic retries with exponential backoff.

use crate::service::{WebhookError, WebhookService};
use chrono::Utc;
use lograven_config::DispatcherConfig;
use lograven_core::{ErrorNotification, EventNotifier, NotifyError, UtcDateTime};
use lograven_entities::webhook_deliveries;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

enum Job {
    Notify(ErrorNotification),
    /// Next attempt of the delivery that this row belongs to
    Retry(webhook_deliveries::Model),
}

/// Enqueue side of the dispatcher
#[derive(Clone)]
pub struct DispatchSender {
    sender: mpsc::Sender<Job>,
}

impl EventNotifier for DispatchSender {
    fn notify(&self, notification: ErrorNotification) -> Result<(), NotifyError> {
        self.sender
            .try_send(Job::Notify(notification))
            .map_err(|e| match e {
                TrySendError::Full(_) => NotifyError::QueueFull,
                TrySendError::Closed(_) => NotifyError::Closed,
            })
    }
}

/// Bounded exponential backoff for automatic retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_retry_window: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &DispatcherConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: config.initial_backoff(),
            max_backoff: config.max_backoff(),
            max_retry_window: config.max_retry_window(),
        }
    }

    /// Wait after attempt `attempt` failed: `initial * 2^(attempt - 1)`,
    /// capped at `max_backoff`
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }

    /// Delay before the next attempt of a failed delivery, or `None` when
    /// its attempts or its retry window are used up
    pub fn next_retry(
        &self,
        delivery: &webhook_deliveries::Model,
        now: UtcDateTime,
    ) -> Option<Duration> {
        let attempt = u32::try_from(delivery.attempt_number.max(1)).unwrap_or(u32::MAX);
        if attempt >= self.max_attempts {
            return None;
        }

        let delay = self.delay_after(attempt);
        let started = delivery.first_sent_at.or(delivery.sent_at).unwrap_or(now);
        let deadline = started + chrono::Duration::from_std(self.max_retry_window).ok()?;
        let next_at = now + chrono::Duration::from_std(delay).ok()?;

        (next_at <= deadline).then_some(delay)
    }
}

/// Worker pool that owns delivery
pub struct WebhookDispatcher {
    sender: DispatchSender,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl WebhookDispatcher {
    /// Spawn `config.workers` workers on a queue of `config.queue_capacity`
    pub fn start(service: Arc<WebhookService>, config: &DispatcherConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::from_config(config);

        let workers = (0..config.workers.max(1))
            .map(|worker_id| {
                let worker = Worker {
                    worker_id,
                    service: service.clone(),
                    policy,
                    sender: sender.clone(),
                    cancel: cancel.clone(),
                };
                tokio::spawn(worker.run(receiver.clone()))
            })
            .collect::<Vec<_>>();

        info!(
            workers = workers.len(),
            queue_capacity = config.queue_capacity,
            "Webhook dispatcher started"
        );

        Self {
            sender: DispatchSender { sender },
            cancel,
            workers,
        }
    }

    pub fn notifier(&self) -> DispatchSender {
        self.sender.clone()
    }

    /// Stop accepting work and wait for in-flight deliveries to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!("Webhook worker panicked: {}", e);
            }
        }
        info!("Webhook dispatcher stopped");
    }
}

struct Worker {
    worker_id: usize,
    service: Arc<WebhookService>,
    policy: RetryPolicy,
    sender: mpsc::Sender<Job>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self, receiver: Arc<Mutex<mpsc::Receiver<Job>>>) {
        debug!(worker_id = self.worker_id, "Webhook worker started");
        loop {
            let job = {
                let mut receiver = receiver.lock().await;
                tokio::select! {
                    _ = self.cancel.cancelled() => None,
                    job = receiver.recv() => job,
                }
            };
            let Some(job) = job else { break };

            match job {
                Job::Notify(notification) => self.dispatch(notification).await,
                Job::Retry(previous) => self.retry(previous).await,
            }
        }
        debug!(worker_id = self.worker_id, "Webhook worker stopped");
    }

    async fn dispatch(&self, notification: ErrorNotification) {
        let webhooks = match self.service.matching_webhooks(&notification).await {
            Ok(webhooks) => webhooks,
            Err(e) => {
                error!(
                    project_id = notification.project_id,
                    group_id = notification.group.id,
                    "Failed to look up webhooks: {}",
                    e
                );
                return;
            }
        };

        for webhook in webhooks {
            match self.service.deliver(&webhook, &notification).await {
                Ok(delivery) => self.after_attempt(delivery),
                Err(e) => error!(webhook_id = webhook.id, "Failed to record delivery: {}", e),
            }
        }
    }

    async fn retry(&self, previous: webhook_deliveries::Model) {
        let webhook = match self.service.get_webhook(previous.webhook_id).await {
            Ok(webhook) => webhook,
            Err(e) => {
                warn!(
                    webhook_id = previous.webhook_id,
                    "Dropping retry, webhook unavailable: {}",
                    e
                );
                return;
            }
        };

        match self.service.continue_delivery(&webhook, &previous).await {
            Ok(Some(delivery)) => self.after_attempt(delivery),
            Ok(None) => {}
            Err(WebhookError::Disabled(webhook_id)) => {
                info!(webhook_id, "Dropping retry, webhook was disabled");
            }
            Err(e) => error!(webhook_id = webhook.id, "Failed to record retry: {}", e),
        }
    }

    fn after_attempt(&self, delivery: webhook_deliveries::Model) {
        if delivery.success {
            return;
        }

        let Some(delay) = self.policy.next_retry(&delivery, Utc::now()) else {
            let failure =
                WebhookError::DeliveryFailed(delivery.error_message.clone().unwrap_or_default());
            error!(
                webhook_id = delivery.webhook_id,
                correlation_id = %delivery.correlation_id,
                attempts = delivery.attempt_number,
                "Giving up on webhook delivery: {}",
                failure
            );
            return;
        };

        debug!(
            webhook_id = delivery.webhook_id,
            correlation_id = %delivery.correlation_id,
            "Retrying webhook delivery in {:?}",
            delay
        );

        let sender = self.sender.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let delivery_id = delivery.id;
                    if let Err(e) = sender.try_send(Job::Retry(delivery)) {
                        warn!(
                            delivery_id,
                            "Could not schedule webhook retry, delivery stays failed: {}",
                            e
                        );
                    }
                }
            }
        });
    }
}
