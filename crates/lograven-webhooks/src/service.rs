//! Webhook matching, signed delivery and delivery history.

use crate::events::{WebhookEventType, WebhookPayload};
use chrono::Utc;
use hmac::{Hmac, Mac};
use lograven_config::DispatcherConfig;
use lograven_core::{ErrorNotification, UtcDateTime};
use lograven_database::DbConnection;
use lograven_entities::types::DeliveryStatus;
use lograven_entities::{webhook_deliveries, webhooks};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, SqlErr,
};
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-lograven-signature";
pub const EVENT_HEADER: &str = "x-lograven-event";
pub const DELIVERY_HEADER: &str = "x-lograven-delivery";
pub const TIMESTAMP_HEADER: &str = "x-lograven-timestamp";
const USER_AGENT: &str = "LogRaven-Webhook/1.0";

/// Webhook service errors
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Webhook not found: {0}")]
    NotFound(i32),

    #[error("Delivery not found: {0}")]
    DeliveryNotFound(i32),

    #[error("Webhook {0} is disabled")]
    Disabled(i32),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Could not claim an attempt number for delivery {0}")]
    AttemptConflict(String),
}

/// Hex HMAC-SHA256 of the raw body keyed by the webhook secret
pub fn sign_payload(secret: &str, body: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Identity of a delivery shared by all of its attempts
struct DeliveryIdentity<'a> {
    correlation_id: &'a str,
    attempt_number: i32,
    event_type: &'a str,
    event_id: i32,
    request_body: &'a str,
    first_sent_at: Option<UtcDateTime>,
}

impl<'a> DeliveryIdentity<'a> {
    fn next(previous: &'a webhook_deliveries::Model, attempt_number: i32) -> Self {
        Self {
            correlation_id: &previous.correlation_id,
            attempt_number,
            event_type: &previous.event_type,
            event_id: previous.event_id,
            request_body: &previous.request_body,
            first_sent_at: previous.first_sent_at.or(previous.sent_at),
        }
    }
}

/// Bounded re-reads of the latest attempt when a concurrent retry takes the
/// number first
const MAX_ATTEMPT_NUMBER_CLAIMS: usize = 5;

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Webhook service for matching and delivering notifications
pub struct WebhookService {
    db: Arc<DbConnection>,
    http_client: reqwest::Client,
    max_response_body_bytes: usize,
}

impl WebhookService {
    pub fn new(db: Arc<DbConnection>, config: &DispatcherConfig) -> Result<Self, WebhookError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            db,
            http_client,
            max_response_body_bytes: config.max_response_body_bytes,
        })
    }

    /// Enabled webhooks of the project that subscribe to this notification
    ///
    /// A webhook matches when it lists the event type and, if it carries a
    /// status filter, the group's current status is in it.
    pub async fn matching_webhooks(
        &self,
        notification: &ErrorNotification,
    ) -> Result<Vec<webhooks::Model>, WebhookError> {
        let event_type = WebhookEventType::for_notification(notification);

        let candidates = webhooks::Entity::find()
            .filter(webhooks::Column::ProjectId.eq(notification.project_id))
            .filter(webhooks::Column::Enabled.eq(true))
            .order_by_asc(webhooks::Column::Id)
            .all(self.db.as_ref())
            .await?;

        Ok(candidates
            .into_iter()
            .filter(|webhook| {
                webhook
                    .event_types()
                    .iter()
                    .any(|subscribed| subscribed == event_type.as_str())
            })
            .filter(|webhook| match webhook.statuses() {
                Some(statuses) => statuses
                    .iter()
                    .any(|status| status.as_str() == notification.group.status),
                None => true,
            })
            .collect())
    }

    /// First attempt of a new delivery of `notification` to `webhook`
    pub async fn deliver(
        &self,
        webhook: &webhooks::Model,
        notification: &ErrorNotification,
    ) -> Result<webhook_deliveries::Model, WebhookError> {
        let payload = WebhookPayload::from_notification(notification);
        let body = serde_json::to_string(&payload)?;
        let correlation_id = uuid::Uuid::new_v4().to_string();

        let pending = self
            .insert_pending(
                webhook,
                DeliveryIdentity {
                    correlation_id: &correlation_id,
                    attempt_number: 1,
                    event_type: payload.event_type.as_str(),
                    event_id: notification.event.id,
                    request_body: &body,
                    first_sent_at: None,
                },
            )
            .await?;
        self.send(webhook, pending).await
    }

    /// New attempt for the delivery that `previous` belongs to
    ///
    /// Appends a row with the next attempt number, the identical request
    /// body and the original `first_sent_at`. `previous` is left untouched.
    /// Concurrent callers each get their own attempt number.
    pub async fn redeliver(
        &self,
        webhook: &webhooks::Model,
        previous: &webhook_deliveries::Model,
    ) -> Result<webhook_deliveries::Model, WebhookError> {
        if !webhook.enabled {
            return Err(WebhookError::Disabled(webhook.id));
        }

        for _ in 0..MAX_ATTEMPT_NUMBER_CLAIMS {
            let latest = self
                .delivery_status(&previous.correlation_id)
                .await?
                .map(|latest| latest.attempt_number)
                .unwrap_or(previous.attempt_number);

            match self
                .insert_pending(webhook, DeliveryIdentity::next(previous, latest + 1))
                .await
            {
                Ok(pending) => return self.send(webhook, pending).await,
                Err(e) if is_unique_violation(&e) => {
                    debug!(
                        correlation_id = %previous.correlation_id,
                        attempt_number = latest + 1,
                        "Attempt number taken by a concurrent retry"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(WebhookError::AttemptConflict(previous.correlation_id.clone()))
    }

    /// Scheduled follow-up to the failed attempt `previous`
    ///
    /// Returns `None` without sending when the delivery has moved on since
    /// `previous`: a later attempt exists or one already succeeded.
    pub async fn continue_delivery(
        &self,
        webhook: &webhooks::Model,
        previous: &webhook_deliveries::Model,
    ) -> Result<Option<webhook_deliveries::Model>, WebhookError> {
        if !webhook.enabled {
            return Err(WebhookError::Disabled(webhook.id));
        }

        if let Some(latest) = self.delivery_status(&previous.correlation_id).await? {
            if latest.success || latest.attempt_number > previous.attempt_number {
                debug!(
                    correlation_id = %previous.correlation_id,
                    latest_attempt = latest.attempt_number,
                    "Skipping scheduled retry, delivery already moved on"
                );
                return Ok(None);
            }
        }

        // The unique (correlation_id, attempt_number) index settles a race
        // with a manual retry that passed the check above at the same time
        match self
            .insert_pending(
                webhook,
                DeliveryIdentity::next(previous, previous.attempt_number + 1),
            )
            .await
        {
            Ok(pending) => self.send(webhook, pending).await.map(Some),
            Err(e) if is_unique_violation(&e) => {
                debug!(
                    correlation_id = %previous.correlation_id,
                    "Skipping scheduled retry, attempt already claimed"
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Manual retry: one synchronous attempt
    pub async fn retry_delivery(
        &self,
        delivery_id: i32,
    ) -> Result<webhook_deliveries::Model, WebhookError> {
        let delivery = self
            .get_delivery(delivery_id)
            .await?
            .ok_or(WebhookError::DeliveryNotFound(delivery_id))?;

        let webhook = webhooks::Entity::find_by_id(delivery.webhook_id)
            .one(self.db.as_ref())
            .await?
            .ok_or(WebhookError::NotFound(delivery.webhook_id))?;

        let attempt = self.redeliver(&webhook, &delivery).await?;
        info!(
            delivery_id,
            correlation_id = %attempt.correlation_id,
            attempt_number = attempt.attempt_number,
            success = attempt.success,
            "Manual webhook retry finished"
        );
        Ok(attempt)
    }

    async fn insert_pending(
        &self,
        webhook: &webhooks::Model,
        identity: DeliveryIdentity<'_>,
    ) -> Result<webhook_deliveries::Model, DbErr> {
        webhook_deliveries::ActiveModel {
            webhook_id: Set(webhook.id),
            correlation_id: Set(identity.correlation_id.to_string()),
            attempt_number: Set(identity.attempt_number),
            event_type: Set(identity.event_type.to_string()),
            event_id: Set(identity.event_id),
            status: Set(DeliveryStatus::Pending),
            request_body: Set(identity.request_body.to_string()),
            first_sent_at: Set(identity.first_sent_at),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
    }

    /// Send a claimed attempt, moving its row `pending -> sent -> success|failed`
    async fn send(
        &self,
        webhook: &webhooks::Model,
        pending: webhook_deliveries::Model,
    ) -> Result<webhook_deliveries::Model, WebhookError> {
        let sent_at = Utc::now();
        let first_sent_at = pending.first_sent_at.unwrap_or(sent_at);
        let mut sent: webhook_deliveries::ActiveModel = pending.into();
        sent.status = Set(DeliveryStatus::Sent);
        sent.sent_at = Set(Some(sent_at));
        sent.first_sent_at = Set(Some(first_sent_at));
        let sent = sent.update(self.db.as_ref()).await?;

        let mut request = self
            .http_client
            .post(&webhook.url)
            .header("content-type", "application/json")
            .header(EVENT_HEADER, sent.event_type.as_str())
            .header(DELIVERY_HEADER, sent.correlation_id.as_str())
            .header(TIMESTAMP_HEADER, sent_at.timestamp().to_string());
        if let Some(secret) = webhook.secret.as_deref().filter(|s| !s.is_empty()) {
            request = request.header(SIGNATURE_HEADER, sign_payload(secret, &sent.request_body));
        }

        let outcome = match request.body(sent.request_body.clone()).send().await {
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.ok().map(|text| {
                    truncate_utf8(text, self.max_response_body_bytes)
                });
                if status.is_success() {
                    (true, Some(status.as_u16()), body, None)
                } else {
                    (
                        false,
                        Some(status.as_u16()),
                        body,
                        Some(format!("Receiver responded with HTTP {}", status.as_u16())),
                    )
                }
            }
            Err(e) if e.is_timeout() => (false, None, None, Some("Request timed out".to_string())),
            Err(e) => (false, None, None, Some(e.to_string())),
        };
        let (success, status_code, response_body, error_message) = outcome;

        let mut finished: webhook_deliveries::ActiveModel = sent.into();
        finished.status = Set(if success {
            DeliveryStatus::Success
        } else {
            DeliveryStatus::Failed
        });
        finished.success = Set(success);
        finished.status_code = Set(status_code.map(i32::from));
        finished.response_body = Set(response_body);
        finished.error_message = Set(error_message.clone());
        finished.response_at = Set(status_code.map(|_| Utc::now()));
        let finished = finished.update(self.db.as_ref()).await?;

        if success {
            debug!(
                webhook_id = webhook.id,
                delivery_id = finished.id,
                attempt_number = finished.attempt_number,
                "Webhook delivered"
            );
        } else {
            warn!(
                webhook_id = webhook.id,
                delivery_id = finished.id,
                attempt_number = finished.attempt_number,
                "Webhook delivery to {} failed: {}",
                webhook.url,
                error_message.as_deref().unwrap_or("unknown error")
            );
        }

        Ok(finished)
    }

    pub async fn get_webhook(&self, webhook_id: i32) -> Result<webhooks::Model, WebhookError> {
        webhooks::Entity::find_by_id(webhook_id)
            .one(self.db.as_ref())
            .await?
            .ok_or(WebhookError::NotFound(webhook_id))
    }

    /// Delivery attempts of a webhook, newest first
    pub async fn list_deliveries(
        &self,
        webhook_id: i32,
        limit: u64,
    ) -> Result<Vec<webhook_deliveries::Model>, WebhookError> {
        self.get_webhook(webhook_id).await?;

        let deliveries = webhook_deliveries::Entity::find()
            .filter(webhook_deliveries::Column::WebhookId.eq(webhook_id))
            .order_by_desc(webhook_deliveries::Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;
        Ok(deliveries)
    }

    pub async fn get_delivery(
        &self,
        delivery_id: i32,
    ) -> Result<Option<webhook_deliveries::Model>, WebhookError> {
        let delivery = webhook_deliveries::Entity::find_by_id(delivery_id)
            .one(self.db.as_ref())
            .await?;
        Ok(delivery)
    }

    /// Latest attempt of a delivery
    pub async fn delivery_status(
        &self,
        correlation_id: &str,
    ) -> Result<Option<webhook_deliveries::Model>, WebhookError> {
        let latest = webhook_deliveries::Entity::find()
            .filter(webhook_deliveries::Column::CorrelationId.eq(correlation_id))
            .order_by_desc(webhook_deliveries::Column::AttemptNumber)
            .one(self.db.as_ref())
            .await?;
        Ok(latest)
    }
}

fn truncate_utf8(mut text: String, max_bytes: usize) -> String {
    if text.len() > max_bytes {
        let mut end = max_bytes;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

#[cfg(test)]
mod tests {
    include!("service_tests.rs");
}
