//! Notification contract between ingestion and webhook delivery
//!
//! The ingestion pipeline hands an [`ErrorNotification`] to an
//! [`EventNotifier`] after an event commits. Implementations must not block:
//! a full queue is reported as [`NotifyError::QueueFull`] and the caller
//! logs and moves on.

use crate::types::UtcDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Snapshot of an error group as it was right after an upsert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub id: i32,
    pub project_id: i32,
    pub fingerprint: String,
    pub error_type: String,
    pub message: String,
    /// `open`, `resolved` or `ignored`
    pub status: String,
    pub count: i64,
    #[schema(value_type = String, format = DateTime)]
    pub first_seen: UtcDateTime,
    #[schema(value_type = String, format = DateTime)]
    pub last_seen: UtcDateTime,
    pub assignee: Option<String>,
}

/// Summary of the event that triggered a notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub id: i32,
    pub error_type: String,
    pub message: String,
    #[schema(value_type = String, format = DateTime)]
    pub timestamp: UtcDateTime,
    pub environment: Option<String>,
    pub release: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorNotification {
    pub project_id: i32,
    /// True when this event created the group
    pub is_new_group: bool,
    pub group: GroupSummary,
    pub event: EventSummary,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification queue is full")]
    QueueFull,

    #[error("notification queue is closed")]
    Closed,
}

pub trait EventNotifier: Send + Sync {
    /// Enqueue without waiting
    fn notify(&self, notification: ErrorNotification) -> Result<(), NotifyError>;
}

/// Notifier that discards everything, for deployments without webhooks
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl EventNotifier for NoopNotifier {
    fn notify(&self, _notification: ErrorNotification) -> Result<(), NotifyError> {
        Ok(())
    }
}
