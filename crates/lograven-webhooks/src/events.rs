//! Webhook event types and payload definitions.

use lograven_core::{ErrorNotification, EventSummary, GroupSummary};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// All supported webhook event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum WebhookEventType {
    #[serde(rename = "error_group.created")]
    ErrorGroupCreated,
    #[serde(rename = "error_group.updated")]
    ErrorGroupUpdated,
}

impl WebhookEventType {
    /// Returns the string representation of the event type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ErrorGroupCreated => "error_group.created",
            Self::ErrorGroupUpdated => "error_group.updated",
        }
    }

    /// Event type for a notification: a new group is `created`, every later
    /// event on it is `updated`
    pub fn for_notification(notification: &ErrorNotification) -> Self {
        if notification.is_new_group {
            Self::ErrorGroupCreated
        } else {
            Self::ErrorGroupUpdated
        }
    }
}

impl std::fmt::Display for WebhookEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Body POSTed to webhook receivers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub event: EventSummary,
    pub group: GroupSummary,
    pub event_type: WebhookEventType,
}

impl WebhookPayload {
    pub fn from_notification(notification: &ErrorNotification) -> Self {
        Self {
            event: notification.event.clone(),
            group: notification.group.clone(),
            event_type: WebhookEventType::for_notification(notification),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    pub(crate) fn notification(is_new_group: bool) -> ErrorNotification {
        let now = Utc::now();
        ErrorNotification {
            project_id: 7,
            is_new_group,
            group: GroupSummary {
                id: 3,
                project_id: 7,
                fingerprint: "abc".to_string(),
                error_type: "TypeError".to_string(),
                message: "boom".to_string(),
                status: "open".to_string(),
                count: 1,
                first_seen: now,
                last_seen: now,
                assignee: None,
            },
            event: EventSummary {
                id: 11,
                error_type: "TypeError".to_string(),
                message: "boom".to_string(),
                timestamp: now,
                environment: Some("production".to_string()),
                release: None,
                url: None,
            },
        }
    }

    #[test]
    fn test_event_type_wire_names() {
        for event_type in [
            WebhookEventType::ErrorGroupCreated,
            WebhookEventType::ErrorGroupUpdated,
        ] {
            assert_eq!(
                serde_json::to_value(event_type).unwrap(),
                serde_json::json!(event_type.as_str())
            );
        }
        assert_eq!(
            WebhookEventType::ErrorGroupUpdated.to_string(),
            "error_group.updated"
        );
    }

    #[test]
    fn test_payload_wire_shape() {
        let payload = WebhookPayload::from_notification(&notification(true));
        let value = serde_json::to_value(&payload).unwrap();

        assert_eq!(value["eventType"], "error_group.created");
        assert_eq!(value["group"]["id"], 3);
        assert_eq!(value["group"]["errorType"], "TypeError");
        assert_eq!(value["event"]["id"], 11);
        assert_eq!(value["event"]["environment"], "production");

        let updated = WebhookPayload::from_notification(&notification(false));
        assert_eq!(updated.event_type, WebhookEventType::ErrorGroupUpdated);
    }
}
