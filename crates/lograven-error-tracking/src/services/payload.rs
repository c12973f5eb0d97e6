//! Ingestion wire payload
//!
//! SDKs post camelCase JSON. Only `errorType` and `message` are required;
//! everything else is optional metadata stored with the event.

use lograven_core::{DateTime, TagMap, UtcDateTime};
use serde::Deserialize;
use utoipa::ToSchema;

use super::types::IngestError;

const MAX_ERROR_TYPE_LEN: usize = 255;

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    #[schema(example = "TypeError")]
    pub error_type: Option<String>,
    #[schema(example = "Cannot read property 'x' of undefined")]
    pub message: Option<String>,
    #[serde(alias = "stackTrace")]
    pub stacktrace: Option<String>,
    /// When the error happened on the client, defaults to receipt time
    pub timestamp: Option<DateTime>,
    pub user_agent: Option<String>,
    pub status_code: Option<i64>,
    #[schema(value_type = Option<Object>)]
    pub user_context: Option<TagMap>,
    #[schema(value_type = Option<Object>)]
    pub tags: Option<TagMap>,
    pub browser: Option<String>,
    pub browser_version: Option<String>,
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub device_type: Option<String>,
    pub url: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub environment: Option<String>,
    pub release: Option<String>,
}

/// A payload that passed validation, ready to be fingerprinted and stored
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedEvent {
    pub error_type: String,
    pub message: String,
    pub stack_trace: Option<String>,
    pub timestamp: UtcDateTime,
    pub user_agent: Option<String>,
    pub status_code: Option<i32>,
    pub user_context: Option<TagMap>,
    pub tags: Option<TagMap>,
    pub browser: Option<String>,
    pub browser_version: Option<String>,
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub device_type: Option<String>,
    pub url: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub environment: Option<String>,
    pub release: Option<String>,
}

impl EventPayload {
    pub fn parse(raw: &[u8]) -> Result<Self, IngestError> {
        serde_json::from_slice(raw).map_err(|e| IngestError::InvalidPayload(e.to_string()))
    }

    /// Check required fields and clamp what can be clamped
    ///
    /// Messages longer than `max_message_length` characters are truncated.
    /// Timestamps in the future are pulled back to `received_at`.
    pub fn validate(
        self,
        received_at: UtcDateTime,
        max_message_length: usize,
    ) -> Result<ValidatedEvent, IngestError> {
        let error_type = non_empty(self.error_type)
            .ok_or_else(|| IngestError::InvalidPayload("errorType is required".to_string()))?;
        if error_type.chars().count() > MAX_ERROR_TYPE_LEN {
            return Err(IngestError::InvalidPayload(format!(
                "errorType must be at most {} characters",
                MAX_ERROR_TYPE_LEN
            )));
        }

        let message = non_empty(self.message)
            .ok_or_else(|| IngestError::InvalidPayload("message is required".to_string()))?;
        let message = if message.chars().count() > max_message_length {
            message.chars().take(max_message_length).collect()
        } else {
            message
        };

        let status_code = match self.status_code {
            Some(code) if (100..=599).contains(&code) => Some(code as i32),
            Some(code) => {
                return Err(IngestError::InvalidPayload(format!(
                    "statusCode {} is not a valid HTTP status",
                    code
                )))
            }
            None => None,
        };

        let timestamp = self
            .timestamp
            .map(|ts| ts.0.min(received_at))
            .unwrap_or(received_at);

        Ok(ValidatedEvent {
            error_type,
            message,
            stack_trace: non_empty(self.stacktrace),
            timestamp,
            user_agent: non_empty(self.user_agent),
            status_code,
            user_context: self.user_context.filter(|bag| !bag.is_empty()),
            tags: self.tags.filter(|bag| !bag.is_empty()),
            browser: non_empty(self.browser),
            browser_version: non_empty(self.browser_version),
            os: non_empty(self.os),
            os_version: non_empty(self.os_version),
            device_type: non_empty(self.device_type),
            url: non_empty(self.url),
            method: non_empty(self.method).map(|m| m.to_uppercase()),
            path: non_empty(self.path),
            environment: non_empty(self.environment),
            release: non_empty(self.release),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
