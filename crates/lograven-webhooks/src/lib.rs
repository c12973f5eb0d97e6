//! # lograven-webhooks
//!
//! Webhook delivery for error group notifications.
//!
//! This crate provides:
//! - Matching notifications against a project's enabled webhooks
//! - Signed HTTP delivery with one immutable row per attempt
//! - A bounded queue and worker pool with exponential backoff retries
//! - Delivery history and manual retry endpoints

mod dispatcher;
mod events;
mod handlers;
mod service;

pub use dispatcher::{DispatchSender, RetryPolicy, WebhookDispatcher};
pub use events::{WebhookEventType, WebhookPayload};
pub use handlers::{configure_routes, WebhookState, WebhooksApiDoc};
pub use service::{sign_payload, WebhookError, WebhookService};
