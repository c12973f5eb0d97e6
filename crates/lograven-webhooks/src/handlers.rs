//! HTTP handlers for webhook delivery history and manual retry.

use crate::service::{WebhookError, WebhookService};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lograven_core::error_builder::ErrorBuilder;
use lograven_core::problemdetails::Problem;
use lograven_core::UtcDateTime;
use lograven_entities::types::DeliveryStatus;
use lograven_entities::webhook_deliveries;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{IntoParams, OpenApi, ToSchema};

/// Shared state for webhook handlers
pub struct WebhookState {
    pub webhook_service: Arc<WebhookService>,
}

impl WebhookState {
    pub fn new(webhook_service: Arc<WebhookService>) -> Self {
        Self { webhook_service }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(list_deliveries, get_delivery, retry_delivery),
    components(schemas(WebhookDeliveryResponse, RetryDeliveryResponse, DeliveryStatus)),
    info(
        title = "Webhook Deliveries API",
        description = "Delivery history and manual retry for error group webhooks",
        version = "1.0.0"
    ),
    tags(
        (name = "Webhook Deliveries", description = "Webhook delivery history and retry endpoints")
    )
)]
pub struct WebhooksApiDoc;

impl From<WebhookError> for Problem {
    fn from(error: WebhookError) -> Self {
        match error {
            WebhookError::NotFound(_) => ErrorBuilder::new(StatusCode::NOT_FOUND)
                .title("Webhook not found")
                .detail(error.to_string())
                .build(),
            WebhookError::DeliveryNotFound(_) => ErrorBuilder::new(StatusCode::NOT_FOUND)
                .title("Delivery not found")
                .detail(error.to_string())
                .build(),
            WebhookError::Disabled(_) => ErrorBuilder::new(StatusCode::CONFLICT)
                .title("Webhook is disabled")
                .detail(error.to_string())
                .build(),
            WebhookError::AttemptConflict(_) => ErrorBuilder::new(StatusCode::CONFLICT)
                .title("Retry already in progress")
                .detail(error.to_string())
                .build(),
            other => {
                error!("Webhook request failed: {}", other);
                ErrorBuilder::new(StatusCode::INTERNAL_SERVER_ERROR)
                    .title("Internal Server Error")
                    .build()
            }
        }
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookDeliveryResponse {
    pub id: i32,
    pub webhook_id: i32,
    /// Shared by every attempt of the same delivery
    pub correlation_id: String,
    pub attempt_number: i32,
    pub event_type: String,
    pub event_id: i32,
    pub status: DeliveryStatus,
    /// JSON body that was POSTed to the receiver
    pub request_body: String,
    pub success: bool,
    pub status_code: Option<i32>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    #[schema(value_type = Option<String>, format = DateTime, example = "2026-10-12T12:15:47.609192Z")]
    pub first_sent_at: Option<UtcDateTime>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub sent_at: Option<UtcDateTime>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub response_at: Option<UtcDateTime>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: UtcDateTime,
}

impl From<webhook_deliveries::Model> for WebhookDeliveryResponse {
    fn from(delivery: webhook_deliveries::Model) -> Self {
        Self {
            id: delivery.id,
            webhook_id: delivery.webhook_id,
            correlation_id: delivery.correlation_id,
            attempt_number: delivery.attempt_number,
            event_type: delivery.event_type,
            event_id: delivery.event_id,
            status: delivery.status,
            request_body: delivery.request_body,
            success: delivery.success,
            status_code: delivery.status_code,
            response_body: delivery.response_body,
            error_message: delivery.error_message,
            first_sent_at: delivery.first_sent_at,
            sent_at: delivery.sent_at,
            response_at: delivery.response_at,
            created_at: delivery.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RetryDeliveryResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListDeliveriesQuery {
    /// Number of deliveries to return (default: 50, max: 100)
    pub limit: Option<u64>,
}

// ============================================================================
// Handlers
// ============================================================================

/// List delivery attempts of a webhook, newest first
#[utoipa::path(
    get,
    path = "/webhooks/{webhook_id}/deliveries",
    responses(
        (status = 200, description = "List of delivery attempts", body = Vec<WebhookDeliveryResponse>),
        (status = 404, description = "Webhook not found"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("webhook_id" = i32, Path, description = "Webhook ID"),
        ListDeliveriesQuery
    ),
    tag = "Webhook Deliveries"
)]
async fn list_deliveries(
    State(state): State<Arc<WebhookState>>,
    Path(webhook_id): Path<i32>,
    Query(query): Query<ListDeliveriesQuery>,
) -> Result<Json<Vec<WebhookDeliveryResponse>>, Problem> {
    let limit = query.limit.unwrap_or(50).clamp(1, 100);

    let deliveries = state
        .webhook_service
        .list_deliveries(webhook_id, limit)
        .await?;
    Ok(Json(deliveries.into_iter().map(Into::into).collect()))
}

/// Get a single delivery attempt
#[utoipa::path(
    get,
    path = "/webhook-deliveries/{delivery_id}",
    responses(
        (status = 200, description = "Delivery attempt including the request body", body = WebhookDeliveryResponse),
        (status = 404, description = "Delivery not found"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("delivery_id" = i32, Path, description = "Delivery ID")
    ),
    tag = "Webhook Deliveries"
)]
async fn get_delivery(
    State(state): State<Arc<WebhookState>>,
    Path(delivery_id): Path<i32>,
) -> Result<Json<WebhookDeliveryResponse>, Problem> {
    let delivery = state
        .webhook_service
        .get_delivery(delivery_id)
        .await?
        .ok_or(WebhookError::DeliveryNotFound(delivery_id))?;
    Ok(Json(delivery.into()))
}

/// Retry a delivery once, synchronously
///
/// Records a new attempt and reports its outcome. Earlier attempts are
/// left as they were.
#[utoipa::path(
    post,
    path = "/webhook-deliveries/{delivery_id}/retry",
    responses(
        (status = 200, description = "Outcome of the new attempt", body = RetryDeliveryResponse),
        (status = 404, description = "Delivery not found"),
        (status = 409, description = "Webhook is disabled or the retry lost a race"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("delivery_id" = i32, Path, description = "Delivery ID")
    ),
    tag = "Webhook Deliveries"
)]
async fn retry_delivery(
    State(state): State<Arc<WebhookState>>,
    Path(delivery_id): Path<i32>,
) -> Result<Json<RetryDeliveryResponse>, Problem> {
    let attempt = state.webhook_service.retry_delivery(delivery_id).await?;
    Ok(Json(RetryDeliveryResponse {
        success: attempt.success,
        error: attempt.error_message,
    }))
}

/// Configure webhook routes
pub fn configure_routes() -> Router<Arc<WebhookState>> {
    Router::new()
        .route("/webhooks/{webhook_id}/deliveries", get(list_deliveries))
        .route("/webhook-deliveries/{delivery_id}", get(get_delivery))
        .route(
            "/webhook-deliveries/{delivery_id}/retry",
            post(retry_delivery),
        )
}
