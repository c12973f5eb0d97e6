use super::types::AppState;
use crate::services::{EventPayload, IngestError, IngestResult};
use axum::{body::Bytes, extract::State, http::HeaderMap, response::Json};
use lograven_core::{
    bad_request, gateway_timeout, internal_server_error, not_found, service_unavailable,
    too_many_requests, unauthorized, Problem,
};
use std::sync::Arc;
use tracing::{error, warn};

pub const DSN_HEADER: &str = "x-dsn";

impl From<IngestError> for Problem {
    fn from(error: IngestError) -> Self {
        match error {
            IngestError::Unauthorized => unauthorized().build(),
            IngestError::InvalidPayload(msg) => bad_request().detail(msg).build(),
            IngestError::QuotaExceeded { current, limit } => too_many_requests()
                .detail(format!(
                    "Project has used {} of {} events this period",
                    current, limit
                ))
                .value("current_count", current)
                .value("limit", limit)
                .build(),
            IngestError::NotFound(what) => not_found()
                .detail(format!("{} does not exist", what))
                .build(),
            IngestError::Conflict(msg) => {
                warn!("Ingestion gave up after repeated storage conflicts: {}", msg);
                service_unavailable().build()
            }
            IngestError::Timeout => gateway_timeout().build(),
            IngestError::Database(e) => {
                error!("Ingestion failed: {}", e);
                internal_server_error().build()
            }
        }
    }
}

/// Ingest one error event
///
/// The project is identified by the `x-dsn` header. The body is read raw so
/// malformed JSON is reported as a problem document like every other
/// validation failure.
#[utoipa::path(
    post,
    path = "/events",
    request_body = EventPayload,
    params(
        ("x-dsn" = String, Header, description = "Project DSN")
    ),
    responses(
        (status = 200, description = "Event stored", body = IngestResult),
        (status = 400, description = "Invalid payload", body = lograven_core::ProblemDetails),
        (status = 401, description = "Unknown or missing DSN", body = lograven_core::ProblemDetails),
        (status = 429, description = "Event quota exceeded", body = lograven_core::ProblemDetails),
        (status = 503, description = "Storage contention, retry later"),
        (status = 504, description = "Ingestion deadline exceeded"),
        (status = 500, description = "Internal server error")
    ),
    tag = "ingestion"
)]
pub async fn ingest_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IngestResult>, Problem> {
    let dsn = headers
        .get(DSN_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let result = state.pipeline.ingest(dsn, &body).await?;
    Ok(Json(result))
}
