use super::ingest::{self, ingest_event};
use super::types::AppState;
use crate::services::{ErrorTrackingError, EventPayload, GroupUpdate, IngestResult, QuotaUsage};
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use lograven_core::{
    bad_request, internal_server_error, not_found, PaginationMeta, PaginationParams, Problem,
    ProblemDetails, UtcDateTime,
};
use lograven_entities::types::GroupStatus;
use lograven_entities::{error_events, error_groups};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{IntoParams, OpenApi, ToSchema};

#[derive(OpenApi)]
#[openapi(
    paths(
        ingest::ingest_event,
        list_error_groups,
        get_error_group,
        update_error_group,
        list_error_events,
        get_usage,
    ),
    components(schemas(
        EventPayload,
        IngestResult,
        ErrorGroupResponse,
        ErrorEventResponse,
        UpdateErrorGroupRequest,
        PaginatedErrorGroupsResponse,
        PaginatedErrorEventsResponse,
        PaginationMeta,
        QuotaUsage,
        GroupStatus,
        ProblemDetails,
    )),
    tags(
        (name = "ingestion", description = "SDK event intake"),
        (name = "error-tracking", description = "Error groups, events and usage")
    )
)]
pub struct ErrorTrackingApiDoc;

pub fn configure_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events", post(ingest_event))
        .route(
            "/projects/{project_id}/error-groups",
            get(list_error_groups),
        )
        .route(
            "/projects/{project_id}/error-groups/{group_id}",
            get(get_error_group).put(update_error_group),
        )
        .route(
            "/projects/{project_id}/error-groups/{group_id}/events",
            get(list_error_events),
        )
        .route("/projects/{project_id}/usage", get(get_usage))
}

// ===== Request/Response Types =====

#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct ListErrorGroupsQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    /// `open`, `resolved` or `ignored`
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct ListErrorEventsQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateErrorGroupRequest {
    pub status: Option<GroupStatus>,
    /// Omit to keep the current assignee, `null` to clear it
    #[serde(default, deserialize_with = "present_or_null")]
    #[schema(value_type = Option<String>)]
    pub assignee: Option<Option<String>>,
}

fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorGroupResponse {
    pub id: i32,
    pub project_id: i32,
    pub fingerprint: String,
    pub error_type: String,
    pub message: String,
    pub status: GroupStatus,
    pub assignee: Option<String>,
    pub total_count: i64,
    #[schema(value_type = String, format = DateTime)]
    pub first_seen: UtcDateTime,
    #[schema(value_type = String, format = DateTime)]
    pub last_seen: UtcDateTime,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: UtcDateTime,
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: UtcDateTime,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorEventResponse {
    pub id: i32,
    pub error_group_id: i32,
    #[schema(value_type = String, format = DateTime)]
    pub timestamp: UtcDateTime,
    pub error_type: String,
    pub message: String,
    pub stack_trace: Option<String>,
    pub mapped_stack_trace: Option<String>,
    pub url: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub status_code: Option<i32>,
    pub user_agent: Option<String>,
    pub browser: Option<String>,
    pub browser_version: Option<String>,
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub device_type: Option<String>,
    pub environment: Option<String>,
    pub release: Option<String>,
    pub user_context: Option<serde_json::Value>,
    pub tags: Option<serde_json::Value>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: UtcDateTime,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedErrorGroupsResponse {
    pub data: Vec<ErrorGroupResponse>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedErrorEventsResponse {
    pub data: Vec<ErrorEventResponse>,
    pub pagination: PaginationMeta,
}

// ===== Conversions =====

impl From<error_groups::Model> for ErrorGroupResponse {
    fn from(group: error_groups::Model) -> Self {
        Self {
            id: group.id,
            project_id: group.project_id,
            fingerprint: group.fingerprint,
            error_type: group.error_type,
            message: group.message,
            status: group.status,
            assignee: group.assignee,
            total_count: group.total_count,
            first_seen: group.first_seen,
            last_seen: group.last_seen,
            created_at: group.created_at,
            updated_at: group.updated_at,
        }
    }
}

impl From<error_events::Model> for ErrorEventResponse {
    fn from(event: error_events::Model) -> Self {
        Self {
            id: event.id,
            error_group_id: event.error_group_id,
            timestamp: event.timestamp,
            error_type: event.error_type,
            message: event.message,
            stack_trace: event.stack_trace,
            mapped_stack_trace: event.mapped_stack_trace,
            url: event.url,
            method: event.method,
            path: event.path,
            status_code: event.status_code,
            user_agent: event.user_agent,
            browser: event.browser,
            browser_version: event.browser_version,
            os: event.os,
            os_version: event.os_version,
            device_type: event.device_type,
            environment: event.environment,
            release: event.release,
            user_context: event.user_context,
            tags: event.tags,
            created_at: event.created_at,
        }
    }
}

// ===== Error Handling =====

impl From<ErrorTrackingError> for Problem {
    fn from(error: ErrorTrackingError) -> Self {
        match error {
            ErrorTrackingError::Database(e) => {
                error!("Error tracking query failed: {}", e);
                internal_server_error().build()
            }
            ErrorTrackingError::GroupNotFound => {
                not_found().detail("Error group not found").build()
            }
            ErrorTrackingError::ProjectNotFound => not_found().detail("Project not found").build(),
            ErrorTrackingError::Validation(msg) => bad_request().detail(msg).build(),
        }
    }
}

// ===== Handlers =====

/// List error groups for a project, most recently seen first
#[utoipa::path(
    get,
    path = "/projects/{project_id}/error-groups",
    responses(
        (status = 200, description = "Paginated list of error groups", body = PaginatedErrorGroupsResponse),
        (status = 400, description = "Unknown status filter", body = ProblemDetails),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("project_id" = i32, Path, description = "Project ID"),
        ListErrorGroupsQuery
    ),
    tag = "error-tracking"
)]
pub async fn list_error_groups(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<i32>,
    Query(query): Query<ListErrorGroupsQuery>,
) -> Result<Json<PaginatedErrorGroupsResponse>, Problem> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(GroupStatus::from_str(raw).ok_or_else(|| {
            ErrorTrackingError::Validation(format!("unknown status '{}'", raw))
        })?),
        None => None,
    };
    let pagination = PaginationParams::new(query.page, query.page_size);
    let (page, page_size) = pagination.normalize();

    let (groups, total_count) = state
        .query_service
        .list_groups(project_id, status, pagination)
        .await?;

    Ok(Json(PaginatedErrorGroupsResponse {
        data: groups.into_iter().map(ErrorGroupResponse::from).collect(),
        pagination: PaginationMeta::new(page, page_size, total_count),
    }))
}

/// Get a specific error group
#[utoipa::path(
    get,
    path = "/projects/{project_id}/error-groups/{group_id}",
    responses(
        (status = 200, description = "Error group details", body = ErrorGroupResponse),
        (status = 404, description = "Error group not found", body = ProblemDetails),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("project_id" = i32, Path, description = "Project ID"),
        ("group_id" = i32, Path, description = "Error group ID")
    ),
    tag = "error-tracking"
)]
pub async fn get_error_group(
    State(state): State<Arc<AppState>>,
    Path((project_id, group_id)): Path<(i32, i32)>,
) -> Result<Json<ErrorGroupResponse>, Problem> {
    let group = state.query_service.get_group(project_id, group_id).await?;
    Ok(Json(ErrorGroupResponse::from(group)))
}

/// Change the status or assignee of an error group
#[utoipa::path(
    put,
    path = "/projects/{project_id}/error-groups/{group_id}",
    request_body = UpdateErrorGroupRequest,
    responses(
        (status = 200, description = "Updated error group", body = ErrorGroupResponse),
        (status = 404, description = "Error group not found", body = ProblemDetails),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("project_id" = i32, Path, description = "Project ID"),
        ("group_id" = i32, Path, description = "Error group ID")
    ),
    tag = "error-tracking"
)]
pub async fn update_error_group(
    State(state): State<Arc<AppState>>,
    Path((project_id, group_id)): Path<(i32, i32)>,
    Json(request): Json<UpdateErrorGroupRequest>,
) -> Result<Json<ErrorGroupResponse>, Problem> {
    let group = state
        .query_service
        .update_group(
            project_id,
            group_id,
            GroupUpdate {
                status: request.status,
                assignee: request.assignee,
            },
        )
        .await?;

    Ok(Json(ErrorGroupResponse::from(group)))
}

/// List events of an error group, newest first
#[utoipa::path(
    get,
    path = "/projects/{project_id}/error-groups/{group_id}/events",
    responses(
        (status = 200, description = "Paginated list of error events", body = PaginatedErrorEventsResponse),
        (status = 404, description = "Error group not found", body = ProblemDetails),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("project_id" = i32, Path, description = "Project ID"),
        ("group_id" = i32, Path, description = "Error group ID"),
        ListErrorEventsQuery
    ),
    tag = "error-tracking"
)]
pub async fn list_error_events(
    State(state): State<Arc<AppState>>,
    Path((project_id, group_id)): Path<(i32, i32)>,
    Query(query): Query<ListErrorEventsQuery>,
) -> Result<Json<PaginatedErrorEventsResponse>, Problem> {
    let pagination = PaginationParams::new(query.page, query.page_size);
    let (page, page_size) = pagination.normalize();

    let (events, total_count) = state
        .query_service
        .list_events(project_id, group_id, pagination)
        .await?;

    Ok(Json(PaginatedErrorEventsResponse {
        data: events.into_iter().map(ErrorEventResponse::from).collect(),
        pagination: PaginationMeta::new(page, page_size, total_count),
    }))
}

/// Event usage of a project in the current billing period
#[utoipa::path(
    get,
    path = "/projects/{project_id}/usage",
    responses(
        (status = 200, description = "Quota usage", body = QuotaUsage),
        (status = 404, description = "Project not found", body = ProblemDetails),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("project_id" = i32, Path, description = "Project ID")
    ),
    tag = "error-tracking"
)]
pub async fn get_usage(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<i32>,
) -> Result<Json<QuotaUsage>, Problem> {
    let usage = state.query_service.usage(project_id).await?;
    Ok(Json(usage))
}

#[cfg(test)]
mod tests {
    include!("handler_tests.rs");
}
