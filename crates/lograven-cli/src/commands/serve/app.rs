use axum::{routing::get, Json, Router};
use lograven_config::LogravenConfig;
use lograven_database::DbConnection;
use lograven_error_tracking::{
    AppState, ErrorQueryService, ErrorTrackingApiDoc, Fingerprinter, IngestionPipeline,
};
use lograven_webhooks::{WebhookDispatcher, WebhookService, WebhookState, WebhooksApiDoc};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::openapi::server::Server;
use utoipa::OpenApi;

/// HTTP router plus the dispatcher feeding webhooks from it
pub struct App {
    pub router: Router,
    pub dispatcher: WebhookDispatcher,
}

/// Wire services together. Must run inside a tokio runtime: the webhook
/// workers are spawned here.
pub fn build_app(db: Arc<DbConnection>, config: &LogravenConfig) -> anyhow::Result<App> {
    let webhook_service = Arc::new(WebhookService::new(db.clone(), &config.dispatcher)?);
    let dispatcher = WebhookDispatcher::start(webhook_service.clone(), &config.dispatcher);

    let pipeline = IngestionPipeline::new(
        db.clone(),
        config.ingest.clone(),
        Fingerprinter::new(&config.fingerprint),
        Arc::new(dispatcher.notifier()),
    );
    let error_tracking = Arc::new(AppState {
        pipeline: Arc::new(pipeline),
        query_service: Arc::new(ErrorQueryService::new(db)),
    });
    let webhooks = Arc::new(WebhookState::new(webhook_service));

    let api = lograven_error_tracking::configure_routes()
        .with_state(error_tracking)
        .merge(lograven_webhooks::configure_routes().with_state(webhooks));

    let doc = api_doc();
    let router = Router::new()
        .route("/health", get(health))
        .route(
            "/api/openapi.json",
            get(move || {
                let doc = doc.clone();
                async move { Json(doc) }
            }),
        )
        .nest("/api", api)
        .layer(TraceLayer::new_for_http());

    Ok(App { router, dispatcher })
}

/// Merged OpenAPI document for everything under `/api`
pub fn api_doc() -> utoipa::openapi::OpenApi {
    let mut doc = ErrorTrackingApiDoc::openapi();
    doc.merge(WebhooksApiDoc::openapi());
    doc.info.title = "LogRaven API".to_string();
    doc.servers = Some(vec![Server::new("/api")]);
    doc
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
