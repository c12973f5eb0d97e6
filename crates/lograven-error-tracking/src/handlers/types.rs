use std::sync::Arc;

use crate::services::{ErrorQueryService, IngestionPipeline};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestionPipeline>,
    pub query_service: Arc<ErrorQueryService>,
}
