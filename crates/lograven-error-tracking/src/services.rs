pub mod error_query_service;
pub mod group_store;
pub mod ingestion_pipeline;
pub mod payload;
pub mod project_resolver;
pub mod quota_tracker;
pub mod symbolicator;
pub mod types;

pub use error_query_service::{ErrorQueryService, GroupUpdate, QuotaUsage};
pub use group_store::GroupStore;
pub use ingestion_pipeline::IngestionPipeline;
pub use payload::{EventPayload, ValidatedEvent};
pub use project_resolver::{ProjectResolver, ResolvedProject};
pub use quota_tracker::{Admission, QuotaTracker};
pub use symbolicator::{PassthroughSymbolicator, Symbolicator};
pub use types::*;
