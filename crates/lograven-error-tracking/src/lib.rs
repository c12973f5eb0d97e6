//! Error ingestion and grouping
//!
//! Events enter through [`IngestionPipeline::ingest`], get a fingerprint, are
//! counted against the project's quota and folded into an error group. The
//! dashboard reads the result through [`ErrorQueryService`].

pub mod fingerprint;
pub mod handlers;
pub mod services;

pub use fingerprint::Fingerprinter;
pub use handlers::{configure_routes, AppState, ErrorTrackingApiDoc};
pub use services::*;
