pub mod handler;
pub mod ingest;
pub mod types;

pub use handler::{configure_routes, ErrorTrackingApiDoc};
pub use types::AppState;
