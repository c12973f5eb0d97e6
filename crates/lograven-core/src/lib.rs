//! Core types shared by every LogRaven crate

pub mod error;
pub mod error_builder;
pub mod notify;
pub mod pagination;
pub mod problemdetails;
pub mod tags;
pub mod types;

pub use error::*;
pub use error_builder::*;
pub use notify::{
    ErrorNotification, EventNotifier, EventSummary, GroupSummary, NoopNotifier, NotifyError,
};
pub use pagination::{PaginationMeta, PaginationParams};
pub use problemdetails::{Problem, ProblemDetails};
pub use tags::{TagMap, TagValue};
pub use types::*;

// Re-export external dependencies
pub use chrono;
pub use serde_json;
pub use uuid;
