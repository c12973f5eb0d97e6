pub mod types;

pub mod plans;
pub mod projects;
pub mod error_groups;
pub mod error_events;
pub mod quota_counters;
pub mod webhooks;
pub mod webhook_deliveries;
