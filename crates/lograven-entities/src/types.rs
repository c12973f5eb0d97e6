use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use utoipa::ToSchema;

/// Lifecycle state of an error group. Only a human actor moves a group out
/// of `Open`; ingestion never changes it.
/// NOTE: Use db_type = "Text" for SQLite compatibility.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DeriveActiveEnum, EnumIter, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    #[sea_orm(string_value = "open")]
    Open,
    #[sea_orm(string_value = "resolved")]
    Resolved,
    #[sea_orm(string_value = "ignored")]
    Ignored,
}

impl Display for GroupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl GroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupStatus::Open => "open",
            GroupStatus::Resolved => "resolved",
            GroupStatus::Ignored => "ignored",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(GroupStatus::Open),
            "resolved" => Some(GroupStatus::Resolved),
            "ignored" => Some(GroupStatus::Ignored),
            _ => None,
        }
    }
}

/// State of a single webhook delivery attempt:
/// `Pending -> Sent -> {Success, Failed}`
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, DeriveActiveEnum, EnumIter, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "sent")]
    Sent,
    #[sea_orm(string_value = "success")]
    Success,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Success => "success",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Success | DeliveryStatus::Failed)
    }
}

/// Monthly event allowance of a plan.
///
/// Plans are configured with a number, or with `"custom"` / `"unlimited"` /
/// `null` for top-tier plans that are never throttled. Stored as a nullable
/// integer column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanLimit {
    Limited(i64),
    Unlimited,
}

impl PlanLimit {
    pub fn from_column(events_per_month: Option<i64>) -> Self {
        match events_per_month {
            Some(limit) => PlanLimit::Limited(limit),
            None => PlanLimit::Unlimited,
        }
    }

    pub fn to_column(self) -> Option<i64> {
        match self {
            PlanLimit::Limited(limit) => Some(limit),
            PlanLimit::Unlimited => None,
        }
    }
}

impl Serialize for PlanLimit {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PlanLimit::Limited(limit) => serializer.serialize_i64(*limit),
            PlanLimit::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}
