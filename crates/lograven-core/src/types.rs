//! Date/time aliases used across LogRaven crates

use chrono::{DateTime as ChronoDateTime, Datelike, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::ops::Deref;
use utoipa::ToSchema;

/// Canonical datetime type for database TIMESTAMPTZ columns
pub type DBDateTime = ChronoDateTime<Utc>;

/// Canonical datetime type for API payloads and responses
///
/// Serializes as RFC 3339, e.g. `2026-10-12T12:15:47.609192+00:00`.
///
/// When used in a utoipa schema, annotate the field:
/// ```rust,ignore
/// #[schema(value_type = String, format = DateTime)]
/// pub field: UtcDateTime,
/// ```
pub type UtcDateTime = ChronoDateTime<Utc>;

/// Lenient timestamp accepted on the ingestion wire
///
/// Accepts RFC 3339 with any offset (`2026-01-15T14:30:00Z`,
/// `2026-01-15T16:30:00+02:00`) and naive `YYYY-MM-DDTHH:MM:SS`, which is
/// read as UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ToSchema)]
#[schema(value_type = String, example = "2026-01-15T14:30:00Z")]
pub struct DateTime(pub ChronoDateTime<Utc>);

impl<'de> Deserialize<'de> for DateTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;

        if let Ok(dt) = ChronoDateTime::parse_from_rfc3339(&s) {
            return Ok(DateTime(dt.with_timezone(&Utc)));
        }

        if let Ok(naive) = NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S") {
            return Ok(DateTime(naive.and_utc()));
        }

        Err(serde::de::Error::custom(
            "invalid timestamp, expected RFC 3339 (YYYY-MM-DDTHH:MM:SSZ)",
        ))
    }
}

impl Serialize for DateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_rfc3339())
    }
}

impl Deref for DateTime {
    type Target = ChronoDateTime<Utc>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<ChronoDateTime<Utc>> for DateTime {
    fn from(dt: ChronoDateTime<Utc>) -> Self {
        DateTime(dt)
    }
}

impl From<DateTime> for ChronoDateTime<Utc> {
    fn from(dt: DateTime) -> Self {
        dt.0
    }
}

/// Billing period identifier (`YYYY-MM`) containing `at`
pub fn billing_period(at: UtcDateTime) -> String {
    format!("{:04}-{:02}", at.year(), at.month())
}
