//! RFC 7807 problem documents returned by every LogRaven HTTP endpoint

use std::collections::BTreeMap;

use axum::http::header::{HeaderValue, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::{response::IntoResponse, Json};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

/// OpenAPI shape of a problem document
#[derive(Debug, Clone, Serialize, ToSchema)]
#[schema(example = json!({
    "type": "https://lograven.dev/probs/quota-exceeded",
    "title": "Quota Exceeded",
    "detail": "Project has used 1000 of 1000 events this period",
    "instance": "/error/quota-exceeded",
    "error_code": "QUOTA_EXCEEDED"
}))]
pub struct ProblemDetails {
    /// URI identifying the problem type
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_url: Option<String>,
    /// Short summary of the problem type
    pub title: String,
    /// Explanation specific to this occurrence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// URI identifying this occurrence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// Problem-specific members such as `error_code`
    #[schema(additional_properties = true)]
    pub extensions: BTreeMap<String, Value>,
}

/// A problem response: status code plus a flat JSON body
#[derive(Debug, Clone)]
pub struct Problem {
    pub status_code: StatusCode,
    pub body: BTreeMap<String, Value>,
}

/// Create an empty problem for `status_code`
pub fn new<S>(status_code: S) -> Problem
where
    S: Into<StatusCode>,
{
    Problem {
        status_code: status_code.into(),
        body: BTreeMap::new(),
    }
}

impl Problem {
    pub fn with_type<S: Into<String>>(self, value: S) -> Self {
        self.with_value("type", value.into())
    }

    pub fn with_title<S: Into<String>>(self, value: S) -> Self {
        self.with_value("title", value.into())
    }

    pub fn with_detail<S: Into<String>>(self, value: S) -> Self {
        self.with_value("detail", value.into())
    }

    pub fn with_instance<S: Into<String>>(self, value: S) -> Self {
        self.with_value("instance", value.into())
    }

    /// Attach an arbitrary member to the body
    pub fn with_value<V: Into<Value>>(mut self, key: &str, value: V) -> Self {
        self.body.insert(key.to_owned(), value.into());
        self
    }

    /// Value of the `error_code` member, if set
    pub fn error_code(&self) -> Option<&str> {
        self.body.get("error_code").and_then(Value::as_str)
    }
}

impl From<StatusCode> for Problem {
    fn from(status_code: StatusCode) -> Self {
        new(status_code)
    }
}

pub type Result<T> = std::result::Result<T, Problem>;

impl IntoResponse for Problem {
    fn into_response(self) -> axum::response::Response {
        if self.body.is_empty() {
            return self.status_code.into_response();
        }

        let mut response = (self.status_code, Json(self.body)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static(PROBLEM_CONTENT_TYPE),
        );
        response
    }
}
