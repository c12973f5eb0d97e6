use crate::problemdetails;
use axum::http::StatusCode;
use serde::Serialize;
use std::collections::BTreeMap;

const PROBLEM_BASE_URL: &str = "https://lograven.dev/probs";

pub struct ErrorBuilder {
    status: StatusCode,
    type_: String,
    title: String,
    detail: String,
    instance: String,
    values: BTreeMap<String, serde_json::Value>,
}

impl ErrorBuilder {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            type_: String::new(),
            title: String::new(),
            detail: String::new(),
            instance: String::new(),
            values: BTreeMap::new(),
        }
    }

    /// Start a problem of a well-known kind, e.g. `"quota-exceeded"`
    fn kind(status: StatusCode, slug: &str, title: &str, error_code: &str) -> Self {
        Self::new(status)
            .type_(format!("{}/{}", PROBLEM_BASE_URL, slug))
            .title(title)
            .instance(format!("/error/{}", slug))
            .value("error_code", error_code)
    }

    pub fn type_(mut self, type_: impl Into<String>) -> Self {
        self.type_ = type_.into();
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }

    pub fn value<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.values.insert(key.to_string(), value);
        }
        self
    }

    pub fn build(self) -> problemdetails::Problem {
        let mut problem = problemdetails::new(self.status)
            .with_type(self.type_)
            .with_title(self.title)
            .with_detail(self.detail)
            .with_instance(self.instance)
            .with_value("timestamp", chrono::Utc::now().to_rfc3339());

        for (key, value) in self.values {
            problem = problem.with_value(&key, value);
        }

        problem
    }
}

pub fn internal_server_error() -> ErrorBuilder {
    ErrorBuilder::kind(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal-server-error",
        "Internal Server Error",
        "INTERNAL_SERVER_ERROR",
    )
    .detail("An unexpected error occurred while processing your request")
}

pub fn not_found() -> ErrorBuilder {
    ErrorBuilder::kind(
        StatusCode::NOT_FOUND,
        "not-found",
        "Resource Not Found",
        "NOT_FOUND",
    )
}

pub fn unauthorized() -> ErrorBuilder {
    ErrorBuilder::kind(
        StatusCode::UNAUTHORIZED,
        "unauthorized",
        "Unauthorized",
        "UNAUTHORIZED",
    )
    .detail("A valid project DSN is required")
}

pub fn bad_request() -> ErrorBuilder {
    ErrorBuilder::kind(
        StatusCode::BAD_REQUEST,
        "bad-request",
        "Bad Request",
        "BAD_REQUEST",
    )
    .detail("The request was malformed or invalid")
}

pub fn too_many_requests() -> ErrorBuilder {
    ErrorBuilder::kind(
        StatusCode::TOO_MANY_REQUESTS,
        "quota-exceeded",
        "Quota Exceeded",
        "QUOTA_EXCEEDED",
    )
}

pub fn conflict() -> ErrorBuilder {
    ErrorBuilder::kind(StatusCode::CONFLICT, "conflict", "Conflict", "CONFLICT")
        .detail("The request conflicts with the current state of the resource")
}

pub fn service_unavailable() -> ErrorBuilder {
    ErrorBuilder::kind(
        StatusCode::SERVICE_UNAVAILABLE,
        "service-unavailable",
        "Service Unavailable",
        "SERVICE_UNAVAILABLE",
    )
    .detail("The request could not be completed, retry later")
}

pub fn gateway_timeout() -> ErrorBuilder {
    ErrorBuilder::kind(
        StatusCode::GATEWAY_TIMEOUT,
        "timeout",
        "Timeout",
        "TIMEOUT",
    )
    .detail("The request did not complete before its deadline")
}
