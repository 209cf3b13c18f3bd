use crate::problemdetails;
use axum::http::StatusCode;
use serde::Serialize;
use std::collections::BTreeMap;

const PROBLEM_BASE_URL: &str = "https://lissen.app/probs";

/// Fluent builder for RFC 7807 problem responses.
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

    /// Attach an extension member. Values that fail to serialize are dropped.
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

fn problem_type(slug: &str) -> String {
    format!("{}/{}", PROBLEM_BASE_URL, slug)
}

// Common error builders
pub fn internal_server_error() -> ErrorBuilder {
    ErrorBuilder::new(StatusCode::INTERNAL_SERVER_ERROR)
        .type_(problem_type("internal-server-error"))
        .title("Internal Server Error")
        .detail("An unexpected error occurred while processing your request")
        .value("error_code", "INTERNAL_SERVER_ERROR")
}

pub fn bad_gateway() -> ErrorBuilder {
    ErrorBuilder::new(StatusCode::BAD_GATEWAY)
        .type_(problem_type("bad-gateway"))
        .title("Bad Gateway")
        .detail("An upstream data source failed to answer the request")
        .value("error_code", "BAD_GATEWAY")
}

pub fn not_found() -> ErrorBuilder {
    ErrorBuilder::new(StatusCode::NOT_FOUND)
        .type_(problem_type("not-found"))
        .title("Resource Not Found")
        .value("error_code", "NOT_FOUND")
}
