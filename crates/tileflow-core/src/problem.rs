//! RFC 7807 problem responses
//!
//! Follows "Problem Details for HTTP APIs": handlers convert typed errors
//! into a `Problem` and return it; axum renders the JSON body with the
//! `application/problem+json` content type.

use std::collections::BTreeMap;

use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::ControlError;

/// Serializable problem document, used for OpenAPI schemas
#[derive(Debug, Clone, Serialize, ToSchema)]
#[schema(example = json!({
    "type": "validation_failed",
    "title": "Validation Failed",
    "detail": "workflow validation failed: dependency cycle detected"
}))]
pub struct ProblemDetails {
    /// A short identifier for the problem type
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_url: Option<String>,
    /// A short, human-readable summary of the problem type
    pub title: String,
    /// A human-readable explanation specific to this occurrence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A problem response under construction
#[derive(Debug, Clone)]
pub struct Problem {
    pub status_code: StatusCode,
    pub body: BTreeMap<String, Value>,
}

/// Create a new `Problem` response to send to the client
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
    /// Specify the "type" to use for the problem
    pub fn with_type<S: Into<String>>(self, value: S) -> Self {
        self.with_value("type", value.into())
    }

    /// Specify the "title" to use for the problem
    pub fn with_title<S: Into<String>>(self, value: S) -> Self {
        self.with_value("title", value.into())
    }

    /// Specify the "detail" to use for the problem
    pub fn with_detail<S: Into<String>>(self, value: S) -> Self {
        self.with_value("detail", value.into())
    }

    /// Attach an arbitrary extension value
    pub fn with_value<V: Into<Value>>(mut self, key: &str, value: V) -> Self {
        self.body.insert(key.to_string(), value.into());
        self
    }
}

impl IntoResponse for Problem {
    fn into_response(self) -> axum::response::Response {
        (
            self.status_code,
            [(CONTENT_TYPE, "application/problem+json")],
            Json(self.body),
        )
            .into_response()
    }
}

impl From<ControlError> for Problem {
    fn from(err: ControlError) -> Self {
        let status = match &err {
            ControlError::TenantMissing => StatusCode::BAD_REQUEST,
            ControlError::ValidationFailed { .. } => StatusCode::BAD_REQUEST,
            ControlError::TenantRejected => StatusCode::TOO_MANY_REQUESTS,
            ControlError::DuplicateWorkflowId(_) => StatusCode::CONFLICT,
            ControlError::NotFound(_) => StatusCode::NOT_FOUND,
            ControlError::NotCancellable(_) => StatusCode::CONFLICT,
            ControlError::SchedulerUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let title = match &err {
            ControlError::TenantMissing => "Tenant Missing",
            ControlError::ValidationFailed { .. } => "Validation Failed",
            ControlError::TenantRejected => "Tenant Rejected",
            ControlError::DuplicateWorkflowId(_) => "Duplicate Workflow Id",
            ControlError::NotFound(_) => "Not Found",
            ControlError::NotCancellable(_) => "Not Cancellable",
            ControlError::SchedulerUnavailable(_) => "Internal Server Error",
        };
        new(status)
            .with_type(err.code())
            .with_title(title)
            .with_detail(err.to_string())
    }
}
