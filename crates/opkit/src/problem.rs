//! RFC 9457 problem body (spec §7 "User-visible body"): `$schema`
//! instead of `type`, and a top-level `errors[]` of `{message,
//! location, value}` instead of a bespoke validation-error shape.
//! `request_id` is the field name carried on the tracing span.

use opkit_schema::ValidationIssue;
use serde::{Deserialize, Serialize};

pub const APPLICATION_PROBLEM_JSON: &str = "application/problem+json";
pub const APPLICATION_PROBLEM_YAML: &str = "application/problem+yaml";
pub const APPLICATION_PROBLEM_CBOR: &str = "application/problem+cbor";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "$schema")]
    pub schema: String,
    /// HTTP reason phrase for `status`.
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<ValidationIssue>,
}

impl Problem {
    pub fn new(status: u16, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            schema: "https://opkit.dev/schemas/problem.json".to_string(),
            title: title.into(),
            status,
            detail: detail.into(),
            instance: None,
            request_id: None,
            errors: Vec::new(),
        }
    }

    pub fn with_instance(mut self, uri: impl Into<String>) -> Self {
        self.instance = Some(uri.into());
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_errors(mut self, errors: Vec<ValidationIssue>) -> Self {
        self.errors = errors;
        self
    }

    /// HTTP reason phrase for a handful of statuses the pipeline produces
    /// directly; anything else falls back to a generic label.
    pub fn reason_phrase(status: u16) -> &'static str {
        match status {
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            406 => "Not Acceptable",
            408 => "Request Timeout",
            413 => "Payload Too Large",
            422 => "Unprocessable Entity",
            500 => "Internal Server Error",
            _ => "Error",
        }
    }
}

/// Renders any `PipelineError` into the wire-level problem body.
pub fn from_pipeline_error(err: &crate::error::PipelineError) -> Problem {
    use crate::error::PipelineError;

    let status = err.status();
    let title = Problem::reason_phrase(status).to_string();

    match err {
        PipelineError::Validation(issues) => {
            Problem::new(status, title, "request failed validation").with_errors(issues.clone())
        }
        PipelineError::Decode(msg) => Problem::new(status, title, msg.clone()),
        PipelineError::Negotiation => {
            Problem::new(status, title, "no representation acceptable to the client")
        }
        PipelineError::PayloadTooLarge { actual, limit } => Problem::new(
            status,
            title,
            format!("body of {actual} bytes exceeds the {limit}-byte limit"),
        ),
        PipelineError::NotFound => Problem::new(status, title, "no operation matches this path"),
        PipelineError::MethodNotAllowed { supported } => Problem::new(
            status,
            title,
            format!(
                "method not allowed, supported: {}",
                supported
                    .iter()
                    .map(|m| m.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        ),
        PipelineError::Handler(h) => {
            let mut p = Problem::new(h.status, h.title.clone(), h.detail.clone().unwrap_or_default());
            p.errors = h.errors.clone();
            p
        }
        PipelineError::Internal(source) => {
            tracing::error!(error = %source, "internal error");
            Problem::new(status, title, "an internal error occurred")
        }
        PipelineError::Schema(e) => {
            tracing::error!(error = %e, "schema construction error surfaced at request time");
            Problem::new(status, title, "an internal error occurred")
        }
        PipelineError::UndeclaredHeader(name) => {
            tracing::error!(header = %name, "handler wrote an undeclared response header");
            Problem::new(status, title, "an internal error occurred")
        }
        PipelineError::Cancelled => {
            Problem::new(status, title, "request cancelled before a response was produced")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    #[test]
    fn validation_error_renders_with_issues() {
        let err = PipelineError::Validation(vec![ValidationIssue::new("too short", "/name")]);
        let problem = from_pipeline_error(&err);
        assert_eq!(problem.status, 422);
        assert_eq!(problem.errors.len(), 1);
    }

    #[test]
    fn internal_error_detail_is_generic() {
        let err = PipelineError::Internal(anyhow::anyhow!("db connection reset"));
        let problem = from_pipeline_error(&err);
        assert_eq!(problem.status, 500);
        assert_eq!(problem.detail, "an internal error occurred");
    }
}
