//! Error kinds from spec §7, each carrying the HTTP status it maps to.

use opkit_schema::{SchemaError, ValidationIssue};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed input after decode; always aggregated into a single 422.
    #[error("{} validation error(s)", .0.len())]
    Validation(Vec<ValidationIssue>),

    /// Body unreadable or not conformant with the declared codec -> 400.
    #[error("decode error: {0}")]
    Decode(String),

    /// No acceptable media type -> 406.
    #[error("no acceptable media type")]
    Negotiation,

    /// -> 413.
    #[error("payload of {actual} bytes exceeds the {limit}-byte limit")]
    PayloadTooLarge { actual: u64, limit: u64 },

    /// From the adapter -> 404.
    #[error("no operation matches this path")]
    NotFound,

    /// From the adapter -> 405.
    #[error("method not allowed, supported: {supported:?}")]
    MethodNotAllowed { supported: Vec<http::Method> },

    /// A typed error returned by the handler; carries its own status.
    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),

    /// Everything else -> 500. Detail is logged, never echoed to the client.
    #[error("internal error")]
    Internal(#[source] anyhow::Error),

    /// A route was registered with a schema that failed to construct.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A handler or pipeline stage wrote a response header that was
    /// neither declared on the operation nor on the transport allow-list.
    #[error("undeclared response header \"{0}\"")]
    UndeclaredHeader(String),

    /// The transport signalled disconnect, or a read deadline elapsed,
    /// before a response was produced.
    #[error("request cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn status(&self) -> u16 {
        match self {
            PipelineError::Validation(_) => 422,
            PipelineError::Decode(_) => 400,
            PipelineError::Negotiation => 406,
            PipelineError::PayloadTooLarge { .. } => 413,
            PipelineError::NotFound => 404,
            PipelineError::MethodNotAllowed { .. } => 405,
            PipelineError::Handler(h) => h.status,
            PipelineError::Internal(_) => 500,
            PipelineError::Schema(_) => 500,
            PipelineError::UndeclaredHeader(_) => 500,
            PipelineError::Cancelled => 408,
        }
    }
}

/// Any typed error a handler can return; carries an HTTP status plus an
/// optional list of structured details, which are passed through the
/// transformer chain before encoding like any other response body.
#[derive(Debug, Error)]
#[error("{title}")]
pub struct HandlerError {
    pub status: u16,
    pub title: String,
    pub detail: Option<String>,
    pub errors: Vec<ValidationIssue>,
}

impl HandlerError {
    pub fn new(status: u16, title: impl Into<String>) -> Self {
        Self {
            status,
            title: title.into(),
            detail: None,
            errors: Vec::new(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
