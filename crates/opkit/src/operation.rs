//! The declarative unit of the engine (spec §3 "Operation") plus the
//! type-state builder that assembles one, generalized from axum's
//! `MethodRouter<S>` to this crate's own `Handler` trait object.

use std::marker::PhantomData;
use std::sync::Arc;

use http::Method;
use indexmap::IndexMap;
use opkit_schema::SchemaOrRef;
use serde_json::Value;

use crate::contracts::{Handler, Middleware};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
}

/// Array encoding hint for `query`/`header` parameters (OpenAPI `style`/`explode`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArrayStyle {
    /// `a=1,2,3`
    FormCommaJoined,
    /// `a=1&a=2&a=3`
    FormExploded,
}

impl Default for ArrayStyle {
    fn default() -> Self {
        ArrayStyle::FormCommaJoined
    }
}

#[derive(Clone, Debug)]
pub struct ParameterDescriptor {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub default: Option<Value>,
    pub style: ArrayStyle,
    pub schema: SchemaOrRef,
}

impl ParameterDescriptor {
    /// Path parameters are implicitly required and carry no default.
    pub fn path(name: impl Into<String>, schema: SchemaOrRef) -> Self {
        Self {
            name: name.into(),
            location: ParamLocation::Path,
            required: true,
            default: None,
            style: ArrayStyle::default(),
            schema,
        }
    }

    pub fn query(name: impl Into<String>, schema: SchemaOrRef) -> Self {
        Self {
            name: name.into(),
            location: ParamLocation::Query,
            required: false,
            default: None,
            style: ArrayStyle::default(),
            schema,
        }
    }

    pub fn header(name: impl Into<String>, schema: SchemaOrRef) -> Self {
        Self {
            name: name.into(),
            location: ParamLocation::Header,
            required: false,
            default: None,
            style: ArrayStyle::default(),
            schema,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn exploded(mut self) -> Self {
        self.style = ArrayStyle::FormExploded;
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct BodyDescriptor {
    pub content: IndexMap<String, SchemaOrRef>,
    /// Bypasses decoding; the raw bytes are handed to the handler untouched.
    pub raw: bool,
    pub required: bool,
}

impl BodyDescriptor {
    pub fn json(schema: SchemaOrRef) -> Self {
        let mut content = IndexMap::new();
        content.insert("application/json".to_string(), schema);
        Self {
            content,
            raw: false,
            required: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResponseDescriptor {
    pub status: u16,
    pub description: String,
    pub content: IndexMap<String, SchemaOrRef>,
    pub headers: IndexMap<String, SchemaOrRef>,
    /// When `Some`, only these header names (plus the transport allow-list)
    /// may be written for this response.
    pub header_allowlist: Option<Vec<String>>,
}

impl ResponseDescriptor {
    pub fn new(status: u16, description: impl Into<String>) -> Self {
        Self {
            status,
            description: description.into(),
            content: IndexMap::new(),
            headers: IndexMap::new(),
            header_allowlist: None,
        }
    }

    pub fn json(mut self, schema: SchemaOrRef) -> Self {
        self.content.insert("application/json".to_string(), schema);
        self
    }

    pub fn header(mut self, name: impl Into<String>, schema: SchemaOrRef) -> Self {
        self.headers.insert(name.into(), schema);
        self
    }
}

/// Invariant errors raised by `Operation::finish` (spec §3).
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("path template names parameter \"{0}\" with no matching parameter descriptor")]
    UnmatchedPathParam(String),
    #[error("parameter descriptor \"{0}\" names a path segment absent from the template")]
    UnknownPathParam(String),
    #[error("operation declares no success (2xx) response")]
    NoSuccessResponse,
}

#[derive(Clone, Debug)]
pub struct Operation {
    pub id: String,
    pub method: Method,
    pub path: String,
    pub tags: Vec<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub security: Vec<String>,
    pub params: Vec<ParameterDescriptor>,
    pub body: Option<BodyDescriptor>,
    pub responses: IndexMap<u16, ResponseDescriptor>,
    pub response_headers: Vec<String>,
    pub metadata: IndexMap<String, Value>,
    pub hidden: bool,
    pub max_body_size: u64,
}

const DEFAULT_MAX_BODY_SIZE: u64 = 2 * 1024 * 1024;

impl Default for Operation {
    fn default() -> Self {
        Self {
            id: String::new(),
            method: Method::GET,
            path: String::new(),
            tags: Vec::new(),
            summary: None,
            description: None,
            security: Vec::new(),
            params: Vec::new(),
            body: None,
            responses: IndexMap::new(),
            response_headers: Vec::new(),
            metadata: IndexMap::new(),
            hidden: false,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl Operation {
    fn path_param_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut rest = self.path.as_str();
        while let Some(start) = rest.find('{') {
            let after = &rest[start + 1..];
            if let Some(end) = after.find('}') {
                names.push(&after[..end]);
                rest = &after[end + 1..];
            } else {
                break;
            }
        }
        names
    }

    /// Checks the invariants spec §3 attaches to Operation, run once at
    /// registration time (eager, before the API serves traffic).
    pub fn finish(self) -> Result<Self, OperationError> {
        let template_names = self.path_param_names();
        let descriptor_names: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.location == ParamLocation::Path)
            .map(|p| p.name.as_str())
            .collect();

        for name in &template_names {
            if !descriptor_names.contains(name) {
                return Err(OperationError::UnmatchedPathParam((*name).to_string()));
            }
        }
        for name in &descriptor_names {
            if !template_names.contains(name) {
                return Err(OperationError::UnknownPathParam((*name).to_string()));
            }
        }
        if !self.responses.keys().any(|status| (200..300).contains(status)) {
            return Err(OperationError::NoSuccessResponse);
        }
        Ok(self.with_response_headers())
    }

    /// Aggregates every header name declared across `responses`, case-
    /// insensitively deduplicated, so the pipeline can validate handler
    /// writes against a single flat list (spec §4.3).
    fn with_response_headers(mut self) -> Self {
        let mut seen = std::collections::HashSet::new();
        let mut names = Vec::new();
        for resp in self.responses.values() {
            for name in resp.headers.keys() {
                if seen.insert(name.to_lowercase()) {
                    names.push(name.clone());
                }
            }
            if let Some(allowlist) = &resp.header_allowlist {
                for name in allowlist {
                    if seen.insert(name.to_lowercase()) {
                        names.push(name.clone());
                    }
                }
            }
        }
        self.response_headers = names;
        self
    }
}

pub mod state {
    #[derive(Debug, Clone, Copy)]
    pub struct Missing;
    #[derive(Debug, Clone, Copy)]
    pub struct Present;
}
pub use state::{Missing, Present};

/// Type-safe operation builder. `H`/`R` are phantom markers tracking
/// whether a handler and at least one response have been attached;
/// `register` (on the adapter side) is only reachable in `(Present, Present)`.
pub struct OperationBuilder<H, R> {
    op: Operation,
    handler: Option<Arc<dyn Handler>>,
    middleware: Vec<Arc<dyn Middleware>>,
    _handler_state: PhantomData<H>,
    _response_state: PhantomData<R>,
}

impl OperationBuilder<Missing, Missing> {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let id = format!(
            "{}_{}",
            method.as_str().to_lowercase(),
            path.replace(['/', '{', '}'], "_").trim_matches('_')
        );
        Self {
            op: Operation {
                id,
                method,
                path,
                max_body_size: DEFAULT_MAX_BODY_SIZE,
                ..Operation::default()
            },
            handler: None,
            middleware: Vec::new(),
            _handler_state: PhantomData,
            _response_state: PhantomData,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }
}

impl<H, R> OperationBuilder<H, R> {
    pub fn spec(&self) -> &Operation {
        &self.op
    }

    pub fn operation_id(mut self, id: impl Into<String>) -> Self {
        self.op.id = id.into();
        self
    }

    pub fn summary(mut self, text: impl Into<String>) -> Self {
        self.op.summary = Some(text.into());
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.op.description = Some(text.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.op.tags.push(tag.into());
        self
    }

    pub fn param(mut self, param: ParameterDescriptor) -> Self {
        self.op.params.push(param);
        self
    }

    pub fn body(mut self, body: BodyDescriptor) -> Self {
        self.op.body = Some(body);
        self
    }

    pub fn max_body_size(mut self, bytes: u64) -> Self {
        self.op.max_body_size = bytes;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.op.hidden = true;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.op.metadata.insert(key.into(), value);
        self
    }

    /// Per-operation middleware; runs inside any group middleware (spec §4.4).
    pub fn middleware(mut self, mw: Arc<dyn Middleware>) -> Self {
        self.middleware.push(mw);
        self
    }

    fn into_parts(self) -> (Operation, Option<Arc<dyn Handler>>, Vec<Arc<dyn Middleware>>) {
        (self.op, self.handler, self.middleware)
    }
}

impl<R> OperationBuilder<Missing, R> {
    pub fn handler(self, h: Arc<dyn Handler>) -> OperationBuilder<Present, R> {
        OperationBuilder {
            op: self.op,
            handler: Some(h),
            middleware: self.middleware,
            _handler_state: PhantomData,
            _response_state: self._response_state,
        }
    }
}

impl<H> OperationBuilder<H, Missing> {
    pub fn response(mut self, resp: ResponseDescriptor) -> OperationBuilder<H, Present> {
        self.op.responses.insert(resp.status, resp);
        OperationBuilder {
            op: self.op,
            handler: self.handler,
            middleware: self.middleware,
            _handler_state: self._handler_state,
            _response_state: PhantomData,
        }
    }
}

impl<H> OperationBuilder<H, Present> {
    pub fn response(mut self, resp: ResponseDescriptor) -> Self {
        self.op.responses.insert(resp.status, resp);
        self
    }
}

impl OperationBuilder<Present, Present> {
    /// Finishes invariant checks and returns the pieces a `Registry` needs:
    /// the frozen `Operation`, its handler, and its per-operation middleware.
    pub fn build(self) -> Result<(Operation, Arc<dyn Handler>, Vec<Arc<dyn Middleware>>), OperationError> {
        let (op, handler, middleware) = self.into_parts();
        let op = op.finish()?;
        Ok((op, handler.expect("Present handler state guarantees a handler"), middleware))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use opkit_schema::Schema;

    struct NoopHandler;

    #[async_trait]
    impl Handler for NoopHandler {
        async fn call(
            &self,
            _ctx: Arc<dyn crate::contracts::RequestContext>,
            _input: Value,
            _writer: &mut dyn crate::contracts::ResponseWriter,
        ) -> Result<(u16, Value), crate::error::HandlerError> {
            Ok((200, Value::Null))
        }
    }

    #[test]
    fn path_param_mismatch_fails_finish() {
        let op = Operation {
            id: "get_thing".into(),
            method: Method::GET,
            path: "/things/{id}".into(),
            responses: {
                let mut m = IndexMap::new();
                m.insert(200, ResponseDescriptor::new(200, "ok"));
                m
            },
            ..Operation::default()
        };
        let err = op.finish().unwrap_err();
        assert!(matches!(err, OperationError::UnmatchedPathParam(name) if name == "id"));
    }

    #[test]
    fn missing_success_response_fails_finish() {
        let op = Operation {
            id: "get_thing".into(),
            method: Method::GET,
            path: "/things".into(),
            responses: {
                let mut m = IndexMap::new();
                m.insert(404, ResponseDescriptor::new(404, "missing"));
                m
            },
            ..Operation::default()
        };
        assert!(matches!(op.finish().unwrap_err(), OperationError::NoSuccessResponse));
    }

    #[test]
    fn builder_requires_handler_and_response_to_build() {
        let (op, _handler, _mw) = OperationBuilder::get("/things/{id}")
            .param(ParameterDescriptor::path("id", SchemaOrRef::inline(Schema::string())))
            .response(ResponseDescriptor::new(200, "ok"))
            .handler(Arc::new(NoopHandler))
            .build()
            .expect("both handler and response present");

        assert_eq!(op.method, Method::GET);
        assert_eq!(op.params.len(), 1);
        assert!(op.responses.contains_key(&200));
    }
}
