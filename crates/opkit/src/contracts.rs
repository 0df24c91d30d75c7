//! External collaborator interfaces (spec §6): the capabilities the core
//! consumes from a transport adapter, plus the Codec/Transformer/Resolver
//! capabilities attached to operations and fields. None of these are
//! implemented by this crate; `opkit-axum` provides the reference
//! implementation over axum.

use std::sync::Arc;

use async_trait::async_trait;
use opkit_schema::ValidationIssue;
use serde_json::Value;

use crate::error::{HandlerError, PipelineError};
use crate::operation::Operation;

/// Per-request read/write surface the adapter provides to the pipeline.
/// The body is assumed already buffered by the adapter up to the
/// operation's `max_body_size` (see `contracts::Adapter`); this crate
/// does not model a streaming body reader as a trait object, since doing
/// so without `async fn` in traits being dyn-safe would mean hand-rolled
/// boxed-stream plumbing with no behavioral payoff for this engine.
pub trait RequestContext: Send + Sync {
    fn method(&self) -> &http::Method;
    fn host(&self) -> &str;
    fn path(&self) -> &str;
    fn path_param(&self, name: &str) -> Option<&str>;
    /// All values for a repeated query parameter, in request order.
    fn query_params(&self, name: &str) -> Vec<&str>;
    fn header(&self, name: &str) -> Option<&str>;
    fn headers(&self) -> Vec<(&str, &str)>;
    fn content_type(&self) -> Option<&str>;
    fn body(&self) -> &[u8];
    fn operation(&self) -> &Operation;
    /// `true` once the transport signals client disconnect or deadline.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Write surface; a small allow-list of transport-level headers (CORS,
/// `Vary`, `Connection`, `Keep-Alive`) bypasses the pipeline's
/// undeclared-header check (spec §4.3).
pub const TRANSPORT_HEADER_ALLOWLIST: &[&str] = &[
    "vary",
    "connection",
    "keep-alive",
    "access-control-allow-origin",
    "access-control-allow-methods",
    "access-control-allow-headers",
    "access-control-allow-credentials",
];

pub trait ResponseWriter: Send {
    fn set_status(&mut self, status: u16);
    fn set_header(&mut self, name: &str, value: &str);
    fn append_header(&mut self, name: &str, value: &str);
    fn write_body(&mut self, bytes: Vec<u8>);
    /// Bounds how long the adapter should keep processing this request
    /// past this call (spec §6 "read-deadline setter").
    fn set_read_deadline(&mut self, deadline: std::time::Duration);
}

/// Installs a route and dispatches requests to it. `opkit`'s `Registry`
/// calls `register` once per (method, path) at startup; `serve` is
/// driven entirely by the adapter (e.g. axum's router), which looks up
/// the matched `Operation` and runs it through `Pipeline::execute`.
pub trait Adapter: Send + Sync {
    fn register(&mut self, method: http::Method, path_template: &str, operation_id: &str);
}

/// A `(marshal, unmarshal)` pair registered under one or more media-type
/// keys. Lookup order is defined in spec §4.3: full media type, then the
/// `+suffix`, then the bare format identifier.
pub trait Codec: Send + Sync {
    fn media_types(&self) -> &[&'static str];
    fn marshal(&self, value: &Value) -> Result<Vec<u8>, PipelineError>;
    fn unmarshal(&self, bytes: &[u8]) -> Result<Value, PipelineError>;
}

#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, ctx: &dyn RequestContext, path_prefix: &str) -> Vec<ValidationIssue>;
}

#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(&self, ctx: &dyn RequestContext, status: u16, value: Value) -> Result<Value, PipelineError>;
}

/// The dispatch target: decode -> this -> encode. Polymorphism lives in
/// the input/output JSON values, not in the handler's Rust signature
/// (spec §9's "uniform decode/dispatch/encode contract").
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(
        &self,
        ctx: Arc<dyn RequestContext>,
        input: Value,
        writer: &mut dyn ResponseWriter,
    ) -> Result<(u16, Value), HandlerError>;
}

/// Middleware: `(ctx, input, next) -> response`, composed so the
/// outermost wrapper added runs first (spec §4.4). A middleware that
/// never calls `next.run` short-circuits the chain (e.g. an auth check
/// rejecting the request before the handler runs).
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn call(
        &self,
        ctx: Arc<dyn RequestContext>,
        input: Value,
        next: Next<'_>,
        writer: &mut dyn ResponseWriter,
    ) -> Result<(u16, Value), HandlerError>;
}

pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    handler: &'a (dyn Handler + 'a),
}

impl<'a> Next<'a> {
    pub fn new(chain: &'a [Arc<dyn Middleware>], handler: &'a (dyn Handler + 'a)) -> Self {
        Self { chain, handler }
    }

    pub async fn run(
        self,
        ctx: Arc<dyn RequestContext>,
        input: Value,
        writer: &mut dyn ResponseWriter,
    ) -> Result<(u16, Value), HandlerError> {
        match self.chain.split_first() {
            Some((mw, rest)) => {
                let next = Next { chain: rest, handler: self.handler };
                mw.call(ctx, input, next, writer).await
            }
            None => self.handler.call(ctx, input, writer).await,
        }
    }
}
