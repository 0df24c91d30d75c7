//! `x-request-id` propagation/generation: a `tower_http::request_id`
//! `MakeRequestId` plus a span-recording middleware fn, so handlers and
//! the pipeline's problem body can read the id back out of extensions.

use axum::body::Body;
use axum::http::{HeaderName, Request};
use axum::middleware::Next;
use axum::response::Response;
use tower_http::request_id::{MakeRequestId, RequestId};
use tower_http::trace::TraceLayer;
use tracing::Span;

#[derive(Clone, Debug)]
pub struct XRequestId(pub String);

pub fn header() -> HeaderName {
    HeaderName::from_static("x-request-id")
}

#[derive(Clone, Default)]
pub struct MakeReqId;

impl MakeRequestId for MakeReqId {
    fn make_request_id<B>(&mut self, _req: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        Some(RequestId::new(id.parse().ok()?))
    }
}

/// Stashes the request id in extensions and records it on the current
/// trace span so handlers and the pipeline's problem body can read it.
pub async fn push_req_id_to_extensions(mut req: Request<Body>, next: Next) -> Response {
    let hdr = header();
    if let Some(rid) = req
        .headers()
        .get(&hdr)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
    {
        req.extensions_mut().insert(XRequestId(rid.clone()));
        tracing::Span::current().record("request_id", rid.as_str());
    }

    next.run(req).await
}

/// `method`/`path`/`status`/`latency` span with an empty `request_id`
/// field filled in by `push_req_id_to_extensions` once the id is known.
pub fn create_trace_layer() -> TraceLayer<
    tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>,
    impl Fn(&Request<Body>) -> Span + Clone,
> {
    TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
        tracing::info_span!(
            "http_request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id = tracing::field::Empty,
        )
    })
}
