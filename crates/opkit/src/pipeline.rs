//! The per-request state machine (spec §4.3):
//! `Received -> Decoded -> ResolversRan -> Validated -> Dispatched ->
//! Transformed -> Encoded -> Done`, with validation run before resolvers
//! per the decision recorded in SPEC_FULL.md §6 (resolvers may assume
//! validated input). A failure at any state short-circuits straight to
//! `Encoded` with a problem document.

use std::sync::Arc;
use std::time::Duration;

use opkit_schema::{SchemaRegistry, ValidationMode, Validator};
use serde_json::Value;

use crate::contracts::{Codec, Handler, Middleware, Next, RequestContext, ResponseWriter, Resolver, Transformer, TRANSPORT_HEADER_ALLOWLIST};
use crate::error::PipelineError;
use crate::operation::{Operation, ParamLocation};
use crate::problem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Received,
    Decoded,
    ResolversRan,
    Validated,
    Dispatched,
    Transformed,
    Encoded,
    Done,
}

/// A resolver attached at a given path prefix (e.g. `"body"`, `""` for
/// the whole input). Invoked in installation order; errors accumulate.
pub struct AttachedResolver {
    pub resolver: Arc<dyn Resolver>,
    pub path_prefix: String,
}

pub struct Pipeline<'a> {
    pub registry: &'a SchemaRegistry,
    pub codecs: &'a [Arc<dyn Codec>],
    pub resolvers: &'a [AttachedResolver],
    pub transformers: &'a [Arc<dyn Transformer>],
    pub middleware: &'a [Arc<dyn Middleware>],
}

/// A fully encoded response: status, content type, headers, and body bytes.
pub struct EncodedResponse {
    pub status: u16,
    pub content_type: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// The sole `ResponseWriter` implementor: collects header writes and a
/// read-deadline request from the handler/middleware chain so `run` can
/// validate and apply them after dispatch. `set_status`/`write_body` are
/// inert; status and body stay authoritative via the handler's return
/// tuple (spec §9's uniform decode/dispatch/encode contract).
#[derive(Default)]
struct HeaderCollector {
    headers: Vec<(String, String)>,
    read_deadline: Option<Duration>,
}

impl HeaderCollector {
    fn set(&mut self, name: &str, value: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
    }
}

impl ResponseWriter for HeaderCollector {
    fn set_status(&mut self, _status: u16) {}

    fn set_header(&mut self, name: &str, value: &str) {
        self.set(name, value);
    }

    fn append_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn write_body(&mut self, _bytes: Vec<u8>) {}

    fn set_read_deadline(&mut self, deadline: Duration) {
        self.read_deadline = Some(deadline);
    }
}

/// Rejects any header the handler wrote that the operation didn't declare
/// in a `ResponseDescriptor` and that isn't on the transport allow-list
/// (spec §4.3).
fn check_declared_headers(operation: &Operation, headers: &[(String, String)]) -> Result<(), PipelineError> {
    for (name, _) in headers {
        let declared = operation.response_headers.iter().any(|d| d.eq_ignore_ascii_case(name));
        let transport = TRANSPORT_HEADER_ALLOWLIST.iter().any(|a| a.eq_ignore_ascii_case(name));
        if !declared && !transport {
            return Err(PipelineError::UndeclaredHeader(name.clone()));
        }
    }
    Ok(())
}

impl<'a> Pipeline<'a> {
    pub async fn execute(
        &self,
        ctx: Arc<dyn RequestContext>,
        operation: &Operation,
        handler: &dyn Handler,
        server_media_types: &[&str],
    ) -> EncodedResponse {
        match self.run(ctx.clone(), operation, handler).await {
            Ok((status, value, headers)) => self.encode_success(ctx.as_ref(), status, value, headers, server_media_types),
            Err(err) => self.encode_error(ctx.as_ref(), err, server_media_types),
        }
    }

    async fn run(
        &self,
        ctx: Arc<dyn RequestContext>,
        operation: &Operation,
        handler: &dyn Handler,
    ) -> Result<(u16, Value, Vec<(String, String)>), PipelineError> {
        if ctx.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        // 1. Receive & size-limit.
        let body_len = ctx.body().len() as u64;
        if body_len > operation.max_body_size {
            return Err(PipelineError::PayloadTooLarge {
                actual: body_len,
                limit: operation.max_body_size,
            });
        }

        // 2 & 3. Bind parameters, decode body.
        let mut issues = Vec::new();
        let params_value = self.bind_params(ctx.as_ref(), operation);
        let body_value = self.decode_body(ctx.as_ref(), operation)?;

        // 5 (validation-first; see module docs). Run before resolvers.
        let mut input = serde_json::Map::new();
        input.insert("params".to_string(), params_value.clone());
        if let Some(body) = &body_value {
            input.insert("body".to_string(), body.clone());
        }

        for param in &operation.params {
            let value = params_value.get(param.name.as_str()).cloned().unwrap_or(Value::Null);
            let mut v = Validator::new(self.registry, ValidationMode::WriteToServer);
            let location = format!("{}.{}", location_prefix(param.location), param.name);
            for mut issue in v.validate_ref(&param.schema, &value) {
                issue.location = merge_location(&location, &issue.location);
                issues.push(issue);
            }
        }

        if let (Some(body_descr), Some(body)) = (&operation.body, &body_value) {
            if let Some(schema) = body_descr.content.values().next() {
                let mut v = Validator::new(self.registry, ValidationMode::WriteToServer);
                for mut issue in v.validate_ref(schema, body) {
                    issue.location = merge_location("body", &issue.location);
                    issues.push(issue);
                }
            }
        }

        // 4. Run resolvers (after validation, per the decided ordering).
        for attached in self.resolvers {
            let errs = attached.resolver.resolve(ctx.as_ref(), &attached.path_prefix).await;
            issues.extend(errs);
        }

        if !issues.is_empty() {
            return Err(PipelineError::Validation(issues));
        }

        if ctx.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        // 6. Dispatch, through any operation/group middleware.
        let mut writer = HeaderCollector::default();
        let next = Next::new(self.middleware, handler);
        let (status, value) = next
            .run(ctx.clone(), Value::Object(input), &mut writer)
            .await
            .map_err(PipelineError::Handler)?;

        check_declared_headers(operation, &writer.headers)?;

        // 7. Transform, API-level then group-level, left to right.
        let transform = async {
            let mut value = value;
            for transformer in self.transformers {
                value = transformer.transform(ctx.as_ref(), status, value).await?;
            }
            Ok(value)
        };
        let value = match writer.read_deadline {
            Some(deadline) => tokio::time::timeout(deadline, transform)
                .await
                .map_err(|_| PipelineError::Cancelled)??,
            None => transform.await?,
        };

        if ctx.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        Ok((status, value, writer.headers))
    }

    fn bind_params(&self, ctx: &dyn RequestContext, operation: &Operation) -> Value {
        let mut map = serde_json::Map::new();
        for param in &operation.params {
            let raw: Option<String> = match param.location {
                ParamLocation::Path => ctx.path_param(&param.name).map(str::to_string),
                ParamLocation::Header => ctx.header(&param.name).map(str::to_string),
                ParamLocation::Query => {
                    let values = ctx.query_params(&param.name);
                    if values.is_empty() {
                        None
                    } else {
                        Some(values.join(","))
                    }
                }
                ParamLocation::Cookie => None,
            };

            let value = match raw {
                Some(s) if s.is_empty() => param.default.clone().unwrap_or(Value::Null),
                Some(s) => coerce_param(&s),
                None => param.default.clone().unwrap_or(Value::Null),
            };
            map.insert(param.name.clone(), value);
        }
        Value::Object(map)
    }

    fn decode_body(&self, ctx: &dyn RequestContext, operation: &Operation) -> Result<Option<Value>, PipelineError> {
        let Some(descriptor) = &operation.body else {
            return Ok(None);
        };
        if descriptor.raw || ctx.body().is_empty() {
            if descriptor.required && ctx.body().is_empty() {
                return Err(PipelineError::Decode("request body is required".to_string()));
            }
            return Ok(None);
        }

        let content_type = ctx.content_type().unwrap_or("application/json");
        let codec = self.select_codec(content_type).ok_or_else(|| {
            PipelineError::Decode(format!("no codec registered for content type \"{content_type}\""))
        })?;
        codec.unmarshal(ctx.body()).map(Some)
    }

    /// `<major>/<minor>[+<suffix>]` lookup: full media type, then the
    /// `+suffix`, then the bare format identifier.
    fn select_codec(&self, content_type: &str) -> Option<&Arc<dyn Codec>> {
        let bare = content_type.split(';').next().unwrap_or(content_type).trim();
        if let Some(codec) = self.codecs.iter().find(|c| c.media_types().contains(&bare)) {
            return Some(codec);
        }
        if let Some((_, suffix)) = bare.rsplit_once('+') {
            let format = format!("application/{suffix}");
            if let Some(codec) = self.codecs.iter().find(|c| c.media_types().contains(&format.as_str())) {
                return Some(codec);
            }
        }
        None
    }

    fn encode_success(
        &self,
        ctx: &dyn RequestContext,
        status: u16,
        value: Value,
        headers: Vec<(String, String)>,
        server_media_types: &[&str],
    ) -> EncodedResponse {
        let accept = ctx.header("accept");
        match crate::negotiate::negotiate(accept, server_media_types) {
            Some(media_type) => match self.select_codec(media_type).and_then(|c| c.marshal(&value).ok()) {
                Some(body) => EncodedResponse {
                    status,
                    content_type: media_type.to_string(),
                    headers,
                    body,
                },
                None => self.encode_error(ctx, PipelineError::Negotiation, server_media_types),
            },
            None => self.encode_error(ctx, PipelineError::Negotiation, server_media_types),
        }
    }

    fn encode_error(&self, ctx: &dyn RequestContext, err: PipelineError, server_media_types: &[&str]) -> EncodedResponse {
        let status = err.status();
        let problem = problem::from_pipeline_error(&err);
        let accept = ctx.header("accept");
        let media_type = crate::negotiate::negotiate(accept, server_media_types).unwrap_or("application/json");
        let body = serde_json::to_vec(&problem).unwrap_or_default();
        EncodedResponse {
            status,
            content_type: problem_content_type(media_type),
            headers: Vec::new(),
            body,
        }
    }
}

fn location_prefix(location: ParamLocation) -> &'static str {
    match location {
        ParamLocation::Path => "path",
        ParamLocation::Query => "query",
        ParamLocation::Header => "header",
        ParamLocation::Cookie => "cookie",
    }
}

fn merge_location(prefix: &str, suffix: &str) -> String {
    if suffix.is_empty() || suffix == "/" {
        format!("/{prefix}")
    } else {
        format!("/{prefix}{suffix}")
    }
}

fn problem_content_type(negotiated: &str) -> String {
    match negotiated {
        "application/yaml" | "application/x-yaml" => problem::APPLICATION_PROBLEM_YAML.to_string(),
        "application/cbor" => problem::APPLICATION_PROBLEM_CBOR.to_string(),
        _ => problem::APPLICATION_PROBLEM_JSON.to_string(),
    }
}

/// Best-effort string -> JSON scalar coercion for bound parameters: path
/// and query values arrive as strings; this lets a schema typed as
/// `integer`/`number`/`boolean` validate against the right JSON type
/// instead of always failing on "expected integer, got string".
fn coerce_param(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::from(f);
    }
    if let Ok(b) = raw.parse::<bool>() {
        return Value::from(b);
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::ResponseDescriptor;
    use indexmap::IndexMap;
    use opkit_schema::{Schema, SchemaOrRef};

    #[test]
    fn coerce_param_prefers_integer_over_string() {
        assert_eq!(coerce_param("42"), Value::from(42));
        assert_eq!(coerce_param("true"), Value::from(true));
        assert_eq!(coerce_param("hello"), Value::from("hello"));
    }

    #[test]
    fn merge_location_builds_json_pointer_style_path() {
        assert_eq!(merge_location("path", ""), "/path");
        assert_eq!(merge_location("body", "/name"), "/body/name");
    }

    struct FakeCtx {
        method: http::Method,
        path: String,
        path_params: std::collections::HashMap<String, String>,
        headers: std::collections::HashMap<String, String>,
        body: Vec<u8>,
        operation: Operation,
    }

    impl RequestContext for FakeCtx {
        fn method(&self) -> &http::Method {
            &self.method
        }
        fn host(&self) -> &str {
            "example.com"
        }
        fn path(&self) -> &str {
            &self.path
        }
        fn path_param(&self, name: &str) -> Option<&str> {
            self.path_params.get(name).map(String::as_str)
        }
        fn query_params(&self, _name: &str) -> Vec<&str> {
            Vec::new()
        }
        fn header(&self, name: &str) -> Option<&str> {
            self.headers.get(&name.to_lowercase()).map(String::as_str)
        }
        fn headers(&self) -> Vec<(&str, &str)> {
            self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
        }
        fn content_type(&self) -> Option<&str> {
            self.header("content-type")
        }
        fn body(&self) -> &[u8] {
            &self.body
        }
        fn operation(&self) -> &Operation {
            &self.operation
        }
    }

    struct StubHandler;

    #[async_trait::async_trait]
    impl Handler for StubHandler {
        async fn call(
            &self,
            _ctx: Arc<dyn RequestContext>,
            _input: Value,
            _writer: &mut dyn ResponseWriter,
        ) -> Result<(u16, Value), crate::error::HandlerError> {
            Ok((200, Value::Null))
        }
    }

    struct FixedResolver {
        message: &'static str,
    }

    #[async_trait::async_trait]
    impl Resolver for FixedResolver {
        async fn resolve(&self, _ctx: &dyn RequestContext, path_prefix: &str) -> Vec<opkit_schema::ValidationIssue> {
            vec![opkit_schema::ValidationIssue::new(self.message, path_prefix)]
        }
    }

    struct JsonOnlyCodec;

    impl Codec for JsonOnlyCodec {
        fn media_types(&self) -> &[&'static str] {
            &["application/json"]
        }
        fn marshal(&self, value: &Value) -> Result<Vec<u8>, PipelineError> {
            Ok(serde_json::to_vec(value).unwrap())
        }
        fn unmarshal(&self, bytes: &[u8]) -> Result<Value, PipelineError> {
            serde_json::from_slice(bytes).map_err(|e| PipelineError::Decode(e.to_string()))
        }
    }

    fn errors_operation() -> Operation {
        use crate::operation::{BodyDescriptor, ParameterDescriptor};

        let id_schema = SchemaOrRef::inline(Schema { max_length: Some(5), ..Schema::string() }.finish().unwrap());
        let mut body_content = IndexMap::new();
        let body_schema = Schema {
            properties: {
                let mut p = IndexMap::new();
                p.insert("name".to_string(), SchemaOrRef::inline(Schema { max_length: Some(10), ..Schema::string() }.finish().unwrap()));
                p.insert("count".to_string(), SchemaOrRef::inline(Schema { minimum: Some(1.0), ..Schema::integer() }.finish().unwrap()));
                p
            },
            ..Schema::object()
        }
        .finish()
        .unwrap();
        body_content.insert("application/json".to_string(), SchemaOrRef::inline(body_schema));

        let mut responses = IndexMap::new();
        responses.insert(200, ResponseDescriptor::new(200, "ok"));
        Operation {
            id: "put_errors".to_string(),
            method: http::Method::PUT,
            path: "/errors/{id}".to_string(),
            params: vec![ParameterDescriptor::path("id", id_schema)],
            body: Some(BodyDescriptor { content: body_content, raw: false, required: true }),
            responses,
            ..Operation::default()
        }
    }

    #[tokio::test]
    async fn five_errors_in_declared_order() {
        // spec §8 concrete scenario 1
        let operation = errors_operation();
        let mut headers = std::collections::HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        headers.insert("accept".to_string(), "application/json".to_string());
        let ctx: Arc<dyn RequestContext> = Arc::new(FakeCtx {
            method: http::Method::PUT,
            path: "/errors/{id}".to_string(),
            path_params: std::collections::HashMap::from([("id".to_string(), "123456".to_string())]),
            headers,
            body: br#"{"name":"12345678901","count":0}"#.to_vec(),
            operation: operation.clone(),
        });

        let registry = SchemaRegistry::default();
        let codecs: Vec<Arc<dyn Codec>> = vec![Arc::new(JsonOnlyCodec)];
        let resolvers = vec![
            AttachedResolver { resolver: Arc::new(FixedResolver { message: "input resolver failed" }), path_prefix: "/input".to_string() },
            AttachedResolver { resolver: Arc::new(FixedResolver { message: "body resolver failed" }), path_prefix: "/body".to_string() },
        ];
        let pipeline = Pipeline {
            registry: &registry,
            codecs: &codecs,
            resolvers: &resolvers,
            transformers: &[],
            middleware: &[],
        };

        let err = pipeline.run(ctx, &operation, &StubHandler).await.unwrap_err();
        let PipelineError::Validation(issues) = err else { panic!("expected validation error") };
        assert_eq!(issues.len(), 5);
        assert_eq!(issues[0].location, "/path.id");
        assert_eq!(issues[1].location, "/body/name");
        assert_eq!(issues[2].location, "/body/count");
        assert_eq!(issues[3].location, "/input");
        assert_eq!(issues[4].location, "/body");
    }

    #[tokio::test]
    async fn cbor_only_operation_406s_on_json_accept() {
        // spec §8 concrete scenario 2
        let mut responses = IndexMap::new();
        let mut content = IndexMap::new();
        content.insert("application/cbor".to_string(), SchemaOrRef::inline(Schema::object()));
        responses.insert(200, ResponseDescriptor { status: 200, description: "ok".to_string(), content, headers: IndexMap::new(), header_allowlist: None });
        let operation = Operation {
            id: "get_cbor_only".to_string(),
            method: http::Method::GET,
            path: "/cbor-only".to_string(),
            responses,
            ..Operation::default()
        };

        let mut headers = std::collections::HashMap::new();
        headers.insert("accept".to_string(), "application/json".to_string());
        let ctx: Arc<dyn RequestContext> = Arc::new(FakeCtx {
            method: http::Method::GET,
            path: "/cbor-only".to_string(),
            path_params: std::collections::HashMap::new(),
            headers,
            body: Vec::new(),
            operation: operation.clone(),
        });

        let registry = SchemaRegistry::default();
        let codecs: Vec<Arc<dyn Codec>> = vec![Arc::new(JsonOnlyCodec)];
        let pipeline = Pipeline {
            registry: &registry,
            codecs: &codecs,
            resolvers: &[],
            transformers: &[],
            middleware: &[],
        };

        let encoded = pipeline.execute(ctx, &operation, &StubHandler, &["application/cbor"]).await;
        assert_eq!(encoded.status, 406);
    }

    struct LocationHandler;

    #[async_trait::async_trait]
    impl Handler for LocationHandler {
        async fn call(
            &self,
            _ctx: Arc<dyn RequestContext>,
            _input: Value,
            writer: &mut dyn ResponseWriter,
        ) -> Result<(u16, Value), crate::error::HandlerError> {
            writer.set_header("location", "/things/1");
            Ok((201, Value::Null))
        }
    }

    struct RogueHeaderHandler;

    #[async_trait::async_trait]
    impl Handler for RogueHeaderHandler {
        async fn call(
            &self,
            _ctx: Arc<dyn RequestContext>,
            _input: Value,
            writer: &mut dyn ResponseWriter,
        ) -> Result<(u16, Value), crate::error::HandlerError> {
            writer.set_header("x-secret", "leak");
            Ok((201, Value::Null))
        }
    }

    fn minimal_operation(status: u16) -> Operation {
        let mut responses = IndexMap::new();
        responses.insert(
            status,
            ResponseDescriptor::new(status, "ok").header("location", SchemaOrRef::inline(Schema::string())),
        );
        Operation {
            id: "post_thing".to_string(),
            method: http::Method::POST,
            path: "/things".to_string(),
            responses,
            ..Operation::default()
        }
        .finish()
        .unwrap()
    }

    fn empty_ctx(operation: Operation) -> Arc<dyn RequestContext> {
        Arc::new(FakeCtx {
            method: http::Method::POST,
            path: "/things".to_string(),
            path_params: std::collections::HashMap::new(),
            headers: std::collections::HashMap::new(),
            body: Vec::new(),
            operation,
        })
    }

    #[tokio::test]
    async fn declared_header_is_collected_and_encoded() {
        let operation = minimal_operation(201);
        let ctx = empty_ctx(operation.clone());
        let registry = SchemaRegistry::default();
        let codecs: Vec<Arc<dyn Codec>> = vec![Arc::new(JsonOnlyCodec)];
        let pipeline = Pipeline { registry: &registry, codecs: &codecs, resolvers: &[], transformers: &[], middleware: &[] };

        let encoded = pipeline.execute(ctx, &operation, &LocationHandler, &["application/json"]).await;
        assert_eq!(encoded.status, 201);
        assert!(encoded.headers.iter().any(|(k, v)| k == "location" && v == "/things/1"));
    }

    #[tokio::test]
    async fn undeclared_header_fails_the_request() {
        let operation = minimal_operation(201);
        let ctx = empty_ctx(operation.clone());
        let registry = SchemaRegistry::default();
        let codecs: Vec<Arc<dyn Codec>> = vec![Arc::new(JsonOnlyCodec)];
        let pipeline = Pipeline { registry: &registry, codecs: &codecs, resolvers: &[], transformers: &[], middleware: &[] };

        let err = pipeline.run(ctx, &operation, &RogueHeaderHandler).await.unwrap_err();
        assert!(matches!(err, PipelineError::UndeclaredHeader(name) if name == "x-secret"));
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits_before_dispatch() {
        struct CancelledCtx(Arc<dyn RequestContext>);
        impl RequestContext for CancelledCtx {
            fn method(&self) -> &http::Method {
                self.0.method()
            }
            fn host(&self) -> &str {
                self.0.host()
            }
            fn path(&self) -> &str {
                self.0.path()
            }
            fn path_param(&self, name: &str) -> Option<&str> {
                self.0.path_param(name)
            }
            fn query_params(&self, name: &str) -> Vec<&str> {
                self.0.query_params(name)
            }
            fn header(&self, name: &str) -> Option<&str> {
                self.0.header(name)
            }
            fn headers(&self) -> Vec<(&str, &str)> {
                self.0.headers()
            }
            fn content_type(&self) -> Option<&str> {
                self.0.content_type()
            }
            fn body(&self) -> &[u8] {
                self.0.body()
            }
            fn operation(&self) -> &Operation {
                self.0.operation()
            }
            fn is_cancelled(&self) -> bool {
                true
            }
        }

        let operation = minimal_operation(201);
        let inner = empty_ctx(operation.clone());
        let ctx: Arc<dyn RequestContext> = Arc::new(CancelledCtx(inner));
        let registry = SchemaRegistry::default();
        let codecs: Vec<Arc<dyn Codec>> = vec![Arc::new(JsonOnlyCodec)];
        let pipeline = Pipeline { registry: &registry, codecs: &codecs, resolvers: &[], transformers: &[], middleware: &[] };

        let err = pipeline.run(ctx, &operation, &LocationHandler).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }
}
