//! Router assembly, mirroring `ApiIngress::build_router`'s layer order
//! (request-id propagation/generation -> trace -> timeout -> CORS ->
//! body limit) but building routes from a frozen `opkit::Registry`
//! table instead of per-module `MethodRouter` registration.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::{MatchedPath, Path as AxumPath, RawQuery, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use axum::Router;
use http::Method;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;

use opkit::contracts::{Codec, RequestContext, Transformer};
use opkit::error::PipelineError;
use opkit::openapi::{OpenApiEmitter, OpenApiInfo};
use opkit::pipeline::{AttachedResolver, EncodedResponse, Pipeline};
use opkit::problem;
use opkit::registry::FrozenTable;
use opkit_schema::SchemaRegistry;

use crate::context::AxumRequestContext;
use crate::request_id;

pub struct AppConfig {
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    pub servers: Vec<String>,
    pub cors_enabled: bool,
    pub request_timeout: Duration,
    pub global_body_limit: usize,
    /// Serve `/openapi.json` and `/openapi.yaml` downgraded to 3.0.3
    /// instead of the native 3.1 document (spec §4.6).
    pub downgrade_openapi: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "opkit API".to_string(),
            version: "0.1.0".to_string(),
            description: None,
            servers: Vec::new(),
            cors_enabled: false,
            request_timeout: Duration::from_secs(30),
            global_body_limit: 16 * 1024 * 1024,
            downgrade_openapi: false,
        }
    }
}

struct AppState {
    frozen: Arc<FrozenTable>,
    registry: Arc<SchemaRegistry>,
    codecs: Vec<Arc<dyn Codec>>,
    resolvers: Vec<AttachedResolver>,
    transformers: Vec<Arc<dyn Transformer>>,
    server_media_types: Vec<String>,
    config: AppConfig,
    openapi_json: OnceLock<Vec<u8>>,
    openapi_yaml: OnceLock<Vec<u8>>,
}

/// A frozen operation table wired up as a runnable axum application.
pub struct App {
    state: Arc<AppState>,
}

impl App {
    pub fn new(
        frozen: Arc<FrozenTable>,
        registry: Arc<SchemaRegistry>,
        codecs: Vec<Arc<dyn Codec>>,
        resolvers: Vec<AttachedResolver>,
        transformers: Vec<Arc<dyn Transformer>>,
        config: AppConfig,
    ) -> Self {
        let server_media_types = codecs
            .iter()
            .flat_map(|c| c.media_types().iter().map(|s| s.to_string()))
            .collect();
        Self {
            state: Arc::new(AppState {
                frozen,
                registry,
                codecs,
                resolvers,
                transformers,
                server_media_types,
                config,
                openapi_json: OnceLock::new(),
                openapi_yaml: OnceLock::new(),
            }),
        }
    }

    /// Builds the fully layered, stateful axum `Router`.
    pub fn router(self) -> Router {
        let mut router = Router::new()
            .route("/health", axum::routing::get(health_check))
            .route("/openapi.json", axum::routing::get(serve_openapi_json))
            .route("/openapi.yaml", axum::routing::get(serve_openapi_yaml));

        let mut paths: Vec<&str> = Vec::new();
        for op in self.state.frozen.operations() {
            if !paths.contains(&op.path.as_str()) {
                paths.push(&op.path);
            }
        }

        for path in paths {
            let methods = self.state.frozen.methods_for(path);
            let mut method_router: MethodRouter<Arc<AppState>> = MethodRouter::new();
            for method in methods {
                let filter = method_filter(&method);
                method_router = method_router.on(filter, dispatch);
            }
            router = router.route(path, method_router);
        }

        let x_request_id = request_id::header();
        router = router.layer(PropagateRequestIdLayer::new(x_request_id.clone()));
        router = router.layer(SetRequestIdLayer::new(x_request_id, request_id::MakeReqId));
        router = router.layer(from_fn(request_id::push_req_id_to_extensions));
        router = router.layer(request_id::create_trace_layer());
        router = router.layer(TimeoutLayer::new(self.state.config.request_timeout));
        if self.state.config.cors_enabled {
            router = router.layer(CorsLayer::permissive());
        }
        router = router.layer(RequestBodyLimitLayer::new(self.state.config.global_body_limit));

        router.with_state(self.state)
    }
}

fn method_filter(method: &Method) -> MethodFilter {
    match *method {
        Method::GET => MethodFilter::GET,
        Method::POST => MethodFilter::POST,
        Method::PUT => MethodFilter::PUT,
        Method::PATCH => MethodFilter::PATCH,
        Method::DELETE => MethodFilter::DELETE,
        Method::HEAD => MethodFilter::HEAD,
        Method::OPTIONS => MethodFilter::OPTIONS,
        Method::TRACE => MethodFilter::TRACE,
        _ => MethodFilter::GET,
    }
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(json!({"status": "healthy"}))
}

fn build_emitter<'a>(state: &'a AppState) -> OpenApiEmitter<'a> {
    let mut emitter = OpenApiEmitter::new(
        &state.frozen,
        &state.registry,
        OpenApiInfo {
            title: state.config.title.clone(),
            version: state.config.version.clone(),
            description: state.config.description.clone(),
        },
    );
    emitter.servers = state.config.servers.clone();
    emitter
}

async fn serve_openapi_json(State(state): State<Arc<AppState>>) -> Response {
    let bytes = state.openapi_json.get_or_init(|| {
        let emitter = build_emitter(&state);
        let document = if state.config.downgrade_openapi {
            emitter.document_3_0_3()
        } else {
            emitter.document()
        };
        serde_json::to_vec_pretty(&document).unwrap_or_default()
    });
    ([(http::header::CONTENT_TYPE, "application/json")], bytes.clone()).into_response()
}

async fn serve_openapi_yaml(State(state): State<Arc<AppState>>) -> Response {
    let bytes = state.openapi_yaml.get_or_init(|| {
        let emitter = build_emitter(&state);
        let document = if state.config.downgrade_openapi {
            emitter.document_3_0_3()
        } else {
            emitter.document()
        };
        serde_yaml::to_string(&document).unwrap_or_default().into_bytes()
    });
    ([(http::header::CONTENT_TYPE, "application/yaml")], bytes.clone()).into_response()
}

async fn dispatch(
    State(state): State<Arc<AppState>>,
    matched_path: MatchedPath,
    AxumPath(path_params): AxumPath<HashMap<String, String>>,
    RawQuery(raw_query): RawQuery,
    req: Request<Body>,
) -> Response {
    let method = req.method().clone();
    let path_template = matched_path.as_str().to_string();

    let Some((operation, handler, middleware)) = state.frozen.lookup(&path_template, &method) else {
        let supported = state.frozen.methods_for(&path_template);
        let err = if supported.is_empty() {
            PipelineError::NotFound
        } else {
            PipelineError::MethodNotAllowed { supported }
        };
        return error_response(&state, err, req.headers());
    };

    let host = req
        .headers()
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let headers = req.headers().clone();
    let max_body_size = operation.max_body_size;
    let body = req.into_body();

    let bytes = match to_bytes(body, (max_body_size as usize).saturating_add(1)).await {
        Ok(b) => b,
        Err(_) => {
            return error_response(
                &state,
                PipelineError::PayloadTooLarge {
                    actual: max_body_size + 1,
                    limit: max_body_size,
                },
                &headers,
            )
        }
    };
    if bytes.len() as u64 > max_body_size {
        return error_response(
            &state,
            PipelineError::PayloadTooLarge {
                actual: bytes.len() as u64,
                limit: max_body_size,
            },
            &headers,
        );
    }

    let concrete_ctx = Arc::new(AxumRequestContext::new(
        method,
        host,
        path_template,
        path_params,
        raw_query.as_deref(),
        headers,
        bytes.to_vec(),
        operation.clone(),
    ));
    let ctx: Arc<dyn RequestContext> = concrete_ctx.clone();

    let pipeline = Pipeline {
        registry: &state.registry,
        codecs: &state.codecs,
        resolvers: &state.resolvers,
        transformers: &state.transformers,
        middleware,
    };
    let server_media_types: Vec<&str> = state.server_media_types.iter().map(String::as_str).collect();

    // Soft-cancellation: a background watchdog marks the context
    // cancelled once the deadline elapses, and `Pipeline::run` observes
    // it at its checkpoints (spec §5). The pipeline future itself is
    // never raced/dropped, so in-flight resolvers/handlers always get a
    // chance to see the flag rather than being aborted mid-step.
    let watchdog_ctx = concrete_ctx.clone();
    let deadline = state.config.request_timeout;
    let watchdog = tokio::spawn(async move {
        tokio::time::sleep(deadline).await;
        watchdog_ctx.mark_cancelled();
    });
    let encoded = pipeline.execute(ctx, operation, handler.as_ref(), &server_media_types).await;
    watchdog.abort();

    encoded_to_response(encoded)
}

fn encoded_to_response(encoded: EncodedResponse) -> Response {
    let status = StatusCode::from_u16(encoded.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, [(http::header::CONTENT_TYPE, encoded.content_type)], encoded.body).into_response();
    for (name, value) in &encoded.headers {
        let (Ok(name), Ok(value)) = (
            axum::http::HeaderName::from_bytes(name.as_bytes()),
            axum::http::HeaderValue::from_str(value),
        ) else {
            continue;
        };
        response.headers_mut().append(name, value);
    }
    response
}

fn error_response(state: &AppState, err: PipelineError, headers: &HeaderMap) -> Response {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let supported = if let PipelineError::MethodNotAllowed { supported } = &err {
        Some(supported.clone())
    } else {
        None
    };
    let problem = problem::from_pipeline_error(&err);
    let accept = headers.get(http::header::ACCEPT).and_then(|v| v.to_str().ok());
    let server_media_types: Vec<&str> = state.server_media_types.iter().map(String::as_str).collect();
    let media_type = opkit::negotiate(accept, &server_media_types).unwrap_or("application/json");
    let body = serde_json::to_vec(&problem).unwrap_or_default();
    let content_type = match media_type {
        "application/yaml" | "application/x-yaml" => problem::APPLICATION_PROBLEM_YAML,
        _ => problem::APPLICATION_PROBLEM_JSON,
    };

    let mut response = (status, [(http::header::CONTENT_TYPE, content_type)], body).into_response();
    if let Some(methods) = supported {
        let allow = methods.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
        if let Ok(value) = axum::http::HeaderValue::from_str(&allow) {
            response.headers_mut().insert(http::header::ALLOW, value);
        }
    }
    response
}
