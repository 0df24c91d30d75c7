//! Reference transport adapter over axum: a `RequestContext` built from
//! an already-buffered `axum::http::Request`, JSON/YAML `Codec`s, and an
//! `App` that assembles a frozen `opkit::Registry` table into a layered
//! `axum::Router`.

pub mod app;
pub mod codec;
pub mod context;
pub mod request_id;

pub use app::{App, AppConfig};
pub use codec::{JsonCodec, YamlCodec};
pub use context::AxumRequestContext;
