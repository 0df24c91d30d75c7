//! Operation registration, request pipeline, content negotiation, group
//! composition, and OpenAPI emission: the request-facing half of the
//! engine, built on top of `opkit_schema`'s type-to-schema compiler and
//! validator.

pub mod contracts;
pub mod error;
pub mod group;
pub mod negotiate;
pub mod openapi;
pub mod operation;
pub mod pipeline;
pub mod problem;
pub mod registry;

pub use contracts::{
    Adapter, Codec, Handler, Middleware, Next, RequestContext, Resolver, ResponseWriter,
    Transformer, TRANSPORT_HEADER_ALLOWLIST,
};
pub use error::{HandlerError, PipelineError};
pub use group::Group;
pub use negotiate::negotiate;
pub use openapi::OpenApiEmitter;
pub use operation::{
    ArrayStyle, BodyDescriptor, Missing, Operation, OperationBuilder, OperationError,
    ParamLocation, ParameterDescriptor, Present, ResponseDescriptor,
};
pub use pipeline::Pipeline;
pub use problem::Problem;
pub use registry::Registry;
