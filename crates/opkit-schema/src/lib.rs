//! Schema data model, registry, compiler and validator.
//!
//! This crate is the leaf dependency of the engine: a reusable
//! [`pointer::PathBuffer`], the [`schema::Schema`]/[`schema::SchemaOrRef`]
//! data model, the [`registry::SchemaRegistry`] that interns named
//! aggregates, the [`compile::ToSchema`] derivation trait, and the
//! [`validate::Validator`].

pub mod compile;
pub mod error;
pub mod pointer;
pub mod registry;
pub mod schema;
pub mod validate;

pub use compile::{compile_struct, intern_named, FieldSpec, OpaqueBytes, ToSchema};
pub use error::{SchemaError, ValidationIssue};
pub use pointer::PathBuffer;
pub use registry::{DefaultNamer, Namer, SchemaRegistry};
pub use schema::{
    AdditionalPropertiesOrRef, CompiledPattern, Composition, Discriminator, PrecomputedMessages,
    Schema, SchemaOrRef, SchemaType,
};
pub use validate::{ValidationMode, Validator};
