//! The Schema data model: a subset of JSON Schema draft-2020-12 augmented
//! with the OpenAPI extensions the emitter needs. See `SchemaBuilder` for
//! the fallible constructor that enforces the invariants named below.

use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;

use crate::error::SchemaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaType {
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
}

impl SchemaType {
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaType::Boolean => "boolean",
            SchemaType::Integer => "integer",
            SchemaType::Number => "number",
            SchemaType::String => "string",
            SchemaType::Array => "array",
            SchemaType::Object => "object",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composition {
    None,
    OneOf,
    AnyOf,
    AllOf,
    Not,
}

#[derive(Debug, Clone)]
pub struct Discriminator {
    pub property_name: String,
    pub mapping: IndexMap<String, String>,
}

/// A compiled regex plus the source text it was compiled from, so the
/// emitter can print back the original pattern string.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub source: String,
    pub regex: Arc<Regex>,
    pub description: Option<String>,
}

/// Messages precomputed at schema-construction time, so the validator's
/// hot path never formats a string for the common failure cases.
#[derive(Debug, Clone, Default)]
pub struct PrecomputedMessages {
    pub type_mismatch: Option<String>,
    pub required_missing: IndexMap<String, String>,
    pub minimum: Option<String>,
    pub maximum: Option<String>,
    pub exclusive_minimum: Option<String>,
    pub exclusive_maximum: Option<String>,
    pub multiple_of: Option<String>,
    pub min_length: Option<String>,
    pub max_length: Option<String>,
    pub pattern: Option<String>,
    pub min_items: Option<String>,
    pub max_items: Option<String>,
    pub unique_items: Option<String>,
    pub min_properties: Option<String>,
    pub max_properties: Option<String>,
    pub one_of: Option<String>,
    pub any_of: Option<String>,
    pub all_of: Option<String>,
    pub not: Option<String>,
    pub enum_mismatch: Option<String>,
}

/// A field/item position that may hold either a fully inline schema or a
/// `$ref` to an interned one, the same shape utoipa's `RefOr<Schema>`
/// takes, generalized for an in-house schema compiler rather than one
/// delegated to a derive macro over a third-party model.
#[derive(Debug, Clone)]
pub enum SchemaOrRef {
    Ref(String),
    Inline(Box<Schema>),
}

impl SchemaOrRef {
    pub fn inline(schema: Schema) -> Self {
        SchemaOrRef::Inline(Box::new(schema))
    }

    pub fn as_ref_str(&self) -> Option<&str> {
        match self {
            SchemaOrRef::Ref(r) => Some(r.as_str()),
            SchemaOrRef::Inline(_) => None,
        }
    }
}

impl Default for SchemaOrRef {
    fn default() -> Self {
        SchemaOrRef::inline(Schema::default())
    }
}

#[derive(Debug, Clone)]
pub enum AdditionalPropertiesOrRef {
    Allowed(bool),
    Schema(Box<SchemaOrRef>),
}

/// A JSON Schema node. Always carries its fully-derived shape; a schema
/// that is *interned* additionally carries `registry_name`, which tells
/// the emitter to print a `$ref` instead of the inline body while the
/// validator keeps using the body directly (the Registry resolves
/// `$ref` strings back to the same `Schema` at validation time, so there
/// is exactly one copy of the derived shape, never two sources of truth).
#[derive(Debug, Clone)]
pub struct Schema {
    pub schema_type: Option<SchemaType>,
    pub nullable: bool,
    pub format: Option<String>,
    pub content_encoding: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub default: Option<Value>,
    pub examples: Vec<Value>,
    pub items: Option<Box<SchemaOrRef>>,
    pub additional_properties: Option<AdditionalPropertiesOrRef>,
    pub properties: IndexMap<String, SchemaOrRef>,
    pub required: Vec<String>,
    pub enum_values: Option<Vec<Value>>,

    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: Option<f64>,
    pub exclusive_maximum: Option<f64>,
    pub multiple_of: Option<f64>,

    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<CompiledPattern>,

    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    pub unique_items: bool,

    pub min_properties: Option<usize>,
    pub max_properties: Option<usize>,
    pub dependent_required: IndexMap<String, Vec<String>>,

    pub read_only: bool,
    pub write_only: bool,
    pub deprecated: bool,
    pub hidden: bool,

    pub composition: Composition,
    pub subschemas: Vec<SchemaOrRef>,
    pub discriminator: Option<Discriminator>,

    pub extensions: IndexMap<String, Value>,
    pub messages: PrecomputedMessages,

    /// Set once this schema is interned in a `SchemaRegistry`; the
    /// emitter replaces the body with `#/components/schemas/<name>`.
    pub registry_name: Option<String>,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            schema_type: None,
            nullable: false,
            format: None,
            content_encoding: None,
            title: None,
            description: None,
            default: None,
            examples: Vec::new(),
            items: None,
            additional_properties: None,
            properties: IndexMap::new(),
            required: Vec::new(),
            enum_values: None,
            minimum: None,
            maximum: None,
            exclusive_minimum: None,
            exclusive_maximum: None,
            multiple_of: None,
            min_length: None,
            max_length: None,
            pattern: None,
            min_items: None,
            max_items: None,
            unique_items: false,
            min_properties: None,
            max_properties: None,
            dependent_required: IndexMap::new(),
            read_only: false,
            write_only: false,
            deprecated: false,
            hidden: false,
            composition: Composition::None,
            subschemas: Vec::new(),
            discriminator: None,
            extensions: IndexMap::new(),
            messages: PrecomputedMessages::default(),
            registry_name: None,
        }
    }
}

impl Schema {
    pub fn new(ty: SchemaType) -> Self {
        Self {
            schema_type: Some(ty),
            ..Default::default()
        }
    }

    pub fn boolean() -> Self {
        Self::new(SchemaType::Boolean)
    }

    pub fn integer() -> Self {
        Self::new(SchemaType::Integer)
    }

    pub fn number() -> Self {
        Self::new(SchemaType::Number)
    }

    pub fn string() -> Self {
        Self::new(SchemaType::String)
    }

    pub fn array(items: SchemaOrRef) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::new(SchemaType::Array)
        }
    }

    pub fn object() -> Self {
        Self::new(SchemaType::Object)
    }

    /// Finalizes bound/pattern/composition consistency and precomputes
    /// every error message the validator will need. Called once, at
    /// compile time, never on the request hot path.
    pub fn finish(mut self) -> Result<Self, SchemaError> {
        self.validate_invariants()?;
        self.precompute_messages();
        Ok(self)
    }

    fn validate_invariants(&self) -> Result<(), SchemaError> {
        for name in &self.required {
            if !self.properties.contains_key(name) {
                return Err(SchemaError::UnknownRequiredField { field: name.clone() });
            }
        }
        for (key, deps) in &self.dependent_required {
            if !self.properties.contains_key(key) {
                return Err(SchemaError::UnknownDependentField { field: key.clone() });
            }
            for dep in deps {
                if !self.properties.contains_key(dep) {
                    return Err(SchemaError::UnknownDependentField { field: dep.clone() });
                }
            }
        }
        if let (Some(min), Some(max)) = (self.min_length, self.max_length) {
            if min > max {
                return Err(SchemaError::InvalidBounds {
                    detail: format!("minLength {min} > maxLength {max}"),
                });
            }
        }
        if let (Some(min), Some(max)) = (self.min_items, self.max_items) {
            if min > max {
                return Err(SchemaError::InvalidBounds {
                    detail: format!("minItems {min} > maxItems {max}"),
                });
            }
        }
        Ok(())
    }

    fn precompute_messages(&mut self) {
        let m = &mut self.messages;
        if let Some(ty) = self.schema_type {
            m.type_mismatch = Some(format!("expected {}", ty.as_str()));
        }
        for name in &self.required {
            m.required_missing
                .insert(name.clone(), format!("missing required property \"{name}\""));
        }
        if let Some(v) = self.minimum {
            m.minimum = Some(format!("must be >= {v}"));
        }
        if let Some(v) = self.maximum {
            m.maximum = Some(format!("must be <= {v}"));
        }
        if let Some(v) = self.exclusive_minimum {
            m.exclusive_minimum = Some(format!("must be > {v}"));
        }
        if let Some(v) = self.exclusive_maximum {
            m.exclusive_maximum = Some(format!("must be < {v}"));
        }
        if let Some(v) = self.multiple_of {
            m.multiple_of = Some(format!("must be a multiple of {v}"));
        }
        if let Some(v) = self.min_length {
            m.min_length = Some(format!("must be at least {v} characters"));
        }
        if let Some(v) = self.max_length {
            m.max_length = Some(format!("must be at most {v} characters"));
        }
        if let Some(p) = &self.pattern {
            m.pattern = Some(
                p.description
                    .clone()
                    .unwrap_or_else(|| format!("must match pattern {}", p.source)),
            );
        }
        if let Some(v) = self.min_items {
            m.min_items = Some(format!("must contain at least {v} items"));
        }
        if let Some(v) = self.max_items {
            m.max_items = Some(format!("must contain at most {v} items"));
        }
        if self.unique_items {
            m.unique_items = Some("items must be unique".to_string());
        }
        if let Some(v) = self.min_properties {
            m.min_properties = Some(format!("must have at least {v} properties"));
        }
        if let Some(v) = self.max_properties {
            m.max_properties = Some(format!("must have at most {v} properties"));
        }
        if self.enum_values.is_some() {
            m.enum_mismatch = Some("must be one of the allowed values".to_string());
        }
        match self.composition {
            Composition::OneOf => m.one_of = Some("must match exactly one schema in oneOf".into()),
            Composition::AnyOf => m.any_of = Some("must match at least one schema in anyOf".into()),
            Composition::AllOf => m.all_of = Some("must match all schemas in allOf".into()),
            Composition::Not => m.not = Some("must not match the schema in not".into()),
            Composition::None => {}
        }
    }

    pub fn with_pattern(mut self, source: &str, description: Option<String>) -> Result<Self, SchemaError> {
        let regex = Regex::new(source).map_err(|e| SchemaError::InvalidPattern {
            pattern: source.to_string(),
            detail: e.to_string(),
        })?;
        self.pattern = Some(CompiledPattern {
            source: source.to_string(),
            regex: Arc::new(regex),
            description,
        });
        Ok(self)
    }

    pub fn is_ref(&self) -> bool {
        self.registry_name.is_some()
    }

    /// Re-derives `messages` after a post-construction edit (spec §4.1's
    /// "transform schema" capability and the "provide own schema"
    /// override both require this; `finish` already calls it once, so
    /// this is only needed when a schema is mutated afterward).
    pub fn recompute_messages(mut self) -> Self {
        self.precompute_messages();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_rejects_unknown_required_field() {
        let schema = Schema {
            required: vec!["missing".to_string()],
            ..Schema::object()
        };
        let err = schema.finish().unwrap_err();
        assert!(matches!(err, SchemaError::UnknownRequiredField { .. }));
    }

    #[test]
    fn finish_rejects_invalid_pattern() {
        let err = Schema::string().with_pattern("(unterminated", None).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidPattern { .. }));
    }

    #[test]
    fn finish_precomputes_minimum_message() {
        let schema = Schema {
            minimum: Some(0.0),
            ..Schema::number()
        }
        .finish()
        .unwrap();
        assert_eq!(schema.messages.minimum.as_deref(), Some("must be >= 0"));
    }

    #[test]
    fn dependent_required_unknown_referent_fails_construction() {
        let mut props = IndexMap::new();
        props.insert("a".to_string(), SchemaOrRef::inline(Schema::string()));
        let mut dependent_required = IndexMap::new();
        dependent_required.insert("a".to_string(), vec!["b".to_string()]);
        let schema = Schema {
            properties: props,
            dependent_required,
            ..Schema::object()
        };
        let err = schema.finish().unwrap_err();
        assert!(matches!(err, SchemaError::UnknownDependentField { .. }));
    }
}
