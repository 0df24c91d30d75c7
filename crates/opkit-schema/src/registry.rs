//! Bidirectional mapping between a Rust type identity and a named,
//! referenceable [`Schema`]. Grows monotonically while the compiler
//! walks types; reads after compilation are lock-free.

use std::any::TypeId;
use std::collections::HashMap;

use indexmap::IndexMap;
use sha2::{Digest, Sha256};

use crate::error::SchemaError;
use crate::schema::Schema;

/// Turns a Rust type name into the component name the emitter will print
/// under `#/components/schemas/<name>`. Pluggable so callers can adopt a
/// different naming convention than "last path segment".
pub trait Namer: Send + Sync {
    fn name_for(&self, type_name: &'static str) -> String;
}

/// Default namer: the last `::`-separated segment, with any generic
/// parameter list stripped (`module::Page<User>` -> `Page`).
pub struct DefaultNamer;

impl Namer for DefaultNamer {
    fn name_for(&self, type_name: &'static str) -> String {
        let without_generics = type_name.split('<').next().unwrap_or(type_name);
        without_generics
            .rsplit("::")
            .next()
            .unwrap_or(without_generics)
            .to_string()
    }
}

pub const REF_PREFIX: &str = "#/components/schemas/";

pub struct SchemaRegistry {
    namer: Box<dyn Namer>,
    by_type: HashMap<TypeId, String>,
    schemas: IndexMap<String, Schema>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new(Box::new(DefaultNamer))
    }
}

impl SchemaRegistry {
    pub fn new(namer: Box<dyn Namer>) -> Self {
        Self {
            namer,
            by_type: HashMap::new(),
            schemas: IndexMap::new(),
        }
    }

    pub fn ref_string(name: &str) -> String {
        format!("{REF_PREFIX}{name}")
    }

    /// Returns the existing name for `T` if already interned.
    pub fn name_of<T: 'static>(&self) -> Option<&str> {
        self.by_type.get(&TypeId::of::<T>()).map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Schema)> {
        self.schemas.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Interns `schema` under a name derived from `T`'s type name,
    /// disambiguating collisions where two distinct types would
    /// otherwise produce the same short name. Returns the `$ref` string
    /// for `T`. Idempotent: calling twice for the same `T` returns the
    /// same ref without recomputing the schema.
    pub fn intern<T: 'static>(
        &mut self,
        type_name: &'static str,
        build: impl FnOnce(&mut SchemaRegistry) -> Result<Schema, SchemaError>,
    ) -> Result<String, SchemaError> {
        let type_id = TypeId::of::<T>();
        if let Some(name) = self.by_type.get(&type_id) {
            return Ok(Self::ref_string(name));
        }

        let base_name = self.namer.name_for(type_name);
        let name = self.disambiguate(&base_name, type_id, type_name);

        // Reserve the slot before calling `build` so that self-referential
        // (recursive) types resolve to the same name instead of recursing
        // forever; `build` may itself call `intern` for nested types.
        self.by_type.insert(type_id, name.clone());
        self.schemas.insert(name.clone(), Schema::default());

        let mut schema = build(self)?;
        schema.registry_name = Some(name.clone());
        self.schemas.insert(name.clone(), schema);

        Ok(Self::ref_string(&name))
    }

    fn disambiguate(&self, base_name: &str, type_id: TypeId, type_name: &'static str) -> String {
        if !self.schemas.contains_key(base_name) {
            return base_name.to_string();
        }
        // A schema with this name already exists. If it belongs to the
        // same type we'd have returned above via `by_type`, so this is a
        // genuine collision between two distinct types: disambiguate with
        // a short stable hash of the fully-qualified type name.
        let _ = type_id;
        let mut hasher = Sha256::new();
        hasher.update(type_name.as_bytes());
        let digest = hasher.finalize();
        let suffix = digest.iter().take(4).map(|b| format!("{b:02x}")).collect::<String>();
        format!("{base_name}_{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;

    #[test]
    fn interning_same_type_twice_returns_same_ref() {
        let mut reg = SchemaRegistry::default();
        let r1 = reg
            .intern::<A>("opkit_schema::registry::tests::A", |_| Ok(Schema::object()))
            .unwrap();
        let r2 = reg
            .intern::<A>("opkit_schema::registry::tests::A", |_| {
                panic!("should not rebuild")
            })
            .unwrap();
        assert_eq!(r1, r2);
        assert_eq!(r1, "#/components/schemas/A");
    }

    #[test]
    fn name_collision_between_distinct_types_is_disambiguated() {
        let mut reg = SchemaRegistry::default();
        let r1 = reg
            .intern::<A>("mod_one::Widget", |_| Ok(Schema::object()))
            .unwrap();
        let r2 = reg
            .intern::<B>("mod_two::Widget", |_| Ok(Schema::object()))
            .unwrap();
        assert_ne!(r1, r2);
        assert_eq!(r1, "#/components/schemas/Widget");
        assert!(r2.starts_with("#/components/schemas/Widget_"));
    }

    #[test]
    fn default_namer_strips_module_path_and_generics() {
        let namer = DefaultNamer;
        assert_eq!(namer.name_for("my_crate::model::User"), "User");
        assert_eq!(namer.name_for("my_crate::model::Page<User>"), "Page");
    }
}
