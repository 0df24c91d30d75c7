//! The Schema Compiler: maps Rust types to [`Schema`]/[`SchemaOrRef`]
//! nodes. Named aggregates (anything deriving `#[derive(Schema)]` or
//! hand-implementing [`ToSchema`] with [`ToSchema::NAMED`] set) intern
//! into the [`SchemaRegistry`] and are referenced; everything else is
//! inlined, matching "named aggregates are interned... anonymous or
//! primitive schemas are inlined".

use std::any::type_name;
use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;

use crate::error::SchemaError;
use crate::registry::SchemaRegistry;
use crate::schema::{AdditionalPropertiesOrRef, Schema, SchemaOrRef, SchemaType};

/// Implemented by every type that can appear in an operation's input or
/// output shape. `#[derive(Schema)]` (see `opkit-macros`) is the usual
/// way to implement this for aggregate types; primitives and common
/// collections get blanket impls below.
pub trait ToSchema: 'static {
    /// Set to `true` by `#[derive(Schema)]` and other named-aggregate
    /// implementors; primitive/collection blanket impls leave it `false`
    /// so their schemas are always inlined rather than interned.
    const NAMED: bool = false;

    /// Produce this type's schema, interning into `registry` if `NAMED`.
    fn to_schema_or_ref(registry: &mut SchemaRegistry) -> Result<SchemaOrRef, SchemaError> {
        let schema = Self::to_schema(registry)?;
        let schema = Self::transform_schema(schema).recompute_messages();
        Ok(SchemaOrRef::inline(schema))
    }

    /// The fully inlined shape, regardless of whether a caller wants a
    /// reference. `#[derive(Schema)]` implements this one; the default
    /// `to_schema_or_ref` calls it for non-named types.
    fn to_schema(registry: &mut SchemaRegistry) -> Result<Schema, SchemaError>;

    /// Post-processes the derived schema, distinct from overriding
    /// `to_schema`/`to_schema_or_ref` wholesale: a type using this hook
    /// still gets its fields/shape derived normally and only adjusts the
    /// result (spec §4.1's "transform schema" capability). No-op by
    /// default; `recompute_messages` runs after either this or a full
    /// override, since both can invalidate precomputed messages.
    fn transform_schema(schema: Schema) -> Schema {
        schema
    }
}

/// Helper for named-aggregate implementors: interns via the registry
/// using `std::any::type_name::<T>()` as the type identity/name seed.
/// `build` receives the registry back so it can recurse into nested
/// field types while `T`'s own slot is already reserved.
pub fn intern_named<T: 'static>(
    registry: &mut SchemaRegistry,
    build: impl FnOnce(&mut SchemaRegistry) -> Result<Schema, SchemaError>,
) -> Result<SchemaOrRef, SchemaError> {
    let name = type_name::<T>();
    let r = registry.intern::<T>(name, build)?;
    Ok(SchemaOrRef::Ref(r))
}

macro_rules! impl_to_schema_primitive {
    ($ty:ty, $build:expr) => {
        impl ToSchema for $ty {
            fn to_schema(_registry: &mut SchemaRegistry) -> Result<Schema, SchemaError> {
                $build
            }
        }
    };
}

impl_to_schema_primitive!(bool, Schema::boolean().finish());
impl_to_schema_primitive!(String, Schema::string().finish());
impl_to_schema_primitive!(char, Schema::string().finish());
impl_to_schema_primitive!(f32, { Ok(Schema { format: Some("float".into()), ..Schema::number() }.finish()?) });
impl_to_schema_primitive!(f64, { Ok(Schema { format: Some("double".into()), ..Schema::number() }.finish()?) });

macro_rules! impl_to_schema_signed_int {
    ($ty:ty, $format:expr) => {
        impl ToSchema for $ty {
            fn to_schema(_registry: &mut SchemaRegistry) -> Result<Schema, SchemaError> {
                Schema { format: Some($format.into()), ..Schema::integer() }.finish()
            }
        }
    };
}

macro_rules! impl_to_schema_unsigned_int {
    ($ty:ty, $format:expr) => {
        impl ToSchema for $ty {
            fn to_schema(_registry: &mut SchemaRegistry) -> Result<Schema, SchemaError> {
                Schema {
                    format: Some($format.into()),
                    minimum: Some(0.0),
                    ..Schema::integer()
                }
                .finish()
            }
        }
    };
}

impl_to_schema_signed_int!(i8, "int8");
impl_to_schema_signed_int!(i16, "int16");
impl_to_schema_signed_int!(i32, "int32");
impl_to_schema_signed_int!(i64, "int64");
impl_to_schema_signed_int!(isize, "int64");
impl_to_schema_unsigned_int!(u8, "uint8");
impl_to_schema_unsigned_int!(u16, "uint16");
impl_to_schema_unsigned_int!(u32, "uint32");
impl_to_schema_unsigned_int!(u64, "uint64");
impl_to_schema_unsigned_int!(usize, "uint64");

/// `Vec<u8>` is a byte sequence: string + `contentEncoding: base64`, per
/// spec §4.1's "byte sequence" mapping rule, not a JSON array of numbers.
impl ToSchema for Vec<u8> {
    fn to_schema(_registry: &mut SchemaRegistry) -> Result<Schema, SchemaError> {
        Schema {
            content_encoding: Some("base64".into()),
            ..Schema::string()
        }
        .finish()
    }
}

/// Opaque/raw-byte payloads that skip base64 framing entirely (spec
/// §4.1's "raw-bytes/opaque" mapping, distinct from `Vec<u8>`'s "byte
/// sequence" -> base64-string mapping above).
pub struct OpaqueBytes(pub Vec<u8>);

impl ToSchema for OpaqueBytes {
    fn to_schema(_registry: &mut SchemaRegistry) -> Result<Schema, SchemaError> {
        Schema::default().finish()
    }
}

impl ToSchema for chrono::DateTime<chrono::Utc> {
    fn to_schema(_registry: &mut SchemaRegistry) -> Result<Schema, SchemaError> {
        Schema { format: Some("date-time".into()), ..Schema::string() }.finish()
    }
}

impl ToSchema for url::Url {
    fn to_schema(_registry: &mut SchemaRegistry) -> Result<Schema, SchemaError> {
        Schema { format: Some("uri".into()), ..Schema::string() }.finish()
    }
}

impl ToSchema for std::net::IpAddr {
    fn to_schema(_registry: &mut SchemaRegistry) -> Result<Schema, SchemaError> {
        Schema { format: Some("ip".into()), ..Schema::string() }.finish()
    }
}

impl ToSchema for std::net::Ipv4Addr {
    fn to_schema(_registry: &mut SchemaRegistry) -> Result<Schema, SchemaError> {
        Schema { format: Some("ipv4".into()), ..Schema::string() }.finish()
    }
}

impl ToSchema for std::net::Ipv6Addr {
    fn to_schema(_registry: &mut SchemaRegistry) -> Result<Schema, SchemaError> {
        Schema { format: Some("ipv6".into()), ..Schema::string() }.finish()
    }
}

impl<T: ToSchema> ToSchema for Vec<T> {
    fn to_schema(registry: &mut SchemaRegistry) -> Result<Schema, SchemaError> {
        let items = T::to_schema_or_ref(registry)?;
        Schema::array(items).finish()
    }
}

impl<T: ToSchema, const N: usize> ToSchema for [T; N] {
    fn to_schema(registry: &mut SchemaRegistry) -> Result<Schema, SchemaError> {
        let items = T::to_schema_or_ref(registry)?;
        Schema {
            min_items: Some(N),
            max_items: Some(N),
            ..Schema::array(items)
        }
        .finish()
    }
}

impl<T: ToSchema> ToSchema for Option<T> {
    fn to_schema(registry: &mut SchemaRegistry) -> Result<Schema, SchemaError> {
        let mut inner = T::to_schema(registry)?;
        inner.nullable = true;
        Ok(inner)
    }

    fn to_schema_or_ref(registry: &mut SchemaRegistry) -> Result<SchemaOrRef, SchemaError> {
        let inner = T::to_schema_or_ref(registry)?;
        make_nullable(inner, type_name::<T>())
    }
}

/// Marks a field/item schema nullable. A bare `$ref` to a named object
/// cannot express nullability in a single schema node (JSON Schema
/// 2020-12's `type: [T, "null"]` form only applies to inline schemas),
/// so referencing a named aggregate through `Option<_>` is a
/// construction-time error rather than a silently-wrong document.
pub fn make_nullable(node: SchemaOrRef, type_name: &'static str) -> Result<SchemaOrRef, SchemaError> {
    match node {
        SchemaOrRef::Inline(mut s) => {
            s.nullable = true;
            Ok(SchemaOrRef::Inline(s))
        }
        SchemaOrRef::Ref(_) => Err(SchemaError::UnsupportedNullableReference {
            type_name: type_name.to_string(),
            detail: "a named/interned schema cannot be referenced as nullable through a bare $ref".into(),
        }),
    }
}

impl<V: ToSchema> ToSchema for HashMap<String, V> {
    fn to_schema(registry: &mut SchemaRegistry) -> Result<Schema, SchemaError> {
        let value_schema = V::to_schema_or_ref(registry)?;
        Schema {
            additional_properties: Some(AdditionalPropertiesOrRef::Schema(Box::new(value_schema))),
            ..Schema::object()
        }
        .finish()
    }
}

impl<V: ToSchema> ToSchema for BTreeMap<String, V> {
    fn to_schema(registry: &mut SchemaRegistry) -> Result<Schema, SchemaError> {
        let value_schema = V::to_schema_or_ref(registry)?;
        Schema {
            additional_properties: Some(AdditionalPropertiesOrRef::Schema(Box::new(value_schema))),
            ..Schema::object()
        }
        .finish()
    }
}

/// Metadata read off a field by `#[derive(Schema)]`-generated code; kept
/// here (rather than in `opkit-macros`) so both the macro crate and
/// hand-written `ToSchema` impls share one struct-building helper.
#[derive(Default)]
pub struct FieldSpec {
    pub name: String,
    pub schema: SchemaOrRef,
    pub required: bool,
    pub nullable: bool,
}

/// Assembles an object [`Schema`] from breadth-first-discovered fields,
/// in the order used by `#[derive(Schema)]`: the outermost declaration
/// wins on name collision (first insertion, per `IndexMap`'s semantics).
pub fn compile_struct(
    fields: Vec<FieldSpec>,
    title: Option<String>,
    description: Option<String>,
    dependent_required: IndexMap<String, Vec<String>>,
) -> Result<Schema, SchemaError> {
    let mut properties = IndexMap::new();
    let mut required = Vec::new();
    for f in fields {
        if f.required {
            required.push(f.name.clone());
        }
        let schema = if f.nullable {
            match f.schema {
                SchemaOrRef::Inline(mut s) => {
                    s.nullable = true;
                    SchemaOrRef::Inline(s)
                }
                r @ SchemaOrRef::Ref(_) => r,
            }
        } else {
            f.schema
        };
        if !properties.contains_key(&f.name) {
            properties.insert(f.name, schema);
        }
    }
    Schema {
        title,
        description,
        properties,
        required,
        dependent_required,
        additional_properties: Some(AdditionalPropertiesOrRef::Allowed(true)),
        ..Schema::object()
    }
    .finish()
}

/// Per-field overrides read by `#[derive(Schema)]` from `#[schema(...)]`
/// attributes and applied to the field's derived schema. Only meaningful
/// for inline schemas: a field whose type is itself a named, interned
/// aggregate is left as a bare `$ref` (the spec's rule that bounds live
/// on the leaf schema, not re-stated per use site).
#[derive(Default)]
pub struct FieldOverrides {
    pub description: Option<String>,
    pub format: Option<String>,
    pub default: Option<serde_json::Value>,
    pub example: Option<serde_json::Value>,
    pub enum_values: Option<Vec<serde_json::Value>>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: Option<f64>,
    pub exclusive_maximum: Option<f64>,
    pub multiple_of: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<(String, Option<String>)>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    pub unique_items: Option<bool>,
    pub read_only: Option<bool>,
    pub write_only: Option<bool>,
    pub deprecated: Option<bool>,
    pub hidden: Option<bool>,
    pub content_encoding: Option<String>,
}

pub fn apply_field_overrides(node: SchemaOrRef, overrides: FieldOverrides) -> Result<SchemaOrRef, SchemaError> {
    let mut schema = match node {
        SchemaOrRef::Ref(r) => return Ok(SchemaOrRef::Ref(r)),
        SchemaOrRef::Inline(s) => *s,
    };
    if let Some(v) = overrides.description {
        schema.description = Some(v);
    }
    if let Some(v) = overrides.format {
        schema.format = Some(v);
    }
    if overrides.default.is_some() {
        schema.default = overrides.default;
    }
    if let Some(v) = overrides.example {
        schema.examples.push(v);
    }
    if overrides.enum_values.is_some() {
        schema.enum_values = overrides.enum_values;
    }
    if overrides.minimum.is_some() {
        schema.minimum = overrides.minimum;
    }
    if overrides.maximum.is_some() {
        schema.maximum = overrides.maximum;
    }
    if overrides.exclusive_minimum.is_some() {
        schema.exclusive_minimum = overrides.exclusive_minimum;
    }
    if overrides.exclusive_maximum.is_some() {
        schema.exclusive_maximum = overrides.exclusive_maximum;
    }
    if overrides.multiple_of.is_some() {
        schema.multiple_of = overrides.multiple_of;
    }
    if overrides.min_length.is_some() {
        schema.min_length = overrides.min_length;
    }
    if overrides.max_length.is_some() {
        schema.max_length = overrides.max_length;
    }
    if overrides.min_items.is_some() {
        schema.min_items = overrides.min_items;
    }
    if overrides.max_items.is_some() {
        schema.max_items = overrides.max_items;
    }
    if let Some(v) = overrides.unique_items {
        schema.unique_items = v;
    }
    if let Some(v) = overrides.read_only {
        schema.read_only = v;
    }
    if let Some(v) = overrides.write_only {
        schema.write_only = v;
    }
    if let Some(v) = overrides.deprecated {
        schema.deprecated = v;
    }
    if let Some(v) = overrides.hidden {
        schema.hidden = v;
    }
    if let Some(v) = overrides.content_encoding {
        schema.content_encoding = Some(v);
    }
    if let Some((pattern, description)) = overrides.pattern {
        schema = schema.with_pattern(&pattern, description)?;
    }
    Ok(SchemaOrRef::inline(schema.finish()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u32_gets_minimum_zero() {
        let mut reg = SchemaRegistry::default();
        let schema = u32::to_schema(&mut reg).unwrap();
        assert_eq!(schema.minimum, Some(0.0));
        assert_eq!(schema.format.as_deref(), Some("uint32"));
    }

    #[test]
    fn vec_u8_is_base64_string_not_array() {
        let mut reg = SchemaRegistry::default();
        let schema = Vec::<u8>::to_schema(&mut reg).unwrap();
        assert_eq!(schema.schema_type, Some(SchemaType::String));
        assert_eq!(schema.content_encoding.as_deref(), Some("base64"));
    }

    #[test]
    fn fixed_array_sets_equal_min_max_items() {
        let mut reg = SchemaRegistry::default();
        let schema = <[u8; 4]>::to_schema(&mut reg).unwrap();
        assert_eq!(schema.min_items, Some(4));
        assert_eq!(schema.max_items, Some(4));
    }

    #[test]
    fn option_marks_inline_schema_nullable() {
        let mut reg = SchemaRegistry::default();
        let schema = Option::<String>::to_schema(&mut reg).unwrap();
        assert!(schema.nullable);
    }

    #[test]
    fn hashmap_uses_additional_properties_schema() {
        let mut reg = SchemaRegistry::default();
        let schema = HashMap::<String, i32>::to_schema(&mut reg).unwrap();
        assert!(matches!(
            schema.additional_properties,
            Some(AdditionalPropertiesOrRef::Schema(_))
        ));
    }

    #[test]
    fn compile_struct_first_declaration_wins_on_collision() {
        let fields = vec![
            FieldSpec {
                name: "id".into(),
                schema: SchemaOrRef::inline(Schema::string()),
                required: true,
                nullable: false,
            },
            FieldSpec {
                name: "id".into(),
                schema: SchemaOrRef::inline(Schema::integer()),
                required: false,
                nullable: false,
            },
        ];
        let schema = compile_struct(fields, None, None, IndexMap::new()).unwrap();
        let kept = &schema.properties["id"];
        match kept {
            SchemaOrRef::Inline(s) => assert_eq!(s.schema_type, Some(SchemaType::String)),
            _ => panic!("expected inline"),
        }
    }
}
