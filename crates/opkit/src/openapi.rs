//! Walks the Operation Table and Schema Registry into an OpenAPI 3.1
//! document (spec §4.6), with an optional downgrade pass to 3.0.3 and a
//! one-shot byte cache for the serialized forms. Grounded on
//! `ApiIngress::build_openapi`'s path-walking shape, generalized from
//! that module's handful of content-type-specific helpers to this
//! engine's `Schema`/`SchemaOrRef` model.

use std::sync::OnceLock;

use indexmap::IndexMap;
use opkit_schema::{Schema, SchemaOrRef, SchemaRegistry};
use serde_json::{json, Map, Value};

use crate::operation::{Operation, ParamLocation};
use crate::registry::FrozenTable;

pub struct OpenApiInfo {
    pub title: String,
    pub version: String,
    pub description: Option<String>,
}

pub struct OpenApiEmitter<'a> {
    pub table: &'a FrozenTable,
    pub schemas: &'a SchemaRegistry,
    pub info: OpenApiInfo,
    pub servers: Vec<String>,
    json_cache: OnceLock<Vec<u8>>,
    yaml_cache: OnceLock<Vec<u8>>,
}

impl<'a> OpenApiEmitter<'a> {
    pub fn new(table: &'a FrozenTable, schemas: &'a SchemaRegistry, info: OpenApiInfo) -> Self {
        Self {
            table,
            schemas,
            info,
            servers: Vec::new(),
            json_cache: OnceLock::new(),
            yaml_cache: OnceLock::new(),
        }
    }

    /// Emits the OpenAPI 3.1 document as a generic JSON tree (the same
    /// tree the 3.0.3 downgrade pass rewrites in place).
    pub fn document(&self) -> Value {
        let mut paths: IndexMap<String, Map<String, Value>> = IndexMap::new();
        let mut tags: Vec<String> = Vec::new();

        for op in self.table.operations() {
            if op.hidden {
                continue;
            }
            let entry = paths.entry(op.path.clone()).or_default();
            entry.insert(op.method.as_str().to_lowercase(), self.operation_object(op));
            for tag in &op.tags {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
        }

        json!({
            "openapi": "3.1.0",
            "info": {
                "title": self.info.title,
                "version": self.info.version,
                "description": self.info.description,
            },
            "servers": self.servers.iter().map(|url| json!({"url": url})).collect::<Vec<_>>(),
            "tags": tags.iter().map(|t| json!({"name": t})).collect::<Vec<_>>(),
            "paths": Value::Object(paths.into_iter().map(|(k, v)| (k, Value::Object(v))).collect()),
            "components": { "schemas": self.components_schemas() },
            "security": Value::Array(Vec::new()),
        })
    }

    fn components_schemas(&self) -> Value {
        let map: Map<String, Value> = self
            .schemas
            .iter()
            .map(|(name, schema)| (name.to_string(), schema_to_json(schema)))
            .collect();
        Value::Object(map)
    }

    fn operation_object(&self, op: &Operation) -> Value {
        let mut obj = Map::new();
        obj.insert("operationId".to_string(), json!(op.id));
        if let Some(summary) = &op.summary {
            obj.insert("summary".to_string(), json!(summary));
        }
        if let Some(description) = &op.description {
            obj.insert("description".to_string(), json!(description));
        }
        if !op.tags.is_empty() {
            obj.insert("tags".to_string(), json!(op.tags));
        }
        if !op.security.is_empty() {
            obj.insert(
                "security".to_string(),
                Value::Array(op.security.iter().map(|s| json!({s: []})).collect()),
            );
        }

        if !op.params.is_empty() {
            let params: Vec<Value> = op
                .params
                .iter()
                .map(|p| {
                    json!({
                        "name": p.name,
                        "in": location_str(p.location),
                        "required": p.required || p.location == ParamLocation::Path,
                        "schema": schema_ref_to_json(&p.schema),
                    })
                })
                .collect();
            obj.insert("parameters".to_string(), Value::Array(params));
        }

        if let Some(body) = &op.body {
            let content: Map<String, Value> = body
                .content
                .iter()
                .map(|(media_type, schema)| {
                    (
                        media_type.clone(),
                        json!({ "schema": schema_ref_to_json(schema) }),
                    )
                })
                .collect();
            obj.insert(
                "requestBody".to_string(),
                json!({ "required": body.required, "content": content }),
            );
        }

        let responses: Map<String, Value> = op
            .responses
            .iter()
            .map(|(status, resp)| {
                let content: Map<String, Value> = resp
                    .content
                    .iter()
                    .map(|(media_type, schema)| {
                        (
                            media_type.clone(),
                            json!({ "schema": schema_ref_to_json(schema) }),
                        )
                    })
                    .collect();
                let mut resp_obj = Map::new();
                resp_obj.insert("description".to_string(), json!(resp.description));
                if !content.is_empty() {
                    resp_obj.insert("content".to_string(), Value::Object(content));
                }
                if !resp.headers.is_empty() {
                    let headers: Map<String, Value> = resp
                        .headers
                        .iter()
                        .map(|(name, schema)| (name.clone(), json!({ "schema": schema_ref_to_json(schema) })))
                        .collect();
                    resp_obj.insert("headers".to_string(), Value::Object(headers));
                }
                (status.to_string(), Value::Object(resp_obj))
            })
            .collect();
        obj.insert("responses".to_string(), Value::Object(responses));

        Value::Object(obj)
    }

    /// Serializes `document()` to JSON bytes, computing it once under a
    /// first-caller-wins guard (spec §5: concurrent first-callers may
    /// redundantly compute; the result is deterministic so that is benign).
    pub fn json_bytes(&self) -> &[u8] {
        self.json_cache.get_or_init(|| serde_json::to_vec_pretty(&self.document()).unwrap_or_default())
    }

    /// Serializes through the same JSON tree so field ordering matches
    /// the JSON form exactly (spec §4.6).
    pub fn yaml_bytes(&self) -> &[u8] {
        self.yaml_cache
            .get_or_init(|| serde_yaml::to_string(&self.document()).unwrap_or_default().into_bytes())
    }

    /// A 3.0.3-compatible rendering of `document()` (spec §4.6, §8 scenario 6).
    pub fn document_3_0_3(&self) -> Value {
        let mut doc = self.document();
        if let Value::Object(map) = &mut doc {
            map.insert("openapi".to_string(), json!("3.0.3"));
        }
        downgrade_to_3_0_3(&mut doc);
        doc
    }
}

fn location_str(location: ParamLocation) -> &'static str {
    match location {
        ParamLocation::Path => "path",
        ParamLocation::Query => "query",
        ParamLocation::Header => "header",
        ParamLocation::Cookie => "cookie",
    }
}

/// Translates the in-memory `Schema` into its OpenAPI 3.1 JSON form.
/// Mirrors `utoipa`'s `Schema -> serde_json::Value` path but walks our
/// own `Schema`/`SchemaOrRef` tree instead of utoipa's.
fn schema_to_json(schema: &Schema) -> Value {
    let mut obj = Map::new();

    if let Some(ty) = schema.schema_type {
        if schema.nullable {
            obj.insert(
                "type".to_string(),
                json!([ty.as_str(), "null"]),
            );
        } else {
            obj.insert("type".to_string(), json!(ty.as_str()));
        }
    }
    if let Some(title) = &schema.title {
        obj.insert("title".to_string(), json!(title));
    }
    if let Some(description) = &schema.description {
        obj.insert("description".to_string(), json!(description));
    }
    if let Some(format) = &schema.format {
        obj.insert("format".to_string(), json!(format));
    }
    if let Some(encoding) = &schema.content_encoding {
        obj.insert("contentEncoding".to_string(), json!(encoding));
    }
    if let Some(default) = &schema.default {
        obj.insert("default".to_string(), default.clone());
    }
    if !schema.examples.is_empty() {
        obj.insert("examples".to_string(), json!(schema.examples));
    }
    if let Some(items) = &schema.items {
        obj.insert("items".to_string(), schema_ref_to_json(items));
    }
    if !schema.properties.is_empty() {
        let props: Map<String, Value> = schema
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), schema_ref_to_json(v)))
            .collect();
        obj.insert("properties".to_string(), Value::Object(props));
    }
    match &schema.additional_properties {
        Some(opkit_schema::AdditionalPropertiesOrRef::Allowed(allowed)) => {
            obj.insert("additionalProperties".to_string(), json!(allowed));
        }
        Some(opkit_schema::AdditionalPropertiesOrRef::Schema(s)) => {
            obj.insert("additionalProperties".to_string(), schema_ref_to_json(s));
        }
        None => {}
    }
    if let Some(values) = &schema.enum_values {
        obj.insert("enum".to_string(), json!(values));
    }
    if let Some(v) = schema.minimum {
        obj.insert("minimum".to_string(), json!(v));
    }
    if let Some(v) = schema.exclusive_minimum {
        obj.insert("exclusiveMinimum".to_string(), json!(v));
    }
    if let Some(v) = schema.maximum {
        obj.insert("maximum".to_string(), json!(v));
    }
    if let Some(v) = schema.exclusive_maximum {
        obj.insert("exclusiveMaximum".to_string(), json!(v));
    }
    if let Some(v) = schema.multiple_of {
        obj.insert("multipleOf".to_string(), json!(v));
    }
    if let Some(v) = schema.min_length {
        obj.insert("minLength".to_string(), json!(v));
    }
    if let Some(v) = schema.max_length {
        obj.insert("maxLength".to_string(), json!(v));
    }
    if let Some(p) = &schema.pattern {
        obj.insert("pattern".to_string(), json!(p.source));
    }
    if let Some(v) = schema.min_items {
        obj.insert("minItems".to_string(), json!(v));
    }
    if let Some(v) = schema.max_items {
        obj.insert("maxItems".to_string(), json!(v));
    }
    if schema.unique_items {
        obj.insert("uniqueItems".to_string(), json!(true));
    }
    if let Some(v) = schema.min_properties {
        obj.insert("minProperties".to_string(), json!(v));
    }
    if let Some(v) = schema.max_properties {
        obj.insert("maxProperties".to_string(), json!(v));
    }
    if !schema.required.is_empty() {
        obj.insert("required".to_string(), json!(schema.required));
    }
    if !schema.dependent_required.is_empty() {
        obj.insert("dependentRequired".to_string(), json!(schema.dependent_required));
    }
    if schema.read_only {
        obj.insert("readOnly".to_string(), json!(true));
    }
    if schema.write_only {
        obj.insert("writeOnly".to_string(), json!(true));
    }
    if schema.deprecated {
        obj.insert("deprecated".to_string(), json!(true));
    }
    use opkit_schema::Composition;
    let subschemas_json: Vec<Value> = schema.subschemas.iter().map(schema_ref_to_json).collect();
    match schema.composition {
        Composition::OneOf => {
            obj.insert("oneOf".to_string(), json!(subschemas_json));
        }
        Composition::AnyOf => {
            obj.insert("anyOf".to_string(), json!(subschemas_json));
        }
        Composition::AllOf => {
            obj.insert("allOf".to_string(), json!(subschemas_json));
        }
        Composition::Not => {
            if let Some(first) = subschemas_json.into_iter().next() {
                obj.insert("not".to_string(), first);
            }
        }
        Composition::None => {}
    }
    if let Some(discriminator) = &schema.discriminator {
        obj.insert(
            "discriminator".to_string(),
            json!({
                "propertyName": discriminator.property_name,
                "mapping": discriminator.mapping,
            }),
        );
    }
    for (key, value) in &schema.extensions {
        obj.insert(key.clone(), value.clone());
    }

    Value::Object(obj)
}

fn schema_ref_to_json(schema: &SchemaOrRef) -> Value {
    match schema {
        SchemaOrRef::Ref(r) => json!({ "$ref": r }),
        SchemaOrRef::Inline(s) => schema_to_json(s),
    }
}

/// Rewrites a 3.1 document tree into 3.0.3-compatible shape (spec §4.6,
/// §8 scenario 6): `exclusiveMinimum`/`exclusiveMaximum` number -> bool
/// + minimum/maximum, `examples` array -> first `example`, nullable
/// `type: [T, "null"]` -> `type: T` + `nullable: true`, and
/// `contentEncoding: base64` on a string -> `format: base64`.
fn downgrade_to_3_0_3(value: &mut Value) {
    match value {
        Value::Object(map) => {
            downgrade_exclusive_bound(map, "exclusiveMinimum", "minimum");
            downgrade_exclusive_bound(map, "exclusiveMaximum", "maximum");

            if let Some(Value::Array(examples)) = map.remove("examples") {
                if let Some(first) = examples.into_iter().next() {
                    map.insert("example".to_string(), first);
                }
            }

            if let Some(Value::Array(types)) = map.get("type").cloned() {
                if types.len() == 2 && types.contains(&json!("null")) {
                    if let Some(non_null) = types.into_iter().find(|t| t != &json!("null")) {
                        map.insert("type".to_string(), non_null);
                        map.insert("nullable".to_string(), json!(true));
                    }
                }
            }

            let is_base64_string = map.get("type") == Some(&json!("string"))
                && map.get("contentEncoding") == Some(&json!("base64"));
            if is_base64_string {
                map.remove("contentEncoding");
                map.insert("format".to_string(), json!("base64"));
            }

            for (key, v) in map.iter_mut() {
                if key == "content" {
                    if let Value::Object(content_map) = v {
                        for media in content_map.values_mut() {
                            if let Value::Object(media_obj) = media {
                                if media_obj.get("schema").is_none() && media.get("content").is_none() {
                                    media_obj.insert("schema".to_string(), json!({ "type": "string", "format": "binary" }));
                                }
                            }
                        }
                    }
                }
                downgrade_to_3_0_3(v);
            }
        }
        Value::Array(items) => {
            for item in items {
                downgrade_to_3_0_3(item);
            }
        }
        _ => {}
    }
}

fn downgrade_exclusive_bound(map: &mut Map<String, Value>, exclusive_key: &str, bound_key: &str) {
    if let Some(n) = map.get(exclusive_key).and_then(Value::as_f64) {
        map.insert(bound_key.to_string(), json!(n));
        map.insert(exclusive_key.to_string(), json!(true));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opkit_schema::Schema;
    use serde_json::json;

    #[test]
    fn downgrade_rewrites_exclusive_minimum_examples_and_content_encoding() {
        let mut doc = json!({
            "openapi": "3.1.0",
            "components": {
                "schemas": {
                    "Widget": {
                        "type": "string",
                        "exclusiveMinimum": 0,
                        "examples": [100],
                        "contentEncoding": "base64",
                    }
                }
            }
        });
        downgrade_to_3_0_3(&mut doc);
        let widget = &doc["components"]["schemas"]["Widget"];
        assert_eq!(widget["minimum"], json!(0.0));
        assert_eq!(widget["exclusiveMinimum"], json!(true));
        assert_eq!(widget["example"], json!(100));
        assert_eq!(widget["format"], json!("base64"));
        assert!(widget.get("contentEncoding").is_none());
        assert!(widget.get("examples").is_none());
    }

    #[test]
    fn schema_to_json_emits_object_with_required_and_properties() {
        let mut schema = Schema::object();
        schema.required.push("name".to_string());
        schema.properties.insert(
            "name".to_string(),
            SchemaOrRef::inline(Schema::string()),
        );
        let json = schema_to_json(&schema);
        assert_eq!(json["type"], "object");
        assert_eq!(json["required"], json!(["name"]));
        assert_eq!(json["properties"]["name"]["type"], "string");
    }
}
