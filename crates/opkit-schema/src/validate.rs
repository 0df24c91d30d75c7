//! The Validator: walks a decoded [`serde_json::Value`] against a
//! [`Schema`], appending [`ValidationIssue`]s to an accumulator rather
//! than short-circuiting, so a single request can report every mistake
//! in one response.

use serde_json::Value;

use crate::error::ValidationIssue;
use crate::pointer::PathBuffer;
use crate::registry::SchemaRegistry;
use crate::schema::{AdditionalPropertiesOrRef, Composition, Schema, SchemaOrRef, SchemaType};

/// Which side of the wire the value is on: `WriteToServer` enforces
/// `readOnly` fields are absent and skips `writeOnly` checks on the way
/// in; `ReadFromServer` is the converse, for outgoing responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    WriteToServer,
    ReadFromServer,
}

pub struct Validator<'r> {
    registry: &'r SchemaRegistry,
    mode: ValidationMode,
}

impl<'r> Validator<'r> {
    pub fn new(registry: &'r SchemaRegistry, mode: ValidationMode) -> Self {
        Self { registry, mode }
    }

    /// Convenience wrapper selecting `write to server` mode.
    pub fn validate_request(registry: &'r SchemaRegistry, schema: &Schema, value: &Value) -> Vec<ValidationIssue> {
        let mut v = Validator::new(registry, ValidationMode::WriteToServer);
        let mut path = PathBuffer::new();
        let mut issues = Vec::new();
        v.validate_schema(schema, value, &mut path, &mut issues);
        issues
    }

    /// Convenience wrapper selecting `read from server` mode.
    pub fn validate_response(registry: &'r SchemaRegistry, schema: &Schema, value: &Value) -> Vec<ValidationIssue> {
        let mut v = Validator::new(registry, ValidationMode::ReadFromServer);
        let mut path = PathBuffer::new();
        let mut issues = Vec::new();
        v.validate_schema(schema, value, &mut path, &mut issues);
        issues
    }

    pub fn validate(&mut self, schema: &Schema, value: &Value) -> Vec<ValidationIssue> {
        let mut path = PathBuffer::new();
        let mut issues = Vec::new();
        self.validate_schema(schema, value, &mut path, &mut issues);
        issues
    }

    /// Same as `validate`, but takes a [`SchemaOrRef`] (e.g. a parameter
    /// or body descriptor's schema) and resolves a top-level `$ref` via
    /// the registry before walking it.
    pub fn validate_ref(&mut self, schema: &SchemaOrRef, value: &Value) -> Vec<ValidationIssue> {
        let mut path = PathBuffer::new();
        let mut issues = Vec::new();
        self.validate_node(schema, value, &mut path, &mut issues);
        issues
    }

    fn resolve<'s>(&'s self, node: &'s SchemaOrRef) -> Option<&'s Schema> {
        match node {
            SchemaOrRef::Inline(s) => Some(s.as_ref()),
            SchemaOrRef::Ref(r) => {
                let name = r.rsplit('/').next().unwrap_or(r);
                self.registry.get(name)
            }
        }
    }

    fn validate_node(&mut self, node: &SchemaOrRef, value: &Value, path: &mut PathBuffer, out: &mut Vec<ValidationIssue>) {
        match self.resolve(node) {
            Some(schema) => self.validate_schema(schema, value, path, out),
            None => out.push(ValidationIssue::new("unresolved schema reference", path.as_str())),
        }
    }

    fn validate_schema(&mut self, schema: &Schema, value: &Value, path: &mut PathBuffer, out: &mut Vec<ValidationIssue>) {
        if matches!(value, Value::Null) {
            if schema.nullable {
                return;
            }
            if schema.schema_type.is_none() && schema.composition == Composition::None {
                return;
            }
        }

        if schema.read_only && self.mode == ValidationMode::WriteToServer && !matches!(value, Value::Null) {
            out.push(ValidationIssue::new("readOnly property must not be set by the client", path.as_str()).with_value(value.clone()));
        }
        if schema.write_only && self.mode == ValidationMode::ReadFromServer && !matches!(value, Value::Null) {
            out.push(ValidationIssue::new("writeOnly property must not appear in a response", path.as_str()).with_value(value.clone()));
        }

        match schema.composition {
            Composition::OneOf => return self.validate_one_of(schema, value, path, out),
            Composition::AnyOf => return self.validate_any_of(schema, value, path, out),
            Composition::AllOf => return self.validate_all_of(schema, value, path, out),
            Composition::Not => return self.validate_not(schema, value, path, out),
            Composition::None => {}
        }

        if let Some(enum_values) = &schema.enum_values {
            if !enum_values.contains(value) {
                out.push(
                    ValidationIssue::new(
                        schema.messages.enum_mismatch.clone().unwrap_or_else(|| "must be one of the allowed values".into()),
                        path.as_str(),
                    )
                    .with_value(value.clone()),
                );
                return;
            }
        }

        match schema.schema_type {
            Some(SchemaType::Boolean) => self.check_type(value.is_boolean(), schema, value, path, out),
            Some(SchemaType::Integer) => self.validate_integer(schema, value, path, out),
            Some(SchemaType::Number) => self.validate_number(schema, value, path, out),
            Some(SchemaType::String) => self.validate_string(schema, value, path, out),
            Some(SchemaType::Array) => self.validate_array(schema, value, path, out),
            Some(SchemaType::Object) => self.validate_object(schema, value, path, out),
            None => {}
        }
    }

    fn check_type(&self, ok: bool, schema: &Schema, value: &Value, path: &PathBuffer, out: &mut Vec<ValidationIssue>) {
        if !ok {
            out.push(
                ValidationIssue::new(
                    schema.messages.type_mismatch.clone().unwrap_or_else(|| "type mismatch".into()),
                    path.as_str(),
                )
                .with_value(value.clone()),
            );
        }
    }

    fn validate_integer(&self, schema: &Schema, value: &Value, path: &PathBuffer, out: &mut Vec<ValidationIssue>) {
        if !value.is_i64() && !value.is_u64() {
            self.check_type(false, schema, value, path, out);
            return;
        }
        let n = value.as_f64().expect("checked integer value converts to f64");
        self.validate_numeric_bounds(schema, n, value, path, out);
    }

    fn validate_number(&self, schema: &Schema, value: &Value, path: &PathBuffer, out: &mut Vec<ValidationIssue>) {
        match value.as_f64() {
            Some(n) => self.validate_numeric_bounds(schema, n, value, path, out),
            None => self.check_type(false, schema, value, path, out),
        }
    }

    fn validate_numeric_bounds(&self, schema: &Schema, n: f64, value: &Value, path: &PathBuffer, out: &mut Vec<ValidationIssue>) {
        if let Some(min) = schema.minimum {
            if n < min {
                out.push(ValidationIssue::new(schema.messages.minimum.clone().unwrap(), path.as_str()).with_value(value.clone()));
            }
        }
        if let Some(max) = schema.maximum {
            if n > max {
                out.push(ValidationIssue::new(schema.messages.maximum.clone().unwrap(), path.as_str()).with_value(value.clone()));
            }
        }
        if let Some(min) = schema.exclusive_minimum {
            if n <= min {
                out.push(ValidationIssue::new(schema.messages.exclusive_minimum.clone().unwrap(), path.as_str()).with_value(value.clone()));
            }
        }
        if let Some(max) = schema.exclusive_maximum {
            if n >= max {
                out.push(ValidationIssue::new(schema.messages.exclusive_maximum.clone().unwrap(), path.as_str()).with_value(value.clone()));
            }
        }
        if let Some(step) = schema.multiple_of {
            if step != 0.0 && (n / step).fract().abs() > f64::EPSILON {
                out.push(ValidationIssue::new(schema.messages.multiple_of.clone().unwrap(), path.as_str()).with_value(value.clone()));
            }
        }
    }

    fn validate_string(&self, schema: &Schema, value: &Value, path: &PathBuffer, out: &mut Vec<ValidationIssue>) {
        let s = match value.as_str() {
            Some(s) => s,
            None => {
                self.check_type(false, schema, value, path, out);
                return;
            }
        };
        let len = s.chars().count();
        if let Some(min) = schema.min_length {
            if len < min {
                out.push(ValidationIssue::new(schema.messages.min_length.clone().unwrap(), path.as_str()).with_value(value.clone()));
            }
        }
        if let Some(max) = schema.max_length {
            if len > max {
                out.push(ValidationIssue::new(schema.messages.max_length.clone().unwrap(), path.as_str()).with_value(value.clone()));
            }
        }
        if let Some(p) = &schema.pattern {
            if !p.regex.is_match(s) {
                out.push(ValidationIssue::new(schema.messages.pattern.clone().unwrap(), path.as_str()).with_value(value.clone()));
            }
        }
    }

    fn validate_array(&mut self, schema: &Schema, value: &Value, path: &mut PathBuffer, out: &mut Vec<ValidationIssue>) {
        let items = match value.as_array() {
            Some(items) => items,
            None => {
                self.check_type(false, schema, value, path, out);
                return;
            }
        };
        if let Some(min) = schema.min_items {
            if items.len() < min {
                out.push(ValidationIssue::new(schema.messages.min_items.clone().unwrap(), path.as_str()));
            }
        }
        if let Some(max) = schema.max_items {
            if items.len() > max {
                out.push(ValidationIssue::new(schema.messages.max_items.clone().unwrap(), path.as_str()));
            }
        }
        if schema.unique_items {
            for i in 0..items.len() {
                for j in (i + 1)..items.len() {
                    if items[i] == items[j] {
                        out.push(ValidationIssue::new(schema.messages.unique_items.clone().unwrap(), path.as_str()));
                    }
                }
            }
        }
        if let Some(item_schema) = &schema.items {
            for (i, item) in items.iter().enumerate() {
                let _g = path.push_index(i);
                self.validate_node(item_schema, item, path, out);
            }
        }
    }

    fn validate_object(&mut self, schema: &Schema, value: &Value, path: &mut PathBuffer, out: &mut Vec<ValidationIssue>) {
        let map = match value.as_object() {
            Some(map) => map,
            None => {
                self.check_type(false, schema, value, path, out);
                return;
            }
        };

        for name in &schema.required {
            if !map.contains_key(name) {
                let msg = schema
                    .messages
                    .required_missing
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| format!("missing required property \"{name}\""));
                out.push(ValidationIssue::new(msg, path.as_str()));
            }
        }

        if let Some(min) = schema.min_properties {
            if map.len() < min {
                out.push(ValidationIssue::new(schema.messages.min_properties.clone().unwrap(), path.as_str()));
            }
        }
        if let Some(max) = schema.max_properties {
            if map.len() > max {
                out.push(ValidationIssue::new(schema.messages.max_properties.clone().unwrap(), path.as_str()));
            }
        }

        if let Some(AdditionalPropertiesOrRef::Allowed(false)) = &schema.additional_properties {
            for key in map.keys() {
                if !schema.properties.contains_key(key) {
                    out.push(ValidationIssue::new(format!("unexpected property \"{key}\""), path.as_str()));
                }
            }
        }

        for (key, deps) in &schema.dependent_required {
            if map.contains_key(key) {
                for dep in deps {
                    if !map.contains_key(dep) {
                        out.push(ValidationIssue::new(
                            format!("property \"{dep}\" is required when \"{key}\" is present"),
                            path.as_str(),
                        ));
                    }
                }
            }
        }

        for (name, prop_schema) in &schema.properties {
            if let Some(v) = map.get(name) {
                let _g = path.push_field(name);
                self.validate_node(prop_schema, v, path, out);
            }
        }
    }

    fn validate_one_of(&mut self, schema: &Schema, value: &Value, path: &mut PathBuffer, out: &mut Vec<ValidationIssue>) {
        let mut matches = 0;
        for sub in &schema.subschemas {
            let mut local = Vec::new();
            self.validate_node(sub, value, path, &mut local);
            if local.is_empty() {
                matches += 1;
            }
        }
        if matches != 1 {
            out.push(
                ValidationIssue::new(
                    schema.messages.one_of.clone().unwrap_or_else(|| "must match exactly one schema in oneOf".into()),
                    path.as_str(),
                )
                .with_value(value.clone()),
            );
        }
    }

    fn validate_any_of(&mut self, schema: &Schema, value: &Value, path: &mut PathBuffer, out: &mut Vec<ValidationIssue>) {
        let mut matched = false;
        for sub in &schema.subschemas {
            let mut local = Vec::new();
            self.validate_node(sub, value, path, &mut local);
            if local.is_empty() {
                matched = true;
                break;
            }
        }
        if !matched {
            out.push(
                ValidationIssue::new(
                    schema.messages.any_of.clone().unwrap_or_else(|| "must match at least one schema in anyOf".into()),
                    path.as_str(),
                )
                .with_value(value.clone()),
            );
        }
    }

    fn validate_all_of(&mut self, schema: &Schema, value: &Value, path: &mut PathBuffer, out: &mut Vec<ValidationIssue>) {
        for sub in &schema.subschemas {
            self.validate_node(sub, value, path, out);
        }
    }

    fn validate_not(&mut self, schema: &Schema, value: &Value, path: &mut PathBuffer, out: &mut Vec<ValidationIssue>) {
        if let Some(sub) = schema.subschemas.first() {
            let mut local = Vec::new();
            self.validate_node(sub, value, path, &mut local);
            if local.is_empty() {
                out.push(ValidationIssue::new(
                    schema.messages.not.clone().unwrap_or_else(|| "must not match the schema in not".into()),
                    path.as_str(),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimum_zero_accepts_zero_rejects_negative() {
        let reg = SchemaRegistry::default();
        let schema = Schema { minimum: Some(0.0), ..Schema::number() }.finish().unwrap();
        assert!(Validator::validate_request(&reg, &schema, &json!(0)).is_empty());
        assert!(!Validator::validate_request(&reg, &schema, &json!(-0.0000001)).is_empty());
    }

    #[test]
    fn exclusive_minimum_zero_rejects_zero() {
        let reg = SchemaRegistry::default();
        let schema = Schema { exclusive_minimum: Some(0.0), ..Schema::number() }.finish().unwrap();
        assert!(!Validator::validate_request(&reg, &schema, &json!(0)).is_empty());
    }

    #[test]
    fn required_missing_is_reported() {
        let reg = SchemaRegistry::default();
        let mut props = indexmap::IndexMap::new();
        props.insert("name".to_string(), SchemaOrRef::inline(Schema::string()));
        let schema = Schema {
            properties: props,
            required: vec!["name".into()],
            ..Schema::object()
        }
        .finish()
        .unwrap();
        let issues = Validator::validate_request(&reg, &schema, &json!({}));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].location, "");
    }

    #[test]
    fn nested_array_item_error_has_indexed_pointer() {
        let reg = SchemaRegistry::default();
        let mut props = indexmap::IndexMap::new();
        props.insert(
            "tags".to_string(),
            SchemaOrRef::inline(Schema::array(SchemaOrRef::inline(
                Schema { min_length: Some(3), ..Schema::string() }.finish().unwrap(),
            ))),
        );
        let schema = Schema { properties: props, ..Schema::object() }.finish().unwrap();
        let issues = Validator::validate_request(&reg, &schema, &json!({"tags": ["ok", "x"]}));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].location, "/tags/1");
    }

    #[test]
    fn additional_properties_false_rejects_unknown_field() {
        let reg = SchemaRegistry::default();
        let schema = Schema {
            additional_properties: Some(AdditionalPropertiesOrRef::Allowed(false)),
            ..Schema::object()
        }
        .finish()
        .unwrap();
        let issues = Validator::validate_request(&reg, &schema, &json!({"surprise": 1}));
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn one_of_requires_exactly_one_match() {
        let reg = SchemaRegistry::default();
        let schema = Schema {
            composition: Composition::OneOf,
            subschemas: vec![
                SchemaOrRef::inline(Schema::string()),
                SchemaOrRef::inline(Schema::integer()),
            ],
            ..Schema::default()
        }
        .finish()
        .unwrap();
        assert!(Validator::validate_request(&reg, &schema, &json!("a string")).is_empty());
        assert!(!Validator::validate_request(&reg, &schema, &json!(true)).is_empty());
    }

    #[test]
    fn unique_items_detects_duplicate() {
        let reg = SchemaRegistry::default();
        let schema = Schema {
            unique_items: true,
            ..Schema::array(SchemaOrRef::inline(Schema::integer()))
        }
        .finish()
        .unwrap();
        let issues = Validator::validate_request(&reg, &schema, &json!([1, 2, 1]));
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn write_only_skipped_on_write_enforced_on_read() {
        let reg = SchemaRegistry::default();
        let mut props = indexmap::IndexMap::new();
        props.insert(
            "password".to_string(),
            SchemaOrRef::inline(Schema { write_only: true, ..Schema::string() }),
        );
        let schema = Schema { properties: props, ..Schema::object() }.finish().unwrap();
        let write_issues = Validator::validate_request(&reg, &schema, &json!({"password": "x"}));
        assert!(write_issues.is_empty());
        let read_issues = Validator::validate_response(&reg, &schema, &json!({"password": "x"}));
        assert_eq!(read_issues.len(), 1);
    }
}
