//! Strict Schema Generation
//!
//! Derives OpenAI-compatible JSON schemas from Rust types via `schemars`.
//! OpenAI's strict structured-output mode rejects plain schemars output: it
//! requires `additionalProperties: false` on every object, every property
//! listed in `required` (nullable ones included), and no `$ref` indirection.
//! `strict_schema()` applies those transformations.

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Types usable as a schema-constrained extraction target.
///
/// Blanket-implemented for anything deriving `JsonSchema` + `Deserialize`,
/// so the extraction schema is fixed at compile time by the target type.
pub trait ExtractionSchema: JsonSchema + DeserializeOwned {
    /// JSON schema for this type in OpenAI strict-mode form.
    fn strict_schema() -> Value {
        let mut schema = serde_json::to_value(schema_for!(Self)).unwrap_or_default();

        enforce_strict_objects(&mut schema);

        // Strict mode does not follow $ref, so inline every definition
        // before stripping the definitions table.
        let definitions = schema.get("definitions").cloned();
        if let Some(definitions) = definitions {
            inline_definitions(&mut schema, &definitions);
        }
        if let Value::Object(map) = &mut schema {
            map.remove("definitions");
            map.remove("$schema");
        }

        schema
    }

    /// Name used for the `json_schema` response format block. Distinct from
    /// `JsonSchema::schema_name` so callers with both traits in scope never
    /// hit an ambiguous method resolution.
    fn response_format_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> ExtractionSchema for T {}

/// Walk the schema, forcing strict-mode object rules: closed objects and a
/// `required` array covering every declared property.
fn enforce_strict_objects(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.get("type") == Some(&Value::String("object".into())) {
                map.insert("additionalProperties".into(), Value::Bool(false));
                if let Some(Value::Object(props)) = map.get("properties") {
                    let required: Vec<Value> =
                        props.keys().map(|k| Value::String(k.clone())).collect();
                    map.insert("required".into(), Value::Array(required));
                }
            }
            for (_, nested) in map.iter_mut() {
                enforce_strict_objects(nested);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                enforce_strict_objects(item);
            }
        }
        _ => {}
    }
}

/// Replace `{"$ref": "#/definitions/Name"}` nodes with the referenced schema,
/// recursing into the substitution to catch nested references.
fn inline_definitions(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(ref_path)) = map.get("$ref").cloned() {
                if let Some(name) = ref_path.strip_prefix("#/definitions/") {
                    if let Some(definition) = definitions.get(name) {
                        *value = definition.clone();
                        inline_definitions(value, definitions);
                        return;
                    }
                }
            }
            for (_, nested) in map.iter_mut() {
                inline_definitions(nested, definitions);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                inline_definitions(item, definitions);
            }
        }
        _ => {}
    }
}
