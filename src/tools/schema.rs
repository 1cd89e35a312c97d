//! Argument validation against a tool's JSON parameter schema
//!
//! Schemas are compiled with `jsonschema`. Object schemas that do not say
//! otherwise are closed: keys missing from `properties` are rejected unless
//! the schema sets `additionalProperties`.

use serde_json::Value;

/// Check `args` against `schema`, returning every violation joined into one reason
pub fn validate_arguments(schema: &Value, args: &Value) -> Result<(), String> {
    let schema = closed(schema);
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| format!("tool schema is invalid: {}", e))?;

    let errors: Vec<String> = validator.iter_errors(args).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join(", "))
    }
}

/// Default a top-level object schema to `additionalProperties: false`
fn closed(schema: &Value) -> Value {
    let mut schema = schema.clone();
    if let Value::Object(map) = &mut schema {
        if map.get("type").and_then(Value::as_str) == Some("object") {
            map.entry("additionalProperties").or_insert(Value::Bool(false));
        }
    }
    schema
}
