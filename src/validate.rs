//! Request validation against an operation's resolved contract.
//!
//! Parameters are checked structurally (presence, type, enum membership);
//! the body is checked by compiling the resolved body schema and collecting
//! every violation. Error paths use the same dotted addressing the
//! synthesizer reports (`params.query.limit`, `body.owner.name`) so the two
//! outputs line up.

use jsonschema::error::ValidationErrorKind;
use serde_json::{Map, Value};

use crate::error::{CatalogError, SchemaError, ValidationError};
use crate::model::{Parameter, ParameterLocation, ValidationReport};
use crate::resolver::ResolvedContract;

/// Validate a request against a resolved contract.
///
/// The request is an object with optional `parameters` (or `params`) buckets
/// and an optional `body` — the shape the synthesizer emits — or a bare body
/// object.
///
/// # Errors
///
/// Returns an error only when the body schema itself cannot be compiled;
/// request violations are reported in the [`ValidationReport`].
pub fn validate(
    contract: &ResolvedContract,
    request: &Value,
) -> Result<ValidationReport, CatalogError> {
    let mut errors = Vec::new();

    let buckets = request
        .get("parameters")
        .or_else(|| request.get("params"))
        .and_then(Value::as_object);
    for param in &contract.parameters {
        check_parameter(param, buckets, &mut errors);
    }

    let body = request
        .get("body")
        .filter(|b| !b.is_null())
        .or_else(|| bare_body(request, buckets.is_some()));
    match (&contract.request_body, body) {
        (Some(request_body), None) => {
            if request_body.required {
                errors.push(ValidationError {
                    path: "body".to_string(),
                    message: "request body is required".to_string(),
                });
            }
        }
        (Some(request_body), Some(body)) => {
            check_body(&request_body.schema, body, &mut errors)?;
        }
        (None, _) => {}
    }

    Ok(ValidationReport::from_errors(errors))
}

/// Treat the request itself as the body when it carries neither buckets nor
/// an explicit `body` key and is a non-empty object.
fn bare_body<'a>(request: &'a Value, has_buckets: bool) -> Option<&'a Value> {
    if has_buckets || request.get("body").is_some() {
        return None;
    }
    let map = request.as_object()?;
    if map.is_empty() {
        return None;
    }
    Some(request)
}

fn check_parameter(
    param: &Parameter,
    buckets: Option<&Map<String, Value>>,
    errors: &mut Vec<ValidationError>,
) {
    let bucket_name = match param.location {
        ParameterLocation::Cookie => ParameterLocation::Header.as_str(),
        other => other.as_str(),
    };
    let value = buckets
        .and_then(|b| b.get(bucket_name))
        .and_then(Value::as_object)
        .and_then(|bucket| bucket.get(&param.name));

    let path = format!("params.{}.{}", param.location.as_str(), param.name);
    let Some(value) = value else {
        if param.required {
            errors.push(ValidationError {
                path,
                message: "required parameter missing".to_string(),
            });
        }
        return;
    };

    if let Some(expected) = param.schema.get("type").and_then(Value::as_str) {
        if !type_matches(expected, value) {
            errors.push(ValidationError {
                path: path.clone(),
                message: format!("expected {expected}, got {}", type_name(value)),
            });
            return;
        }
    }
    if let Some(allowed) = param.schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            errors.push(ValidationError {
                path,
                message: format!("value not in enum, expected one of {}", Value::Array(allowed.clone())),
            });
        }
    }
}

fn check_body(
    schema: &Value,
    body: &Value,
    errors: &mut Vec<ValidationError>,
) -> Result<(), CatalogError> {
    let validator = jsonschema::validator_for(schema).map_err(|err| {
        CatalogError::Schema(SchemaError::InvalidSchema {
            path: "/requestBody".to_string(),
            message: err.to_string(),
        })
    })?;

    for violation in validator.iter_errors(body) {
        let base = dotted_body_path(&violation.instance_path.to_string());
        // Point a missing-required error at the field itself so it lines up
        // with the synthesizer's unknown-required reporting.
        let (path, message) = match &violation.kind {
            ValidationErrorKind::Required { property } => {
                let name = property
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| property.to_string());
                (format!("{base}.{name}"), "required field missing".to_string())
            }
            _ => (base, violation.to_string()),
        };
        errors.push(ValidationError { path, message });
    }
    Ok(())
}

/// Rewrite a JSON Pointer instance path (`/owner/name`) to the dotted form
/// (`body.owner.name`).
fn dotted_body_path(pointer: &str) -> String {
    let mut path = String::from("body");
    for segment in pointer.split('/').filter(|s| !s.is_empty()) {
        path.push('.');
        path.push_str(&segment.replace("~1", "/").replace("~0", "~"));
    }
    path
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RequestBody;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn contract() -> ResolvedContract {
        ResolvedContract {
            parameters: vec![
                Parameter {
                    name: "petId".into(),
                    location: ParameterLocation::Path,
                    required: true,
                    schema: json!({"type": "string"}),
                },
                Parameter {
                    name: "limit".into(),
                    location: ParameterLocation::Query,
                    required: false,
                    schema: json!({"type": "integer"}),
                },
            ],
            request_body: Some(RequestBody {
                content_type: "application/json".into(),
                required: true,
                schema: json!({
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "kind": {"type": "string", "enum": ["dog", "cat"]}
                    },
                    "required": ["name", "kind"]
                }),
            }),
            responses: BTreeMap::new(),
        }
    }

    #[test]
    fn valid_request_passes() {
        let request = json!({
            "parameters": {"path": {"petId": "42"}},
            "body": {"name": "Rex", "kind": "dog"}
        });
        let report = validate(&contract(), &request).unwrap();
        assert!(report.ok);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn missing_required_parameter() {
        let request = json!({"body": {"name": "Rex", "kind": "dog"}});
        let report = validate(&contract(), &request).unwrap();
        assert!(!report.ok);
        assert_eq!(report.errors[0].path, "params.path.petId");
        assert_eq!(report.errors[0].message, "required parameter missing");
    }

    #[test]
    fn parameter_type_mismatch() {
        let request = json!({
            "parameters": {
                "path": {"petId": "42"},
                "query": {"limit": "ten"}
            },
            "body": {"name": "Rex", "kind": "dog"}
        });
        let report = validate(&contract(), &request).unwrap();
        assert!(!report.ok);
        let error = report
            .errors
            .iter()
            .find(|e| e.path == "params.query.limit")
            .unwrap();
        assert!(error.message.contains("expected integer"));
    }

    #[test]
    fn missing_body_is_reported_once() {
        let request = json!({"parameters": {"path": {"petId": "42"}}});
        let report = validate(&contract(), &request).unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].path, "body");
        assert_eq!(report.errors[0].message, "request body is required");
    }

    #[test]
    fn body_violations_use_dotted_paths() {
        let request = json!({
            "parameters": {"path": {"petId": "42"}},
            "body": {"name": "Rex"}
        });
        let report = validate(&contract(), &request).unwrap();
        assert!(!report.ok);
        let missing = report
            .errors
            .iter()
            .find(|e| e.path == "body.kind")
            .unwrap();
        assert_eq!(missing.message, "required field missing");

        let nested = json!({
            "parameters": {"path": {"petId": "42"}},
            "body": {"name": 7, "kind": "dog"}
        });
        let report = validate(&contract(), &nested).unwrap();
        assert!(report.errors.iter().any(|e| e.path == "body.name"));
    }

    #[test]
    fn body_enum_violation() {
        let request = json!({
            "parameters": {"path": {"petId": "42"}},
            "body": {"name": "Rex", "kind": "hamster"}
        });
        let report = validate(&contract(), &request).unwrap();
        assert!(report.errors.iter().any(|e| e.path == "body.kind"));
    }

    #[test]
    fn errors_are_sorted_by_path() {
        let request = json!({});
        let report = validate(&contract(), &request).unwrap();
        let paths: Vec<&str> = report.errors.iter().map(|e| e.path.as_str()).collect();
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
    }

    #[test]
    fn bare_body_object_is_accepted() {
        let request = json!({"name": "Rex"});
        let report = validate(&contract(), &request).unwrap();
        assert!(report
            .errors
            .iter()
            .any(|e| e.path == "body.kind" && e.message == "required field missing"));
        // The path parameter is still required.
        assert!(report.errors.iter().any(|e| e.path == "params.path.petId"));
    }

    #[test]
    fn optional_parameter_absence_is_fine() {
        let request = json!({
            "parameters": {"path": {"petId": "42"}},
            "body": {"name": "Rex", "kind": "cat"}
        });
        let report = validate(&contract(), &request).unwrap();
        assert!(report.ok);
    }
}
