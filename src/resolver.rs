//! Schema resolution.
//!
//! Turns a raw schema fragment into a concrete, navigable tree: local `$ref`
//! pointers are inlined (with cycle detection and a bounded unroll depth),
//! `allOf` branches are merged into one node, `oneOf`/`anyOf` alternatives
//! are kept in declaration order, and missing `type` keywords are inferred.
//! The same input always produces the same output.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::SchemaError;
use crate::model::{OperationRecord, Parameter, RequestBody};

/// Options for schema resolution.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Bound on `$ref` expansion depth. Re-entering a reference past this
    /// limit is a [`SchemaError::CycleDepthExceeded`], never silent
    /// truncation.
    pub max_depth: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        ResolverOptions { max_depth: 32 }
    }
}

/// An operation's contract with every schema resolved.
#[derive(Debug, Clone)]
pub struct ResolvedContract {
    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBody>,
    pub responses: BTreeMap<String, Value>,
}

/// Resolve one schema fragment against its owning document.
///
/// # Errors
///
/// Returns `SchemaError` on dangling pointers, reference cycles that exceed
/// the depth limit, and incompatible `allOf` branches.
pub fn resolve(
    fragment: &Value,
    document: &Value,
    options: &ResolverOptions,
) -> Result<Value, SchemaError> {
    let mut stack = Vec::new();
    resolve_value(fragment, document, options, "", &mut stack)
}

/// Resolve an operation's parameter and body schemas.
pub fn resolve_contract(
    record: &OperationRecord,
    document: &Value,
    options: &ResolverOptions,
) -> Result<ResolvedContract, SchemaError> {
    let mut parameters = Vec::with_capacity(record.parameters.len());
    for param in &record.parameters {
        let path = format!("/parameters/{}", param.name);
        let mut resolved = param.clone();
        resolved.schema = resolve_at(&param.schema, document, options, &path)?;
        parameters.push(resolved);
    }

    let request_body = match &record.request_body {
        Some(body) => {
            let mut resolved = body.clone();
            resolved.schema = resolve_at(&body.schema, document, options, "/requestBody")?;
            Some(resolved)
        }
        None => None,
    };

    let mut responses = BTreeMap::new();
    for (status, response) in &record.responses {
        let path = format!("/responses/{status}");
        responses.insert(
            status.clone(),
            resolve_at(response, document, options, &path)?,
        );
    }

    Ok(ResolvedContract {
        parameters,
        request_body,
        responses,
    })
}

/// `oneOf`/`anyOf` alternatives of a resolved node, declaration order.
pub fn choice_alternatives(schema: &Value) -> Option<(&'static str, &Vec<Value>)> {
    for keyword in ["oneOf", "anyOf"] {
        if let Some(Value::Array(alts)) = schema.get(keyword) {
            if !alts.is_empty() {
                let key = if keyword == "oneOf" { "oneOf" } else { "anyOf" };
                return Some((key, alts));
            }
        }
    }
    None
}

fn resolve_at(
    fragment: &Value,
    document: &Value,
    options: &ResolverOptions,
    path: &str,
) -> Result<Value, SchemaError> {
    let mut stack = Vec::new();
    resolve_value(fragment, document, options, path, &mut stack)
}

fn resolve_value(
    value: &Value,
    document: &Value,
    options: &ResolverOptions,
    path: &str,
    stack: &mut Vec<String>,
) -> Result<Value, SchemaError> {
    match value {
        Value::Object(map) => resolve_object(map, document, options, path, stack),
        Value::Array(arr) => {
            let mut result = Vec::with_capacity(arr.len());
            for (i, item) in arr.iter().enumerate() {
                let item_path = format!("{path}/{i}");
                result.push(resolve_value(item, document, options, &item_path, stack)?);
            }
            Ok(Value::Array(result))
        }
        other => Ok(other.clone()),
    }
}

fn resolve_object(
    map: &Map<String, Value>,
    document: &Value,
    options: &ResolverOptions,
    path: &str,
    stack: &mut Vec<String>,
) -> Result<Value, SchemaError> {
    if let Some(pointer) = map.get("$ref").and_then(|v| v.as_str()) {
        return expand_ref(pointer, map, document, options, path, stack);
    }

    let mut result = Map::new();
    for (key, child) in map {
        let child_path = format!("{path}/{key}");
        let resolved = resolve_value(child, document, options, &child_path, stack)?;
        result.insert(key.clone(), resolved);
    }

    if let Some(Value::Array(_)) = result.get("allOf") {
        let merged = merge_all_of(&result, path)?;
        return Ok(Value::Object(infer_type(merged)));
    }

    Ok(Value::Object(infer_type(result)))
}

fn expand_ref(
    pointer: &str,
    map: &Map<String, Value>,
    document: &Value,
    options: &ResolverOptions,
    path: &str,
    stack: &mut Vec<String>,
) -> Result<Value, SchemaError> {
    if !pointer.starts_with('#') {
        return Err(SchemaError::InvalidSchema {
            path: path.to_string(),
            message: format!("only document-local references are supported, got \"{pointer}\""),
        });
    }

    // A pointer already on the expansion stack is a cycle; bounded unrolling
    // is allowed up to max_depth, then the cycle is reported.
    if stack.len() >= options.max_depth {
        return Err(SchemaError::CycleDepthExceeded {
            pointer: pointer.to_string(),
            limit: options.max_depth,
        });
    }

    let target = navigate_pointer(document, pointer).ok_or_else(|| SchemaError::DanglingRef {
        pointer: pointer.to_string(),
        path: path.to_string(),
    })?;

    stack.push(pointer.to_string());
    let mut resolved = resolve_value(target, document, options, path, stack)?;
    stack.pop();

    // Keywords alongside $ref override the referenced schema's keywords.
    if map.len() > 1 {
        if let Value::Object(ref mut resolved_map) = resolved {
            for (key, sibling) in map {
                if key == "$ref" {
                    continue;
                }
                let sibling_path = format!("{path}/{key}");
                let value = resolve_value(sibling, document, options, &sibling_path, stack)?;
                resolved_map.insert(key.clone(), value);
            }
        }
    }

    Ok(resolved)
}

/// Navigate an RFC 6901 JSON Pointer fragment (`#/components/schemas/Pet`).
pub fn navigate_pointer<'a>(document: &'a Value, pointer: &str) -> Option<&'a Value> {
    let path = pointer.trim_start_matches('#').trim_start_matches('/');
    if path.is_empty() {
        return Some(document);
    }

    let mut current = document;
    for part in path.split('/') {
        let key = part.replace("~1", "/").replace("~0", "~");
        current = match current {
            Value::Object(map) => map.get(&key)?,
            Value::Array(arr) => arr.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Merge resolved `allOf` branches into the owning object: property maps
/// union (later branch wins per key), `required` union sorted, scalar
/// keywords first-wins, incompatible primitive types error.
fn merge_all_of(map: &Map<String, Value>, path: &str) -> Result<Map<String, Value>, SchemaError> {
    let branches = match map.get("allOf") {
        Some(Value::Array(arr)) => arr.clone(),
        _ => Vec::new(),
    };

    let mut merged = Map::new();
    for (key, value) in map {
        if key != "allOf" {
            merged.insert(key.clone(), value.clone());
        }
    }

    let mut properties: Map<String, Value> = merged
        .get("properties")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();
    let mut required: Vec<String> = merged
        .get("required")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    for (i, branch) in branches.iter().enumerate() {
        let Some(branch_map) = branch.as_object() else {
            continue;
        };

        if let (Some(existing), Some(incoming)) = (
            merged.get("type").and_then(|v| v.as_str()),
            branch_map.get("type").and_then(|v| v.as_str()),
        ) {
            if existing != incoming {
                return Err(SchemaError::IncompatibleAllOf {
                    path: format!("{path}/allOf/{i}"),
                    left: existing.to_string(),
                    right: incoming.to_string(),
                });
            }
        }

        for (key, value) in branch_map {
            match key.as_str() {
                "properties" => {
                    if let Some(props) = value.as_object() {
                        for (name, prop) in props {
                            properties.insert(name.clone(), prop.clone());
                        }
                    }
                }
                "required" => {
                    if let Some(arr) = value.as_array() {
                        for item in arr {
                            if let Some(name) = item.as_str() {
                                if !required.iter().any(|r| r == name) {
                                    required.push(name.to_string());
                                }
                            }
                        }
                    }
                }
                _ => {
                    if !merged.contains_key(key) {
                        merged.insert(key.clone(), value.clone());
                    }
                }
            }
        }
    }

    if !properties.is_empty() {
        merged.insert("properties".to_string(), Value::Object(properties));
        merged
            .entry("type")
            .or_insert_with(|| Value::String("object".to_string()));
    }
    if !required.is_empty() {
        required.sort();
        required.dedup();
        merged.insert(
            "required".to_string(),
            Value::Array(required.into_iter().map(Value::String).collect()),
        );
    }

    Ok(merged)
}

/// Infer a missing `type` keyword: `properties` implies object, `items`
/// implies array.
fn infer_type(mut map: Map<String, Value>) -> Map<String, Value> {
    if !map.contains_key("type") {
        if map.get("properties").is_some_and(Value::is_object) {
            map.insert("type".to_string(), Value::String("object".to_string()));
        } else if map.get("items").is_some_and(Value::is_object) {
            map.insert("type".to_string(), Value::String("array".to_string()));
        }
    }
    map
}
