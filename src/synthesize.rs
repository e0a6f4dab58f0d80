//! Deterministic request synthesis.
//!
//! Builds the minimal structurally-plausible request for an operation from
//! its resolved contract and caller-provided field values. Field values are
//! chosen by a fixed precedence: provided value, `const`, `default`,
//! `example`, first `enum` entry, then a type placeholder. A field that fell
//! all the way to a placeholder is reported in `unknown_required_fields` so
//! the caller knows what the skeleton is still missing. Identical inputs
//! always produce byte-identical output.

use serde_json::{json, Map, Value};

use crate::model::{
    OperationRecord, Parameter, ParameterBuckets, ParameterLocation, RequestSkeleton, Synthesized,
};
use crate::resolver::{choice_alternatives, ResolvedContract};

/// Nesting bound for body synthesis. Deeper structures get a sentinel string
/// instead of endless recursion.
const MAX_BODY_DEPTH: usize = 3;
const RECURSION_SENTINEL: &str = "<recursion_limit>";

/// Keys that mark the bucketed provided-fields form.
const BUCKET_KEYS: [&str; 5] = ["params", "path", "query", "header", "body"];

/// Caller-provided field values, either a flat name-to-value map or
/// pre-bucketed location/`body` sections (with or without a `params`
/// wrapper).
struct Provided {
    params: Map<String, Value>,
    body: Map<String, Value>,
    flat: Map<String, Value>,
    bucketed: bool,
}

impl Provided {
    fn parse(provided: &Value) -> Self {
        let map = provided.as_object().cloned().unwrap_or_default();
        let bucketed =
            !map.is_empty() && map.keys().all(|k| BUCKET_KEYS.contains(&k.as_str()));
        if bucketed {
            let mut params = map
                .get("params")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            for location in ["path", "query", "header"] {
                if let Some(bucket) = map.get(location) {
                    params.insert(location.to_string(), bucket.clone());
                }
            }
            let body = map
                .get("body")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            Provided {
                params,
                body,
                flat: Map::new(),
                bucketed: true,
            }
        } else {
            Provided {
                params: Map::new(),
                body: Map::new(),
                flat: map,
                bucketed: false,
            }
        }
    }

    fn parameter(&self, param: &Parameter) -> Option<&Value> {
        if self.bucketed {
            self.params
                .get(param.location.as_str())
                .and_then(Value::as_object)
                .and_then(|bucket| bucket.get(&param.name))
        } else {
            self.flat.get(&param.name)
        }
    }

    fn body_field(&self, name: &str) -> Option<&Value> {
        if self.bucketed {
            self.body.get(name)
        } else {
            self.flat.get(name)
        }
    }

    fn has_body_fields(&self) -> bool {
        if self.bucketed {
            !self.body.is_empty()
        } else {
            !self.flat.is_empty()
        }
    }
}

/// Synthesize a request skeleton for one operation.
pub fn synthesize(
    record: &OperationRecord,
    contract: &ResolvedContract,
    provided: &Value,
) -> Synthesized {
    let provided = Provided::parse(provided);
    let mut unknowns = Vec::new();
    let mut buckets = ParameterBuckets::default();

    for param in &contract.parameters {
        let value = match provided.parameter(param) {
            Some(value) => value.clone(),
            None if param.required => {
                let (value, derived) = schema_value(&param.schema);
                if !derived {
                    unknowns.push(format!(
                        "params.{}.{}",
                        param.location.as_str(),
                        param.name
                    ));
                }
                value
            }
            None => continue,
        };
        bucket_for(&mut buckets, param.location).insert(param.name.clone(), value);
    }

    let (content_type, body) = match &contract.request_body {
        Some(request_body) if request_body.required || provided.has_body_fields() => {
            let body = synthesize_body(&request_body.schema, &provided, "body", 0, &mut unknowns);
            (Some(request_body.content_type.clone()), Some(body))
        }
        _ => (None, None),
    };

    unknowns.sort();
    unknowns.dedup();

    Synthesized {
        endpoint_id: record.endpoint_id.clone(),
        request: RequestSkeleton {
            method: record.method.clone(),
            path: record.path.clone(),
            content_type,
            parameters: buckets,
            body,
        },
        unknown_required_fields: unknowns,
    }
}

fn bucket_for(buckets: &mut ParameterBuckets, location: ParameterLocation) -> &mut Map<String, Value> {
    match location {
        ParameterLocation::Path => &mut buckets.path,
        ParameterLocation::Query => &mut buckets.query,
        // Cookie parameters ride in a header.
        ParameterLocation::Header | ParameterLocation::Cookie => &mut buckets.header,
    }
}

/// Synthesize a body value from a resolved schema. Only the top level
/// consults provided fields; nested objects synthesize from the schema alone.
fn synthesize_body(
    schema: &Value,
    provided: &Provided,
    path: &str,
    depth: usize,
    unknowns: &mut Vec<String>,
) -> Value {
    let schema = select_alternative(schema, provided, depth);

    match schema.get("type").and_then(Value::as_str) {
        Some("object") | None if schema.get("properties").is_some() => {
            synthesize_object(schema, provided, path, depth, unknowns)
        }
        _ => {
            let (value, derived) = schema_value(schema);
            if !derived {
                unknowns.push(path.to_string());
            }
            value
        }
    }
}

fn synthesize_object(
    schema: &Value,
    provided: &Provided,
    path: &str,
    depth: usize,
    unknowns: &mut Vec<String>,
) -> Value {
    if depth >= MAX_BODY_DEPTH {
        return Value::String(RECURSION_SENTINEL.to_string());
    }

    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut body = Map::new();
    for (name, prop_schema) in &properties {
        let field_path = format!("{path}.{name}");
        let provided_value = if depth == 0 { provided.body_field(name) } else { None };

        if let Some(value) = provided_value {
            body.insert(name.clone(), value.clone());
            continue;
        }
        if !required.contains(&name.as_str()) {
            continue;
        }

        let prop_schema = select_alternative(prop_schema, provided, depth + 1);
        let value = if is_object_schema(prop_schema) {
            synthesize_object(prop_schema, provided, &field_path, depth + 1, unknowns)
        } else {
            let (value, derived) = schema_value(prop_schema);
            if !derived {
                unknowns.push(field_path);
            }
            value
        };
        body.insert(name.clone(), value);
    }
    Value::Object(body)
}

fn is_object_schema(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("object")
        || schema.get("properties").is_some()
}

/// Pick one `oneOf`/`anyOf` alternative: the first whose required properties
/// are all provided by the caller, else the first declared.
fn select_alternative<'a>(schema: &'a Value, provided: &Provided, depth: usize) -> &'a Value {
    let Some((_, alternatives)) = choice_alternatives(schema) else {
        return schema;
    };

    if depth == 0 {
        for alternative in alternatives {
            let required = alternative
                .get("required")
                .and_then(Value::as_array)
                .map(|r| r.iter().filter_map(Value::as_str).collect::<Vec<_>>())
                .unwrap_or_default();
            if !required.is_empty()
                && required.iter().all(|name| provided.body_field(name).is_some())
            {
                return alternative;
            }
        }
    }
    &alternatives[0]
}

/// Derive a value from a schema without caller input. The bool is true when
/// the schema itself supplied the value (const, default, example, or enum),
/// false when the value is only a type placeholder.
fn schema_value(schema: &Value) -> (Value, bool) {
    for keyword in ["const", "default", "example"] {
        if let Some(value) = schema.get(keyword) {
            return (value.clone(), true);
        }
    }
    if let Some(first) = schema
        .get("enum")
        .and_then(Value::as_array)
        .and_then(|e| e.first())
    {
        return (first.clone(), true);
    }
    (placeholder(schema), false)
}

/// Format-aware type placeholder.
fn placeholder(schema: &Value) -> Value {
    let schema_type = schema.get("type").and_then(Value::as_str);
    match schema_type {
        Some("string") => match schema.get("format").and_then(Value::as_str) {
            Some("email") => json!("user@example.com"),
            Some("uuid") => json!("00000000-0000-0000-0000-000000000000"),
            Some("date") => json!("1970-01-01"),
            Some("date-time") => json!("1970-01-01T00:00:00Z"),
            Some("uri") | Some("url") => json!("https://example.com"),
            _ => json!("<string>"),
        },
        Some("integer") => json!(0),
        Some("number") => json!(0.0),
        Some("boolean") => json!(false),
        // One element of the item type, so consumers see the shape.
        Some("array") => match schema.get("items") {
            Some(items) if items.is_object() => json!([placeholder(items)]),
            _ => json!([]),
        },
        Some("object") => json!({}),
        _ => json!("<string>"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RequestBody, DEFAULT_AUDIENCE};
    use std::collections::BTreeMap;

    fn record() -> OperationRecord {
        OperationRecord {
            endpoint_id: "pets:createPet".into(),
            spec_id: "pets".into(),
            operation_id: Some("createPet".into()),
            method: "post".into(),
            path: "/pets".into(),
            summary: None,
            description: None,
            tags: vec![],
            audience: DEFAULT_AUDIENCE.into(),
            parameters: vec![],
            request_body: None,
            responses: BTreeMap::new(),
        }
    }

    fn contract_with_body(schema: Value) -> ResolvedContract {
        ResolvedContract {
            parameters: vec![],
            request_body: Some(RequestBody {
                content_type: "application/json".into(),
                required: true,
                schema,
            }),
            responses: BTreeMap::new(),
        }
    }

    fn pet_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "kind": {"type": "string"},
                "nickname": {"type": "string"}
            },
            "required": ["name", "kind"]
        })
    }

    #[test]
    fn provided_fields_pass_through_and_gaps_are_reported() {
        let result = synthesize(
            &record(),
            &contract_with_body(pet_schema()),
            &json!({"name": "Rex"}),
        );

        let body = result.request.body.unwrap();
        assert_eq!(body["name"], "Rex");
        assert_eq!(body["kind"], "<string>");
        assert!(body.get("nickname").is_none());
        assert_eq!(result.unknown_required_fields, vec!["body.kind"]);
    }

    #[test]
    fn bucketed_provided_fields() {
        let mut rec = record();
        rec.parameters = vec![Parameter {
            name: "petId".into(),
            location: ParameterLocation::Path,
            required: true,
            schema: json!({"type": "string"}),
        }];
        let contract = ResolvedContract {
            parameters: rec.parameters.clone(),
            request_body: contract_with_body(pet_schema()).request_body,
            responses: BTreeMap::new(),
        };

        let result = synthesize(
            &rec,
            &contract,
            &json!({
                "params": {"path": {"petId": "42"}},
                "body": {"name": "Rex", "kind": "dog"}
            }),
        );

        assert_eq!(result.request.parameters.path["petId"], "42");
        let body = result.request.body.unwrap();
        assert_eq!(body["kind"], "dog");
        assert!(result.unknown_required_fields.is_empty());
    }

    #[test]
    fn bucketed_form_without_params_wrapper() {
        let result = synthesize(
            &record(),
            &contract_with_body(pet_schema()),
            &json!({"body": {"name": "Rex", "kind": "dog"}}),
        );
        let body = result.request.body.unwrap();
        assert_eq!(body["name"], "Rex");
        assert!(result.unknown_required_fields.is_empty());
    }

    #[test]
    fn array_placeholder_carries_item_shape() {
        let schema = json!({
            "type": "object",
            "properties": {
                "tags": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["tags"]
        });
        let result = synthesize(&record(), &contract_with_body(schema), &json!({}));
        let body = result.request.body.unwrap();
        assert_eq!(body["tags"], json!(["<string>"]));
        assert_eq!(result.unknown_required_fields, vec!["body.tags"]);
    }

    #[test]
    fn schema_defaults_beat_placeholders() {
        let schema = json!({
            "type": "object",
            "properties": {
                "status": {"type": "string", "enum": ["available", "sold"]},
                "count": {"type": "integer", "default": 1},
                "channel": {"const": "api"}
            },
            "required": ["status", "count", "channel"]
        });
        let result = synthesize(&record(), &contract_with_body(schema), &json!({}));

        let body = result.request.body.unwrap();
        assert_eq!(body["status"], "available");
        assert_eq!(body["count"], 1);
        assert_eq!(body["channel"], "api");
        assert!(result.unknown_required_fields.is_empty());
    }

    #[test]
    fn format_aware_placeholders() {
        let schema = json!({
            "type": "object",
            "properties": {
                "email": {"type": "string", "format": "email"},
                "id": {"type": "string", "format": "uuid"},
                "when": {"type": "string", "format": "date-time"},
                "site": {"type": "string", "format": "uri"},
                "active": {"type": "boolean"},
                "score": {"type": "number"}
            },
            "required": ["email", "id", "when", "site", "active", "score"]
        });
        let result = synthesize(&record(), &contract_with_body(schema), &json!({}));

        let body = result.request.body.unwrap();
        assert_eq!(body["email"], "user@example.com");
        assert_eq!(body["id"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(body["when"], "1970-01-01T00:00:00Z");
        assert_eq!(body["site"], "https://example.com");
        assert_eq!(body["active"], false);
        assert_eq!(body["score"], 0.0);
        assert_eq!(result.unknown_required_fields.len(), 6);
    }

    #[test]
    fn required_parameter_without_value_is_unknown() {
        let mut rec = record();
        rec.parameters = vec![Parameter {
            name: "petId".into(),
            location: ParameterLocation::Path,
            required: true,
            schema: json!({"type": "string"}),
        }];
        let contract = ResolvedContract {
            parameters: rec.parameters.clone(),
            request_body: None,
            responses: BTreeMap::new(),
        };

        let result = synthesize(&rec, &contract, &json!({}));
        assert_eq!(result.request.parameters.path["petId"], "<string>");
        assert_eq!(result.unknown_required_fields, vec!["params.path.petId"]);
    }

    #[test]
    fn optional_parameters_appear_only_when_provided() {
        let mut rec = record();
        rec.parameters = vec![Parameter {
            name: "limit".into(),
            location: ParameterLocation::Query,
            required: false,
            schema: json!({"type": "integer"}),
        }];
        let contract = ResolvedContract {
            parameters: rec.parameters.clone(),
            request_body: None,
            responses: BTreeMap::new(),
        };

        let absent = synthesize(&rec, &contract, &json!({}));
        assert!(absent.request.parameters.query.is_empty());

        let present = synthesize(&rec, &contract, &json!({"limit": 5}));
        assert_eq!(present.request.parameters.query["limit"], 5);
    }

    #[test]
    fn optional_body_omitted_without_provided_fields() {
        let mut contract = contract_with_body(pet_schema());
        contract.request_body.as_mut().unwrap().required = false;

        let result = synthesize(&record(), &contract, &json!({}));
        assert!(result.request.body.is_none());
        assert!(result.request.content_type.is_none());
    }

    #[test]
    fn nested_objects_synthesize_required_fields() {
        let schema = json!({
            "type": "object",
            "properties": {
                "owner": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "phone": {"type": "string"}
                    },
                    "required": ["name"]
                }
            },
            "required": ["owner"]
        });
        let result = synthesize(&record(), &contract_with_body(schema), &json!({}));

        let body = result.request.body.unwrap();
        assert_eq!(body["owner"]["name"], "<string>");
        assert!(body["owner"].get("phone").is_none());
        assert_eq!(result.unknown_required_fields, vec!["body.owner.name"]);
    }

    #[test]
    fn recursion_is_capped() {
        let mut deepest = json!({
            "type": "object",
            "properties": {"leaf": {"type": "string"}},
            "required": ["leaf"]
        });
        for _ in 0..5 {
            deepest = json!({
                "type": "object",
                "properties": {"next": deepest},
                "required": ["next"]
            });
        }
        let result = synthesize(&record(), &contract_with_body(deepest), &json!({}));

        let body = result.request.body.unwrap();
        let capped = &body["next"]["next"]["next"];
        assert_eq!(capped, &json!(RECURSION_SENTINEL));
    }

    #[test]
    fn choice_prefers_alternative_matching_provided_shape() {
        let schema = json!({
            "oneOf": [
                {
                    "type": "object",
                    "properties": {"cardNumber": {"type": "string"}},
                    "required": ["cardNumber"]
                },
                {
                    "type": "object",
                    "properties": {"iban": {"type": "string"}},
                    "required": ["iban"]
                }
            ]
        });
        let by_shape = synthesize(
            &record(),
            &contract_with_body(schema.clone()),
            &json!({"iban": "DE89"}),
        );
        assert_eq!(by_shape.request.body.unwrap()["iban"], "DE89");

        // No provided fields: first declared alternative wins.
        let by_order = synthesize(&record(), &contract_with_body(schema), &json!({}));
        let body = by_order.request.body.unwrap();
        assert_eq!(body["cardNumber"], "<string>");
    }

    #[test]
    fn synthesis_is_deterministic() {
        let provided = json!({"name": "Rex"});
        let contract = contract_with_body(pet_schema());
        let a = synthesize(&record(), &contract, &provided);
        let b = synthesize(&record(), &contract, &provided);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
