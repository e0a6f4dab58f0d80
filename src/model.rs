//! Core data model for the catalog: operation records, spec metadata,
//! search results, and the structured outputs of synthesis and validation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

/// HTTP methods recognized in path items, in fixed extraction order.
pub const HTTP_METHODS: &[&str] = &[
    "get", "post", "put", "patch", "delete", "options", "head", "trace",
];

/// Audience assigned to operations that carry no `x-audience` extension.
pub const DEFAULT_AUDIENCE: &str = "external";

/// Where a parameter lives in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParameterLocation {
    /// Parse an OpenAPI `in` value. Returns `None` for unknown locations.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "path" => Some(ParameterLocation::Path),
            "query" => Some(ParameterLocation::Query),
            "header" => Some(ParameterLocation::Header),
            "cookie" => Some(ParameterLocation::Cookie),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterLocation::Path => "path",
            ParameterLocation::Query => "query",
            ParameterLocation::Header => "header",
            ParameterLocation::Cookie => "cookie",
        }
    }
}

/// One declared request parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    /// Raw (unresolved) parameter schema fragment.
    pub schema: Value,
}

/// Request body contract for one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody {
    pub content_type: String,
    pub required: bool,
    /// Raw (unresolved) body schema fragment.
    pub schema: Value,
}

/// The catalog's atomic unit: one method+path entry of one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    pub endpoint_id: String,
    pub spec_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub audience: String,
    pub parameters: Vec<Parameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    /// Status code to (raw) response schema.
    pub responses: BTreeMap<String, Value>,
}

impl OperationRecord {
    /// Stable endpoint identifier: `spec:operationId` when the operation
    /// declares one, else `spec:method:path`.
    pub fn endpoint_id_for(spec_id: &str, operation_id: Option<&str>, method: &str, path: &str) -> String {
        match operation_id {
            Some(op_id) => format!("{spec_id}:{op_id}"),
            None => format!("{spec_id}:{method}:{path}"),
        }
    }

    /// Concatenated text used for lexical and semantic indexing.
    pub fn index_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(op_id) = &self.operation_id {
            parts.push(op_id);
        }
        if let Some(summary) = &self.summary {
            parts.push(summary);
        }
        if let Some(description) = &self.description {
            parts.push(description);
        }
        parts.push(&self.method);
        parts.push(&self.path);
        let mut text = parts.join(" ");
        for tag in &self.tags {
            text.push(' ');
            text.push_str(tag);
        }
        text
    }

    /// Reduced projection for `getOperation(full=false)`.
    pub fn summary_view(&self) -> OperationSummary {
        OperationSummary {
            endpoint_id: self.endpoint_id.clone(),
            spec_id: self.spec_id.clone(),
            operation_id: self.operation_id.clone(),
            method: self.method.clone(),
            path: self.path.clone(),
            summary: self.summary.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// Identity-and-summary projection of an [`OperationRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSummary {
    pub endpoint_id: String,
    pub spec_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub tags: Vec<String>,
}

/// Result of `getOperation`, full contract or summary projection.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OperationView {
    Full(OperationRecord),
    Summary(OperationSummary),
}

/// Per-document catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecMeta {
    pub spec_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub file_path: String,
    pub operation_count: usize,
    /// Set when the document failed to index; its operations are absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One ranked search hit. Ephemeral, never persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub endpoint_id: String,
    pub spec_id: String,
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_snippet: Option<String>,
}

/// Parameter buckets of a synthesized request skeleton.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterBuckets {
    pub path: serde_json::Map<String, Value>,
    pub query: serde_json::Map<String, Value>,
    pub header: serde_json::Map<String, Value>,
}

/// Minimal structurally-valid request produced by the synthesizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSkeleton {
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub parameters: ParameterBuckets,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Synthesis output: skeleton plus the required fields the caller still owes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Synthesized {
    pub endpoint_id: String,
    pub request: RequestSkeleton,
    pub unknown_required_fields: Vec<String>,
}

/// Structured validation outcome. `ok` iff `errors` is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    /// Build a report from collected errors, sorting them by (path, message).
    pub fn from_errors(mut errors: Vec<ValidationError>) -> Self {
        errors.sort_by(|a, b| (&a.path, &a.message).cmp(&(&b.path, &b.message)));
        ValidationReport {
            ok: errors.is_empty(),
            errors,
        }
    }
}

/// One document that failed to index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFailure {
    pub spec_id: String,
    pub file_path: String,
    pub error: String,
}

/// Structured outcome of one rebuild, emitted to observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildOutcome {
    /// Documents that indexed successfully.
    pub documents: usize,
    /// Total operation records in the snapshot.
    pub operations: usize,
    pub failures: Vec<DocumentFailure>,
    /// SHA-256 fingerprint of the specification directory.
    pub fingerprint: String,
    /// True when the snapshot was restored from the persisted cache.
    pub from_cache: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn endpoint_id_prefers_operation_id() {
        let id = OperationRecord::endpoint_id_for("pets", Some("createPet"), "post", "/pets");
        assert_eq!(id, "pets:createPet");
    }

    #[test]
    fn endpoint_id_falls_back_to_method_path() {
        let id = OperationRecord::endpoint_id_for("pets", None, "get", "/pets/{petId}");
        assert_eq!(id, "pets:get:/pets/{petId}");
    }

    #[test]
    fn parameter_location_parse() {
        assert_eq!(ParameterLocation::parse("query"), Some(ParameterLocation::Query));
        assert_eq!(ParameterLocation::parse("body"), None);
    }

    #[test]
    fn index_text_includes_tags() {
        let record = OperationRecord {
            endpoint_id: "pets:createPet".into(),
            spec_id: "pets".into(),
            operation_id: Some("createPet".into()),
            method: "post".into(),
            path: "/pets".into(),
            summary: Some("Create a pet".into()),
            description: None,
            tags: vec!["pets".into()],
            audience: DEFAULT_AUDIENCE.into(),
            parameters: Vec::new(),
            request_body: None,
            responses: BTreeMap::new(),
        };
        let text = record.index_text();
        assert!(text.contains("createPet"));
        assert!(text.contains("Create a pet"));
        assert!(text.ends_with("pets"));
    }

    #[test]
    fn validation_report_sorts_errors() {
        let report = ValidationReport::from_errors(vec![
            ValidationError {
                path: "body.name".into(),
                message: "b".into(),
            },
            ValidationError {
                path: "body.kind".into(),
                message: "a".into(),
            },
        ]);
        assert!(!report.ok);
        assert_eq!(report.errors[0].path, "body.kind");
    }

    #[test]
    fn skeleton_round_trips_camel_case() {
        let skeleton = RequestSkeleton {
            method: "post".into(),
            path: "/pets".into(),
            content_type: Some("application/json".into()),
            parameters: ParameterBuckets::default(),
            body: Some(json!({"name": "Rex"})),
        };
        let value = serde_json::to_value(&skeleton).unwrap();
        assert_eq!(value["contentType"], "application/json");
        let back: RequestSkeleton = serde_json::from_value(value).unwrap();
        assert_eq!(back, skeleton);
    }
}
