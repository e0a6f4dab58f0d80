//! Catalog construction.
//!
//! Turns a directory of specification documents into an [`IndexSnapshot`]:
//! documents are parsed in parallel, operations are extracted per path item,
//! full-mode resolution runs per document, and the lexical (plus optional
//! semantic) indexes are built over the merged record set. A document that
//! fails to parse or resolve is recorded as a failure and excluded; the rest
//! of the catalog is unaffected.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{EngineConfig, ResolutionMode};
use crate::embeddings::{HashEmbedder, VectorIndex};
use crate::error::CatalogError;
use crate::loader::{self, SpecSource};
use crate::model::{
    DocumentFailure, OperationRecord, Parameter, ParameterLocation, RebuildOutcome, RequestBody,
    SpecMeta, DEFAULT_AUDIENCE, HTTP_METHODS,
};
use crate::resolver::{self, ResolverOptions};
use crate::search::LexicalIndex;
use crate::snapshot::IndexSnapshot;

/// One document's contribution to the snapshot.
struct BuiltDocument {
    meta: SpecMeta,
    records: Vec<OperationRecord>,
    raw: Option<Arc<Value>>,
    path: PathBuf,
}

/// Build a fresh snapshot from the configured specification directory.
///
/// # Errors
///
/// Fails on a missing spec directory, on index construction errors, and with
/// [`CatalogError::EmptyCatalog`] when every discovered document failed.
pub fn build(config: &EngineConfig) -> Result<Arc<IndexSnapshot>, CatalogError> {
    let exclude = config.cache_exclusions();
    let sources = loader::discover(config.spec_dir(), &exclude)?;
    let fingerprint = loader::fingerprint(config.spec_dir(), &exclude)?;

    let parsed: Vec<Result<Value, CatalogError>> =
        sources.par_iter().map(loader::parse).collect();

    // Id assignment is order-dependent, so it stays sequential; extraction
    // then fans back out per document. Collect keeps the stable file order.
    let mut used_ids = HashSet::new();
    let inputs: Vec<(&SpecSource, Result<(String, Value), String>)> = sources
        .iter()
        .zip(parsed)
        .map(|(source, outcome)| match outcome {
            Ok(raw) => {
                let spec_id = loader::assign_spec_id(source, &raw, &mut used_ids);
                (source, Ok((spec_id, raw)))
            }
            Err(err) => (source, Err(err.to_string())),
        })
        .collect();

    let mut documents: Vec<BuiltDocument> = inputs
        .into_par_iter()
        .map(|(source, outcome)| match outcome {
            Ok((spec_id, raw)) => ingest_document(source, spec_id, raw),
            Err(error) => failed_document(source, loader::fallback_spec_id(source), error),
        })
        .collect();

    let resolver_options = ResolverOptions {
        max_depth: config.max_depth,
    };
    if config.resolution == ResolutionMode::Full {
        documents
            .par_iter_mut()
            .for_each(|doc| resolve_document(doc, &resolver_options));
    }

    assemble(config, documents, fingerprint, false)
}

/// Assemble a snapshot from built documents. Shared between fresh builds and
/// cache restores (which pass records without raw documents).
fn assemble(
    config: &EngineConfig,
    documents: Vec<BuiltDocument>,
    fingerprint: String,
    from_cache: bool,
) -> Result<Arc<IndexSnapshot>, CatalogError> {
    let mut records: BTreeMap<String, OperationRecord> = BTreeMap::new();
    let mut metas = Vec::with_capacity(documents.len());
    let mut failures = Vec::new();
    let mut raw_documents = HashMap::new();
    let mut spec_paths = HashMap::new();

    for doc in documents {
        if let Some(error) = &doc.meta.error {
            warn!(
                spec_id = %doc.meta.spec_id,
                file = %doc.meta.file_path,
                error = %error,
                "document excluded from catalog"
            );
            failures.push(DocumentFailure {
                spec_id: doc.meta.spec_id.clone(),
                file_path: doc.meta.file_path.clone(),
                error: error.clone(),
            });
        } else {
            if let Some(raw) = doc.raw {
                raw_documents.insert(doc.meta.spec_id.clone(), raw);
            }
            spec_paths.insert(doc.meta.spec_id.clone(), doc.path);
            // Later documents win duplicate endpoint ids; load order is the
            // sorted relative path order.
            for record in doc.records {
                records.insert(record.endpoint_id.clone(), record);
            }
        }
        metas.push(doc.meta);
    }

    let succeeded = metas.iter().filter(|m| m.error.is_none()).count();
    if succeeded == 0 && !failures.is_empty() {
        return Err(CatalogError::EmptyCatalog {
            failures: failures.len(),
        });
    }

    let lexical = LexicalIndex::build(records.values())?;
    let vectors = if config.semantic {
        let embedder = HashEmbedder::new(config.embedder);
        let mut index = VectorIndex::new(embedder.dims());
        for record in records.values() {
            index.insert(record.endpoint_id.clone(), embedder.embed(&record.index_text()));
        }
        Some(index)
    } else {
        None
    };

    let outcome = RebuildOutcome {
        documents: succeeded,
        operations: records.len(),
        failures,
        fingerprint,
        from_cache,
    };
    debug!(
        documents = outcome.documents,
        operations = outcome.operations,
        failures = outcome.failures.len(),
        "catalog assembled"
    );

    Ok(Arc::new(IndexSnapshot::new(
        records,
        metas,
        outcome,
        lexical,
        vectors,
        raw_documents,
        spec_paths,
        config.resolution,
        ResolverOptions {
            max_depth: config.max_depth,
        },
    )))
}

/// Rebuild a snapshot from persisted catalog state. Raw documents are not
/// rehydrated; lazy resolution reloads them from disk on demand.
pub(crate) fn restore(
    config: &EngineConfig,
    records: Vec<OperationRecord>,
    metas: Vec<SpecMeta>,
    fingerprint: String,
) -> Result<Arc<IndexSnapshot>, CatalogError> {
    let spec_dir = config.spec_dir().to_path_buf();
    let mut by_spec: HashMap<String, Vec<OperationRecord>> = HashMap::new();
    for record in records {
        by_spec.entry(record.spec_id.clone()).or_default().push(record);
    }

    let documents = metas
        .into_iter()
        .map(|meta| {
            let records = by_spec.remove(&meta.spec_id).unwrap_or_default();
            let path = spec_dir.join(&meta.file_path);
            BuiltDocument {
                meta,
                records,
                raw: None,
                path,
            }
        })
        .collect();

    assemble(config, documents, fingerprint, true)
}

fn failed_document(source: &SpecSource, spec_id: String, error: String) -> BuiltDocument {
    BuiltDocument {
        meta: SpecMeta {
            spec_id,
            title: None,
            version: None,
            description: None,
            file_path: source.relative_path.clone(),
            operation_count: 0,
            error: Some(error),
        },
        records: Vec::new(),
        raw: None,
        path: source.path.clone(),
    }
}

fn ingest_document(source: &SpecSource, spec_id: String, raw: Value) -> BuiltDocument {
    let records = extract_operations(&spec_id, &raw);
    let info = raw.get("info");
    let meta = SpecMeta {
        spec_id,
        title: info.and_then(|i| i.get("title")).and_then(Value::as_str).map(str::to_string),
        version: info.and_then(|i| i.get("version")).and_then(Value::as_str).map(str::to_string),
        description: info
            .and_then(|i| i.get("description"))
            .and_then(Value::as_str)
            .map(str::to_string),
        file_path: source.relative_path.clone(),
        operation_count: records.len(),
        error: None,
    };
    BuiltDocument {
        meta,
        records,
        raw: Some(Arc::new(raw)),
        path: source.path.clone(),
    }
}

/// Extract one record per method+path entry, in a deterministic order.
pub(crate) fn extract_operations(spec_id: &str, raw: &Value) -> Vec<OperationRecord> {
    let mut records = Vec::new();
    let Some(paths) = raw.get("paths").and_then(Value::as_object) else {
        return records;
    };

    for (path, path_item) in paths {
        let Some(path_item) = deref_node(path_item, raw).as_object() else {
            continue;
        };
        let shared_parameters = parameter_list(path_item.get("parameters"), raw);

        for method in HTTP_METHODS {
            let Some(op) = path_item.get(*method) else {
                continue;
            };
            let Some(op) = op.as_object() else {
                continue;
            };

            let operation_id = op
                .get("operationId")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            let endpoint_id =
                OperationRecord::endpoint_id_for(spec_id, operation_id.as_deref(), method, path);

            let own_parameters = parameter_list(op.get("parameters"), raw);
            let parameters = merge_parameters(shared_parameters.clone(), own_parameters);

            let mut tags: Vec<String> = op
                .get("tags")
                .and_then(Value::as_array)
                .map(|tags| {
                    tags.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            tags.sort();
            tags.dedup();

            records.push(OperationRecord {
                endpoint_id,
                spec_id: spec_id.to_string(),
                operation_id,
                method: (*method).to_string(),
                path: path.clone(),
                summary: op.get("summary").and_then(Value::as_str).map(str::to_string),
                description: op
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                tags,
                audience: op
                    .get("x-audience")
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_AUDIENCE)
                    .to_string(),
                parameters,
                request_body: extract_body(op.get("requestBody"), raw),
                responses: extract_responses(op.get("responses"), raw),
            });
        }
    }

    records.sort_by(|a, b| (&a.path, &a.method).cmp(&(&b.path, &b.method)));
    records
}

/// Follow a top-level `$ref` on a node. Parameters, bodies, and responses may
/// be declared as references into `components`.
fn deref_node<'a>(node: &'a Value, document: &'a Value) -> &'a Value {
    if let Some(pointer) = node.get("$ref").and_then(Value::as_str) {
        if let Some(target) = pointer
            .strip_prefix('#')
            .and_then(|p| resolver::navigate_pointer(document, p))
        {
            return target;
        }
    }
    node
}

fn parameter_list(node: Option<&Value>, document: &Value) -> Vec<Parameter> {
    let Some(items) = node.and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut parameters = Vec::new();
    for item in items {
        let item = deref_node(item, document);
        let Some(name) = item.get("name").and_then(Value::as_str) else {
            continue;
        };
        let Some(location) = item
            .get("in")
            .and_then(Value::as_str)
            .and_then(ParameterLocation::parse)
        else {
            continue;
        };
        // Path parameters are always required regardless of the declaration.
        let required = location == ParameterLocation::Path
            || item.get("required").and_then(Value::as_bool).unwrap_or(false);
        parameters.push(Parameter {
            name: name.to_string(),
            location,
            required,
            schema: item.get("schema").cloned().unwrap_or(Value::Object(Default::default())),
        });
    }
    parameters
}

/// Merge path-item and operation parameters. An operation-level declaration
/// replaces a shared one with the same (name, location); output is ordered by
/// (location, name).
fn merge_parameters(shared: Vec<Parameter>, own: Vec<Parameter>) -> Vec<Parameter> {
    let mut merged: Vec<Parameter> = Vec::with_capacity(shared.len() + own.len());
    for param in shared.into_iter().chain(own) {
        if let Some(existing) = merged
            .iter_mut()
            .find(|p| p.name == param.name && p.location == param.location)
        {
            *existing = param;
        } else {
            merged.push(param);
        }
    }
    merged.sort_by(|a, b| (a.location, &a.name).cmp(&(b.location, &b.name)));
    merged
}

/// Pick the request body contract: `application/json` when declared, else the
/// lexicographically first content type.
fn extract_body(node: Option<&Value>, document: &Value) -> Option<RequestBody> {
    let body = deref_node(node?, document).as_object()?;
    let content = body.get("content")?.as_object()?;

    let content_type = if content.contains_key("application/json") {
        "application/json".to_string()
    } else {
        let mut keys: Vec<&String> = content.keys().collect();
        keys.sort();
        keys.first()?.to_string()
    };
    let schema = content
        .get(&content_type)
        .and_then(|media| media.get("schema"))
        .cloned()
        .unwrap_or(Value::Object(Default::default()));

    Some(RequestBody {
        content_type,
        required: body.get("required").and_then(Value::as_bool).unwrap_or(false),
        schema,
    })
}

fn extract_responses(node: Option<&Value>, document: &Value) -> BTreeMap<String, Value> {
    let mut responses = BTreeMap::new();
    let Some(map) = node.and_then(Value::as_object) else {
        return responses;
    };
    for (status, response) in map {
        responses.insert(status.clone(), deref_node(response, document).clone());
    }
    responses
}

/// Resolve every record's contract in place. A single resolution failure
/// excludes the whole document.
fn resolve_document(doc: &mut BuiltDocument, options: &ResolverOptions) {
    if doc.meta.error.is_some() {
        return;
    }
    let Some(raw) = doc.raw.clone() else {
        return;
    };

    for record in &mut doc.records {
        match resolver::resolve_contract(record, &raw, options) {
            Ok(contract) => {
                record.parameters = contract.parameters;
                record.request_body = contract.request_body;
                record.responses = contract.responses;
            }
            Err(err) => {
                doc.meta.error = Some(err.to_string());
                doc.meta.operation_count = 0;
                doc.records.clear();
                return;
            }
        }
    }
}
