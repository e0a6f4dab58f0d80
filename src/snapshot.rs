//! Immutable index snapshots and the atomic store that publishes them.
//!
//! A rebuild produces one [`IndexSnapshot`]; readers obtain the active
//! snapshot from the [`SnapshotStore`] and keep a consistent view for the
//! whole operation even while a replacement is being published. Publishing
//! is a single atomic pointer swap, so readers never block writers and a
//! failed rebuild never disturbs the active snapshot.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use arc_swap::ArcSwap;
use serde_json::Value;

use crate::config::ResolutionMode;
use crate::error::CatalogError;
use crate::loader::{self, SpecSource};
use crate::model::{OperationRecord, RebuildOutcome, SpecMeta};
use crate::resolver::{self, ResolvedContract, ResolverOptions};
use crate::search::LexicalIndex;
use crate::embeddings::VectorIndex;

/// One fully-built, immutable view of the catalog.
pub struct IndexSnapshot {
    records: BTreeMap<String, OperationRecord>,
    metas: Vec<SpecMeta>,
    outcome: RebuildOutcome,
    lexical: LexicalIndex,
    vectors: Option<VectorIndex>,
    /// Raw documents by spec id. Populated at build time; snapshots restored
    /// from the persisted cache fill entries on first use.
    documents: RwLock<HashMap<String, Arc<Value>>>,
    /// Source file per spec id, for lazy document loads.
    spec_paths: HashMap<String, PathBuf>,
    resolution: ResolutionMode,
    resolver_options: ResolverOptions,
    /// Per-endpoint resolved contracts, filled on first access in lazy mode.
    contracts: RwLock<HashMap<String, Arc<ResolvedContract>>>,
}

impl IndexSnapshot {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        records: BTreeMap<String, OperationRecord>,
        metas: Vec<SpecMeta>,
        outcome: RebuildOutcome,
        lexical: LexicalIndex,
        vectors: Option<VectorIndex>,
        documents: HashMap<String, Arc<Value>>,
        spec_paths: HashMap<String, PathBuf>,
        resolution: ResolutionMode,
        resolver_options: ResolverOptions,
    ) -> Self {
        IndexSnapshot {
            records,
            metas,
            outcome,
            lexical,
            vectors,
            documents: RwLock::new(documents),
            spec_paths,
            resolution,
            resolver_options,
            contracts: RwLock::new(HashMap::new()),
        }
    }

    pub fn records(&self) -> &BTreeMap<String, OperationRecord> {
        &self.records
    }

    pub fn get(&self, endpoint_id: &str) -> Option<&OperationRecord> {
        self.records.get(endpoint_id)
    }

    pub fn metas(&self) -> &[SpecMeta] {
        &self.metas
    }

    pub fn outcome(&self) -> &RebuildOutcome {
        &self.outcome
    }

    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    pub fn vectors(&self) -> Option<&VectorIndex> {
        self.vectors.as_ref()
    }

    /// The resolved request contract for an endpoint.
    ///
    /// In full mode the record's schemas were resolved at build time and the
    /// contract is assembled directly. In lazy mode the first access resolves
    /// against the owning document and the result is cached for the life of
    /// this snapshot, so repeated calls return identical structures.
    pub fn contract(&self, endpoint_id: &str) -> Result<Arc<ResolvedContract>, CatalogError> {
        if let Some(cached) = self.contracts.read().expect("contract cache poisoned").get(endpoint_id) {
            return Ok(Arc::clone(cached));
        }

        let record = self
            .records
            .get(endpoint_id)
            .ok_or_else(|| CatalogError::UnknownEndpoint {
                endpoint_id: endpoint_id.to_string(),
            })?;

        let contract = match self.resolution {
            ResolutionMode::Full => ResolvedContract {
                parameters: record.parameters.clone(),
                request_body: record.request_body.clone(),
                responses: record.responses.clone(),
            },
            ResolutionMode::Lazy => {
                let document = self.document(&record.spec_id)?;
                resolver::resolve_contract(record, &document, &self.resolver_options)?
            }
        };

        let contract = Arc::new(contract);
        self.contracts
            .write()
            .expect("contract cache poisoned")
            .insert(endpoint_id.to_string(), Arc::clone(&contract));
        Ok(contract)
    }

    /// The raw document for a spec id, loading it from disk if this snapshot
    /// was restored from the cache without documents in memory.
    fn document(&self, spec_id: &str) -> Result<Arc<Value>, CatalogError> {
        if let Some(doc) = self.documents.read().expect("document cache poisoned").get(spec_id) {
            return Ok(Arc::clone(doc));
        }

        let path = self
            .spec_paths
            .get(spec_id)
            .ok_or_else(|| CatalogError::UnknownEndpoint {
                endpoint_id: spec_id.to_string(),
            })?;
        let source = SpecSource {
            path: path.clone(),
            relative_path: path.to_string_lossy().into_owned(),
        };
        let raw = Arc::new(loader::parse(&source)?);
        self.documents
            .write()
            .expect("document cache poisoned")
            .insert(spec_id.to_string(), Arc::clone(&raw));
        Ok(raw)
    }
}

/// Lock-free handle to the active snapshot.
///
/// Readers call [`active`](SnapshotStore::active) and hold the returned `Arc`
/// for the duration of one operation; [`publish`](SnapshotStore::publish)
/// swaps in a replacement without ever blocking them.
pub struct SnapshotStore {
    inner: ArcSwap<IndexSnapshot>,
}

impl SnapshotStore {
    pub fn new(initial: Arc<IndexSnapshot>) -> Self {
        SnapshotStore {
            inner: ArcSwap::from(initial),
        }
    }

    pub fn active(&self) -> Arc<IndexSnapshot> {
        self.inner.load_full()
    }

    pub fn publish(&self, snapshot: Arc<IndexSnapshot>) {
        self.inner.store(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DEFAULT_AUDIENCE, Parameter, ParameterLocation, RequestBody};
    use serde_json::json;

    fn pet_record(document_schema: Value) -> OperationRecord {
        OperationRecord {
            endpoint_id: "pets:createPet".into(),
            spec_id: "pets".into(),
            operation_id: Some("createPet".into()),
            method: "post".into(),
            path: "/pets".into(),
            summary: Some("Create a pet".into()),
            description: None,
            tags: vec![],
            audience: DEFAULT_AUDIENCE.into(),
            parameters: vec![Parameter {
                name: "trace".into(),
                location: ParameterLocation::Header,
                required: false,
                schema: json!({"type": "string"}),
            }],
            request_body: Some(RequestBody {
                content_type: "application/json".into(),
                required: true,
                schema: document_schema,
            }),
            responses: BTreeMap::new(),
        }
    }

    fn snapshot_with(record: OperationRecord, document: Value, mode: ResolutionMode) -> IndexSnapshot {
        let mut records = BTreeMap::new();
        records.insert(record.endpoint_id.clone(), record);
        let lexical = LexicalIndex::build(records.values()).unwrap();
        let mut documents = HashMap::new();
        documents.insert("pets".to_string(), Arc::new(document));

        IndexSnapshot::new(
            records,
            Vec::new(),
            RebuildOutcome {
                documents: 1,
                operations: 1,
                failures: Vec::new(),
                fingerprint: "test".into(),
                from_cache: false,
            },
            lexical,
            None,
            documents,
            HashMap::new(),
            mode,
            ResolverOptions::default(),
        )
    }

    #[test]
    fn lazy_contract_resolves_refs_once() {
        let document = json!({
            "components": {
                "schemas": {
                    "Pet": {
                        "type": "object",
                        "properties": {"name": {"type": "string"}},
                        "required": ["name"]
                    }
                }
            }
        });
        let record = pet_record(json!({"$ref": "#/components/schemas/Pet"}));
        let snapshot = snapshot_with(record, document, ResolutionMode::Lazy);

        let first = snapshot.contract("pets:createPet").unwrap();
        let body = first.request_body.as_ref().unwrap();
        assert_eq!(body.schema["properties"]["name"]["type"], "string");

        // Second access comes from the cache: same Arc.
        let second = snapshot.contract("pets:createPet").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn full_mode_uses_record_schemas_directly() {
        let resolved = json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        });
        let record = pet_record(resolved.clone());
        let snapshot = snapshot_with(record, json!({}), ResolutionMode::Full);

        let contract = snapshot.contract("pets:createPet").unwrap();
        assert_eq!(contract.request_body.as_ref().unwrap().schema, resolved);
    }

    #[test]
    fn unknown_endpoint_is_an_error() {
        let record = pet_record(json!({"type": "object"}));
        let snapshot = snapshot_with(record, json!({}), ResolutionMode::Full);
        assert!(matches!(
            snapshot.contract("pets:nope"),
            Err(CatalogError::UnknownEndpoint { .. })
        ));
    }

    #[test]
    fn store_swaps_atomically() {
        let a = Arc::new(snapshot_with(
            pet_record(json!({"type": "object"})),
            json!({}),
            ResolutionMode::Full,
        ));
        let store = SnapshotStore::new(Arc::clone(&a));

        // A reader holding the old snapshot keeps it across a publish.
        let held = store.active();
        let mut replacement_record = pet_record(json!({"type": "object"}));
        replacement_record.endpoint_id = "pets:listPets".into();
        replacement_record.operation_id = Some("listPets".into());
        let b = Arc::new(snapshot_with(replacement_record, json!({}), ResolutionMode::Full));
        store.publish(Arc::clone(&b));

        assert!(held.get("pets:createPet").is_some());
        assert!(store.active().get("pets:listPets").is_some());
        assert!(store.active().get("pets:createPet").is_none());
    }
}
