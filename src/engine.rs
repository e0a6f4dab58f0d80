//! The catalog engine facade.
//!
//! Owns the snapshot store and exposes the public operations: search,
//! operation lookup, synthesis, validation, catalog listing, and refresh.
//! Every operation reads from one atomically-acquired snapshot, so results
//! are internally consistent even while a rebuild publishes a replacement.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, Weak};
use std::thread;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::builder;
use crate::cache;
use crate::config::EngineConfig;
use crate::embeddings::HashEmbedder;
use crate::error::CatalogError;
use crate::model::{
    OperationView, RebuildOutcome, SearchResult, SpecMeta, Synthesized, ValidationReport,
};
use crate::search;
use crate::snapshot::{IndexSnapshot, SnapshotStore};
use crate::synthesize;
use crate::validate;

/// Thread-safe, cloneable handle to the catalog engine.
#[derive(Clone)]
pub struct CatalogEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    store: SnapshotStore,
    /// Serializes rebuilds; queued refreshers coalesce behind the holder.
    rebuild_lock: Mutex<()>,
    refresh_pending: AtomicBool,
    watch_started: AtomicBool,
}

impl CatalogEngine {
    /// Build the engine over a specification directory. The initial build
    /// restores from the persisted cache when its fingerprint still matches.
    ///
    /// # Errors
    ///
    /// Fails when the directory is missing or every document in it is broken.
    pub fn new(config: EngineConfig) -> Result<Self, CatalogError> {
        let snapshot = cache::build_or_restore(&config)?;
        let outcome = snapshot.outcome();
        info!(
            documents = outcome.documents,
            operations = outcome.operations,
            failures = outcome.failures.len(),
            from_cache = outcome.from_cache,
            "catalog ready"
        );

        Ok(CatalogEngine {
            inner: Arc::new(EngineInner {
                config,
                store: SnapshotStore::new(snapshot),
                rebuild_lock: Mutex::new(()),
                refresh_pending: AtomicBool::new(false),
                watch_started: AtomicBool::new(false),
            }),
        })
    }

    /// Hybrid search over the active snapshot. `audience` is a hard filter;
    /// `None` searches every operation.
    pub fn search(
        &self,
        query: &str,
        audience: Option<&str>,
    ) -> Result<Vec<SearchResult>, CatalogError> {
        let config = &self.inner.config;
        let snapshot = self.inner.store.active();

        let lexical_hits =
            snapshot
                .lexical()
                .search(query, audience, config.candidate_pool)?;
        let lexical_ranked: Vec<(String, f32)> = lexical_hits
            .iter()
            .map(|h| (h.endpoint_id.clone(), h.score))
            .collect();
        let snippets: HashMap<&str, Option<&str>> = lexical_hits
            .iter()
            .map(|h| (h.endpoint_id.as_str(), h.snippet.as_deref()))
            .collect();

        let semantic_ranked = match snapshot.vectors() {
            Some(vectors) => {
                let embedder = HashEmbedder::new(config.embedder);
                let query_vector = embedder.embed(query);
                if query_vector.iter().all(|v| *v == 0.0) {
                    Vec::new()
                } else {
                    vectors
                        .search(&query_vector, config.candidate_pool)
                        .into_iter()
                        .filter(|(id, score)| {
                            *score > 0.0
                                && audience.map_or(true, |aud| {
                                    snapshot.get(id).is_some_and(|r| r.audience == aud)
                                })
                        })
                        .collect()
                }
            }
            None => Vec::new(),
        };

        let fused = search::fuse(
            &lexical_ranked,
            &semantic_ranked,
            config.rrf_k,
            config.lexical_weight,
            config.semantic_weight,
        );

        let mut results = Vec::with_capacity(config.result_limit);
        for (endpoint_id, score) in fused {
            if results.len() >= config.result_limit {
                break;
            }
            let Some(record) = snapshot.get(&endpoint_id) else {
                continue;
            };
            results.push(SearchResult {
                endpoint_id: record.endpoint_id.clone(),
                spec_id: record.spec_id.clone(),
                method: record.method.clone(),
                path: record.path.clone(),
                summary: record.summary.clone(),
                tags: record.tags.clone(),
                score,
                match_snippet: snippets
                    .get(endpoint_id.as_str())
                    .and_then(|s| s.map(str::to_string)),
            });
        }
        Ok(results)
    }

    /// Look up one operation. With `full`, the returned record carries the
    /// resolved parameter and body schemas; otherwise a summary projection.
    pub fn get_operation(
        &self,
        endpoint_id: &str,
        full: bool,
    ) -> Result<OperationView, CatalogError> {
        let snapshot = self.inner.store.active();
        let record = snapshot
            .get(endpoint_id)
            .ok_or_else(|| CatalogError::UnknownEndpoint {
                endpoint_id: endpoint_id.to_string(),
            })?;

        if !full {
            return Ok(OperationView::Summary(record.summary_view()));
        }

        let contract = snapshot.contract(endpoint_id)?;
        let mut full_record = record.clone();
        full_record.parameters = contract.parameters.clone();
        full_record.request_body = contract.request_body.clone();
        full_record.responses = contract.responses.clone();
        Ok(OperationView::Full(full_record))
    }

    /// Per-document catalog listing, including failed documents.
    pub fn catalog(&self) -> Vec<SpecMeta> {
        self.inner.store.active().metas().to_vec()
    }

    /// Synthesize a minimal request skeleton for an endpoint.
    pub fn synthesize(
        &self,
        endpoint_id: &str,
        provided: &Value,
    ) -> Result<Synthesized, CatalogError> {
        let snapshot = self.inner.store.active();
        let record = snapshot
            .get(endpoint_id)
            .ok_or_else(|| CatalogError::UnknownEndpoint {
                endpoint_id: endpoint_id.to_string(),
            })?;
        let contract = snapshot.contract(endpoint_id)?;
        Ok(synthesize::synthesize(record, &contract, provided))
    }

    /// Validate a request against an endpoint's resolved contract.
    pub fn validate(
        &self,
        endpoint_id: &str,
        request: &Value,
    ) -> Result<ValidationReport, CatalogError> {
        let snapshot = self.inner.store.active();
        if snapshot.get(endpoint_id).is_none() {
            return Err(CatalogError::UnknownEndpoint {
                endpoint_id: endpoint_id.to_string(),
            });
        }
        let contract = snapshot.contract(endpoint_id)?;
        validate::validate(&contract, request)
    }

    /// The outcome of the rebuild that produced the active snapshot.
    pub fn last_outcome(&self) -> RebuildOutcome {
        self.inner.store.active().outcome().clone()
    }

    /// Rebuild the catalog and publish the result atomically.
    ///
    /// Concurrent refreshes coalesce: callers queued behind an in-flight
    /// rebuild return that rebuild's outcome instead of starting another.
    /// A rebuild that exceeds the configured budget is abandoned, the active
    /// snapshot stays published, and [`CatalogError::RebuildTimeout`] is
    /// returned.
    pub fn refresh(&self) -> Result<RebuildOutcome, CatalogError> {
        self.inner.refresh()
    }

    /// Start the background watch thread. It polls the directory fingerprint
    /// at the configured interval and refreshes when it changes. Idempotent;
    /// the thread exits once the last engine handle is dropped.
    pub fn watch(&self) {
        if self.inner.watch_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let interval = self.inner.config.watch_interval;
        thread::spawn(move || watch_loop(weak, interval));
    }
}

impl EngineInner {
    fn refresh(&self) -> Result<RebuildOutcome, CatalogError> {
        self.refresh_pending.store(true, Ordering::SeqCst);
        let _guard = self.rebuild_lock.lock().expect("rebuild lock poisoned");

        // The rebuild that just finished ahead of us cleared the flag; its
        // outcome is already the active snapshot's.
        if !self.refresh_pending.swap(false, Ordering::SeqCst) {
            return Ok(self.store.active().outcome().clone());
        }

        let snapshot = self.rebuild_with_timeout()?;
        let outcome = snapshot.outcome().clone();
        self.store.publish(snapshot);
        info!(
            documents = outcome.documents,
            operations = outcome.operations,
            failures = outcome.failures.len(),
            "catalog refreshed"
        );
        Ok(outcome)
    }

    fn rebuild_with_timeout(&self) -> Result<Arc<IndexSnapshot>, CatalogError> {
        let budget = self.config.rebuild_timeout;
        let config = self.config.clone();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            // The receiver may have given up; the abandoned result is
            // dropped with the dead channel.
            let _ = tx.send(builder::build(&config));
        });

        match rx.recv_timeout(budget) {
            Ok(result) => {
                let snapshot = result?;
                // Persist only on the receiving side: an abandoned rebuild
                // leaves no cache write behind.
                cache::save(&self.config, &snapshot);
                Ok(snapshot)
            }
            Err(_) => {
                warn!(budget = ?budget, "rebuild exceeded its budget, keeping active snapshot");
                Err(CatalogError::RebuildTimeout { budget })
            }
        }
    }
}

fn watch_loop(weak: Weak<EngineInner>, interval: std::time::Duration) {
    debug!("watch thread started");
    loop {
        thread::sleep(interval);
        let Some(inner) = weak.upgrade() else {
            break;
        };

        let active = inner.store.active().outcome().fingerprint.clone();
        let exclude = inner.config.cache_exclusions();
        match crate::loader::fingerprint(inner.config.spec_dir(), &exclude) {
            Ok(current) if current != active => {
                debug!("specification directory changed");
                if let Err(err) = inner.refresh() {
                    warn!(error = %err, "watch-triggered refresh failed");
                }
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "watch fingerprint failed"),
        }
    }
    debug!("watch thread stopped");
}
