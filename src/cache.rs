//! Persisted catalog cache.
//!
//! The extracted catalog (metas plus operation records) is written to disk
//! keyed by the specification directory's fingerprint. On startup a cache
//! whose version, resolution mode, and fingerprint all match is restored
//! instead of re-parsing every document; any mismatch or read failure falls
//! back to a full rebuild. The cache is an optimization only, so save
//! failures are logged and swallowed.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::builder;
use crate::config::{EngineConfig, ResolutionMode};
use crate::error::CatalogError;
use crate::loader;
use crate::model::{OperationRecord, SpecMeta};
use crate::snapshot::IndexSnapshot;

const CACHE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheFile {
    version: u32,
    resolution: ResolutionMode,
    fingerprint: String,
    metas: Vec<SpecMeta>,
    records: Vec<OperationRecord>,
}

/// Try to restore a snapshot from the configured cache path. `None` when
/// caching is disabled, the file is absent or unreadable, or the cache no
/// longer matches the directory contents.
pub fn load(config: &EngineConfig) -> Option<Arc<IndexSnapshot>> {
    let path = config.cache_path.as_deref()?;
    let file = read_cache(path)?;

    if file.version != CACHE_VERSION {
        debug!(path = %path.display(), version = file.version, "cache version mismatch");
        return None;
    }
    if file.resolution != config.resolution {
        debug!(path = %path.display(), "cache resolution mode mismatch");
        return None;
    }

    let current = match loader::fingerprint(config.spec_dir(), &config.cache_exclusions()) {
        Ok(fp) => fp,
        Err(err) => {
            warn!(error = %err, "fingerprinting spec directory failed");
            return None;
        }
    };
    if current != file.fingerprint {
        debug!(path = %path.display(), "cache fingerprint stale");
        return None;
    }

    match builder::restore(config, file.records, file.metas, file.fingerprint) {
        Ok(snapshot) => {
            debug!(path = %path.display(), "catalog restored from cache");
            Some(snapshot)
        }
        Err(err) => {
            warn!(error = %err, "cache restore failed");
            None
        }
    }
}

fn read_cache(path: &Path) -> Option<CacheFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(file) => Some(file),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "cache file unreadable");
            None
        }
    }
}

/// Persist a snapshot's catalog. Best-effort: failures are logged, never
/// propagated. The file is written to a sibling temp path and renamed so a
/// concurrent reader never sees a partial cache.
pub fn save(config: &EngineConfig, snapshot: &IndexSnapshot) {
    let Some(path) = config.cache_path.as_deref() else {
        return;
    };

    let file = CacheFile {
        version: CACHE_VERSION,
        resolution: config.resolution,
        fingerprint: snapshot.outcome().fingerprint.clone(),
        metas: snapshot.metas().to_vec(),
        records: snapshot.records().values().cloned().collect(),
    };
    let serialized = match serde_json::to_string(&file) {
        Ok(s) => s,
        Err(err) => {
            warn!(error = %err, "cache serialization failed");
            return;
        }
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!(path = %path.display(), error = %err, "cache directory creation failed");
                return;
            }
        }
    }

    let tmp = path.with_extension("tmp");
    if let Err(err) = std::fs::write(&tmp, serialized) {
        warn!(path = %tmp.display(), error = %err, "cache write failed");
        return;
    }
    if let Err(err) = std::fs::rename(&tmp, path) {
        warn!(path = %path.display(), error = %err, "cache rename failed");
        return;
    }
    debug!(path = %path.display(), "catalog cached");
}

/// Build a snapshot, restoring from cache when possible and refreshing the
/// cache after a fresh build.
pub fn build_or_restore(config: &EngineConfig) -> Result<Arc<IndexSnapshot>, CatalogError> {
    if let Some(snapshot) = load(config) {
        return Ok(snapshot);
    }
    let snapshot = builder::build(config)?;
    save(config, &snapshot);
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn spec_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        let spec = json!({
            "info": {"title": "Pets", "version": "1.0.0"},
            "paths": {
                "/pets": {
                    "post": {
                        "operationId": "createPet",
                        "summary": "Create a pet",
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": {"$ref": "#/components/schemas/Pet"}
                                }
                            }
                        },
                        "responses": {}
                    }
                }
            },
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
        fs::write(
            dir.path().join("pets.json"),
            serde_json::to_string(&spec).unwrap(),
        )
        .unwrap();
        dir
    }

    #[test]
    fn round_trip_restores_catalog() {
        let dir = spec_dir();
        let cache_file = dir.path().join("cache").join("catalog.json");
        let config = EngineConfig::new(dir.path()).cache_path(&cache_file);

        let built = build_or_restore(&config).unwrap();
        assert!(!built.outcome().from_cache);
        assert!(cache_file.exists());

        let restored = build_or_restore(&config).unwrap();
        assert!(restored.outcome().from_cache);
        assert_eq!(restored.outcome().operations, built.outcome().operations);
        assert!(restored.get("pets:createPet").is_some());
    }

    #[test]
    fn restored_snapshot_still_resolves_lazily() {
        let dir = spec_dir();
        let cache_file = dir.path().join("catalog-cache.json");
        let config = EngineConfig::new(dir.path()).cache_path(&cache_file);

        build_or_restore(&config).unwrap();
        let restored = build_or_restore(&config).unwrap();
        assert!(restored.outcome().from_cache);

        // Documents are not persisted; the contract load goes back to disk.
        let contract = restored.contract("pets:createPet").unwrap();
        let schema = &contract.request_body.as_ref().unwrap().schema;
        assert_eq!(schema["properties"]["name"]["type"], "string");
    }

    #[test]
    fn stale_fingerprint_forces_rebuild() {
        let dir = spec_dir();
        let cache_file = dir.path().join("catalog-cache.json");
        let config = EngineConfig::new(dir.path()).cache_path(&cache_file);
        build_or_restore(&config).unwrap();

        // Change the directory contents; size change guarantees a new
        // fingerprint regardless of mtime resolution.
        fs::write(dir.path().join("more.json"), r#"{"paths": {}}"#).unwrap();

        let rebuilt = build_or_restore(&config).unwrap();
        assert!(!rebuilt.outcome().from_cache);
        assert_eq!(rebuilt.outcome().documents, 2);
    }

    #[test]
    fn in_tree_cache_file_is_not_a_document() {
        let dir = spec_dir();
        let cache_file = dir.path().join("catalog-cache.json");
        let config = EngineConfig::new(dir.path()).cache_path(&cache_file);

        let built = build_or_restore(&config).unwrap();
        assert_eq!(built.outcome().documents, 1);
        assert!(cache_file.exists());

        // Writing the cache must not change the fingerprint it is keyed by.
        let restored = build_or_restore(&config).unwrap();
        assert!(restored.outcome().from_cache);
        assert_eq!(restored.outcome().documents, 1);
        assert!(restored
            .metas()
            .iter()
            .all(|m| m.spec_id != "catalog-cache"));
    }

    #[test]
    fn corrupt_cache_is_ignored() {
        let dir = spec_dir();
        let cache_file = dir.path().join("catalog-cache.json");
        fs::write(&cache_file, "definitely not json").unwrap();

        let config = EngineConfig::new(dir.path()).cache_path(&cache_file);
        let snapshot = build_or_restore(&config).unwrap();
        assert!(!snapshot.outcome().from_cache);
    }

    #[test]
    fn resolution_mode_mismatch_is_ignored() {
        let dir = spec_dir();
        let cache_file = dir.path().join("catalog-cache.json");
        let lazy = EngineConfig::new(dir.path()).cache_path(&cache_file);
        build_or_restore(&lazy).unwrap();

        let full = EngineConfig::new(dir.path())
            .cache_path(&cache_file)
            .resolution(ResolutionMode::Full);
        let snapshot = build_or_restore(&full).unwrap();
        assert!(!snapshot.outcome().from_cache);
    }

    #[test]
    fn caching_disabled_without_path() {
        let dir = spec_dir();
        let config = EngineConfig::new(dir.path());
        let snapshot = build_or_restore(&config).unwrap();
        assert!(!snapshot.outcome().from_cache);
        assert!(load(&config).is_none());
    }
}
