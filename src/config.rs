//! Engine configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// When `$ref` resolution work happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    /// Resolve per-operation on first access, cached for the snapshot's life.
    #[default]
    Lazy,
    /// Resolve every operation eagerly during catalog build; a resolution
    /// failure excludes that document from the snapshot.
    Full,
}

impl ResolutionMode {
    /// Parse a mode flag. Returns `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "lazy" => Some(ResolutionMode::Lazy),
            "full" => Some(ResolutionMode::Full),
            _ => None,
        }
    }
}

/// Semantic-stage embedder selection.
///
/// The only supported family is the deterministic hash embedder, identified
/// as `hash-<dims>` (e.g. `hash-384`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedderSpec {
    pub dims: usize,
}

impl EmbedderSpec {
    /// Parse an embedding-model identifier. `None` for unknown identifiers
    /// or a zero dimension.
    pub fn parse(model: &str) -> Option<Self> {
        let dims = model.strip_prefix("hash-")?.parse::<usize>().ok()?;
        if dims == 0 {
            return None;
        }
        Some(EmbedderSpec { dims })
    }
}

impl Default for EmbedderSpec {
    fn default() -> Self {
        EmbedderSpec { dims: 384 }
    }
}

/// Configuration for [`CatalogEngine`](crate::engine::CatalogEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory of specification documents.
    pub spec_dir: PathBuf,
    pub resolution: ResolutionMode,
    /// Bound on `$ref` re-entry during resolution.
    pub max_depth: usize,
    /// Enable the semantic search stage.
    pub semantic: bool,
    pub embedder: EmbedderSpec,
    /// Candidate pool size per ranking stage before fusion.
    pub candidate_pool: usize,
    /// Maximum results returned after fusion.
    pub result_limit: usize,
    /// RRF smoothing constant.
    pub rrf_k: f32,
    /// RRF weight of the lexical stage.
    pub lexical_weight: f32,
    /// RRF weight of the semantic stage.
    pub semantic_weight: f32,
    /// Polling interval of the watch thread.
    pub watch_interval: Duration,
    /// Budget for one rebuild; exceeding it abandons the rebuild.
    pub rebuild_timeout: Duration,
    /// Persisted-index location; `None` disables caching.
    pub cache_path: Option<PathBuf>,
}

impl EngineConfig {
    pub fn new(spec_dir: impl Into<PathBuf>) -> Self {
        EngineConfig {
            spec_dir: spec_dir.into(),
            resolution: ResolutionMode::Lazy,
            max_depth: 32,
            semantic: false,
            embedder: EmbedderSpec::default(),
            candidate_pool: 50,
            result_limit: 10,
            rrf_k: 60.0,
            lexical_weight: 0.7,
            semantic_weight: 0.3,
            watch_interval: Duration::from_secs(2),
            rebuild_timeout: Duration::from_secs(30),
            cache_path: None,
        }
    }

    pub fn resolution(mut self, mode: ResolutionMode) -> Self {
        self.resolution = mode;
        self
    }

    pub fn semantic(mut self, enabled: bool) -> Self {
        self.semantic = enabled;
        self
    }

    pub fn embedder(mut self, spec: EmbedderSpec) -> Self {
        self.embedder = spec;
        self
    }

    pub fn result_limit(mut self, limit: usize) -> Self {
        self.result_limit = limit.max(1);
        self
    }

    pub fn watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    pub fn rebuild_timeout(mut self, budget: Duration) -> Self {
        self.rebuild_timeout = budget;
        self
    }

    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn spec_dir(&self) -> &Path {
        &self.spec_dir
    }

    /// Paths discovery and fingerprinting must skip: the cache file and its
    /// temp sibling. The cache may live inside the spec directory without
    /// being picked up as a specification document.
    pub fn cache_exclusions(&self) -> Vec<PathBuf> {
        match &self.cache_path {
            Some(path) => vec![path.clone(), path.with_extension("tmp")],
            None => Vec::new(),
        }
    }
}
