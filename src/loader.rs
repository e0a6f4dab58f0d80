//! Specification document loading.
//!
//! Discovers specification files under a directory, parses JSON/YAML into
//! `serde_json::Value`, assigns stable spec ids, and fingerprints the
//! directory contents for cache keying and change detection.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::CatalogError;

/// A discovered specification file, not yet parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSource {
    pub path: PathBuf,
    /// Path relative to the spec directory, with `/` separators.
    pub relative_path: String,
}

/// A parsed, immutable specification document.
#[derive(Debug, Clone)]
pub struct SpecDocument {
    pub spec_id: String,
    pub path: PathBuf,
    pub relative_path: String,
    pub raw: Value,
}

/// Enumerate specification files under `spec_dir`, sorted lexicographically
/// by relative path. Load order (and therefore duplicate-endpoint
/// tie-breaking) is stable across rebuilds.
///
/// Paths in `exclude` are skipped even when their extension matches; the
/// persisted cache file may live inside the spec directory.
///
/// # Errors
///
/// Returns `CatalogError::SpecDirNotFound` if the directory doesn't exist.
pub fn discover(spec_dir: &Path, exclude: &[PathBuf]) -> Result<Vec<SpecSource>, CatalogError> {
    if !spec_dir.is_dir() {
        return Err(CatalogError::SpecDirNotFound {
            path: spec_dir.to_path_buf(),
        });
    }

    let mut sources = Vec::new();
    walk(spec_dir, spec_dir, exclude, &mut sources)?;
    sources.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(sources)
}

fn walk(
    root: &Path,
    dir: &Path,
    exclude: &[PathBuf],
    out: &mut Vec<SpecSource>,
) -> Result<(), CatalogError> {
    let entries = std::fs::read_dir(dir).map_err(|source| CatalogError::ReadError {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| CatalogError::ReadError {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if is_excluded(&path, exclude) {
            continue;
        }
        if path.is_dir() {
            walk(root, &path, exclude, out)?;
        } else if is_spec_file(&path) {
            out.push(SpecSource {
                relative_path: relative_to(&path, root),
                path,
            });
        }
    }
    Ok(())
}

/// Compare against exclusions as given, falling back to canonical forms so a
/// relative spec dir still matches an absolute cache path.
fn is_excluded(path: &Path, exclude: &[PathBuf]) -> bool {
    exclude.iter().any(|excluded| {
        excluded == path
            || match (excluded.canonicalize(), path.canonicalize()) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            }
    })
}

fn is_spec_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("json") | Some("yaml") | Some("yml")
    )
}

fn relative_to(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Parse one specification file. JSON for `.json`, YAML otherwise.
///
/// # Errors
///
/// Returns `CatalogError::ReadError` on I/O failure and
/// `CatalogError::DocumentParse` on malformed content.
pub fn parse(source: &SpecSource) -> Result<Value, CatalogError> {
    let content = std::fs::read_to_string(&source.path).map_err(|err| CatalogError::ReadError {
        path: source.path.clone(),
        source: err,
    })?;

    let is_json = source
        .path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let raw: Value = if is_json {
        serde_json::from_str(&content).map_err(|e| CatalogError::DocumentParse {
            path: source.path.clone(),
            message: e.to_string(),
        })?
    } else {
        serde_yaml::from_str(&content).map_err(|e| CatalogError::DocumentParse {
            path: source.path.clone(),
            message: e.to_string(),
        })?
    };

    if !raw.is_object() {
        return Err(CatalogError::DocumentParse {
            path: source.path.clone(),
            message: "document root is not an object".to_string(),
        });
    }

    Ok(raw)
}

/// Derive the spec id for a document: the `info.x-spec-id` override when
/// present, else the file stem. `used` tracks ids already taken in load
/// order; collisions get a `-2`, `-3`… suffix.
pub fn assign_spec_id(source: &SpecSource, raw: &Value, used: &mut HashSet<String>) -> String {
    let base = spec_id_override(raw).unwrap_or_else(|| default_spec_id(&source.path));
    let id = ensure_unique(base, used);
    used.insert(id.clone());
    id
}

/// The spec id used for a file that failed to parse (no override available).
pub fn fallback_spec_id(source: &SpecSource) -> String {
    default_spec_id(&source.path)
}

fn default_spec_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "spec".to_string())
}

fn spec_id_override(raw: &Value) -> Option<String> {
    let id = raw.get("info")?.get("x-spec-id")?.as_str()?.trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

fn ensure_unique(base: String, used: &HashSet<String>) -> String {
    if !used.contains(&base) {
        return base;
    }
    let mut suffix = 2;
    loop {
        let candidate = format!("{base}-{suffix}");
        if !used.contains(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

/// SHA-256 fingerprint of the specification directory: relative path, size,
/// and mtime of every spec file, in sorted order. A cache keyed by this value
/// is never reused for a different specification set. `exclude` must carry
/// the same exclusions as discovery so writing the cache file never changes
/// the fingerprint it is keyed by.
pub fn fingerprint(spec_dir: &Path, exclude: &[PathBuf]) -> Result<String, CatalogError> {
    let sources = discover(spec_dir, exclude)?;
    let mut hasher = Sha256::new();
    for source in &sources {
        let meta = std::fs::metadata(&source.path).map_err(|err| CatalogError::ReadError {
            path: source.path.clone(),
            source: err,
        })?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        hasher.update(source.relative_path.as_bytes());
        hasher.update([0u8]);
        hasher.update(meta.len().to_le_bytes());
        hasher.update(mtime.to_le_bytes());
    }
    let digest = hasher.finalize();
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}
