//! API Catalog Engine
//!
//! Deterministic indexing, search, and request tooling over a directory of
//! OpenAPI-style specification documents.
//!
//! The engine ingests every JSON/YAML document under a directory, extracts
//! one record per operation, and serves hybrid (BM25 + optional semantic)
//! search, operation lookup with `$ref` resolution, deterministic request
//! synthesis, and request validation. Rebuilds publish a new immutable
//! snapshot atomically; readers are never blocked and never see a partial
//! catalog.
//!
//! # Example
//!
//! ```
//! use api_catalog::{resolve, ResolverOptions};
//! use serde_json::json;
//!
//! let document = json!({
//!     "components": {
//!         "schemas": {
//!             "Pet": {
//!                 "type": "object",
//!                 "properties": { "name": { "type": "string" } },
//!                 "required": ["name"]
//!             }
//!         }
//!     }
//! });
//!
//! let fragment = json!({ "$ref": "#/components/schemas/Pet" });
//! let resolved = resolve(&fragment, &document, &ResolverOptions::default()).unwrap();
//!
//! assert_eq!(resolved["properties"]["name"]["type"], "string");
//! ```
//!
//! # Endpoint identifiers
//!
//! Every operation gets a stable id: `{spec}:{operationId}` when the
//! operation declares one, else `{spec}:{method}:{path}`. The spec id is the
//! file stem, overridable per document via `info.x-spec-id`; collisions get
//! a numeric suffix in load order.

mod builder;
mod cache;
mod config;
mod embeddings;
mod engine;
mod error;
mod loader;
mod model;
mod resolver;
mod search;
mod snapshot;
mod synthesize;
mod validate;

pub use config::{EmbedderSpec, EngineConfig, ResolutionMode};
pub use embeddings::{HashEmbedder, VectorIndex};
pub use engine::CatalogEngine;
pub use error::{CatalogError, SchemaError, ValidationError};
pub use loader::fingerprint;
pub use model::{
    DocumentFailure, OperationRecord, OperationSummary, OperationView, Parameter,
    ParameterBuckets, ParameterLocation, RebuildOutcome, RequestBody, RequestSkeleton,
    SearchResult, SpecMeta, Synthesized, ValidationReport, DEFAULT_AUDIENCE,
};
pub use resolver::{choice_alternatives, navigate_pointer, resolve, ResolvedContract, ResolverOptions};
pub use search::fuse;
pub use synthesize::synthesize;
pub use validate::validate;
