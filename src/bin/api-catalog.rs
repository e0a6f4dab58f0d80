//! API Catalog CLI
//!
//! Command-line interface over the catalog engine: index a specification
//! directory, search it, and generate or validate requests.

use std::path::PathBuf;
use std::process::ExitCode;

use api_catalog::{
    CatalogEngine, CatalogError, EmbedderSpec, EngineConfig, ResolutionMode,
};
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "api-catalog")]
#[command(about = "Index, search, and exercise a directory of API specifications")]
#[command(version)]
struct Cli {
    /// Directory of specification documents (.json, .yaml, .yml)
    #[arg(long, global = true, default_value = "./specs")]
    spec_dir: PathBuf,

    /// Schema resolution mode: lazy (on first access) or full (at build)
    #[arg(long, global = true, default_value = "lazy")]
    deref: String,

    /// Enable the semantic search stage
    #[arg(long, global = true)]
    semantic: bool,

    /// Embedding model for the semantic stage (e.g. hash-384)
    #[arg(long, global = true)]
    embedder: Option<String>,

    /// Persisted catalog cache file
    #[arg(long, global = true)]
    cache: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the catalog and report the outcome
    Index,

    /// List every indexed document, including failures
    Catalog,

    /// Hybrid search over the catalog
    Search {
        /// Free-text query
        query: String,

        /// Restrict results to one audience (e.g. external, internal)
        #[arg(long)]
        audience: Option<String>,

        /// Maximum number of results
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Look up one operation by endpoint id
    Get {
        /// Endpoint id (spec:operationId or spec:method:path)
        endpoint_id: String,

        /// Return the full record with resolved schemas
        #[arg(long)]
        full: bool,
    },

    /// Generate a minimal request skeleton for an endpoint
    Generate {
        /// Endpoint id
        endpoint_id: String,

        /// Provided field values as inline JSON (flat or params/body buckets)
        #[arg(long, default_value = "{}")]
        fields: String,
    },

    /// Validate a request file against an endpoint's contract
    Validate {
        /// Endpoint id
        endpoint_id: String,

        /// Request JSON file with parameters buckets and body
        request: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn run(cli: Cli) -> Result<(), u8> {
    let config = build_config(&cli)?;
    let pretty = cli.pretty;

    let engine = CatalogEngine::new(config).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    match cli.command {
        Commands::Index => emit(&engine.last_outcome(), pretty),
        Commands::Catalog => emit(&engine.catalog(), pretty),

        Commands::Search {
            query,
            audience,
            limit,
        } => {
            let results = engine
                .search(&query, audience.as_deref())
                .map_err(catalog_error)?;
            let limited: Vec<_> = results.into_iter().take(limit).collect();
            emit(&limited, pretty)
        }

        Commands::Get { endpoint_id, full } => {
            let view = engine
                .get_operation(&endpoint_id, full)
                .map_err(catalog_error)?;
            emit(&view, pretty)
        }

        Commands::Generate {
            endpoint_id,
            fields,
        } => {
            let provided: Value = serde_json::from_str(&fields).map_err(|e| {
                eprintln!("Error parsing --fields: {}", e);
                2u8
            })?;
            let synthesized = engine
                .synthesize(&endpoint_id, &provided)
                .map_err(catalog_error)?;
            emit(&synthesized, pretty)
        }

        Commands::Validate {
            endpoint_id,
            request,
        } => {
            let content = std::fs::read_to_string(&request).map_err(|e| {
                eprintln!("Error reading {}: {}", request.display(), e);
                3u8
            })?;
            let request: Value = serde_json::from_str(&content).map_err(|e| {
                eprintln!("Error parsing request: {}", e);
                2u8
            })?;

            let report = engine
                .validate(&endpoint_id, &request)
                .map_err(catalog_error)?;
            emit(&report, pretty)?;
            if report.ok {
                Ok(())
            } else {
                Err(1)
            }
        }
    }
}

fn build_config(cli: &Cli) -> Result<EngineConfig, u8> {
    let resolution = ResolutionMode::parse(&cli.deref).ok_or_else(|| {
        eprintln!("Error: unknown --deref mode \"{}\" (expected lazy or full)", cli.deref);
        2u8
    })?;

    let mut config = EngineConfig::new(&cli.spec_dir)
        .resolution(resolution)
        .semantic(cli.semantic);
    if let Some(model) = &cli.embedder {
        let spec = EmbedderSpec::parse(model).ok_or_else(|| {
            eprintln!("Error: unknown embedder \"{}\" (expected hash-<dims>)", model);
            2u8
        })?;
        config = config.embedder(spec);
    }
    if let Some(cache) = &cli.cache {
        config = config.cache_path(cache);
    }
    if let Commands::Search { limit, .. } = &cli.command {
        config = config.result_limit(*limit);
    }
    Ok(config)
}

fn catalog_error(e: CatalogError) -> u8 {
    eprintln!("Error: {}", e);
    e.exit_code() as u8
}

fn emit<T: serde::Serialize>(value: &T, pretty: bool) -> Result<(), u8> {
    let output = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;
    println!("{}", output);
    Ok(())
}
