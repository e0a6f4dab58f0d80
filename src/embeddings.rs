//! Deterministic semantic embeddings for operation text.
//!
//! FNV-1a hash embeddings: no model downloads, fully deterministic, which
//! keeps the semantic stage reproducible across rebuilds. Query and
//! operation text share the same vector space by construction.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::config::EmbedderSpec;

/// Hash-based text embedder. Tokens and token bigrams are folded into a
/// fixed-dimension signed accumulator, then L2-normalized.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(spec: EmbedderSpec) -> Self {
        HashEmbedder { dims: spec.dims }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Embed text into an L2-normalized vector. All-zero for text with no
    /// usable tokens.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text);
        let mut vector = vec![0.0f32; self.dims];
        if tokens.is_empty() {
            return vector;
        }

        for token in &tokens {
            accumulate(&mut vector, token, 1.0);
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            accumulate(&mut vector, &bigram, 0.5);
        }

        l2_normalize(&mut vector);
        vector
    }
}

/// In-memory cosine-similarity index over operation embeddings.
///
/// Keyed by endpoint id in a `BTreeMap` so iteration (and therefore equal-
/// score ordering) is stable.
#[derive(Debug, Default)]
pub struct VectorIndex {
    vectors: BTreeMap<String, Vec<f32>>,
    dims: usize,
}

impl VectorIndex {
    pub fn new(dims: usize) -> Self {
        VectorIndex {
            vectors: BTreeMap::new(),
            dims,
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Insert an embedding; vectors of the wrong dimension are rejected.
    pub fn insert(&mut self, endpoint_id: impl Into<String>, vector: Vec<f32>) -> bool {
        if vector.len() != self.dims {
            return false;
        }
        self.vectors.insert(endpoint_id.into(), vector);
        true
    }

    /// Ranked cosine search. Expects normalized vectors, so the dot product
    /// is the cosine. Ties break by endpoint id.
    pub fn search(&self, query: &[f32], limit: usize) -> Vec<(String, f32)> {
        if query.len() != self.dims {
            return Vec::new();
        }

        let mut scored: Vec<(String, f32)> = self
            .vectors
            .iter()
            .map(|(id, vec)| (id.clone(), dot(query, vec)))
            .collect();
        scored.sort_by(|a, b| match b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal) {
            Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });
        scored.truncate(limit);
        scored
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() >= 2)
        .map(str::to_string)
        .collect()
}

fn accumulate(vector: &mut [f32], token: &str, weight: f32) {
    let token_hash = fnv1a(token.as_bytes());
    for salt in 0..vector.len() {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&token_hash.to_le_bytes());
        bytes[8..].copy_from_slice(&(salt as u64).to_le_bytes());
        let dim_hash = fnv1a(&bytes);

        let sign = if dim_hash & 1 == 0 { weight } else { -weight };
        let dim = ((dim_hash >> 1) as usize) % vector.len();
        vector[dim] += sign;
    }
}

fn fnv1a(data: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET;
    for byte in data {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
