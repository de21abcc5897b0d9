use std::collections::{BTreeMap, HashMap};

use crag_core::error::{AppError, ErrorKind};

use crate::embeddings::Embedder;

/// Exact-string query -> embedding memo. Unbounded; entries are never replaced or evicted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryCache {
    entries: HashMap<String, Vec<f32>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, query: &str) -> Option<&[f32]> {
        self.entries.get(query).map(Vec::as_slice)
    }

    /// Insert unless present; returns the vector now cached for `query`.
    pub fn insert(&mut self, query: &str, vector: Vec<f32>) -> &[f32] {
        self.entries.entry(query.to_string()).or_insert(vector)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by query string, for deterministic snapshots.
    pub fn sorted_entries(&self) -> BTreeMap<&str, &[f32]> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
            .collect()
    }
}

impl FromIterator<(String, Vec<f32>)> for QueryCache {
    fn from_iter<I: IntoIterator<Item = (String, Vec<f32>)>>(iter: I) -> Self {
        let mut cache = QueryCache::new();
        for (k, v) in iter {
            cache.insert(&k, v);
        }
        cache
    }
}

/// Single-item embedding call for a query, checked against the store's width before the
/// caller may cache it.
pub fn embed_query(embedder: &dyn Embedder, model: &str, query: &str, dims: usize) -> Result<Vec<f32>, AppError> {
    let mut out = embedder.embed(model, &[query.to_string()])?;
    if out.len() != 1 || out[0].is_empty() {
        return Err(AppError::new(
            ErrorKind::Provider,
            "RAG_EMBEDDINGS_FAILED",
            "Query embedding response was malformed",
        )
        .with_details(format!("vectors={}", out.len()))
        .with_retryable(true));
    }
    let v = out.remove(0);
    if v.len() != dims {
        return Err(AppError::new(
            ErrorKind::Provider,
            "RAG_QUERY_DIMS_MISMATCH",
            "Query embedding dims do not match store dims",
        )
        .with_details(format!("store_dims={dims}; query_dims={}", v.len()))
        .with_retryable(true));
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(AppError::new(
            ErrorKind::Provider,
            "RAG_EMBEDDINGS_NON_FINITE",
            "Query embedding contains non-finite values",
        )
        .with_retryable(true));
    }
    Ok(v)
}
