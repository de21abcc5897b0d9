use std::collections::HashSet;

use crag_core::domain::ChunkMetadata;
use crag_core::error::{AppError, ErrorKind};
use serde::{Deserialize, Serialize};

use crate::store::EmbeddingStore;

pub mod similarity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    #[serde(flatten)]
    pub metadata: ChunkMetadata,
    pub score: f32,
    /// Row of the hit in the store; unique within a result list.
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedList {
    pub query: String,
    pub hits: Vec<RetrievalHit>,
}

impl RankedList {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Distinct source urls in rank order.
    pub fn source_urls(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.hits
            .iter()
            .map(|h| h.metadata.source_url.as_str())
            .filter(|u| seen.insert(*u))
            .collect()
    }
}

/// Exhaustive dot-product search over an [`EmbeddingStore`].
pub struct Retriever<'s> {
    store: &'s EmbeddingStore,
}

impl<'s> Retriever<'s> {
    pub fn new(store: &'s EmbeddingStore) -> Self {
        Self { store }
    }

    /// Top `k` chunks for `query`, highest score first; ties go to the earlier row.
    ///
    /// An empty store is reported before the query is embedded, so it is never masked
    /// by a provider failure.
    pub fn search(&self, query: &str, k: usize) -> Result<RankedList, AppError> {
        if query.trim().is_empty() {
            return Err(AppError::new(ErrorKind::InvalidInput, "RAG_QUERY_EMPTY", "Query must not be empty"));
        }
        if k == 0 {
            return Err(AppError::new(
                ErrorKind::InvalidInput,
                "RAG_QUERY_K_INVALID",
                "k must be at least 1",
            ));
        }
        if self.store.is_empty() {
            return Err(self.store.empty_index());
        }

        // Vectors reaching the cache always have the table's width.
        let qv = self.store.get_or_embed(query)?;
        let table = self.store.read_table();

        let scores: Vec<f32> = table.rows().map(|(v, _)| similarity::dot(&qv, v)).collect();
        let mut hits = Vec::with_capacity(k.min(scores.len()));
        for row in similarity::rank_top_k(&scores, k) {
            if let Some(meta) = table.metadata(row) {
                hits.push(RetrievalHit {
                    metadata: meta.clone(),
                    score: scores[row],
                    index: row,
                });
            }
        }
        tracing::debug!(store = %self.store.name(), k, hits = hits.len(), "search complete");

        Ok(RankedList {
            query: query.to_string(),
            hits,
        })
    }
}
