use std::collections::HashSet;

use crag_core::error::{AppError, ErrorKind};

use crate::retrieve::RankedList;
use crate::store::EmbeddingStore;

/// Downstream stage that may reorder and truncate a ranked list.
///
/// Implementations receive hits with their original scores, metadata and store rows,
/// and must return a subset of those same hits.
pub trait Reranker {
    fn rerank(&self, query: &str, ranked: RankedList, top_n: usize) -> Result<RankedList, AppError>;
}

/// Keeps retrieval order and cuts to `top_n`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughReranker;

impl Reranker for PassthroughReranker {
    fn rerank(&self, _query: &str, mut ranked: RankedList, top_n: usize) -> Result<RankedList, AppError> {
        ranked.hits.truncate(top_n);
        Ok(ranked)
    }
}

/// Retrieve `k` candidates and hand them to `reranker`, rejecting output that is not a
/// subset of its input.
pub fn retrieve_rerank(
    store: &EmbeddingStore,
    reranker: &dyn Reranker,
    query: &str,
    k: usize,
    top_n: usize,
) -> Result<RankedList, AppError> {
    let ranked = store.search(query, k)?;
    let candidates: HashSet<usize> = ranked.hits.iter().map(|h| h.index).collect();

    let out = reranker.rerank(query, ranked, top_n)?;
    let mut seen = HashSet::new();
    for hit in &out.hits {
        if !candidates.contains(&hit.index) || !seen.insert(hit.index) {
            return Err(AppError::new(
                ErrorKind::InvalidInput,
                "RAG_RERANK_INVALID",
                "Reranker returned a hit that was not among its candidates",
            )
            .with_details(format!("index={}", hit.index)));
        }
    }
    if out.hits.len() > top_n {
        return Err(AppError::new(
            ErrorKind::InvalidInput,
            "RAG_RERANK_INVALID",
            "Reranker returned more hits than requested",
        )
        .with_details(format!("top_n={top_n}; got={}", out.hits.len())));
    }
    Ok(out)
}
