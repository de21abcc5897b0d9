use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crag_ai::chunking::{ChunkFileOutcome, Chunker, TextSplitter};
use crag_ai::embeddings::voyage_embed::VoyageEmbedder;
use crag_ai::llm::anthropic_context::AnthropicContextGenerator;
use crag_ai::llm::TokenUsage;
use crag_ai::retrieve::RankedList;
use crag_ai::store::{EmbeddingStore, IngestOutcome, StoreValidation};
use crag_core::config::RagConfig;
use crag_core::domain::{Chunk, ValidationWarning};
use crag_core::error::{AppError, ErrorKind};
use crag_core::ingest::chunk_file::{load_chunk_dir, CHUNK_FILE_EXTENSION};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ChunkSummary {
    pub written: Vec<String>,
    pub skipped: Vec<String>,
    pub chunks: usize,
    pub usage: TokenUsage,
}

#[derive(Debug, Serialize)]
pub struct IngestSummary {
    pub outcome: IngestOutcome,
    pub chunk_files: usize,
    pub warnings: Vec<ValidationWarning>,
}

fn store(cfg: &RagConfig) -> Result<EmbeddingStore, AppError> {
    let embedder = VoyageEmbedder::new(
        &cfg.embedding.endpoint,
        cfg.voyage_api_key()?,
        Duration::from_secs(cfg.embedding.timeout_secs),
    )?;
    EmbeddingStore::from_config(cfg, Arc::new(embedder))
}

/// Chunk every `<input_dir>/<site>/*.json` page that has no chunk file yet.
pub fn chunk(cfg: &RagConfig, input_dir: &Path) -> Result<ChunkSummary, AppError> {
    let generator = AnthropicContextGenerator::new(
        &cfg.context.endpoint,
        cfg.anthropic_api_key()?,
        &cfg.context.model,
        cfg.context.max_tokens,
        Duration::from_secs(cfg.context.timeout_secs),
    )?;
    let chunker = Chunker::new(TextSplitter::from_config(&cfg.chunking)?, &generator);

    let mut summary = ChunkSummary {
        written: Vec::new(),
        skipped: Vec::new(),
        chunks: 0,
        usage: TokenUsage::default(),
    };
    for site in sorted_entries(input_dir, |p| p.is_dir())? {
        for page in sorted_entries(&site, |p| p.extension().and_then(|e| e.to_str()) == Some("json"))? {
            match chunker.chunk_source_file(&page)? {
                ChunkFileOutcome::Reused { path, chunks } => {
                    summary.chunks += chunks.len();
                    summary.skipped.push(path.display().to_string());
                }
                ChunkFileOutcome::Written { path, document } => {
                    summary.chunks += document.chunks.len();
                    summary.usage += document.usage;
                    summary.written.push(path.display().to_string());
                }
            }
        }
    }
    tracing::info!(
        written = summary.written.len(),
        skipped = summary.skipped.len(),
        chunks = summary.chunks,
        "chunking finished"
    );
    Ok(summary)
}

/// Load every `<input_dir>/<site>/chunks/*.jsonl` file and ingest the records.
pub fn ingest(cfg: &RagConfig, input_dir: &Path) -> Result<IngestSummary, AppError> {
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut warnings = Vec::new();
    let mut chunk_files = 0usize;
    for site in sorted_entries(input_dir, |p| p.is_dir())? {
        let dir = site.join("chunks");
        if !dir.is_dir() {
            continue;
        }
        chunk_files += sorted_entries(&dir, |p| {
            p.extension().and_then(|e| e.to_str()) == Some(CHUNK_FILE_EXTENSION)
        })?
        .len();
        let load = load_chunk_dir(&dir)?;
        chunks.extend(load.chunks);
        warnings.extend(load.warnings);
    }

    let store = store(cfg)?;
    let outcome = store.ingest(&chunks)?;
    Ok(IngestSummary {
        outcome,
        chunk_files,
        warnings,
    })
}

/// Search the persisted store. The store is saved afterwards so new cache entries persist.
pub fn search(cfg: &RagConfig, query: &str, k: usize) -> Result<RankedList, AppError> {
    let store = store(cfg)?;
    store.load_required()?;
    let cached = store.cached_queries();
    let ranked = store.search(query, k)?;
    if store.cached_queries() != cached {
        store.save()?;
    }
    Ok(ranked)
}

pub fn validate(cfg: &RagConfig) -> Result<StoreValidation, AppError> {
    let store = store(cfg)?;
    store.load_required()?;
    Ok(store.validate())
}

fn sorted_entries(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>, AppError> {
    let entries = fs::read_dir(dir).map_err(|e| {
        let err = if e.kind() == io::ErrorKind::NotFound {
            AppError::new(ErrorKind::NotFound, "RAG_INPUT_DIR_NOT_FOUND", "Input directory does not exist")
        } else {
            AppError::new(ErrorKind::Io, "RAG_INPUT_DIR_READ_FAILED", "Failed to read input directory")
        };
        err.with_details(format!("path={}; err={}", dir.display(), e))
    })?;
    let mut out: Vec<PathBuf> = entries
        .flatten()
        .map(|ent| ent.path())
        .filter(|p| keep(p))
        .collect();
    out.sort();
    Ok(out)
}
