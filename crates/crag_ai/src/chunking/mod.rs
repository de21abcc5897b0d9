use std::path::{Path, PathBuf};

use crag_core::domain::{Chunk, SourceDocument};
use crag_core::error::AppError;
use crag_core::ingest::chunk_file::{chunk_file_path_for, read_chunk_file, write_chunk_file};
use crag_core::ingest::source_document::read_source_document;

use crate::llm::{ContextGenerator, SituatedContext, TokenUsage};

pub mod splitter;

pub use splitter::TextSplitter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDocument {
    pub chunks: Vec<Chunk>,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkFileOutcome {
    /// The chunk file already existed; its records were read back instead.
    Reused { path: PathBuf, chunks: Vec<Chunk> },
    Written { path: PathBuf, document: ChunkedDocument },
}

impl ChunkFileOutcome {
    pub fn chunks(&self) -> &[Chunk] {
        match self {
            ChunkFileOutcome::Reused { chunks, .. } => chunks,
            ChunkFileOutcome::Written { document, .. } => &document.chunks,
        }
    }
}

/// Ask the provider for a short phrase placing `chunk` within `document`.
pub fn contextualize(
    generator: &dyn ContextGenerator,
    document: &str,
    chunk: &str,
) -> Result<SituatedContext, AppError> {
    generator.situate(document, chunk)
}

pub struct Chunker<'g> {
    splitter: TextSplitter,
    generator: &'g dyn ContextGenerator,
}

impl<'g> Chunker<'g> {
    pub fn new(splitter: TextSplitter, generator: &'g dyn ContextGenerator) -> Self {
        Self { splitter, generator }
    }

    /// Split and situate every window, in order. A provider failure aborts the whole
    /// document; nothing partial is returned.
    pub fn chunk_document(&self, doc: &SourceDocument) -> Result<ChunkedDocument, AppError> {
        let windows = self.splitter.split(&doc.content);
        tracing::info!(
            source_url = %doc.source_url,
            windows = windows.len(),
            chunk_size = self.splitter.chunk_size(),
            chunk_overlap = self.splitter.chunk_overlap(),
            "chunking document"
        );

        let mut chunks = Vec::with_capacity(windows.len());
        let mut usage = TokenUsage::default();
        for (idx, window) in windows.into_iter().enumerate() {
            let sequence_number = (idx + 1) as u32;
            let situated = contextualize(self.generator, &doc.content, window).map_err(|e| {
                let details = format!(
                    "source_url={}; chunk={}; {}",
                    doc.source_url,
                    sequence_number,
                    e.details.clone().unwrap_or_default()
                );
                e.with_details(details)
            })?;
            tracing::debug!(
                chunk = sequence_number,
                input_tokens = situated.usage.input_tokens,
                output_tokens = situated.usage.output_tokens,
                total_tokens = situated.usage.total(),
                cache_read = situated.usage.cache_read_input_tokens,
                cache_creation = situated.usage.cache_creation_input_tokens,
                "situated chunk"
            );
            usage += situated.usage;
            chunks.push(Chunk {
                sequence_number,
                context: situated.text,
                source_url: doc.source_url.clone(),
                text: window.to_string(),
            });
        }

        tracing::info!(
            source_url = %doc.source_url,
            chunks = chunks.len(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cache_read = usage.cache_read_input_tokens,
            "document chunked"
        );
        Ok(ChunkedDocument { chunks, usage })
    }

    /// Chunk a crawled page into its sibling `chunks/` file, reusing an existing file.
    pub fn chunk_source_file(&self, source_path: &Path) -> Result<ChunkFileOutcome, AppError> {
        let path = chunk_file_path_for(source_path);
        if path.exists() {
            tracing::info!(path = %path.display(), "chunk file exists; skipping");
            let load = read_chunk_file(&path)?;
            return Ok(ChunkFileOutcome::Reused {
                path,
                chunks: load.chunks,
            });
        }

        let doc = read_source_document(source_path)?;
        let document = self.chunk_document(&doc)?;
        write_chunk_file(&path, &document.chunks)?;
        Ok(ChunkFileOutcome::Written { path, document })
    }
}
