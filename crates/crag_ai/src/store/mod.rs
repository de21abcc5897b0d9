use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use crag_core::config::RagConfig;
use crag_core::domain::{Chunk, ValidationWarning};
use crag_core::error::{AppError, ErrorKind};
use serde::{Deserialize, Serialize};

use crate::embeddings::Embedder;
use crate::retrieve::{similarity, RankedList, Retriever};

pub mod batch;
pub mod cache;
pub mod snapshot;
pub mod table;

pub use cache::QueryCache;
pub use snapshot::Snapshot;
pub use table::VectorTable;

const NORM_TOLERANCE: f32 = 1e-3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub model: String,
    pub batch_size: usize,
    pub parallel_batches: usize,
}

impl StoreOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            batch_size: 128,
            parallel_batches: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// The store already held vectors; nothing was done.
    AlreadyLoaded { vectors: usize },
    /// A snapshot existed on disk and was loaded instead of re-embedding.
    LoadedSnapshot { vectors: usize },
    Embedded { vectors: usize, dims: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreValidation {
    pub total: usize,
    pub unique_contents: usize,
    pub warnings: Vec<ValidationWarning>,
}

impl StoreValidation {
    pub fn has_duplicates(&self) -> bool {
        self.unique_contents != self.total
    }
}

/// Vectors, metadata and query cache for one named corpus.
///
/// Ingest and load take the table's write lock for their whole duration, so they are
/// serialized against each other and against searches. Searches only take read locks.
pub struct EmbeddingStore {
    name: String,
    path: PathBuf,
    embedder: Arc<dyn Embedder>,
    options: StoreOptions,
    table: RwLock<VectorTable>,
    cache: RwLock<QueryCache>,
}

impl EmbeddingStore {
    pub fn new(
        name: &str,
        path: PathBuf,
        embedder: Arc<dyn Embedder>,
        options: StoreOptions,
    ) -> Result<Self, AppError> {
        if options.batch_size == 0 || options.parallel_batches == 0 || options.model.trim().is_empty() {
            return Err(AppError::new(
                ErrorKind::Configuration,
                "RAG_CONFIG_INVALID",
                "Store options require a model and non-zero batch settings",
            )
            .with_details(format!(
                "model={}; batch_size={}; parallel_batches={}",
                options.model, options.batch_size, options.parallel_batches
            )));
        }
        Ok(Self {
            name: name.to_string(),
            path,
            embedder,
            options,
            table: RwLock::new(VectorTable::default()),
            cache: RwLock::new(QueryCache::new()),
        })
    }

    pub fn from_config(cfg: &RagConfig, embedder: Arc<dyn Embedder>) -> Result<Self, AppError> {
        cfg.validate()?;
        Self::new(
            &cfg.store.name,
            cfg.snapshot_path(),
            embedder,
            StoreOptions {
                model: cfg.embedding.model.clone(),
                batch_size: cfg.embedding.batch_size,
                parallel_batches: cfg.embedding.parallel_batches,
            },
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.read_table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_table().is_empty()
    }

    pub fn cached_queries(&self) -> usize {
        self.read_cache().len()
    }

    /// Populate the store from chunk records, at most once.
    ///
    /// In-memory data wins, then an on-disk snapshot, and only then are the chunk texts
    /// embedded. The new vectors are persisted before they become visible; a failed batch
    /// or a failed save leaves the store exactly as it was.
    pub fn ingest(&self, chunks: &[Chunk]) -> Result<IngestOutcome, AppError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        if !table.is_empty() {
            tracing::info!(store = %self.name, vectors = table.len(), "store already loaded; skipping ingest");
            return Ok(IngestOutcome::AlreadyLoaded { vectors: table.len() });
        }
        if let Some(snap) = snapshot::load(&self.path)?.filter(|snap| !snap.table.is_empty()) {
            self.check_model(&snap)?;
            let vectors = snap.table.len();
            *table = snap.table;
            *self.cache.write().unwrap_or_else(PoisonError::into_inner) = snap.cache;
            return Ok(IngestOutcome::LoadedSnapshot { vectors });
        }
        if chunks.is_empty() {
            return Err(AppError::new(
                ErrorKind::InvalidInput,
                "RAG_INGEST_EMPTY",
                "No chunks available; build chunks before ingesting",
            ));
        }

        tracing::info!(store = %self.name, chunks = chunks.len(), batch_size = self.options.batch_size, "embedding chunks");
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let metadata = chunks.iter().map(Chunk::metadata).collect();
        let vectors = batch::embed_in_batches(
            self.embedder.as_ref(),
            &self.options.model,
            &texts,
            self.options.batch_size,
            self.options.parallel_batches,
        )?;
        let built = VectorTable::from_rows(vectors, metadata)?;

        let snap = Snapshot {
            model: self.options.model.clone(),
            table: built,
            cache: self.read_cache().clone(),
        };
        snapshot::save(&self.path, &snap)?;

        let outcome = IngestOutcome::Embedded {
            vectors: snap.table.len(),
            dims: snap.table.dims(),
        };
        *table = snap.table;
        tracing::info!(store = %self.name, ?outcome, "ingest complete");
        Ok(outcome)
    }

    /// Replace in-memory state with the on-disk snapshot. `Ok(false)` when there is none
    /// or it holds no vectors.
    pub fn load(&self) -> Result<bool, AppError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        match snapshot::load(&self.path)?.filter(|snap| !snap.table.is_empty()) {
            Some(snap) => {
                self.check_model(&snap)?;
                *table = snap.table;
                *self.cache.write().unwrap_or_else(PoisonError::into_inner) = snap.cache;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Like [`EmbeddingStore::load`], but a missing snapshot is a `NotFound` error.
    pub fn load_required(&self) -> Result<(), AppError> {
        if self.load()? {
            Ok(())
        } else {
            Err(AppError::new(
                ErrorKind::NotFound,
                "RAG_SNAPSHOT_NOT_FOUND",
                "No snapshot exists for this store; ingest chunks first",
            )
            .with_details(format!("path={}", self.path.display())))
        }
    }

    /// Persist vectors and cache. An empty store is never written, so an on-disk snapshot
    /// always holds vectors.
    pub fn save(&self) -> Result<(), AppError> {
        let snap = self.snapshot();
        if snap.table.is_empty() {
            return Err(self.empty_index());
        }
        snapshot::save(&self.path, &snap)
    }

    pub fn snapshot(&self) -> Snapshot {
        let table = self.read_table();
        let cache = self.read_cache();
        Snapshot {
            model: self.options.model.clone(),
            table: table.clone(),
            cache: cache.clone(),
        }
    }

    /// Cached query vector, embedding and caching it on a miss. The provider call runs
    /// without holding any lock, and only a vector matching the store's width is cached.
    pub fn get_or_embed(&self, query: &str) -> Result<Vec<f32>, AppError> {
        if let Some(v) = self.read_cache().get(query) {
            tracing::debug!(store = %self.name, "query cache hit");
            return Ok(v.to_vec());
        }
        let dims = self.read_table().dims();
        if dims == 0 {
            return Err(self.empty_index());
        }
        let v = cache::embed_query(self.embedder.as_ref(), &self.options.model, query, dims)?;
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        Ok(cache.insert(query, v).to_vec())
    }

    pub fn search(&self, query: &str, k: usize) -> Result<RankedList, AppError> {
        Retriever::new(self).search(query, k)
    }

    /// Duplicate contents and non-unit vectors are reported, never rejected.
    pub fn validate(&self) -> StoreValidation {
        let table = self.read_table();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut warnings = Vec::new();

        for (row, (vector, meta)) in table.rows().enumerate() {
            if !seen.insert(meta.content.as_str()) {
                warnings.push(
                    ValidationWarning::new("RAG_DUPLICATE_CHUNK", "Chunk content is stored more than once")
                        .with_details(format!("row={row}; source_url={}", meta.source_url)),
                );
            }
            let norm = similarity::l2_norm(vector);
            if (norm - 1.0).abs() > NORM_TOLERANCE {
                warnings.push(
                    ValidationWarning::new(
                        "RAG_VECTOR_NOT_NORMALIZED",
                        "Stored vector is not unit length; dot-product scores are not cosine",
                    )
                    .with_details(format!("row={row}; norm={norm:.4}")),
                );
            }
        }

        let report = StoreValidation {
            total: table.len(),
            unique_contents: seen.len(),
            warnings,
        };
        if report.has_duplicates() {
            tracing::warn!(
                store = %self.name,
                total = report.total,
                unique = report.unique_contents,
                "store contains duplicate chunks"
            );
        } else {
            tracing::info!(store = %self.name, total = report.total, "all stored chunks are unique");
        }
        report
    }

    pub(crate) fn read_table(&self) -> RwLockReadGuard<'_, VectorTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, QueryCache> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn empty_index(&self) -> AppError {
        AppError::new(
            ErrorKind::EmptyIndex,
            "RAG_INDEX_EMPTY",
            "Store holds no vectors; ingest or load before searching",
        )
        .with_details(format!("store={}", self.name))
    }

    fn check_model(&self, snap: &Snapshot) -> Result<(), AppError> {
        if snap.model != self.options.model {
            return Err(AppError::new(
                ErrorKind::Configuration,
                "RAG_SNAPSHOT_MODEL_MISMATCH",
                "Snapshot was built with a different embedding model",
            )
            .with_details(format!(
                "path={}; snapshot_model={}; configured_model={}",
                self.path.display(),
                snap.model,
                self.options.model
            )));
        }
        Ok(())
    }
}
