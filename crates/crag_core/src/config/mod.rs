use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorKind};

pub const VOYAGE_API_KEY_ENV: &str = "VOYAGE_API_KEY";
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum window length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive windows; strictly less than `chunk_size`.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub endpoint: String,
    pub batch_size: usize,
    /// Upper bound on batches in flight at once during ingest.
    pub parallel_batches: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "voyage-3-large".to_string(),
            endpoint: "https://api.voyageai.com/v1/embeddings".to_string(),
            batch_size: 128,
            parallel_batches: 4,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContextConfig {
    pub model: String,
    pub endpoint: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-haiku-20240307".to_string(),
            endpoint: "https://api.anthropic.com/v1/messages".to_string(),
            max_tokens: 1000,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub name: String,
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "school_db".to_string(),
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RagConfig {
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub context: ContextConfig,
    pub store: StoreConfig,
}

impl RagConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, AppError> {
        let cfg: RagConfig = toml::from_str(raw).map_err(|e| {
            AppError::new(ErrorKind::Configuration, "RAG_CONFIG_INVALID", "Failed to parse configuration")
                .with_details(e.to_string())
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                AppError::new(ErrorKind::NotFound, "RAG_CONFIG_NOT_FOUND", "Configuration file not found")
                    .with_details(format!("path={}", path.display()))
            } else {
                AppError::new(ErrorKind::Io, "RAG_CONFIG_READ_FAILED", "Failed to read configuration file")
                    .with_details(format!("path={}; err={}", path.display(), e))
            }
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let c = &self.chunking;
        if c.chunk_size == 0 {
            return Err(invalid("chunking.chunk_size must be greater than zero", "chunk_size=0"));
        }
        if c.chunk_overlap >= c.chunk_size {
            return Err(invalid(
                "chunking.chunk_overlap must be smaller than chunking.chunk_size",
                format!("chunk_size={}; chunk_overlap={}", c.chunk_size, c.chunk_overlap),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(invalid("embedding.batch_size must be greater than zero", "batch_size=0"));
        }
        if self.embedding.parallel_batches == 0 {
            return Err(invalid(
                "embedding.parallel_batches must be greater than zero",
                "parallel_batches=0",
            ));
        }
        if self.embedding.timeout_secs == 0 || self.context.timeout_secs == 0 {
            return Err(invalid(
                "Provider timeouts must be greater than zero",
                format!(
                    "embedding.timeout_secs={}; context.timeout_secs={}",
                    self.embedding.timeout_secs, self.context.timeout_secs
                ),
            ));
        }
        if self.embedding.model.trim().is_empty() || self.context.model.trim().is_empty() {
            return Err(invalid("Provider model ids must not be empty", "model=\"\""));
        }
        if self.store.name.trim().is_empty() {
            return Err(invalid("store.name must not be empty", "name=\"\""));
        }
        Ok(())
    }

    /// `<data_dir>/<name>/vector_store.snap`
    pub fn snapshot_path(&self) -> PathBuf {
        self.store
            .data_dir
            .join(&self.store.name)
            .join("vector_store.snap")
    }

    pub fn voyage_api_key(&self) -> Result<String, AppError> {
        api_key_from_env(VOYAGE_API_KEY_ENV)
    }

    pub fn anthropic_api_key(&self) -> Result<String, AppError> {
        api_key_from_env(ANTHROPIC_API_KEY_ENV)
    }
}

fn invalid(message: &str, details: impl Into<String>) -> AppError {
    AppError::new(ErrorKind::Configuration, "RAG_CONFIG_INVALID", message).with_details(details)
}

fn api_key_from_env(var: &str) -> Result<String, AppError> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(AppError::new(
            ErrorKind::Configuration,
            "RAG_CREDENTIALS_MISSING",
            "Provider API key is not set",
        )
        .with_details(format!("env={var}"))),
    }
}
