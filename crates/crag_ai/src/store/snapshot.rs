//! Durable form of a store: vectors, metadata and the query cache in one file.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! "CRAGSNAP" | u32 version | section(header JSON) | section(vectors) | section(metadata JSON)
//!            | section(query cache) | sha256 of everything before it
//! section = u64 byte length | bytes
//! vectors = count * dims f32
//! cache   = u32 entries | (u32 key len | key utf-8 | u32 dims | dims f32)*
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crag_core::domain::ChunkMetadata;
use crag_core::error::{AppError, ErrorKind};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::cache::QueryCache;
use super::table::VectorTable;

pub const SNAPSHOT_MAGIC: &[u8; 8] = b"CRAGSNAP";
pub const SNAPSHOT_VERSION: u32 = 1;
const DIGEST_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Embedding model every vector (stored and cached) was produced with.
    pub model: String,
    pub table: VectorTable,
    pub cache: QueryCache,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotHeader {
    model: String,
    dims: u64,
    count: u64,
    cache_entries: u64,
    saved_at: String,
}

pub fn encode(snapshot: &Snapshot, saved_at: &str) -> Result<Vec<u8>, AppError> {
    let header = SnapshotHeader {
        model: snapshot.model.clone(),
        dims: snapshot.table.dims() as u64,
        count: snapshot.table.len() as u64,
        cache_entries: snapshot.cache.len() as u64,
        saved_at: saved_at.to_string(),
    };
    let header_json = serde_json::to_vec(&header).map_err(encode_failed)?;
    let metadata_json = serde_json::to_vec(snapshot.table.all_metadata()).map_err(encode_failed)?;

    let mut vectors = Vec::with_capacity(snapshot.table.raw_values().len() * 4);
    put_f32s(&mut vectors, snapshot.table.raw_values());

    let mut cache = Vec::new();
    let entries = snapshot.cache.sorted_entries();
    put_u32(&mut cache, len_u32(entries.len(), "cache entries")?);
    for (query, vector) in entries {
        put_u32(&mut cache, len_u32(query.len(), "cache key")?);
        cache.extend_from_slice(query.as_bytes());
        put_u32(&mut cache, len_u32(vector.len(), "cache vector")?);
        put_f32s(&mut cache, vector);
    }

    let mut out = Vec::new();
    out.extend_from_slice(SNAPSHOT_MAGIC);
    put_u32(&mut out, SNAPSHOT_VERSION);
    for section in [&header_json, &vectors, &metadata_json, &cache] {
        out.extend_from_slice(&(section.len() as u64).to_le_bytes());
        out.extend_from_slice(section);
    }
    let digest = Sha256::digest(&out);
    out.extend_from_slice(&digest);
    Ok(out)
}

pub fn decode(bytes: &[u8]) -> Result<Snapshot, AppError> {
    if bytes.len() < SNAPSHOT_MAGIC.len() + 4 + DIGEST_LEN || &bytes[..SNAPSHOT_MAGIC.len()] != SNAPSHOT_MAGIC {
        return Err(corrupt("File is not a snapshot", format!("bytes={}", bytes.len())));
    }
    let (body, digest) = bytes.split_at(bytes.len() - DIGEST_LEN);
    let actual = Sha256::digest(body);
    if actual.as_slice() != digest {
        return Err(corrupt(
            "Snapshot checksum mismatch",
            format!("expected={}; got={}", hex::encode(digest), hex::encode(actual)),
        ));
    }

    let mut r = Reader::new(&body[SNAPSHOT_MAGIC.len()..]);
    let version = r.u32()?;
    if version != SNAPSHOT_VERSION {
        return Err(AppError::new(
            ErrorKind::CorruptState,
            "RAG_SNAPSHOT_UNSUPPORTED_VERSION",
            "Snapshot format version is not supported",
        )
        .with_details(format!("version={version}; supported={SNAPSHOT_VERSION}")));
    }

    let header: SnapshotHeader = serde_json::from_slice(r.section()?)
        .map_err(|e| corrupt("Failed to decode snapshot header", e.to_string()))?;
    let vector_bytes = r.section()?;
    let metadata: Vec<ChunkMetadata> = serde_json::from_slice(r.section()?)
        .map_err(|e| corrupt("Failed to decode snapshot metadata", e.to_string()))?;
    let cache_bytes = r.section()?;
    if !r.is_done() {
        return Err(corrupt("Trailing bytes after snapshot sections", format!("extra={}", r.remaining())));
    }

    if vector_bytes.len() % 4 != 0 {
        return Err(corrupt("Vector section is not a whole number of f32", format!("bytes={}", vector_bytes.len())));
    }
    let values = read_f32s(vector_bytes);
    if header.count != metadata.len() as u64 {
        return Err(corrupt(
            "Snapshot header count does not match metadata",
            format!("header={}; metadata={}", header.count, metadata.len()),
        ));
    }
    let table = VectorTable::from_flat(header.dims as usize, values, metadata)?;

    let mut cr = Reader::new(cache_bytes);
    let entries = cr.u32()?;
    let mut cache = QueryCache::new();
    for _ in 0..entries {
        let key_len = cr.u32()? as usize;
        let key = std::str::from_utf8(cr.take(key_len)?)
            .map_err(|e| corrupt("Cached query is not valid UTF-8", e.to_string()))?;
        let dims = cr.u32()? as usize;
        if dims as u64 != header.dims {
            return Err(corrupt(
                "Cached query vector width does not match stored vectors",
                format!("query={key}; header_dims={}; cached_dims={dims}", header.dims),
            ));
        }
        let vector = read_f32s(cr.take(dims.checked_mul(4).ok_or_else(|| corrupt("Cache vector too large", ""))?)?);
        cache.insert(key, vector);
    }
    if !cr.is_done() || cache.len() as u64 != header.cache_entries {
        return Err(corrupt(
            "Query cache section is inconsistent",
            format!("header_entries={}; decoded={}", header.cache_entries, cache.len()),
        ));
    }

    Ok(Snapshot {
        model: header.model,
        table,
        cache,
    })
}

/// Write a uniquely named temp file beside `path`, fsync it, then rename it over `path`.
/// Parent directories are created. A snapshot without vectors is refused.
pub fn save(path: &Path, snapshot: &Snapshot) -> Result<(), AppError> {
    if snapshot.table.is_empty() {
        return Err(AppError::new(
            ErrorKind::EmptyIndex,
            "RAG_INDEX_EMPTY",
            "Refusing to save a snapshot without vectors",
        )
        .with_details(format!("path={}", path.display())));
    }
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::new(ErrorKind::Io, "RAG_SNAPSHOT_WRITE_FAILED", "Failed to create snapshot directory")
                    .with_details(format!("path={}; err={}", parent.display(), e))
            })?;
            parent
        }
        None => Path::new("."),
    };

    let saved_at = OffsetDateTime::now_utc().format(&Rfc3339).map_err(|e| {
        AppError::new(ErrorKind::Io, "RAG_SNAPSHOT_WRITE_FAILED", "Failed to format time").with_details(e.to_string())
    })?;
    let bytes = encode(snapshot, &saved_at)?;

    let tmp = write_synced(dir, &bytes).map_err(|e| {
        AppError::new(ErrorKind::Io, "RAG_SNAPSHOT_WRITE_FAILED", "Failed to write snapshot")
            .with_details(format!("dir={}; err={}", dir.display(), e))
    })?;
    tmp.persist(path).map_err(|e| {
        AppError::new(ErrorKind::Io, "RAG_SNAPSHOT_WRITE_FAILED", "Failed to finalize snapshot write")
            .with_details(format!("tmp={}; dest={}; err={}", e.file.path().display(), path.display(), e.error))
    })?;

    tracing::info!(
        path = %path.display(),
        vectors = snapshot.table.len(),
        cached_queries = snapshot.cache.len(),
        bytes = bytes.len(),
        "saved snapshot"
    );
    Ok(())
}

/// `Ok(None)` when no snapshot exists; `CorruptState` when one exists but cannot be used.
pub fn load(path: &Path) -> Result<Option<Snapshot>, AppError> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(AppError::new(
                ErrorKind::CorruptState,
                "RAG_SNAPSHOT_UNREADABLE",
                "Snapshot exists but could not be read",
            )
            .with_details(format!("path={}; err={}", path.display(), e)))
        }
    };
    let snapshot = decode(&bytes).map_err(|e| {
        let details = format!("path={}; {}", path.display(), e.details.clone().unwrap_or_default());
        e.with_details(details)
    })?;
    tracing::info!(
        path = %path.display(),
        vectors = snapshot.table.len(),
        cached_queries = snapshot.cache.len(),
        "loaded snapshot"
    );
    Ok(Some(snapshot))
}

fn write_synced(dir: &Path, bytes: &[u8]) -> io::Result<NamedTempFile> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

fn corrupt(message: &str, details: impl Into<String>) -> AppError {
    AppError::new(ErrorKind::CorruptState, "RAG_SNAPSHOT_CORRUPT", message).with_details(details)
}

fn encode_failed(e: serde_json::Error) -> AppError {
    AppError::new(ErrorKind::Io, "RAG_SNAPSHOT_WRITE_FAILED", "Failed to encode snapshot section")
        .with_details(e.to_string())
}

fn len_u32(n: usize, what: &str) -> Result<u32, AppError> {
    u32::try_from(n).map_err(|_| {
        AppError::new(ErrorKind::Io, "RAG_SNAPSHOT_WRITE_FAILED", "Snapshot field too large")
            .with_details(format!("field={what}; len={n}"))
    })
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_f32s(out: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

fn read_f32s(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], AppError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| corrupt("Snapshot is truncated", format!("offset={}; wanted={n}", self.pos)))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, AppError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn section(&mut self) -> Result<&'a [u8], AppError> {
        let b = self.take(8)?;
        let len = u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
        let len = usize::try_from(len).map_err(|_| corrupt("Section length overflows", format!("len={len}")))?;
        self.take(len)
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn is_done(&self) -> bool {
        self.remaining() == 0
    }
}
