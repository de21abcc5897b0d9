use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::domain::{Chunk, ValidationWarning};
use crate::error::{AppError, ErrorKind};

pub const CHUNK_FILE_EXTENSION: &str = "jsonl";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkFileLoad {
    pub chunks: Vec<Chunk>,
    pub warnings: Vec<ValidationWarning>,
}

impl ChunkFileLoad {
    fn extend(&mut self, other: ChunkFileLoad) {
        self.chunks.extend(other.chunks);
        self.warnings.extend(other.warnings);
    }
}

/// `<dir>/<name>.json` -> `<dir>/chunks/<name>.json_chunk.jsonl`.
pub fn chunk_file_path_for(source_path: &Path) -> PathBuf {
    let dir = source_path.parent().unwrap_or_else(|| Path::new(""));
    let name = source_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dir.join("chunks")
        .join(format!("{name}_chunk.{CHUNK_FILE_EXTENSION}"))
}

/// Write one JSON object per line. The file only appears once fully written: records go
/// to a uniquely named temp file in the same directory, which is then renamed into place.
pub fn write_chunk_file(path: &Path, chunks: &[Chunk]) -> Result<(), AppError> {
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::new(ErrorKind::Io, "RAG_CHUNK_FILE_WRITE_FAILED", "Failed to create chunk directory")
                    .with_details(format!("path={}; err={}", parent.display(), e))
            })?;
            parent
        }
        None => Path::new("."),
    };

    let mut out = String::new();
    for chunk in chunks {
        let line = serde_json::to_string(chunk).map_err(|e| {
            AppError::new(ErrorKind::Io, "RAG_CHUNK_FILE_WRITE_FAILED", "Failed to encode chunk record")
                .with_details(format!("chunk={}; err={}", chunk.sequence_number, e))
        })?;
        out.push_str(&line);
        out.push('\n');
    }

    let tmp = NamedTempFile::new_in(dir)
        .and_then(|mut f| f.write_all(out.as_bytes()).map(|()| f))
        .map_err(|e| {
            AppError::new(ErrorKind::Io, "RAG_CHUNK_FILE_WRITE_FAILED", "Failed to write chunk file")
                .with_details(format!("dir={}; err={}", dir.display(), e))
        })?;
    tmp.persist(path).map_err(|e| {
        AppError::new(ErrorKind::Io, "RAG_CHUNK_FILE_WRITE_FAILED", "Failed to finalize chunk file write")
            .with_details(format!("tmp={}; dest={}; err={}", e.file.path().display(), path.display(), e.error))
    })?;
    tracing::info!(path = %path.display(), records = chunks.len(), "wrote chunk file");
    Ok(())
}

/// Parse a chunk file, skipping (and reporting) lines that are not valid chunk records.
pub fn read_chunk_file(path: &Path) -> Result<ChunkFileLoad, AppError> {
    let raw = fs::read_to_string(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            AppError::new(ErrorKind::NotFound, "RAG_CHUNK_FILE_NOT_FOUND", "Chunk file not found")
                .with_details(format!("path={}", path.display()))
        } else {
            AppError::new(ErrorKind::Io, "RAG_CHUNK_FILE_READ_FAILED", "Failed to read chunk file")
                .with_details(format!("path={}; err={}", path.display(), e))
        }
    })?;
    Ok(parse_chunk_lines(&raw, &path.display().to_string()))
}

pub fn parse_chunk_lines(raw: &str, origin: &str) -> ChunkFileLoad {
    let mut load = ChunkFileLoad::default();
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Chunk>(line) {
            Ok(chunk) => load.chunks.push(chunk),
            Err(e) => {
                let details = format!("file={origin}; line={}; err={e}", idx + 1);
                tracing::warn!(%details, "skipping malformed chunk record");
                load.warnings.push(
                    ValidationWarning::new("RAG_MALFORMED_CHUNK_RECORD", "Chunk record could not be parsed")
                        .with_details(details),
                );
            }
        }
    }
    load
}

/// Read every `*.jsonl` file directly inside `dir`, in file-name order.
pub fn load_chunk_dir(dir: &Path) -> Result<ChunkFileLoad, AppError> {
    let entries = fs::read_dir(dir).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            AppError::new(ErrorKind::NotFound, "RAG_CHUNK_DIR_NOT_FOUND", "Chunk directory not found")
                .with_details(format!("path={}", dir.display()))
        } else {
            AppError::new(ErrorKind::Io, "RAG_CHUNK_FILE_READ_FAILED", "Failed to list chunk directory")
                .with_details(format!("path={}; err={}", dir.display(), e))
        }
    })?;

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|ent| ent.path())
        .filter(|p| p.is_file() && p.extension().and_then(|s| s.to_str()) == Some(CHUNK_FILE_EXTENSION))
        .collect();
    files.sort();

    let mut load = ChunkFileLoad::default();
    for file in files {
        load.extend(read_chunk_file(&file)?);
    }
    Ok(load)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn chunk(n: u32, text: &str) -> Chunk {
        Chunk {
            sequence_number: n,
            context: format!("ctx {n}"),
            source_url: "https://a.edu".to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn chunk_file_name_sits_under_chunks_dir() {
        let p = chunk_file_path_for(Path::new("website_content/TAMU/tuition.json"));
        assert_eq!(p, PathBuf::from("website_content/TAMU/chunks/tuition.json_chunk.jsonl"));
    }

    #[test]
    fn wire_format_uses_chunk_file_field_names() {
        let line = serde_json::to_string(&chunk(3, "hello")).unwrap();
        assert!(line.contains(r#""Chunk Number":3"#));
        assert!(line.contains(r#""chunk_text":"hello""#));
    }

    #[test]
    fn skips_malformed_lines_but_keeps_the_rest() {
        let good = serde_json::to_string(&chunk(1, "one")).unwrap();
        let also_good = serde_json::to_string(&chunk(2, "two")).unwrap();
        let raw = format!("{good}\n{{not json\n\n{{\"Chunk Number\":3}}\n{also_good}\n");

        let load = parse_chunk_lines(&raw, "mem");
        assert_eq!(load.chunks.len(), 2);
        assert_eq!(load.chunks[1].text, "two");
        assert_eq!(load.warnings.len(), 2);
        assert!(load.warnings[0].details.as_deref().unwrap().contains("line=2"));
        assert!(load.warnings[1].details.as_deref().unwrap().contains("line=4"));
    }

    #[test]
    fn write_then_load_dir_in_name_order() {
        let dir = tempdir().unwrap();
        write_chunk_file(&dir.path().join("b.json_chunk.jsonl"), &[chunk(1, "b1")]).unwrap();
        write_chunk_file(&dir.path().join("a.json_chunk.jsonl"), &[chunk(1, "a1"), chunk(2, "a2")]).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let load = load_chunk_dir(dir.path()).unwrap();
        let texts: Vec<&str> = load.chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a1", "a2", "b1"]);
        assert!(load.warnings.is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 3);
    }

    #[test]
    fn rewriting_a_chunk_file_replaces_it_whole() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.json_chunk.jsonl");
        write_chunk_file(&path, &[chunk(1, "old"), chunk(2, "old")]).unwrap();
        write_chunk_file(&path, &[chunk(1, "new")]).unwrap();

        let load = read_chunk_file(&path).unwrap();
        assert_eq!(load.chunks, vec![chunk(1, "new")]);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_dir_is_not_found() {
        let dir = tempdir().unwrap();
        let err = load_chunk_dir(&dir.path().join("missing")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
