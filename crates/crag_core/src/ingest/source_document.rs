use std::fs;
use std::io;
use std::path::Path;

use crate::domain::SourceDocument;
use crate::error::{AppError, ErrorKind};

/// Read one crawled page. Absent files are `NotFound`; undecodable ones are `MalformedRecord`.
pub fn read_source_document(path: &Path) -> Result<SourceDocument, AppError> {
    let raw = fs::read_to_string(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            AppError::new(ErrorKind::NotFound, "RAG_SOURCE_NOT_FOUND", "Source document not found")
                .with_details(format!("path={}", path.display()))
        } else {
            AppError::new(ErrorKind::Io, "RAG_SOURCE_READ_FAILED", "Failed to read source document")
                .with_details(format!("path={}; err={}", path.display(), e))
        }
    })?;
    serde_json::from_str(&raw).map_err(|e| {
        AppError::new(
            ErrorKind::MalformedRecord,
            "RAG_SOURCE_MALFORMED",
            "Source document is not a {source_url, content} JSON object",
        )
        .with_details(format!("path={}; err={}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_crawled_page() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("page.json");
        fs::write(&path, r#"{"source_url":"https://a.edu/x","content":"Tuition is due."}"#).unwrap();

        let doc = read_source_document(&path).unwrap();
        assert_eq!(doc.source_url, "https://a.edu/x");
        assert_eq!(doc.content, "Tuition is due.");
    }

    #[test]
    fn missing_and_malformed_are_distinct() {
        let dir = tempdir().unwrap();
        let missing = read_source_document(&dir.path().join("nope.json")).unwrap_err();
        assert_eq!(missing.kind, ErrorKind::NotFound);

        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"content":"no url"}"#).unwrap();
        let bad = read_source_document(&path).unwrap_err();
        assert_eq!(bad.kind, ErrorKind::MalformedRecord);
    }
}
