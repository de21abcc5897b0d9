use std::cell::{Cell, RefCell};
use std::fs;

use crag_ai::chunking::{ChunkFileOutcome, Chunker, TextSplitter};
use crag_ai::llm::{ContextGenerator, SituatedContext, TokenUsage};
use crag_core::domain::SourceDocument;
use crag_core::error::{AppError, ErrorKind};
use crag_core::ingest::chunk_file::{chunk_file_path_for, read_chunk_file};
use pretty_assertions::assert_eq;

/// Answers with a context naming the chunk, optionally failing on the n-th call.
struct ScriptedContext {
    calls: Cell<usize>,
    fail_on_call: Option<usize>,
    seen_documents: RefCell<Vec<String>>,
}

impl ScriptedContext {
    fn new(fail_on_call: Option<usize>) -> Self {
        Self {
            calls: Cell::new(0),
            fail_on_call,
            seen_documents: RefCell::new(Vec::new()),
        }
    }
}

impl ContextGenerator for ScriptedContext {
    fn situate(&self, document: &str, chunk: &str) -> Result<SituatedContext, AppError> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        self.seen_documents.borrow_mut().push(document.to_string());
        if self.fail_on_call == Some(call) {
            return Err(AppError::new(ErrorKind::Provider, "RAG_CONTEXT_FAILED", "overloaded").with_retryable(true));
        }
        Ok(SituatedContext {
            text: format!("about {chunk}"),
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 3,
                cache_read_input_tokens: if call == 0 { 0 } else { 8 },
                cache_creation_input_tokens: if call == 0 { 8 } else { 0 },
            },
        })
    }
}

fn doc(content: &str) -> SourceDocument {
    SourceDocument {
        source_url: "https://example.edu/letters".to_string(),
        content: content.to_string(),
    }
}

#[test]
fn windows_become_numbered_situated_chunks() {
    let generator = ScriptedContext::new(None);
    let chunker = Chunker::new(TextSplitter::new(4, 2).unwrap(), &generator);

    let out = chunker.chunk_document(&doc("ABCDEFGHIJ")).expect("chunk");
    let texts: Vec<&str> = out.chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["ABCD", "CDEF", "EFGH", "GHIJ"]);
    let numbers: Vec<u32> = out.chunks.iter().map(|c| c.sequence_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    assert_eq!(out.chunks[2].context, "about EFGH");
    assert!(out.chunks.iter().all(|c| c.source_url == "https://example.edu/letters"));

    // Every call carries the whole document.
    assert!(generator.seen_documents.borrow().iter().all(|d| d == "ABCDEFGHIJ"));
    assert_eq!(
        out.usage,
        TokenUsage {
            input_tokens: 40,
            output_tokens: 12,
            cache_read_input_tokens: 24,
            cache_creation_input_tokens: 8,
        }
    );
}

#[test]
fn context_failure_aborts_the_document() {
    let generator = ScriptedContext::new(Some(1));
    let chunker = Chunker::new(TextSplitter::new(4, 2).unwrap(), &generator);

    let err = chunker.chunk_document(&doc("ABCDEFGHIJ")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Provider);
    assert!(err.retryable);
    let details = err.details.unwrap_or_default();
    assert!(details.contains("chunk=2"), "{details}");
    assert_eq!(generator.calls.get(), 2);
}

#[test]
fn source_file_is_chunked_once_then_reused() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("admissions.json");
    fs::write(
        &source,
        r#"{"source_url":"https://example.edu/admissions","content":"Apply early.\n\nDeadlines are firm."}"#,
    )
    .unwrap();

    let generator = ScriptedContext::new(None);
    let chunker = Chunker::new(TextSplitter::new(20, 5).unwrap(), &generator);

    let first = chunker.chunk_source_file(&source).expect("chunk");
    let path = chunk_file_path_for(&source);
    assert!(matches!(first, ChunkFileOutcome::Written { .. }));
    assert_eq!(read_chunk_file(&path).unwrap().chunks, first.chunks().to_vec());
    let calls = generator.calls.get();
    assert!(calls > 0);

    let second = chunker.chunk_source_file(&source).expect("reuse");
    assert!(matches!(second, ChunkFileOutcome::Reused { .. }));
    assert_eq!(second.chunks(), first.chunks());
    assert_eq!(generator.calls.get(), calls);
}

#[test]
fn failed_document_leaves_no_chunk_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("tuition.json");
    fs::write(
        &source,
        r#"{"source_url":"https://example.edu/tuition","content":"ABCDEFGHIJ"}"#,
    )
    .unwrap();

    let generator = ScriptedContext::new(Some(2));
    let chunker = Chunker::new(TextSplitter::new(4, 2).unwrap(), &generator);

    assert!(chunker.chunk_source_file(&source).is_err());
    assert!(!chunk_file_path_for(&source).exists());
}

#[test]
fn missing_source_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let generator = ScriptedContext::new(None);
    let chunker = Chunker::new(TextSplitter::new(10, 2).unwrap(), &generator);

    let err = chunker.chunk_source_file(&dir.path().join("nope.json")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}
