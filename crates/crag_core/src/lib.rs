pub mod config;
pub mod domain;
pub mod error;
pub mod ingest;

#[cfg(test)]
mod tests {
    use super::error::{AppError, ErrorKind};

    #[test]
    fn app_error_is_structured() {
        let err = AppError::new(ErrorKind::CorruptState, "RAG_TEST", "snapshot failed").with_retryable(false);
        assert_eq!(err.kind, ErrorKind::CorruptState);
        assert_eq!(err.code, "RAG_TEST");
        assert_eq!(err.message, "snapshot failed");
        assert!(!err.retryable);
    }

    #[test]
    fn display_includes_details() {
        let err = AppError::new(ErrorKind::Provider, "RAG_EMBEDDINGS_FAILED", "Embedding call failed")
            .with_details("status=503");
        assert_eq!(err.to_string(), "[RAG_EMBEDDINGS_FAILED] Embedding call failed (status=503)");
    }
}
