pub mod chunking;
pub mod embeddings;
pub mod llm;
pub mod rerank;
pub mod retrieve;
pub mod store;

mod http;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::embeddings::voyage_embed::VoyageEmbedder;
    use super::llm::anthropic_context::AnthropicContextGenerator;
    use crag_core::error::ErrorKind;

    #[test]
    fn provider_clients_require_credentials() {
        let t = Duration::from_secs(5);
        let err = VoyageEmbedder::new("https://api.voyageai.com/v1/embeddings", "  ".to_string(), t).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
        assert!(VoyageEmbedder::new("https://api.voyageai.com/v1/embeddings", "k".to_string(), t).is_ok());

        let err = AnthropicContextGenerator::new(
            "https://api.anthropic.com/v1/messages",
            String::new(),
            "claude-3-haiku-20240307",
            1000,
            t,
        )
        .unwrap_err();
        assert_eq!(err.code, "RAG_CREDENTIALS_MISSING");
    }
}
