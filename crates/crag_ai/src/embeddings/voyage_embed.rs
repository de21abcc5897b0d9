use std::time::Duration;

use crag_core::error::{AppError, ErrorKind};
use serde::{Deserialize, Serialize};

use super::Embedder;
use crate::http::{agent, provider_error};

#[derive(Debug, Clone)]
pub struct VoyageEmbedder {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
}

impl VoyageEmbedder {
    pub fn new(endpoint: &str, api_key: String, timeout: Duration) -> Result<Self, AppError> {
        if api_key.trim().is_empty() {
            return Err(AppError::new(
                ErrorKind::Configuration,
                "RAG_CREDENTIALS_MISSING",
                "Voyage API key is empty",
            ));
        }
        Ok(Self {
            agent: agent(timeout),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingsRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl Embedder for VoyageEmbedder {
    fn embed(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let req = EmbeddingsRequest { input: inputs, model };
        let body = serde_json::to_value(req).map_err(|e| {
            AppError::new(ErrorKind::Provider, "RAG_EMBEDDINGS_FAILED", "Failed to encode embeddings request")
                .with_details(e.to_string())
        })?;

        let resp = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(body)
            .map_err(|e| provider_error("RAG_EMBEDDINGS_FAILED", "Embeddings", e))?;

        let parsed: EmbeddingsResponse = resp.into_json().map_err(|e| {
            AppError::new(ErrorKind::Provider, "RAG_EMBEDDINGS_FAILED", "Failed to decode embeddings response")
                .with_details(e.to_string())
        })?;
        order_by_index(parsed.data, inputs.len())
    }
}

/// The API tags each vector with its input index; rebuild input order from it.
fn order_by_index(items: Vec<EmbeddingItem>, expected: usize) -> Result<Vec<Vec<f32>>, AppError> {
    if items.len() != expected {
        return Err(AppError::new(
            ErrorKind::Provider,
            "RAG_EMBEDDINGS_FAILED",
            "Embeddings response count does not match input count",
        )
        .with_details(format!("expected={expected}; got={}", items.len())));
    }
    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for item in items {
        let index = item.index;
        let slot = slots.get_mut(index).filter(|s| s.is_none());
        match slot {
            Some(slot) if !item.embedding.is_empty() => *slot = Some(item.embedding),
            _ => {
                return Err(AppError::new(
                    ErrorKind::Provider,
                    "RAG_EMBEDDINGS_FAILED",
                    "Embeddings response has an invalid, duplicate or empty entry",
                )
                .with_details(format!("index={index}")))
            }
        }
    }
    Ok(slots.into_iter().flatten().collect())
}
