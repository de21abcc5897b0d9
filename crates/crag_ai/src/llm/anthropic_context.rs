use std::time::Duration;

use crag_core::error::{AppError, ErrorKind};
use serde::{Deserialize, Serialize};

use super::{ContextGenerator, SituatedContext, TokenUsage};
use crate::http::{agent, provider_error};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const PROMPT_CACHING_BETA: &str = "prompt-caching-2024-07-31";

#[derive(Debug, Clone)]
pub struct AnthropicContextGenerator {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicContextGenerator {
    pub fn new(
        endpoint: &str,
        api_key: String,
        model: &str,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        if api_key.trim().is_empty() {
            return Err(AppError::new(
                ErrorKind::Configuration,
                "RAG_CREDENTIALS_MISSING",
                "Anthropic API key is empty",
            ));
        }
        Ok(Self {
            agent: agent(timeout),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            max_tokens,
        })
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Debug, Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    #[serde(default)]
    usage: TokenUsageWire,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct TokenUsageWire {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: Option<u64>,
    #[serde(default)]
    cache_creation_input_tokens: Option<u64>,
}

impl From<TokenUsageWire> for TokenUsage {
    fn from(w: TokenUsageWire) -> Self {
        TokenUsage {
            input_tokens: w.input_tokens,
            output_tokens: w.output_tokens,
            cache_read_input_tokens: w.cache_read_input_tokens.unwrap_or(0),
            cache_creation_input_tokens: w.cache_creation_input_tokens.unwrap_or(0),
        }
    }
}

fn document_block(document: &str) -> String {
    format!("<document>\n{document}\n</document>")
}

fn chunk_instruction(chunk: &str) -> String {
    format!(
        "Here is the chunk we want to situate within the whole document\n\
         <chunk>\n{chunk}\n</chunk>\n\n\
         Please give a short succinct context to situate this chunk within the overall document \
         for the purposes of improving search retrieval of the chunk.\n\
         Answer only with the succinct context and nothing else.\n\
         Please don't start with 'this chunk'"
    )
}

fn build_request<'a>(model: &'a str, max_tokens: u32, document: &str, chunk: &str) -> MessagesRequest<'a> {
    MessagesRequest {
        model,
        max_tokens,
        temperature: 0.0,
        messages: vec![Message {
            role: "user",
            content: vec![
                ContentBlock {
                    kind: "text",
                    text: document_block(document),
                    cache_control: Some(CacheControl { kind: "ephemeral" }),
                },
                ContentBlock {
                    kind: "text",
                    text: chunk_instruction(chunk),
                    cache_control: None,
                },
            ],
        }],
    }
}

impl ContextGenerator for AnthropicContextGenerator {
    fn situate(&self, document: &str, chunk: &str) -> Result<SituatedContext, AppError> {
        let req = build_request(&self.model, self.max_tokens, document, chunk);
        let body = serde_json::to_value(&req).map_err(|e| {
            AppError::new(ErrorKind::Provider, "RAG_CONTEXT_FAILED", "Failed to encode context request")
                .with_details(e.to_string())
        })?;

        let resp = self
            .agent
            .post(&self.endpoint)
            .set("x-api-key", &self.api_key)
            .set("anthropic-version", ANTHROPIC_VERSION)
            .set("anthropic-beta", PROMPT_CACHING_BETA)
            .send_json(body)
            .map_err(|e| provider_error("RAG_CONTEXT_FAILED", "Context generation", e))?;

        let parsed: MessagesResponse = resp.into_json().map_err(|e| {
            AppError::new(ErrorKind::Provider, "RAG_CONTEXT_FAILED", "Failed to decode context response")
                .with_details(e.to_string())
        })?;

        let text = parsed
            .content
            .into_iter()
            .find_map(|block| match block {
                ResponseBlock::Text { text } => Some(text),
                ResponseBlock::Other => None,
            })
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AppError::new(ErrorKind::Provider, "RAG_CONTEXT_FAILED", "Context response was empty")
            })?;

        Ok(SituatedContext {
            text,
            usage: parsed.usage.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_block_is_marked_cacheable() {
        let req = build_request("m", 10, "DOC", "CHUNK");
        let v = serde_json::to_value(&req).unwrap();
        let blocks = &v["messages"][0]["content"];
        assert_eq!(blocks[0]["cache_control"]["type"], "ephemeral");
        assert!(blocks[0]["text"].as_str().unwrap().contains("DOC"));
        assert!(blocks[1].get("cache_control").is_none());
        assert!(blocks[1]["text"].as_str().unwrap().contains("<chunk>\nCHUNK\n</chunk>"));
        assert_eq!(v["temperature"], 0.0);
    }

    #[test]
    fn decodes_usage_with_cache_counters() {
        let raw = r#"{"content":[{"type":"text","text":" Tuition section. "}],
            "usage":{"input_tokens":12,"output_tokens":5,"cache_read_input_tokens":900}}"#;
        let parsed: MessagesResponse = serde_json::from_str(raw).unwrap();
        let usage: TokenUsage = parsed.usage.into();
        assert_eq!(usage.cache_read_input_tokens, 900);
        assert_eq!(usage.cache_creation_input_tokens, 0);
        assert_eq!(usage.total(), 17);
    }
}
