use std::ops::AddAssign;

use crag_core::error::AppError;
use serde::{Deserialize, Serialize};

/// Token counters reported by the context-generation provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub cache_creation_input_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
        self.cache_read_input_tokens += rhs.cache_read_input_tokens;
        self.cache_creation_input_tokens += rhs.cache_creation_input_tokens;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SituatedContext {
    pub text: String,
    pub usage: TokenUsage,
}

/// External capability that places a chunk within its whole document.
///
/// Implementations are expected to mark `document` as reusable prompt context, since the
/// same document is sent once per chunk.
pub trait ContextGenerator {
    fn situate(&self, document: &str, chunk: &str) -> Result<SituatedContext, AppError>;
}

pub mod anthropic_context;
