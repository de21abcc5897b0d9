use serde::{Deserialize, Deserializer, Serialize};

/// One window of a source document plus its generated situating context.
///
/// Notes:
/// - `sequence_number` is 1-based and restarts at 1 for every document.
/// - Field names on the wire match the chunk-file format (`"Chunk Number"`, `"chunk_text"`).
/// - All four fields are required; a line missing any of them is a malformed record.
/// - A chunk number of 0 is malformed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    #[serde(rename = "Chunk Number", deserialize_with = "positive_sequence")]
    pub sequence_number: u32,
    pub context: String,
    pub source_url: String,
    #[serde(rename = "chunk_text")]
    pub text: String,
}

impl Chunk {
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            content: self.text.clone(),
            context: self.context.clone(),
            source_url: self.source_url.clone(),
        }
    }
}

fn positive_sequence<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let n = u32::deserialize(deserializer)?;
    if n == 0 {
        return Err(serde::de::Error::custom("Chunk Number is 1-based; got 0"));
    }
    Ok(n)
}

/// Per-vector record kept alongside each stored embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub content: String,
    pub context: String,
    pub source_url: String,
}

/// A crawled page as written by the scraper: `{ "source_url", "content" }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceDocument {
    pub source_url: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationWarning {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl ValidationWarning {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
