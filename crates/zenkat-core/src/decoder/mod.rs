//! Content decoders.
//!
//! A decoder turns the raw bytes of a hydrated file into a structured
//! [`Document`]. Decoding is an enrichment: when it fails, hydration still
//! stores the raw bytes and records a [`DecodeWarning`].

mod markdown;

pub use markdown::MarkdownDecoder;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Decoder failure. Never fails a hydration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("content is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 { valid_up_to: usize },

    #[error("malformed content: {0}")]
    Malformed(String),
}

/// Non-fatal note stored alongside content whose decoding failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeWarning {
    pub decoder: String,
    pub message: String,
}

impl DecodeWarning {
    pub fn new(decoder: &str, err: &DecodeError) -> Self {
        Self {
            decoder: decoder.to_string(),
            message: err.to_string(),
        }
    }
}

/// Block category, used by `block_type` queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Heading,
    Paragraph,
    List,
    ThematicBreak,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListItem {
    /// Leading whitespace width, tabs counted as four columns
    pub indent: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Heading { level: u8, text: String },
    Paragraph { text: String },
    List { ordered: bool, items: Vec<ListItem> },
    ThematicBreak,
}

impl Block {
    pub fn block_type(&self) -> BlockType {
        match self {
            Self::Heading { .. } => BlockType::Heading,
            Self::Paragraph { .. } => BlockType::Paragraph,
            Self::List { .. } => BlockType::List,
            Self::ThematicBreak => BlockType::ThematicBreak,
        }
    }
}

/// Block-level structure of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Document {
    pub blocks: Vec<Block>,
}

impl Document {
    /// `(level, text)` of every heading in document order.
    pub fn headings(&self) -> impl Iterator<Item = (u8, &str)> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Heading { level, text } => Some((*level, text.as_str())),
            _ => None,
        })
    }

    pub fn contains(&self, block_type: BlockType) -> bool {
        self.blocks.iter().any(|b| b.block_type() == block_type)
    }
}

/// Pluggable decoder invoked at hydration time.
pub trait ContentDecoder: Send + Sync {
    fn name(&self) -> &str;

    /// Decode raw bytes. `Ok(None)` means the decoder keeps no structure.
    fn decode(&self, bytes: &[u8]) -> Result<Option<Document>, DecodeError>;
}

/// Decoder that keeps raw bytes only.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDecoder;

impl ContentDecoder for NullDecoder {
    fn name(&self) -> &str {
        "none"
    }

    fn decode(&self, _bytes: &[u8]) -> Result<Option<Document>, DecodeError> {
        Ok(None)
    }
}
