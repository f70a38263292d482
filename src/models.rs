//! Core data models shared by indexing, retrieval and generation.
//!
//! Records flow through two shapes: [`ChunkRecord`] is what the indexer
//! writes (content, provenance, embedding) and [`Chunk`] is what the
//! retriever hands to the generator (content, provenance, similarity).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category assigned to files sitting directly in the sync root.
pub const UNCATEGORIZED: &str = "Uncategorized";
/// Category assigned to files outside the sync root.
pub const EXTERNAL: &str = "External";

/// Provenance attached to every indexed chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub filepath: String,
    pub filename: String,
    pub category: String,
    #[serde(default = "default_page_no")]
    pub page_no: u32,
}

fn default_page_no() -> u32 {
    1
}

/// A chunk ready to be written to the vector index.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub content: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

/// A retrieved chunk with its similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
    pub score: f64,
}

/// A text block produced by extraction, before embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub text: String,
    pub page_no: u32,
}

/// The caller's organizational department, taken from a validated
/// credential. Holding one is the only way into retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Department(String);

impl Department {
    /// Returns `None` for blank input.
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
