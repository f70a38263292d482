//! Vector index abstraction.
//!
//! The [`VectorStore`] trait is the only way indexing writes chunks and the
//! only way retrieval reads them back. Two backends:
//!
//! | Backend | Module | Use |
//! |---------|--------|-----|
//! | SQLite (`chunks` table, brute-force cosine) | [`sqlite`] | production |
//! | `RwLock<Vec<_>>` | [`memory`] | tests, ephemeral runs |
//!
//! Implementations must be `Send + Sync`; one instance is shared by every
//! concurrent chat request.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::models::{Chunk, ChunkRecord};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Restricts a similarity search to a set of categories.
///
/// An empty set matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    pub categories: BTreeSet<String>,
}

impl SearchFilter {
    pub fn categories<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            categories: categories.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, category: &str) -> bool {
        self.categories.contains(category)
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Remove every record whose `metadata.filepath` equals `filepath`.
    /// Returns the number of records removed.
    async fn delete_by_filepath(&self, filepath: &str) -> Result<u64>;

    /// Insert records as a single unit. Returns the number written.
    async fn insert_batch(&self, records: &[ChunkRecord]) -> Result<usize>;

    /// Nearest neighbours of `query` among records allowed by `filter`,
    /// with similarity `>= threshold`, best first, at most `limit`.
    async fn similarity_search(
        &self,
        query: &[f32],
        filter: &SearchFilter,
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<Chunk>>;

    async fn count_by_filepath(&self, filepath: &str) -> Result<usize>;

    async fn count(&self) -> Result<usize>;
}

/// A scored candidate before truncation. `id` is the insertion order.
pub(crate) struct Scored {
    pub id: i64,
    pub chunk: Chunk,
}

/// Sort by descending score, then ascending insertion id, and keep `limit`.
pub(crate) fn rank(mut scored: Vec<Scored>, limit: usize) -> Vec<Chunk> {
    scored.sort_by(|a, b| {
        b.chunk
            .score
            .partial_cmp(&a.chunk.score)
            .unwrap_or(Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });
    scored.truncate(limit);
    scored.into_iter().map(|s| s.chunk).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn scored(id: i64, score: f64) -> Scored {
        Scored {
            id,
            chunk: Chunk {
                content: format!("chunk {}", id),
                metadata: ChunkMetadata {
                    filepath: "a.txt".into(),
                    filename: "a.txt".into(),
                    category: "HR".into(),
                    page_no: 1,
                },
                score,
            },
        }
    }

    #[test]
    fn test_rank_breaks_ties_by_id() {
        let ranked = rank(vec![scored(3, 0.9), scored(1, 0.7), scored(2, 0.9)], 2);
        let contents: Vec<_> = ranked.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["chunk 2", "chunk 3"]);
    }

    #[test]
    fn test_empty_filter_allows_nothing() {
        assert!(!SearchFilter::default().allows("HR"));
        assert!(SearchFilter::categories(["HR", "General"]).allows("General"));
    }
}
