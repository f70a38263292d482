//! In-memory [`VectorStore`] for tests and throwaway runs.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`. Search is
//! brute-force cosine similarity, same as the SQLite backend.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{rank, Scored, SearchFilter, VectorStore};
use crate::embedding::cosine_similarity;
use crate::models::{Chunk, ChunkRecord};

struct StoredRecord {
    id: i64,
    record: ChunkRecord,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    records: Vec<StoredRecord>,
}

pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn delete_by_filepath(&self, filepath: &str) -> Result<u64> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let before = inner.records.len();
        inner
            .records
            .retain(|r| r.record.metadata.filepath != filepath);
        Ok((before - inner.records.len()) as u64)
    }

    async fn insert_batch(&self, records: &[ChunkRecord]) -> Result<usize> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        for record in records {
            inner.next_id += 1;
            let id = inner.next_id;
            inner.records.push(StoredRecord {
                id,
                record: record.clone(),
            });
        }
        Ok(records.len())
    }

    async fn similarity_search(
        &self,
        query: &[f32],
        filter: &SearchFilter,
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<Chunk>> {
        let inner = self.inner.read().map_err(poisoned)?;
        let scored = inner
            .records
            .iter()
            .filter(|r| filter.allows(&r.record.metadata.category))
            .filter_map(|r| {
                let score = cosine_similarity(query, &r.record.embedding) as f64;
                (score >= threshold).then(|| Scored {
                    id: r.id,
                    chunk: Chunk {
                        content: r.record.content.clone(),
                        metadata: r.record.metadata.clone(),
                        score,
                    },
                })
            })
            .collect();
        Ok(rank(scored, limit))
    }

    async fn count_by_filepath(&self, filepath: &str) -> Result<usize> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .records
            .iter()
            .filter(|r| r.record.metadata.filepath == filepath)
            .count())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.inner.read().map_err(poisoned)?.records.len())
    }
}
