//! Department-scoped similarity retrieval.
//!
//! A caller only ever sees chunks from its own department's category plus
//! the configured globally visible categories. The category filter is
//! pushed into the store query and checked again on the way out.
//!
//! Retrieval never fails outward: an embedding or store error (or a store
//! timeout) is logged and yields an empty context, which the generator
//! answers with its polite decline.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetrievalConfig;
use crate::embedding::{self, EmbeddingProvider};
use crate::models::{Chunk, Department};
use crate::store::{SearchFilter, VectorStore};

/// Which categories a department may read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    globally_visible: BTreeSet<String>,
}

impl AccessPolicy {
    pub fn new<I, S>(globally_visible: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            globally_visible: globally_visible.into_iter().map(Into::into).collect(),
        }
    }

    /// `{department} ∪ globally_visible`.
    pub fn allowed_categories(&self, department: &Department) -> BTreeSet<String> {
        let mut allowed = self.globally_visible.clone();
        allowed.insert(department.as_str().to_string());
        allowed
    }
}

pub struct ScopedRetriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    policy: AccessPolicy,
    top_k: usize,
    min_similarity: f64,
    timeout: Duration,
}

impl ScopedRetriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            policy: AccessPolicy::new(config.global_categories.iter().cloned()),
            top_k: config.top_k,
            min_similarity: config.min_similarity,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Up to `top_k` chunks visible to `department`, most similar first.
    pub async fn retrieve(&self, question: &str, department: &Department) -> Vec<Chunk> {
        let query = match embedding::embed(&*self.embedder, question).await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(%department, error = %e, "question embedding failed");
                return Vec::new();
            }
        };

        let filter = SearchFilter {
            categories: self.policy.allowed_categories(department),
        };

        let search =
            self.store
                .similarity_search(&query, &filter, self.top_k, self.min_similarity);
        let chunks = match tokio::time::timeout(self.timeout, search).await {
            Ok(Ok(chunks)) => chunks,
            Ok(Err(e)) => {
                tracing::error!(%department, error = %e, "vector search failed");
                return Vec::new();
            }
            Err(_) => {
                tracing::error!(%department, timeout = ?self.timeout, "vector search timed out");
                return Vec::new();
            }
        };

        let before = chunks.len();
        let mut chunks: Vec<Chunk> = chunks
            .into_iter()
            .filter(|c| filter.allows(&c.metadata.category))
            .collect();
        if chunks.len() != before {
            tracing::warn!(%department, dropped = before - chunks.len(), "store returned out-of-scope chunks");
        }
        chunks.truncate(self.top_k);

        tracing::debug!(%department, hits = chunks.len(), "retrieved");
        chunks
    }
}
