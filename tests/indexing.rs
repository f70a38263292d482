mod common;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{Harness, KeywordEmbedder, ScriptedChatModel};
use scoped_rag::config::IndexingConfig;
use scoped_rag::embedding::EmbeddingProvider;
use scoped_rag::extract::BuiltinConverter;
use scoped_rag::indexer::Indexer;
use scoped_rag::models::{Chunk, ChunkRecord};
use scoped_rag::store::{InMemoryStore, SearchFilter, VectorStore};

/// Keyword embedder that errors on any text containing `poison`.
struct PickyEmbedder {
    inner: KeywordEmbedder,
    poison: &'static str,
}

impl PickyEmbedder {
    fn failing_on(poison: &'static str) -> Self {
        Self {
            inner: KeywordEmbedder::default(),
            poison,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for PickyEmbedder {
    fn model_name(&self) -> &str {
        "picky"
    }
    fn dims(&self) -> Option<usize> {
        self.inner.dims()
    }
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains(self.poison)) {
            bail!("embedding service unavailable");
        }
        self.inner.embed_texts(texts).await
    }
}

/// In-memory store whose `fail_on`-th insert (1-based) errors.
struct FlakyInsertStore {
    inner: InMemoryStore,
    inserts: AtomicUsize,
    fail_on: usize,
}

#[async_trait]
impl VectorStore for FlakyInsertStore {
    async fn delete_by_filepath(&self, filepath: &str) -> Result<u64> {
        self.inner.delete_by_filepath(filepath).await
    }
    async fn insert_batch(&self, records: &[ChunkRecord]) -> Result<usize> {
        if self.inserts.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
            bail!("disk I/O error");
        }
        self.inner.insert_batch(records).await
    }
    async fn similarity_search(
        &self,
        query: &[f32],
        filter: &SearchFilter,
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<Chunk>> {
        self.inner
            .similarity_search(query, filter, limit, threshold)
            .await
    }
    async fn count_by_filepath(&self, filepath: &str) -> Result<usize> {
        self.inner.count_by_filepath(filepath).await
    }
    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }
}

const HANDBOOK: [&str; 3] = [
    "Vacation requests go to your manager at least two weeks ahead of the leave.",
    "Any laptop expense above the standard allowance needs a budget owner sign-off.",
    "Holiday cover is arranged within the team before the vacation starts.",
];

fn write_handbook(root: &Path) -> std::path::PathBuf {
    let path = root.join("HR/handbook.md");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, HANDBOOK.join("\n\n")).unwrap();
    path
}

fn indexer(
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    root: &Path,
    batch_size: usize,
) -> Indexer {
    Indexer::new(
        store,
        embedder,
        Arc::new(BuiltinConverter),
        root,
        IndexingConfig {
            batch_size,
            ..IndexingConfig::default()
        },
    )
}

#[tokio::test]
async fn test_full_index_reports_every_file() {
    let dir = tempfile::tempdir().unwrap();
    let root = common::write_library(dir.path());
    let h = Harness::new(&root, ScriptedChatModel::default());

    let report = h.indexer.run_full().await.unwrap();
    assert_eq!(report.files_indexed, 4);
    assert_eq!(report.files_failed, 0);
    assert_eq!(report.chunks_written, 4);
    assert_eq!(h.store.count().await.unwrap(), 4);
}

#[tokio::test]
async fn test_reindex_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let root = common::write_library(dir.path());
    let h = Harness::new(&root, ScriptedChatModel::default());
    let policy = root.join("HR/leave_policy.md");

    h.indexer.reindex(&policy).await.unwrap();
    h.indexer.reindex(&policy).await.unwrap();

    let key = policy.to_string_lossy();
    assert_eq!(h.store.count_by_filepath(&key).await.unwrap(), 1);
    assert_eq!(h.store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_changed_file_replaces_old_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let root = common::write_library(dir.path());
    let h = Harness::new(&root, ScriptedChatModel::default());
    let policy = root.join("HR/leave_policy.md");
    h.indexer.reindex(&policy).await.unwrap();

    std::fs::write(
        &policy,
        format!(
            "{}\n\nParental leave is sixteen weeks and can be split into two blocks.",
            common::HR_POLICY
        ),
    )
    .unwrap();
    let written = h.indexer.reindex(&policy).await.unwrap();

    assert_eq!(written, 2);
    let key = policy.to_string_lossy();
    assert_eq!(h.store.count_by_filepath(&key).await.unwrap(), 2);
}

#[tokio::test]
async fn test_short_blocks_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("downloads");
    std::fs::create_dir_all(root.join("HR")).unwrap();
    let stub = root.join("HR/stub.md");
    std::fs::write(&stub, "# Leave\n\nTBD.").unwrap();

    let h = Harness::new(&root, ScriptedChatModel::default());
    let written = h.indexer.reindex(&stub).await.unwrap();

    assert_eq!(written, 0);
    assert_eq!(h.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unreadable_file_is_counted_as_failed() {
    let dir = tempfile::tempdir().unwrap();
    let root = common::write_library(dir.path());
    let broken = root.join("Finance/report.pdf");
    std::fs::write(&broken, b"not a pdf at all").unwrap();
    let h = Harness::new(&root, ScriptedChatModel::default());

    let report = h
        .indexer
        .run(&[root.join("Finance/budget.md"), broken])
        .await;

    assert_eq!(report.files_indexed, 1);
    assert_eq!(report.files_failed, 1);
    assert_eq!(report.chunks_written, 1);
}

#[tokio::test]
async fn test_full_index_requires_existing_root() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(&dir.path().join("missing"), ScriptedChatModel::default());
    assert!(h.indexer.run_full().await.is_err());
}

#[tokio::test]
async fn test_other_spellings_of_a_path_share_records() {
    let dir = tempfile::tempdir().unwrap();
    let root = common::write_library(dir.path());
    let h = Harness::new(&root, ScriptedChatModel::default());

    h.indexer
        .reindex(&root.join("HR/leave_policy.md"))
        .await
        .unwrap();
    h.indexer
        .reindex(&root.join("HR/./leave_policy.md"))
        .await
        .unwrap();
    h.indexer
        .reindex(&root.join("./HR/leave_policy.md"))
        .await
        .unwrap();

    assert_eq!(h.store.count().await.unwrap(), 1);
    let key = root.join("HR/leave_policy.md");
    assert_eq!(
        h.store
            .count_by_filepath(&key.to_string_lossy())
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_embedding_outage_keeps_previous_records() {
    let dir = tempfile::tempdir().unwrap();
    let root = common::write_library(dir.path());
    let h = Harness::new(&root, ScriptedChatModel::default());
    let policy = root.join("HR/leave_policy.md");
    h.indexer.reindex(&policy).await.unwrap();

    let down = indexer(
        h.store.clone(),
        Arc::new(PickyEmbedder::failing_on("")),
        &root,
        10,
    );
    assert!(down.reindex(&policy).await.is_err());

    let report = down.run(&[policy.clone()]).await;
    assert_eq!(report.files_indexed, 0);
    assert_eq!(report.files_failed, 1);

    let key = policy.to_string_lossy();
    assert_eq!(h.store.count_by_filepath(&key).await.unwrap(), 1);
}

#[tokio::test]
async fn test_failed_block_embedding_skips_only_that_block() {
    let dir = tempfile::tempdir().unwrap();
    let handbook = write_handbook(dir.path());
    let store = Arc::new(InMemoryStore::new());

    let written = indexer(
        store.clone(),
        Arc::new(PickyEmbedder::failing_on("laptop")),
        dir.path(),
        10,
    )
    .reindex(&handbook)
    .await
    .unwrap();

    assert_eq!(written, 2);
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_failed_batch_keeps_other_batches() {
    let dir = tempfile::tempdir().unwrap();
    let handbook = write_handbook(dir.path());
    let store = Arc::new(FlakyInsertStore {
        inner: InMemoryStore::new(),
        inserts: AtomicUsize::new(0),
        fail_on: 2,
    });

    let written = indexer(
        store.clone(),
        Arc::new(KeywordEmbedder::default()),
        dir.path(),
        1,
    )
    .reindex(&handbook)
    .await
    .unwrap();

    assert_eq!(written, 2);
    assert_eq!(store.count().await.unwrap(), 2);
    assert_eq!(store.inserts.load(Ordering::SeqCst), 3);
}
