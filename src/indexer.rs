//! Vector index maintenance.
//!
//! Re-indexing a file replaces every record for its path: extract blocks,
//! embed what survives, delete the old records, insert in batches. Paths
//! are made absolute and lexically normalized first, so every spelling of
//! one file maps to one set of records and running it twice over an
//! unchanged file leaves the same set of records.
//!
//! Failures are isolated at the smallest unit that makes sense:
//!
//! | Failure | Effect |
//! |---------|--------|
//! | conversion | file reported as failed, old records kept |
//! | embedding a block | block skipped |
//! | embedding every block | file reported as failed, old records kept |
//! | inserting a batch | batch skipped, earlier batches kept |

use anyhow::{anyhow, bail, Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::config::IndexingConfig;
use crate::embedding::{self, EmbeddingProvider};
use crate::extract::{category_for_path, extract_blocks, lexical, DocumentConverter};
use crate::models::{ChunkMetadata, ChunkRecord};
use crate::store::VectorStore;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub files_indexed: usize,
    pub files_failed: usize,
    pub chunks_written: usize,
}

pub struct Indexer {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    converter: Arc<dyn DocumentConverter>,
    root: PathBuf,
    config: IndexingConfig,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        converter: Arc<dyn DocumentConverter>,
        root: impl Into<PathBuf>,
        config: IndexingConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            converter,
            root: index_key(&root.into()),
            config,
        }
    }

    /// Replace the index records for `path`. Returns the number written.
    ///
    /// Old records are only deleted once the new blocks are embedded; if the
    /// file has blocks but none of them embeds, the call fails and the index
    /// keeps what it had.
    pub async fn reindex(&self, path: &Path) -> Result<usize> {
        let path = index_key(path);
        let blocks = {
            let converter = self.converter.clone();
            let owned = path.clone();
            let config = self.config.clone();
            tokio::task::spawn_blocking(move || extract_blocks(&*converter, &owned, &config))
                .await?
                .with_context(|| format!("failed to convert {}", path.display()))?
        };

        let filepath = path.to_string_lossy().into_owned();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| filepath.clone());
        let category = category_for_path(&path, &self.root);

        let block_count = blocks.len();
        let mut records = Vec::with_capacity(block_count);
        for block in blocks {
            match embedding::embed(&*self.embedder, &block.text).await {
                Ok(vector) => records.push(ChunkRecord {
                    content: block.text,
                    metadata: ChunkMetadata {
                        filepath: filepath.clone(),
                        filename: filename.clone(),
                        category: category.clone(),
                        page_no: block.page_no,
                    },
                    embedding: vector,
                }),
                Err(e) => {
                    tracing::warn!(%filepath, page = block.page_no, error = %e, "skipping block: embedding failed");
                }
            }
        }
        if block_count > 0 && records.is_empty() {
            bail!("no block of {} could be embedded; keeping old records", filepath);
        }

        let removed = self.store.delete_by_filepath(&filepath).await?;
        tracing::debug!(%filepath, removed, blocks = block_count, embedded = records.len(), "reindexing");

        let mut written = 0;
        for (batch_no, batch) in records.chunks(self.config.batch_size).enumerate() {
            match self.store.insert_batch(batch).await {
                Ok(n) => written += n,
                Err(e) => {
                    tracing::error!(%filepath, batch = batch_no, size = batch.len(), error = %e, "batch insert failed");
                }
            }
        }

        tracing::info!(%filepath, %category, chunks = written, "indexed");
        Ok(written)
    }

    /// Re-index each of `files`. Per-file failures are logged and counted.
    pub async fn run(&self, files: &[PathBuf]) -> IndexReport {
        let mut report = IndexReport::default();

        for path in files {
            match self.reindex(path).await {
                Ok(n) => {
                    report.files_indexed += 1;
                    report.chunks_written += n;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %format!("{:#}", e), "indexing failed");
                    report.files_failed += 1;
                }
            }
        }

        report
    }

    /// Re-index every file under the sync root matching the include globs.
    pub async fn run_full(&self) -> Result<IndexReport> {
        let files = self.discover()?;
        tracing::info!(root = %self.root.display(), files = files.len(), "full scan");
        Ok(self.run(&files).await)
    }

    /// Files under the sync root matching `include_globs`, in path order.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        if !self.root.exists() {
            return Err(anyhow!("sync root does not exist: {}", self.root.display()));
        }
        let include = build_globset(&self.config.include_globs)?;

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            if include.is_match(relative) {
                files.push(path.to_path_buf());
            }
        }
        Ok(files)
    }
}

/// Absolute, `.`-free form of `path`, used as the record key.
fn index_key(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    lexical(&absolute)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
    }
    Ok(builder.build()?)
}
