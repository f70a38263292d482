//! One-shot mirror of a remote document library into the local sync root.
//!
//! A run walks the remote folder tree depth-first and downloads every file
//! that is new, newer than the recorded copy, or missing locally. The
//! per-item modification times live in [`SyncState`], a JSON file next to
//! the index. Runs are serialized with a [`SyncLock`] file.
//!
//! Failure policy: authentication and listing failures abort the run; a
//! failed download is logged, counted, and leaves its state entry untouched
//! so the next run retries it.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Last-synced modification time per remote item id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncState {
    entries: BTreeMap<String, DateTime<Utc>>,
}

impl SyncState {
    /// Load from `path`. A missing file is an empty state.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse sync state: {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read sync state: {}", path.display())),
        }
    }

    /// Write to `path` via a sibling temp file and rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = sibling(path, "tmp");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    pub fn get(&self, item_id: &str) -> Option<DateTime<Utc>> {
        self.entries.get(item_id).copied()
    }

    pub fn record(&mut self, item_id: &str, modified: DateTime<Utc>) {
        self.entries.insert(item_id.to_string(), modified);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A file is fetched when it has no entry, its remote time is strictly
    /// newer than the recorded one, or the local copy is gone.
    pub fn needs_download(
        &self,
        item_id: &str,
        remote_modified: DateTime<Utc>,
        local_exists: bool,
    ) -> bool {
        match self.get(item_id) {
            None => true,
            Some(recorded) => remote_modified > recorded || !local_exists,
        }
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Exclusive run lock at `<state_file>.lock`, removed on drop.
#[derive(Debug)]
pub struct SyncLock {
    path: PathBuf,
}

impl SyncLock {
    pub fn acquire(state_file: &Path) -> Result<Self> {
        let path = sibling(state_file, "lock");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                bail!(
                    "another sync or index run holds {} (remove it if no run is active)",
                    path.display()
                )
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create {}", path.display()))
            }
        };
        writeln!(file, "{}", std::process::id())?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove sync lock");
        }
    }
}

/// A file as listed by the remote source.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub modified: DateTime<Utc>,
    /// Pre-authenticated download link, when the source provides one.
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEntry {
    Folder { id: String, name: String },
    File(RemoteFile),
}

/// One page of a folder listing plus the continuation cursor, if any.
#[derive(Debug, Clone, Default)]
pub struct RemotePage {
    pub entries: Vec<RemoteEntry>,
    pub next: Option<String>,
}

/// A remote document library that can be listed and downloaded from.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Obtain credentials. Called once per run, before anything else.
    async fn authenticate(&mut self) -> Result<()>;

    /// Resolve the library and return the id of its root folder.
    async fn resolve_root(&mut self) -> Result<String>;

    /// List one page of `folder_id`'s children. `cursor` is the `next`
    /// value of the previous page.
    async fn list_children(&self, folder_id: &str, cursor: Option<&str>) -> Result<RemotePage>;

    /// Fetch the content of `file` into `dest`.
    async fn download(&self, file: &RemoteFile, dest: &Path) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct SyncReport {
    /// Local paths written during this run, in download order.
    pub changed: Vec<PathBuf>,
    pub skipped: usize,
    pub failed: usize,
}

/// Mirrors a [`RemoteSource`] into `root`, tracking progress in `state_file`.
pub struct SourceSync {
    root: PathBuf,
    state_file: PathBuf,
}

impl SourceSync {
    pub fn new(root: impl Into<PathBuf>, state_file: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            state_file: state_file.into(),
        }
    }

    /// Run one sync pass. The caller must hold the run lock for the
    /// duration, which `_lock` witnesses.
    pub async fn run(
        &self,
        _lock: &SyncLock,
        source: &mut dyn RemoteSource,
    ) -> Result<SyncReport> {
        let mut state = SyncState::load(&self.state_file)?;

        source
            .authenticate()
            .await
            .context("remote source authentication failed")?;
        let root_id = source.resolve_root().await?;

        let mut report = SyncReport::default();
        let walked = self
            .walk(&*source, &root_id, &mut state, &mut report)
            .await;

        // Only successful downloads are recorded, so partial state is safe
        // to keep even when the walk failed.
        state.save(&self.state_file)?;
        walked?;

        tracing::info!(
            changed = report.changed.len(),
            skipped = report.skipped,
            failed = report.failed,
            "sync finished"
        );
        Ok(report)
    }

    async fn walk(
        &self,
        source: &dyn RemoteSource,
        root_id: &str,
        state: &mut SyncState,
        report: &mut SyncReport,
    ) -> Result<()> {
        let mut stack = vec![(root_id.to_string(), self.root.clone())];

        while let Some((folder_id, local_dir)) = stack.pop() {
            let mut subfolders = Vec::new();
            let mut cursor: Option<String> = None;

            loop {
                let page = source
                    .list_children(&folder_id, cursor.as_deref())
                    .await
                    .with_context(|| format!("failed to list folder {}", local_dir.display()))?;

                for entry in page.entries {
                    match entry {
                        RemoteEntry::Folder { id, name } => match safe_name(&name) {
                            Some(name) => subfolders.push((id, local_dir.join(name))),
                            None => tracing::warn!(%name, "skipping folder with unsafe name"),
                        },
                        RemoteEntry::File(file) => {
                            self.sync_file(source, &file, &local_dir, state, report)
                                .await;
                        }
                    }
                }

                match page.next {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }

            // Reverse so the first listed folder is visited first.
            stack.extend(subfolders.into_iter().rev());
        }

        Ok(())
    }

    async fn sync_file(
        &self,
        source: &dyn RemoteSource,
        file: &RemoteFile,
        local_dir: &Path,
        state: &mut SyncState,
        report: &mut SyncReport,
    ) {
        let Some(name) = safe_name(&file.name) else {
            tracing::warn!(name = %file.name, "skipping file with unsafe name");
            report.failed += 1;
            return;
        };
        let dest = local_dir.join(name);

        if !state.needs_download(&file.id, file.modified, dest.exists()) {
            report.skipped += 1;
            return;
        }

        match download_atomically(source, file, &dest).await {
            Ok(()) => {
                tracing::info!(path = %dest.display(), "downloaded");
                state.record(&file.id, file.modified);
                report.changed.push(dest);
            }
            Err(e) => {
                tracing::warn!(path = %dest.display(), error = %e, "download failed");
                report.failed += 1;
            }
        }
    }
}

async fn download_atomically(source: &dyn RemoteSource, file: &RemoteFile, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = sibling(dest, "part");

    if let Err(e) = source.download(file, &tmp).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    tokio::fs::rename(&tmp, dest)
        .await
        .with_context(|| format!("Failed to move download into {}", dest.display()))?;
    Ok(())
}

/// Accept a remote item name only if it is a single normal path component.
fn safe_name(name: &str) -> Option<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\'])
    {
        None
    } else {
        Some(trimmed)
    }
}
