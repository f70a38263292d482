//! Microsoft Graph (SharePoint / OneDrive) document library source.
//!
//! Implements [`RemoteSource`] against the Graph v1.0 REST API using an
//! app-only (client-credentials) token.
//!
//! # Configuration
//!
//! ```toml
//! [sync.graph]
//! site_hostname = "acme.sharepoint.com"
//! site_path = "/sites/intranet"
//! library = "Documents"
//! ```
//!
//! Credentials come from `GRAPH_TENANT_ID`, `GRAPH_CLIENT_ID` and
//! `GRAPH_CLIENT_SECRET`.
//!
//! # Requests
//!
//! | Step | Request |
//! |------|---------|
//! | token | `POST {login}/{tenant}/oauth2/v2.0/token` |
//! | site | `GET /sites/{hostname}:{site_path}` |
//! | drive | `GET /sites/{site}/drives`, matched by `name` |
//! | listing | `GET /drives/{drive}/items/{folder}/children`, then `@odata.nextLink` |
//! | content | `@microsoft.graph.downloadUrl`, else `GET /drives/{drive}/items/{id}/content` |

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::config::GraphConfig;
use crate::http;
use crate::sync::{RemoteEntry, RemoteFile, RemotePage, RemoteSource};

const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

pub struct GraphSource {
    config: GraphConfig,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    client: reqwest::Client,
    token: Option<String>,
    drive_id: Option<String>,
}

impl GraphSource {
    /// Build a source from config plus the `GRAPH_*` environment variables.
    pub fn from_env(config: &GraphConfig) -> Result<Self> {
        let var = |name: &str| {
            std::env::var(name).map_err(|_| anyhow!("{} environment variable not set", name))
        };
        Ok(Self {
            config: config.clone(),
            tenant_id: var("GRAPH_TENANT_ID")?,
            client_id: var("GRAPH_CLIENT_ID")?,
            client_secret: var("GRAPH_CLIENT_SECRET")?,
            client: http::build_client(config.timeout_secs)?,
            token: None,
            drive_id: None,
        })
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| anyhow!("Graph source used before authenticate()"))
    }

    /// Overrides the client-wide timeout, which is sized for JSON calls.
    fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.config.download_timeout_secs)
    }

    fn drive(&self) -> Result<&str> {
        self.drive_id
            .as_deref()
            .ok_or_else(|| anyhow!("Graph drive not resolved"))
    }

    async fn get(&self, url: &str) -> Result<serde_json::Value> {
        http::get_json_with_retry(
            &self.client,
            url,
            Some(self.token()?),
            self.config.max_retries,
            "Graph",
        )
        .await
    }
}

#[async_trait]
impl RemoteSource for GraphSource {
    async fn authenticate(&mut self) -> Result<()> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.config.login_base_url.trim_end_matches('/'),
            self.tenant_id
        );
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", GRAPH_SCOPE),
        ];

        let response = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .context("token request failed")?;
        let status = response.status();
        let body: serde_json::Value = response.json().await.unwrap_or_default();

        match body.get("access_token").and_then(|t| t.as_str()) {
            Some(token) if status.is_success() => {
                self.token = Some(token.to_string());
                tracing::debug!("graph token acquired");
                Ok(())
            }
            _ => {
                let reason = body
                    .get("error_description")
                    .and_then(|d| d.as_str())
                    .unwrap_or("no error description");
                bail!("Graph authentication failed ({}): {}", status, reason)
            }
        }
    }

    async fn resolve_root(&mut self) -> Result<String> {
        let site_url = format!(
            "{}/sites/{}:{}",
            self.base(),
            self.config.site_hostname,
            self.config.site_path
        );
        let site = self.get(&site_url).await?;
        let site_id = site
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("Graph site response has no id"))?
            .to_string();

        let drives = self
            .get(&format!("{}/sites/{}/drives", self.base(), site_id))
            .await?;
        let drive_id = find_drive(&drives, &self.config.library)?;
        tracing::info!(site = %site_id, drive = %drive_id, library = %self.config.library, "graph drive resolved");

        self.drive_id = Some(drive_id);
        Ok("root".to_string())
    }

    async fn list_children(&self, folder_id: &str, cursor: Option<&str>) -> Result<RemotePage> {
        let url = match cursor {
            Some(next) => next.to_string(),
            None => format!(
                "{}/drives/{}/items/{}/children",
                self.base(),
                self.drive()?,
                folder_id
            ),
        };
        parse_children_page(&self.get(&url).await?)
    }

    async fn download(&self, file: &RemoteFile, dest: &Path) -> Result<()> {
        let request = match &file.download_url {
            // Pre-authenticated; sending the bearer would be rejected.
            Some(url) => self.client.get(url),
            None => self
                .client
                .get(format!(
                    "{}/drives/{}/items/{}/content",
                    self.base(),
                    self.drive()?,
                    file.id
                ))
                .bearer_auth(self.token()?),
        };

        let mut response = request
            .timeout(self.download_timeout())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            bail!("download of {} failed with {}", file.name, status);
        }

        let mut out = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        while let Some(chunk) = response.chunk().await? {
            out.write_all(&chunk).await?;
        }
        out.flush().await?;
        Ok(())
    }
}

fn find_drive(drives: &serde_json::Value, library: &str) -> Result<String> {
    drives
        .get("value")
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .find(|d| d.get("name").and_then(|n| n.as_str()) == Some(library))
        .and_then(|d| d.get("id").and_then(|id| id.as_str()))
        .map(str::to_string)
        .ok_or_else(|| anyhow!("document library '{}' not found on site", library))
}

/// Parse a `driveItem` collection page. Items that are neither folders nor
/// files (e.g. packages, notebooks) are ignored.
fn parse_children_page(json: &serde_json::Value) -> Result<RemotePage> {
    let items = json
        .get("value")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("Invalid Graph response: missing value array"))?;

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let id = str_field(item, "id")?;
        let name = str_field(item, "name")?;

        if item.get("folder").is_some() {
            entries.push(RemoteEntry::Folder { id, name });
        } else if item.get("file").is_some() {
            let modified = str_field(item, "lastModifiedDateTime")?;
            let modified = DateTime::parse_from_rfc3339(&modified)
                .with_context(|| format!("bad lastModifiedDateTime on {}", name))?
                .with_timezone(&Utc);
            entries.push(RemoteEntry::File(RemoteFile {
                id,
                name,
                modified,
                download_url: item
                    .get("@microsoft.graph.downloadUrl")
                    .and_then(|u| u.as_str())
                    .map(str::to_string),
            }));
        }
    }

    Ok(RemotePage {
        entries,
        next: json
            .get("@odata.nextLink")
            .and_then(|n| n.as_str())
            .map(str::to_string),
    })
}

fn str_field(item: &serde_json::Value, key: &str) -> Result<String> {
    item.get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid Graph item: missing {}", key))
}
