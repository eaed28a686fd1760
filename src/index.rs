//! Upload of converted artifacts to the document-indexing service.
//!
//! ## Why a trait?
//!
//! The indexing service is an external collaborator; the pipeline only
//! depends on four calls (readiness, list titles, upload, submit for
//! embedding). [`DocumentIndex`] captures that contract so the upload logic
//! in [`upload_new_artifacts`] is tested against an in-memory fake, while
//! [`AnythingLlmIndex`] speaks the real HTTP API.
//!
//! ## Dedup rule
//!
//! An artifact's title is its stem plus `.txt`, which is the name the
//! service reports for an uploaded text document. Titles already present in
//! the listing are never uploaded again, so rerunning an upload is safe.

use crate::config::{IndexConfig, RetryPolicy};
use crate::error::PipelineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// The call contract of a document-indexing service.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Poll until the service answers, per `policy`. `false` when it never did.
    async fn wait_until_available(&self, policy: &RetryPolicy) -> bool;

    /// Titles of every document the service already holds.
    async fn list_titles(&self) -> Result<HashSet<String>, PipelineError>;

    /// Upload one file; returns the document location when the service
    /// reports one.
    async fn upload(&self, path: &Path) -> Result<Option<String>, PipelineError>;

    /// Submit uploaded locations for embedding.
    async fn update_embeddings(&self, adds: &[String]) -> Result<(), PipelineError>;
}

/// What an upload pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReport {
    /// Titles skipped because the service already had them.
    pub already_present: Vec<String>,
    /// Locations returned for newly uploaded artifacts.
    pub uploaded: Vec<String>,
    /// Artifacts whose upload failed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
    /// Whether an embeddings update was submitted and accepted.
    pub embeddings_updated: bool,
}

/// Title the service will report for an artifact: `<stem>.txt`.
pub fn artifact_title(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{stem}.txt")
}

/// Upload every artifact in `output_dir` the index does not have yet, then
/// submit all new locations in a single embeddings update.
///
/// Listing failures are fatal, since uploading blind would duplicate
/// documents. Per-file upload failures and a rejected embeddings update are
/// logged and reported.
pub async fn upload_new_artifacts(
    index: &dyn DocumentIndex,
    output_dir: &Path,
) -> Result<UploadReport, PipelineError> {
    let existing = index.list_titles().await?;
    info!("Index holds {} documents", existing.len());

    let mut artifacts = Vec::new();
    let unreadable = |e: std::io::Error| {
        PipelineError::Internal(format!("Cannot read '{}': {e}", output_dir.display()))
    };
    let mut entries = tokio::fs::read_dir(output_dir).await.map_err(unreadable)?;
    while let Some(entry) = entries.next_entry().await.map_err(unreadable)? {
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if is_file {
            artifacts.push(entry.path());
        }
    }
    artifacts.sort();

    let mut report = UploadReport::default();
    for path in artifacts {
        let title = artifact_title(&path);
        if existing.contains(&title) {
            debug!("'{}' already indexed, skipping", title);
            report.already_present.push(title);
            continue;
        }

        info!("Uploading {}", path.display());
        match index.upload(&path).await {
            Ok(Some(location)) => report.uploaded.push(location),
            Ok(None) => {
                warn!("Upload of {} returned no document location", path.display());
                report
                    .failed
                    .push((path, "no document location in response".to_string()));
            }
            Err(e) => {
                warn!("Upload of {} failed: {}", path.display(), e);
                report.failed.push((path, e.to_string()));
            }
        }
    }

    if report.uploaded.is_empty() {
        info!("No new documents to embed");
        return Ok(report);
    }

    info!("Updating embeddings for {} documents", report.uploaded.len());
    match index.update_embeddings(&report.uploaded).await {
        Ok(()) => report.embeddings_updated = true,
        Err(e) => error!("Embeddings update failed: {}", e),
    }
    Ok(report)
}

// ── AnythingLLM client ───────────────────────────────────────────────────

/// [`DocumentIndex`] over the AnythingLLM developer API.
pub struct AnythingLlmIndex {
    client: reqwest::Client,
    config: IndexConfig,
}

#[derive(Debug, Deserialize)]
struct DocumentsResponse {
    #[serde(rename = "localFiles", default)]
    local_files: Folder,
}

#[derive(Debug, Default, Deserialize)]
struct Folder {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(rename = "type", default)]
    kind: String,
    title: Option<String>,
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    documents: Vec<UploadedDocument>,
}

#[derive(Debug, Deserialize)]
struct UploadedDocument {
    location: Option<String>,
}

fn collect_titles(items: &[Item], titles: &mut HashSet<String>) {
    for item in items {
        match item.kind.as_str() {
            "file" => {
                if let Some(title) = &item.title {
                    titles.insert(title.clone());
                }
            }
            "folder" => collect_titles(&item.items, titles),
            _ => {}
        }
    }
}

impl AnythingLlmIndex {
    pub fn new(config: IndexConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PipelineError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn request_err(url: &str, reason: impl std::fmt::Display) -> PipelineError {
        PipelineError::IndexRequest {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    async fn check(url: &str, resp: reqwest::Response) -> Result<reqwest::Response, PipelineError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(Self::request_err(url, format!("HTTP {status}: {}", body.trim())))
    }
}

#[async_trait]
impl DocumentIndex for AnythingLlmIndex {
    async fn wait_until_available(&self, policy: &RetryPolicy) -> bool {
        info!("Waiting for indexing service at {}", self.config.base_url);
        for attempt in 1..=policy.max_attempts {
            match self.client.get(&self.config.base_url).send().await {
                Ok(resp) if resp.status() == reqwest::StatusCode::OK => {
                    info!("Indexing service is available");
                    return true;
                }
                Ok(resp) => debug!("Readiness check answered {}", resp.status()),
                Err(e) => debug!("Readiness check failed: {}", e),
            }
            if attempt < policy.max_attempts {
                warn!(
                    "Indexing service not ready ({}/{}), retrying in {:?}",
                    attempt, policy.max_attempts, policy.backoff
                );
                sleep(policy.backoff).await;
            }
        }
        error!("Indexing service did not become available");
        false
    }

    async fn list_titles(&self) -> Result<HashSet<String>, PipelineError> {
        let url = self.url("/api/v1/documents");
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| Self::request_err(&url, e))?;
        let listing: DocumentsResponse = Self::check(&url, resp)
            .await?
            .json()
            .await
            .map_err(|e| Self::request_err(&url, e))?;

        let mut titles = HashSet::new();
        collect_titles(&listing.local_files.items, &mut titles);
        Ok(titles)
    }

    async fn upload(&self, path: &Path) -> Result<Option<String>, PipelineError> {
        let url = self.url("/api/v1/document/upload");
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Self::request_err(&url, format!("reading {}: {e}", path.display())))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(file_name))
            .text("workspace", self.config.workspace.clone());
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Self::request_err(&url, e))?;
        let uploaded: UploadResponse = Self::check(&url, resp)
            .await?
            .json()
            .await
            .map_err(|e| Self::request_err(&url, e))?;

        Ok(uploaded.documents.into_iter().next().and_then(|d| d.location))
    }

    async fn update_embeddings(&self, adds: &[String]) -> Result<(), PipelineError> {
        let url = self.url(&format!(
            "/api/v1/workspace/{}/update-embeddings",
            self.config.workspace
        ));
        let body = serde_json::json!({ "adds": adds, "deletes": [] });
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::request_err(&url, e))?;
        Self::check(&url, resp).await?;
        Ok(())
    }
}
