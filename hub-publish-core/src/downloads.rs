//! # downloads: publish release binaries as downloadable assets
//!
//! Files come either from an include/exclude scan of the build directory or,
//! when no pattern is configured, from the main artifact and (optionally)
//! the attached artifacts. With `override` set, existing downloads whose
//! names collide with an upload are deleted first. Any failure aborts the
//! publication; dry-run lists but neither deletes nor uploads.
//!
//! [`ReleaseAssets`] implements [`DownloadService`] on the Hub's release
//! assets API.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::client::HubClient;
use crate::config::{DownloadsConfig, ProjectInfo, RepositoryConfig};
use crate::contract::{Download, DownloadService, NewDownload};
use crate::error::{PublishError, ResultExt};
use crate::repository::{resolve_repository, RepositoryId};
use crate::scanner::matching_files;
use crate::strings::{non_empty, remove_empties};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedDownload {
    pub name: String,
    pub size: u64,
    /// Id assigned by the Hub; `None` in dry-run.
    pub id: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct DownloadsReport {
    pub repository: RepositoryId,
    pub tag: String,
    pub deleted: Vec<String>,
    pub uploaded: Vec<UploadedDownload>,
    pub dry_run: bool,
}

/// Insert `suffix` before the last extension of `file_name`, or append it
/// when there is no extension.
pub fn download_name(file_name: &str, suffix: Option<&str>) -> String {
    let Some(suffix) = non_empty(suffix) else {
        return file_name.to_string();
    };
    match file_name.rfind('.') {
        Some(dot) => format!("{}{}{}", &file_name[..dot], suffix, &file_name[dot..]),
        None => format!("{file_name}{suffix}"),
    }
}

fn existing_file(path: &Path) -> Option<PathBuf> {
    path.is_file().then(|| path.to_path_buf())
}

/// Files to publish, in upload order.
pub fn select_files(config: &DownloadsConfig) -> Result<Vec<PathBuf>, PublishError> {
    let includes = remove_empties(&config.includes);
    let excludes = remove_empties(&config.excludes);

    if !includes.is_empty() || !excludes.is_empty() {
        let base = config.build_directory.as_deref().ok_or_else(|| {
            PublishError::Config("No build directory configured for include/exclude scanning".to_string())
        })?;
        debug!(
            base = %base.display(),
            includes = ?includes,
            excludes = ?excludes,
            "[DOWNLOADS] Scanning build directory"
        );
        let files = matching_files(&includes, &excludes, base)?;
        debug!(files = ?files, "[DOWNLOADS] Scanned files to include");
        return Ok(files);
    }

    let mut files: Vec<PathBuf> = config.artifact.as_deref().and_then(existing_file).into_iter().collect();
    if config.include_attached {
        files.extend(config.attached.iter().filter_map(|p| existing_file(p)));
    }
    debug!(files = ?files, "[DOWNLOADS] Artifact files to include");
    Ok(files)
}

async fn existing_downloads<D: DownloadService + ?Sized>(
    service: &D,
    repository: &RepositoryId,
    tag: &str,
) -> Result<HashMap<String, u64>, PublishError> {
    match service.list_downloads(repository, tag).await {
        Ok(downloads) => {
            let existing: HashMap<String, u64> = downloads
                .into_iter()
                .filter(|d| !d.name.is_empty())
                .map(|d| (d.name, d.id))
                .collect();
            debug!(count = existing.len(), "[DOWNLOADS] Listed existing downloads");
            Ok(existing)
        }
        Err(e) => {
            error!(error = %e, "[DOWNLOADS][ERROR] Listing downloads failed");
            Err(e.context("Listing downloads failed"))
        }
    }
}

/// Publish the selected files as downloads of the configured release.
pub async fn publish_downloads<D: DownloadService + ?Sized>(
    service: &D,
    config: &DownloadsConfig,
    target: &RepositoryConfig,
    project: Option<&ProjectInfo>,
) -> Result<DownloadsReport, PublishError> {
    let tag = non_empty(config.tag.as_deref())
        .ok_or_else(|| PublishError::Config("No release tag configured".to_string()))?
        .to_string();
    let repository = resolve_repository(project, target.owner.as_deref(), target.name.as_deref())?;
    let files = select_files(config)?;
    let dry_run = config.dry_run;

    let existing = if config.override_existing {
        existing_downloads(service, &repository, &tag).await?
    } else {
        HashMap::new()
    };

    if dry_run {
        info!("[DRY RUN] Downloads will not be deleted or uploaded");
    }
    info!(count = files.len(), repository = %repository, tag = %tag, "[DOWNLOADS] Adding downloads");

    let mut report = DownloadsReport {
        repository: repository.clone(),
        tag: tag.clone(),
        deleted: Vec::new(),
        uploaded: Vec::new(),
        dry_run,
    };

    for file in files {
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| PublishError::Config(format!("{} is not a file", file.display())))?;
        let name = download_name(&file_name, config.suffix.as_deref());
        let size = std::fs::metadata(&file)
            .map_err(|source| PublishError::Io {
                path: file.clone(),
                source,
            })?
            .len();

        if let Some(&id) = existing.get(&name) {
            info!(name = %name, id, "[DOWNLOADS] Deleting existing download");
            if !dry_run {
                if let Err(e) = service.delete_download(&repository, id).await {
                    error!(name = %name, error = %e, "[DOWNLOADS][ERROR] Delete failed");
                    return Err(e.context(format!("Deleting existing download {name} failed")));
                }
            }
            report.deleted.push(name.clone());
        }

        info!(name = %name, size, "[DOWNLOADS] Adding download");
        let id = if dry_run {
            None
        } else {
            let download = NewDownload {
                name: name.clone(),
                description: non_empty(config.description.as_deref()).map(str::to_string),
                path: file.clone(),
                size,
            };
            match service.create_download(&repository, &tag, download).await {
                Ok(created) => Some(created.id),
                Err(e) => {
                    error!(name = %name, error = %e, "[DOWNLOADS][ERROR] Upload failed");
                    return Err(e.context(format!("Resource {name} upload failed")));
                }
            }
        };
        report.uploaded.push(UploadedDownload { name, size, id });
    }

    Ok(report)
}

#[derive(Debug, Clone, Deserialize)]
struct Release {
    id: u64,
    upload_url: String,
}

/// [`DownloadService`] on release assets. The release for a tag is looked up
/// once and reused.
#[derive(Debug)]
pub struct ReleaseAssets {
    client: HubClient,
    releases: Mutex<HashMap<String, Release>>,
}

impl ReleaseAssets {
    pub fn new(client: HubClient) -> Self {
        Self {
            client,
            releases: Mutex::new(HashMap::new()),
        }
    }

    async fn release(&self, repository: &RepositoryId, tag: &str) -> Result<Release, PublishError> {
        let key = format!("{repository}@{tag}");
        let mut releases = self.releases.lock().await;
        if let Some(release) = releases.get(&key) {
            return Ok(release.clone());
        }
        let path = format!("/repos/{}/{}/releases/tags/{tag}", repository.owner, repository.name);
        let release: Release = self.client.get(&path).await.context("Error getting release")?;
        debug!(tag, id = release.id, "[DOWNLOADS] Resolved release");
        releases.insert(key, release.clone());
        Ok(release)
    }
}

/// `https://uploads.host/.../assets{?name,label}` without the template part.
fn upload_target(upload_url: &str) -> &str {
    upload_url.split('{').next().unwrap_or(upload_url)
}

#[async_trait]
impl DownloadService for ReleaseAssets {
    async fn list_downloads(&self, repository: &RepositoryId, tag: &str) -> Result<Vec<Download>, PublishError> {
        let release = self.release(repository, tag).await?;
        let path = format!(
            "/repos/{}/{}/releases/{}/assets?per_page=100",
            repository.owner, repository.name, release.id
        );
        self.client.get_all(&path).await
    }

    async fn delete_download(&self, repository: &RepositoryId, id: u64) -> Result<(), PublishError> {
        let path = format!("/repos/{}/{}/releases/assets/{id}", repository.owner, repository.name);
        self.client.delete(&path).await
    }

    async fn create_download(
        &self,
        repository: &RepositoryId,
        tag: &str,
        download: NewDownload,
    ) -> Result<Download, PublishError> {
        let release = self.release(repository, tag).await?;
        let bytes = std::fs::read(&download.path).map_err(|source| PublishError::Io {
            path: download.path.clone(),
            source,
        })?;
        debug!(name = %download.name, size = download.size, "[DOWNLOADS] Uploading asset");

        let mut query = vec![("name", download.name.as_str())];
        if let Some(label) = download.description.as_deref() {
            query.push(("label", label));
        }
        self.client
            .post_bytes(upload_target(&release.upload_url), &query, bytes)
            .await
    }
}
