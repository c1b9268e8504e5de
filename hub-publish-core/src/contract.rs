//! # contract: the seams between the publishers and the Hub
//!
//! The site publisher talks to the Hub only through [`GitData`], the Hub's
//! "git data" primitives (blobs, trees, commits, references) plus the user
//! lookups needed for commit authorship. The downloads publisher talks only
//! through [`DownloadService`].
//!
//! Both traits are annotated for `mockall`, so pipelines can be exercised
//! against deterministic mocks. The mocks are exported behind the
//! `test-export-mocks` feature for use from other crates' tests.
//!
//! The wire types below serialise to the exact JSON bodies the Hub expects.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::PublishError;
use crate::repository::RepositoryId;

pub const ENCODING_BASE64: &str = "base64";
pub const TYPE_BLOB: &str = "blob";
pub const TYPE_COMMIT: &str = "commit";
/// Mode of a regular, non-executable file.
pub const MODE_BLOB: &str = "100644";

/// Content of a blob to create.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub encoding: String,
    pub content: String,
}

impl Blob {
    /// A blob carrying `bytes` as base64.
    pub fn base64(bytes: &[u8]) -> Self {
        use base64::Engine;
        Self {
            encoding: ENCODING_BASE64.to_string(),
            content: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
}

impl TreeEntry {
    /// A regular-file entry pointing at the blob `sha`.
    pub fn blob(path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: MODE_BLOB.to_string(),
            kind: TYPE_BLOB.to_string(),
            sha: sha.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub sha: String,
    #[serde(default)]
    pub tree: Vec<TreeEntry>,
}

/// Bare `{sha}` pointer as it appears in commit responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaReference {
    pub sha: String,
}

/// Author or committer identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitUser {
    pub name: String,
    pub email: String,
    pub date: DateTime<Utc>,
}

/// Body of a create-commit request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NewCommit {
    pub message: String,
    /// Sha of the tree.
    pub tree: String,
    /// Zero or one parent sha.
    pub parents: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<CommitUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committer: Option<CommitUser>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub tree: ShaReference,
    #[serde(default)]
    pub parents: Vec<ShaReference>,
    #[serde(default)]
    pub author: Option<CommitUser>,
    #[serde(default)]
    pub committer: Option<CommitUser>,
}

/// Object a reference points at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedResource {
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Fully qualified name, e.g. `refs/heads/gh-pages`.
    #[serde(rename = "ref")]
    pub name: String,
    pub object: TypedResource,
}

impl Reference {
    /// A reference named `name` pointing at the commit `sha`.
    pub fn to_commit(name: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            object: TypedResource {
                kind: TYPE_COMMIT.to_string(),
                sha: sha.into(),
            },
        }
    }
}

/// The authenticated user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct User {
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserEmail {
    pub email: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub verified: bool,
}

/// The Hub's git data primitives. Each call maps to exactly one request.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait GitData: Send + Sync {
    /// Create a blob and return its sha.
    async fn create_blob(&self, repository: &RepositoryId, blob: Blob) -> Result<String, PublishError>;

    /// Create a tree. With `base_tree` the entries are overlaid on that tree;
    /// without it the tree holds exactly `entries`.
    async fn create_tree(
        &self,
        repository: &RepositoryId,
        entries: Vec<TreeEntry>,
        base_tree: Option<String>,
    ) -> Result<Tree, PublishError>;

    async fn create_commit(&self, repository: &RepositoryId, commit: NewCommit) -> Result<Commit, PublishError>;

    /// Read a reference by its fully qualified name. A missing reference is
    /// reported as a `Hub` error with status 404.
    async fn get_reference(&self, repository: &RepositoryId, name: &str) -> Result<Reference, PublishError>;

    async fn get_commit(&self, repository: &RepositoryId, sha: &str) -> Result<Commit, PublishError>;

    async fn create_reference(&self, repository: &RepositoryId, reference: Reference) -> Result<Reference, PublishError>;

    /// Point an existing reference at `reference.object.sha`. Without `force`
    /// the Hub rejects non-fast-forward updates.
    async fn edit_reference(
        &self,
        repository: &RepositoryId,
        reference: Reference,
        force: bool,
    ) -> Result<Reference, PublishError>;

    async fn get_user(&self) -> Result<User, PublishError>;

    async fn get_emails(&self) -> Result<Vec<UserEmail>, PublishError>;
}

/// A downloadable file attached to a release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Download {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub browser_download_url: Option<String>,
}

/// A local file to publish as a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDownload {
    /// Name the file is published under.
    pub name: String,
    pub description: Option<String>,
    pub path: PathBuf,
    /// Measured before upload.
    pub size: u64,
}

/// Release downloads of a repository, addressed by release tag.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DownloadService: Send + Sync {
    async fn list_downloads(&self, repository: &RepositoryId, tag: &str) -> Result<Vec<Download>, PublishError>;

    async fn delete_download(&self, repository: &RepositoryId, id: u64) -> Result<(), PublishError>;

    /// Create the download resource and upload the file's bytes.
    async fn create_download(
        &self,
        repository: &RepositoryId,
        tag: &str,
        download: NewDownload,
    ) -> Result<Download, PublishError>;
}
