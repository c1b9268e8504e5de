//! [`GitData`] over HTTP: one request per call against the Hub's git data
//! endpoints.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::client::HubClient;
use crate::contract::{
    Blob, Commit, GitData, NewCommit, Reference, ShaReference, Tree, TreeEntry, User, UserEmail,
};
use crate::error::PublishError;
use crate::repository::RepositoryId;

#[derive(Serialize)]
struct NewTree<'a> {
    tree: &'a [TreeEntry],
    #[serde(skip_serializing_if = "Option::is_none")]
    base_tree: Option<&'a str>,
}

#[derive(Serialize)]
struct NewReference<'a> {
    #[serde(rename = "ref")]
    name: &'a str,
    sha: &'a str,
}

#[derive(Serialize)]
struct ReferenceUpdate<'a> {
    sha: &'a str,
    force: bool,
}

/// Path of the repository's git data root.
fn git_path(repository: &RepositoryId, rest: &str) -> String {
    format!("/repos/{}/{}/git/{rest}", repository.owner, repository.name)
}

/// `refs/heads/x` is addressed as `git/refs/heads/x`.
fn reference_path(repository: &RepositoryId, name: &str) -> String {
    let name = name.strip_prefix("refs/").unwrap_or(name);
    git_path(repository, &format!("refs/{name}"))
}

#[derive(Debug, Clone)]
pub struct DataService {
    client: HubClient,
}

impl DataService {
    pub fn new(client: HubClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GitData for DataService {
    async fn create_blob(&self, repository: &RepositoryId, blob: Blob) -> Result<String, PublishError> {
        let created: ShaReference = self.client.post(&git_path(repository, "blobs"), &blob).await?;
        debug!(sha = %created.sha, "Created blob");
        Ok(created.sha)
    }

    async fn create_tree(
        &self,
        repository: &RepositoryId,
        entries: Vec<TreeEntry>,
        base_tree: Option<String>,
    ) -> Result<Tree, PublishError> {
        let body = NewTree {
            tree: &entries,
            base_tree: base_tree.as_deref(),
        };
        self.client.post(&git_path(repository, "trees"), &body).await
    }

    async fn create_commit(&self, repository: &RepositoryId, commit: NewCommit) -> Result<Commit, PublishError> {
        self.client.post(&git_path(repository, "commits"), &commit).await
    }

    async fn get_reference(&self, repository: &RepositoryId, name: &str) -> Result<Reference, PublishError> {
        self.client.get(&reference_path(repository, name)).await
    }

    async fn get_commit(&self, repository: &RepositoryId, sha: &str) -> Result<Commit, PublishError> {
        self.client
            .get(&git_path(repository, &format!("commits/{sha}")))
            .await
    }

    async fn create_reference(&self, repository: &RepositoryId, reference: Reference) -> Result<Reference, PublishError> {
        let body = NewReference {
            name: &reference.name,
            sha: &reference.object.sha,
        };
        self.client.post(&git_path(repository, "refs"), &body).await
    }

    async fn edit_reference(
        &self,
        repository: &RepositoryId,
        reference: Reference,
        force: bool,
    ) -> Result<Reference, PublishError> {
        let body = ReferenceUpdate {
            sha: &reference.object.sha,
            force,
        };
        self.client
            .patch(&reference_path(repository, &reference.name), &body)
            .await
    }

    async fn get_user(&self) -> Result<User, PublishError> {
        self.client.get("/user").await
    }

    async fn get_emails(&self) -> Result<Vec<UserEmail>, PublishError> {
        self.client.get("/user/emails").await
    }
}
