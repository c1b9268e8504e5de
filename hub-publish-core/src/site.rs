//! # site: publish a generated site into a branch of a Hub repository
//!
//! The pipeline rebuilds the output directory as a tree on the Hub without a
//! local working copy:
//!
//! 1. resolve the target repository and scan the output directory
//! 2. read the target reference (absent on first publish)
//! 3. upload one base64 blob per file, plus an empty `.nojekyll` if asked
//! 4. create a tree, optionally on top of the current commit's tree
//! 5. create a commit whose parent is the current reference target, if any
//! 6. create the reference, or move it (fast-forward unless forced)
//!
//! Every step fails fast. The reference is read before anything is written,
//! so a reference that does not point at a commit aborts without mutations.
//! In dry-run mode the reads still happen and the writes are replaced by
//! empty placeholders.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{debug, error, info, warn};

use crate::config::{ProjectInfo, RepositoryConfig, SiteConfig};
use crate::contract::{Blob, Commit, CommitUser, GitData, NewCommit, Reference, Tree, TreeEntry, TYPE_COMMIT};
use crate::error::{PublishError, ResultExt};
use crate::repository::{resolve_repository, RepositoryId};
use crate::scanner::matching_paths;
use crate::strings::non_empty;

/// Marker file that turns off Jekyll processing of the published branch.
pub const NO_JEKYLL_FILE: &str = ".nojekyll";

/// How the target reference was advanced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefUpdate {
    Created,
    Updated { previous: String, forced: bool },
}

#[derive(Debug, Clone)]
pub struct SiteReport {
    pub repository: RepositoryId,
    pub reference: String,
    /// Entries sent to create-tree, in order.
    pub entries: Vec<TreeEntry>,
    /// Tree the new entries were laid over, in merge mode.
    pub base_tree: Option<String>,
    pub tree_sha: String,
    pub commit_sha: String,
    pub parent: Option<String>,
    pub update: RefUpdate,
    /// Nothing was written; shas are empty placeholders.
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub enum SiteOutcome {
    Skipped,
    Published(SiteReport),
}

fn read_file(path: &Path) -> Result<Vec<u8>, PublishError> {
    let io = |source: std::io::Error| PublishError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(io)?;
    let length = file.metadata().map_err(io)?.len();
    // Initial capacity is capped; longer files still grow the buffer.
    let mut buffer = Vec::with_capacity(length.min(i32::MAX as u64) as usize);
    file.read_to_end(&mut buffer).map_err(io)?;
    Ok(buffer)
}

/// Read the reference. `None` when it does not exist yet.
async fn current_reference<G: GitData + ?Sized>(
    data: &G,
    repository: &RepositoryId,
    name: &str,
) -> Result<Option<Reference>, PublishError> {
    match data.get_reference(repository, name).await {
        Ok(reference) if reference.object.kind == TYPE_COMMIT => {
            info!(reference = name, sha = %reference.object.sha, "[SITE] Found existing reference");
            Ok(Some(reference))
        }
        Ok(reference) => {
            error!(
                reference = name,
                kind = %reference.object.kind,
                "[SITE][ERROR] Existing reference does not point to a commit"
            );
            Err(PublishError::Invariant(format!(
                "Existing ref {} points to a {} ({}) instead of a commit",
                reference.name, reference.object.kind, reference.object.sha
            )))
        }
        Err(e) if e.is_not_found() => {
            info!(reference = name, "[SITE] Reference not found, publishing a new branch");
            Ok(None)
        }
        Err(e) => {
            error!(reference = name, error = %e, "[SITE][ERROR] Failed to get reference");
            Err(e.context("Error getting reference"))
        }
    }
}

/// Name and primary email of the authenticated user, stamped with the
/// current time. Any lookup failure leaves the identity to the Hub.
async fn commit_identity<G: GitData + ?Sized>(data: &G) -> Option<CommitUser> {
    let user = match data.get_user().await {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, "[SITE] Unable to look up the authenticated user, commit author left to the Hub");
            return None;
        }
    };
    let emails = match data.get_emails().await {
        Ok(emails) => emails,
        Err(e) => {
            warn!(error = %e, "[SITE] Unable to look up user emails, commit author left to the Hub");
            return None;
        }
    };
    let email = emails
        .iter()
        .find(|e| e.primary)
        .or_else(|| emails.first())
        .map(|e| e.email.clone());
    let Some(email) = email else {
        warn!(login = %user.login, "[SITE] User has no email address, commit author left to the Hub");
        return None;
    };

    let name = user
        .name
        .filter(|n| !n.is_empty())
        .unwrap_or(user.login);
    debug!(name = %name, email = %email, "[SITE] Commit author resolved");
    Some(CommitUser {
        name,
        email,
        date: chrono::Utc::now(),
    })
}

async fn upload_blob<G: GitData + ?Sized>(
    data: &G,
    repository: &RepositoryId,
    file: &Path,
    dry_run: bool,
) -> Result<String, PublishError> {
    let blob = {
        let bytes = read_file(file).context("Error reading file")?;
        Blob::base64(&bytes)
    };
    if dry_run {
        debug!(path = %file.display(), "[DRY RUN][SITE][BLOB] Would create blob");
        return Ok(String::new());
    }

    debug!(path = %file.display(), "[SITE][BLOB] Creating blob");
    match data.create_blob(repository, blob).await {
        Ok(sha) => Ok(sha),
        Err(e) => {
            error!(path = %file.display(), error = %e, "[SITE][ERROR][BLOB] create_blob failed");
            Err(e.context("Error creating blob"))
        }
    }
}

/// Publish `config.output_directory` to the configured branch.
pub async fn publish_site<G: GitData + ?Sized>(
    data: &G,
    config: &SiteConfig,
    target: &RepositoryConfig,
    project: Option<&ProjectInfo>,
) -> Result<SiteOutcome, PublishError> {
    if config.skip {
        info!("[SITE] Skipping site publication");
        return Ok(SiteOutcome::Skipped);
    }

    let message = non_empty(config.message.as_deref())
        .ok_or_else(|| PublishError::Config("No commit message configured".to_string()))?;
    let base = config
        .output_directory
        .as_deref()
        .ok_or_else(|| PublishError::Config("No output directory configured".to_string()))?;
    let repository = resolve_repository(project, target.owner.as_deref(), target.name.as_deref())?;
    let reference_name = config.reference_name();
    let prefix = config.path_prefix();
    let dry_run = config.dry_run;
    if dry_run {
        info!(
            repository = %repository,
            reference = %reference_name,
            "[DRY RUN] Site publication will not write anything to the Hub"
        );
    }

    // --- Scan ---
    debug!(
        base = %base.display(),
        includes = ?config.includes,
        excludes = ?config.excludes,
        "[SITE] Scanning output directory"
    );
    let paths = matching_paths(&config.includes, &config.excludes, base)?;
    debug!(paths = ?paths, "[SITE] Scanned files to include");

    // --- Current reference ---
    let existing = current_reference(data, &repository, &reference_name).await?;

    // --- Blobs ---
    info!(count = paths.len(), "[SITE] Creating blobs");
    let mut entries = Vec::with_capacity(paths.len() + 1);
    for path in &paths {
        let sha = upload_blob(data, &repository, &base.join(path), dry_run).await?;
        entries.push(TreeEntry::blob(format!("{prefix}{path}"), sha));
    }

    if config.no_jekyll && !paths.iter().any(|p| p == NO_JEKYLL_FILE) {
        let sha = if dry_run {
            String::new()
        } else {
            info!("[SITE][BLOB] Creating empty .nojekyll blob");
            data.create_blob(&repository, Blob::base64(&[]))
                .await
                .context("Error creating blob")?
        };
        entries.push(TreeEntry::blob(NO_JEKYLL_FILE, sha));
    }

    // --- Tree ---
    let base_tree = match (&existing, config.merge) {
        (Some(reference), true) => {
            let commit = match data.get_commit(&repository, &reference.object.sha).await {
                Ok(commit) => commit,
                Err(e) => {
                    error!(sha = %reference.object.sha, error = %e, "[SITE][ERROR] Failed to get commit");
                    return Err(e.context("Error getting commit"));
                }
            };
            info!(base_tree = %commit.tree.sha, "[SITE] Merging with existing tree");
            Some(commit.tree.sha)
        }
        _ => None,
    };

    info!(entries = entries.len(), "[SITE] Creating tree");
    let tree = if dry_run {
        Tree::default()
    } else {
        match data
            .create_tree(&repository, entries.clone(), base_tree.clone())
            .await
        {
            Ok(tree) => tree,
            Err(e) => {
                error!(error = %e, "[SITE][ERROR] create_tree failed");
                return Err(e.context("Error creating tree"));
            }
        }
    };

    // --- Commit ---
    let parent = existing.as_ref().map(|r| r.object.sha.clone());
    let identity = commit_identity(data).await;
    let new_commit = NewCommit {
        message: message.to_string(),
        tree: tree.sha.clone(),
        parents: parent.iter().cloned().collect(),
        author: identity.clone(),
        committer: identity,
    };
    let commit = if dry_run {
        Commit::default()
    } else {
        match data.create_commit(&repository, new_commit).await {
            Ok(commit) => {
                info!(sha = %commit.sha, "[SITE] Created commit");
                commit
            }
            Err(e) => {
                error!(error = %e, "[SITE][ERROR] create_commit failed");
                return Err(e.context("Error creating commit"));
            }
        }
    };

    // --- Reference ---
    let reference = Reference::to_commit(reference_name.clone(), commit.sha.clone());
    let update = match &parent {
        Some(previous) => {
            info!(
                reference = %reference_name,
                from = %previous,
                to = %commit.sha,
                force = config.force,
                "[SITE] Updating reference"
            );
            if !dry_run {
                if let Err(e) = data.edit_reference(&repository, reference, config.force).await {
                    error!(error = %e, "[SITE][ERROR] edit_reference failed");
                    return Err(e.context("Error editing reference"));
                }
            }
            RefUpdate::Updated {
                previous: previous.clone(),
                forced: config.force,
            }
        }
        None => {
            info!(reference = %reference_name, sha = %commit.sha, "[SITE] Creating reference");
            if !dry_run {
                if let Err(e) = data.create_reference(&repository, reference).await {
                    error!(error = %e, "[SITE][ERROR] create_reference failed");
                    return Err(e.context("Error creating reference"));
                }
            }
            RefUpdate::Created
        }
    };

    if dry_run {
        info!("[DRY RUN] Site publication finished, nothing was persisted");
    } else {
        info!(repository = %repository, reference = %reference_name, commit = %commit.sha, "[SITE] Site published");
    }

    Ok(SiteOutcome::Published(SiteReport {
        repository,
        reference: reference_name,
        entries,
        base_tree,
        tree_sha: tree.sha,
        commit_sha: commit.sha,
        parent,
        update,
        dry_run,
    }))
}
