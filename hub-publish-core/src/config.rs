use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// Default reference updated by the site publisher.
pub const BRANCH_DEFAULT: &str = "refs/heads/gh-pages";

fn default_branch() -> String {
    BRANCH_DEFAULT.to_string()
}

/// How to reach and authenticate against the Hub.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubConfig {
    /// Bare host name or full URL. Absent means the public Hub.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub oauth2_token: Option<String>,
    /// Id of a server entry in [`crate::settings::Settings`].
    #[serde(default)]
    pub server: Option<String>,
}

impl HubConfig {
    pub fn trace_loaded(&self) {
        info!(
            host = self.host.as_deref().unwrap_or(crate::repository::HOST_DEFAULT),
            user_name_set = self.user_name.is_some(),
            password_set = self.password.is_some(),
            oauth2_token_set = self.oauth2_token.is_some(),
            server = self.server.as_deref().unwrap_or(""),
            "Loaded Hub connection config"
        );
    }
}

/// Explicit repository target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryConfig {
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Project metadata used as a fallback source for the target repository.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectInfo {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub scm: Option<ScmInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScmInfo {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub connection: Option<String>,
    #[serde(default)]
    pub developer_connection: Option<String>,
}

/// Options for publishing a generated site into a branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Reference to update; a bare branch name is expanded to `refs/heads/<name>`.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Prefix for every tree entry path.
    #[serde(default)]
    pub path: Option<String>,
    /// Commit message. Required.
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
    /// Directory whose files are committed. Required.
    #[serde(default)]
    pub output_directory: Option<PathBuf>,
    /// Allow a non-fast-forward reference update.
    #[serde(default)]
    pub force: bool,
    /// Compose the new tree on top of the tree at the current reference.
    #[serde(default)]
    pub merge: bool,
    /// Add an empty `.nojekyll` file when none is scanned.
    #[serde(default)]
    pub no_jekyll: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub skip: bool,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            branch: default_branch(),
            path: None,
            message: None,
            includes: Vec::new(),
            excludes: Vec::new(),
            output_directory: None,
            force: false,
            merge: false,
            no_jekyll: false,
            dry_run: false,
            skip: false,
        }
    }
}

impl SiteConfig {
    pub fn trace_loaded(&self) {
        info!(
            branch = %self.branch,
            path = self.path.as_deref().unwrap_or(""),
            output_directory = ?self.output_directory,
            force = self.force,
            merge = self.merge,
            no_jekyll = self.no_jekyll,
            dry_run = self.dry_run,
            skip = self.skip,
            "Loaded site config"
        );
        debug!(?self, "Site config loaded (full debug)");
    }

    /// The configured branch as a fully qualified reference name.
    pub fn reference_name(&self) -> String {
        qualify_reference(&self.branch)
    }

    /// The path prefix with exactly one trailing `/`, or empty.
    pub fn path_prefix(&self) -> String {
        let prefix = self.path.as_deref().unwrap_or("").replace('\\', "/");
        if prefix.is_empty() || prefix.ends_with('/') {
            prefix
        } else {
            format!("{prefix}/")
        }
    }
}

/// `gh-pages` -> `refs/heads/gh-pages`; already-qualified names are kept.
pub fn qualify_reference(branch: &str) -> String {
    let branch = branch.trim();
    if branch.is_empty() {
        BRANCH_DEFAULT.to_string()
    } else if branch.starts_with("refs/") {
        branch.to_string()
    } else {
        format!("refs/heads/{branch}")
    }
}

/// Options for publishing release binaries as downloadable assets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadsConfig {
    /// Tag of the release the assets are attached to.
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Delete existing assets whose name collides with an upload.
    #[serde(default, rename = "override")]
    pub override_existing: bool,
    #[serde(default)]
    pub include_attached: bool,
    /// Inserted before the file extension of every uploaded name.
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
    /// Base directory for include/exclude scanning.
    #[serde(default)]
    pub build_directory: Option<PathBuf>,
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
    /// Main build artifact, used when no include/exclude patterns are set.
    #[serde(default)]
    pub artifact: Option<PathBuf>,
    #[serde(default)]
    pub attached: Vec<PathBuf>,
}

impl DownloadsConfig {
    pub fn trace_loaded(&self) {
        info!(
            tag = self.tag.as_deref().unwrap_or(""),
            override_existing = self.override_existing,
            include_attached = self.include_attached,
            dry_run = self.dry_run,
            includes = self.includes.len(),
            excludes = self.excludes.len(),
            "Loaded downloads config"
        );
        debug!(?self, "Downloads config loaded (full debug)");
    }
}
