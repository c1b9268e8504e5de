//! Resolution of the target repository from explicit configuration, the
//! project URL, or SCM URLs.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProjectInfo;
use crate::error::PublishError;
use crate::strings::non_empty;

/// Host name of the public Hub.
pub const HOST_DEFAULT: &str = "github.com";
/// Host name of the public Hub's API.
pub const HOST_API: &str = "api.github.com";

const SUFFIX_GIT: &str = ".git";

/// Owner and name of a Hub repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryId {
    pub owner: String,
    pub name: String,
}

impl RepositoryId {
    /// Both parts must be non-empty.
    pub fn new(owner: &str, name: &str) -> Option<Self> {
        if owner.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    /// Parse an `owner/name` id.
    pub fn from_id(id: &str) -> Option<Self> {
        let (owner, name) = id.split_once('/')?;
        Self::new(owner, name)
    }

    /// Parse a repository web URL such as `https://github.com/owner/name`.
    ///
    /// The host is not checked; the first two path segments are taken as
    /// owner and name, and a trailing `.git` is dropped.
    pub fn from_url(value: &str) -> Option<Self> {
        let url = url::Url::parse(value).ok()?;
        let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
        let owner = segments.next()?;
        let name = segments.next()?;
        let name = name.strip_suffix(SUFFIX_GIT).unwrap_or(name);
        Self::new(owner, name)
    }

    /// Extract the repository from an SCM URL such as
    /// `scm:git:git://github.com/owner/name.git` or
    /// `scm:git:git@github.com:owner/name.git`.
    pub fn from_scm_url(value: &str) -> Option<Self> {
        if value.is_empty() {
            return None;
        }
        let host_index = value.find(HOST_DEFAULT)?;
        if host_index + 1 >= value.len() || !value.ends_with(SUFFIX_GIT) {
            return None;
        }
        // Skip the host and the single separator (`/` or `:`) after it.
        let start = host_index + HOST_DEFAULT.len() + 1;
        let end = value.len() - SUFFIX_GIT.len();
        if start > end {
            return None;
        }
        Self::from_id(value.get(start..end)?)
    }

    /// `owner/name`
    pub fn generate_id(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Resolve the repository, or `None` if no source yields one.
///
/// Order: explicit owner and name, then the project URL, then the SCM URL,
/// SCM connection and SCM developer connection.
pub fn find_repository(
    project: Option<&ProjectInfo>,
    owner: Option<&str>,
    name: Option<&str>,
) -> Option<RepositoryId> {
    if let (Some(owner), Some(name)) = (non_empty(owner), non_empty(name)) {
        return RepositoryId::new(owner, name);
    }

    let project = project?;
    if let Some(repo) = non_empty(project.url.as_deref()).and_then(RepositoryId::from_url) {
        return Some(repo);
    }

    let scm = project.scm.as_ref()?;
    non_empty(scm.url.as_deref())
        .and_then(RepositoryId::from_url)
        .or_else(|| {
            non_empty(scm.connection.as_deref()).and_then(RepositoryId::from_scm_url)
        })
        .or_else(|| {
            non_empty(scm.developer_connection.as_deref()).and_then(RepositoryId::from_scm_url)
        })
}

/// Like [`find_repository`] but a missing repository is a configuration error.
pub fn resolve_repository(
    project: Option<&ProjectInfo>,
    owner: Option<&str>,
    name: Option<&str>,
) -> Result<RepositoryId, PublishError> {
    let repository = find_repository(project, owner, name).ok_or_else(|| {
        PublishError::Config("No Hub repository (owner and name) configured".to_string())
    })?;
    debug!(repository = %repository, "Using Hub repository");
    Ok(repository)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScmInfo;

    #[test]
    fn extract_from_anonymous_url() {
        let repo = RepositoryId::from_scm_url("scm:git:git://github.com/owner/project.git")
            .expect("anonymous url should parse");
        assert_eq!(repo.owner, "owner");
        assert_eq!(repo.name, "project");
        assert_eq!(repo.generate_id(), "owner/project");
    }

    #[test]
    fn extract_from_ssh_url() {
        let repo = RepositoryId::from_scm_url("scm:git:git@github.com:owner/project.git")
            .expect("ssh url should parse");
        assert_eq!(repo.generate_id(), "owner/project");
    }

    #[test]
    fn extract_from_malformed_urls() {
        for url in [
            "scm:git:git://github.com",
            "scm:git:git://github.com/",
            "scm:git:git@github.com",
            "scm:git:git@github.com:",
            "scm:git:git@github.com:.git",
            "scm:git:git://example.com/owner/project.git",
            "",
            " ",
        ] {
            assert!(
                RepositoryId::from_scm_url(url).is_none(),
                "expected no repository for {url:?}"
            );
        }
    }

    #[test]
    fn from_url_takes_first_two_segments() {
        let repo = RepositoryId::from_url("https://github.com/nanoko-project/coffee-mill-maven-plugin")
            .expect("url should parse");
        assert_eq!(repo.owner, "nanoko-project");
        assert_eq!(repo.name, "coffee-mill-maven-plugin");

        let with_git = RepositoryId::from_url("https://github.com/owner/name.git/tree/main")
            .expect("url with suffix should parse");
        assert_eq!(with_git.name, "name");

        assert!(RepositoryId::from_url("https://github.com/owner").is_none());
        assert!(RepositoryId::from_url("must not be used").is_none());
    }

    #[test]
    fn explicit_owner_and_name_win() {
        let project = ProjectInfo {
            url: Some("https://github.com/other/thing".into()),
            scm: None,
        };
        let repo = find_repository(Some(&project), Some("octo"), Some("site")).unwrap();
        assert_eq!(repo.generate_id(), "octo/site");
    }

    #[test]
    fn empty_project_yields_nothing() {
        let project = ProjectInfo::default();
        assert!(find_repository(Some(&project), None, None).is_none());
        assert!(find_repository(None, None, None).is_none());
        assert!(find_repository(None, Some("octo"), Some("")).is_none());
        assert!(matches!(
            resolve_repository(None, None, None),
            Err(PublishError::Config(_))
        ));
    }

    #[test]
    fn project_url_then_scm_sources() {
        let project = ProjectInfo {
            url: Some("https://github.com/from/project-url".into()),
            scm: Some(ScmInfo {
                url: Some("https://github.com/from/scm-url".into()),
                connection: None,
                developer_connection: None,
            }),
        };
        let repo = find_repository(Some(&project), None, None).unwrap();
        assert_eq!(repo.generate_id(), "from/project-url");

        let scm_only = ProjectInfo {
            url: None,
            scm: Some(ScmInfo {
                url: None,
                connection: Some("not an scm url".into()),
                developer_connection: Some("scm:git:git@github.com:dev/conn.git".into()),
            }),
        };
        let repo = find_repository(Some(&scm_only), None, None).unwrap();
        assert_eq!(repo.generate_id(), "dev/conn");
    }
}
