//! Include/exclude scanning of a base directory.
//!
//! Patterns follow the usual ant-style rules: `*` stays within one path
//! segment, `**` crosses segments, and a pattern ending in `/` selects
//! everything below that directory. Patterns are matched against the path
//! relative to the base directory, always with `/` separators.
//!
//! Braces are literal: `{a,b}` matches a file named `{a,b}`, not `a` or `b`.
//! Character classes such as `[0-9]` are kept.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::PublishError;
use crate::strings::remove_empties;

/// Turn ant-style patterns into a glob set. `None` when no pattern remains.
fn build_set(patterns: &[String]) -> Result<Option<GlobSet>, PublishError> {
    let patterns = remove_empties(patterns);
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in &patterns {
        builder.add(compile(pattern)?);
    }
    builder
        .build()
        .map(Some)
        .map_err(|e| PublishError::Config(format!("Invalid path pattern: {e}")))
}

fn compile(pattern: &str) -> Result<Glob, PublishError> {
    let mut normalized = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '\\' => normalized.push('/'),
            '{' => normalized.push_str("[{]"),
            '}' => normalized.push_str("[}]"),
            c => normalized.push(c),
        }
    }
    if normalized.ends_with('/') {
        normalized.push_str("**");
    }
    GlobBuilder::new(&normalized)
        .literal_separator(true)
        .build()
        .map_err(|e| PublishError::Config(format!("Invalid path pattern '{pattern}': {e}")))
}

/// Relative `/`-joined form of `path` below `base`.
pub fn relative_path(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Files below `base` selected by `includes` and not by `excludes`, relative
/// to `base` and sorted. Empty includes select every file.
pub fn matching_paths(
    includes: &[String],
    excludes: &[String],
    base: &Path,
) -> Result<Vec<String>, PublishError> {
    if !base.is_dir() {
        return Err(PublishError::Io {
            path: base.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "base directory does not exist"),
        });
    }

    let includes = build_set(includes)?;
    let excludes = build_set(excludes)?;

    let mut paths = Vec::new();
    for entry in WalkDir::new(base).follow_links(true) {
        let entry = entry.map_err(|e| PublishError::Io {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| base.to_path_buf()),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(relative) = relative_path(base, entry.path()) else {
            continue;
        };
        let included = includes.as_ref().map_or(true, |set| set.is_match(&relative));
        let excluded = excludes.as_ref().is_some_and(|set| set.is_match(&relative));
        if included && !excluded {
            paths.push(relative);
        }
    }
    paths.sort();

    debug!(base = %base.display(), count = paths.len(), "Scanned paths");
    Ok(paths)
}

/// [`matching_paths`] resolved back to absolute file paths.
pub fn matching_files(
    includes: &[String],
    excludes: &[String],
    base: &Path,
) -> Result<Vec<PathBuf>, PublishError> {
    Ok(matching_paths(includes, excludes, base)?
        .into_iter()
        .map(|relative| base.join(relative))
        .collect())
}
