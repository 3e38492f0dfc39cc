use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Separator between the repository key and the relative path in the
/// display form (`libs-release:org/acme/acme-1.0.jar`).
pub const REPO_PATH_SEP: char = ':';

/// A logical location in the repository tree.
///
/// Repository paths key the metadata layer and the path lock registry; binary
/// content is addressed by checksum instead. The relative path is stored
/// normalised: forward slashes only, no leading, trailing or duplicate
/// separators. An empty relative path denotes the repository root.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoPath {
    repo_key: String,
    path: String,
}

impl RepoPath {
    /// Build a path from a repository key and a relative path.
    pub fn new(repo_key: &str, path: &str) -> Result<Self, TypeError> {
        let repo_key = repo_key.trim();
        if repo_key.is_empty() {
            return Err(TypeError::InvalidPath {
                path: path.to_string(),
                reason: "repository key must not be empty".into(),
            });
        }
        if repo_key.contains(['/', '\\', REPO_PATH_SEP]) {
            return Err(TypeError::InvalidPath {
                path: repo_key.to_string(),
                reason: "repository key must not contain separators".into(),
            });
        }
        Ok(Self {
            repo_key: repo_key.to_string(),
            path: normalize(path)?,
        })
    }

    /// The root of a repository.
    pub fn root(repo_key: &str) -> Result<Self, TypeError> {
        Self::new(repo_key, "")
    }

    /// Parse `repo:rel/path` or `repo/rel/path`.
    pub fn parse(id: &str) -> Result<Self, TypeError> {
        let id = id.trim().trim_start_matches('/');
        match id.split_once(REPO_PATH_SEP) {
            Some((repo, rest)) => Self::new(repo, rest),
            None => match id.split_once('/') {
                Some((repo, rest)) => Self::new(repo, rest),
                None => Self::new(id, ""),
            },
        }
    }

    pub fn repo_key(&self) -> &str {
        &self.repo_key
    }

    /// Relative path inside the repository (empty for the root).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Last path segment; the repository key for the root.
    pub fn name(&self) -> &str {
        if self.is_root() {
            return &self.repo_key;
        }
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// The containing folder, or `None` for the repository root.
    pub fn parent(&self) -> Option<RepoPath> {
        if self.is_root() {
            return None;
        }
        let parent = match self.path.rfind('/') {
            Some(idx) => &self.path[..idx],
            None => "",
        };
        Some(Self {
            repo_key: self.repo_key.clone(),
            path: parent.to_string(),
        })
    }

    /// Path of a direct child with the given name.
    pub fn child(&self, name: &str) -> Result<RepoPath, TypeError> {
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(TypeError::InvalidPath {
                path: name.to_string(),
                reason: "child name must be a single non-empty segment".into(),
            });
        }
        let path = if self.is_root() {
            name.to_string()
        } else {
            format!("{}/{}", self.path, name)
        };
        Self::new(&self.repo_key, &path)
    }

    /// All ancestors from the repository root down to the direct parent.
    pub fn ancestors(&self) -> Vec<RepoPath> {
        let mut chain = Vec::new();
        let mut current = self.parent();
        while let Some(p) = current {
            current = p.parent();
            chain.push(p);
        }
        chain.reverse();
        chain
    }

    /// Whether `self` is `other` or lies beneath it.
    pub fn is_descendant_of(&self, other: &RepoPath) -> bool {
        if self.repo_key != other.repo_key {
            return false;
        }
        other.is_root()
            || self.path == other.path
            || self
                .path
                .strip_prefix(&other.path)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

fn normalize(path: &str) -> Result<String, TypeError> {
    let unified = path.replace('\\', "/");
    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" => continue,
            "." | ".." => {
                return Err(TypeError::InvalidPath {
                    path: path.to_string(),
                    reason: format!("relative segment '{segment}' is not allowed"),
                })
            }
            s => segments.push(s),
        }
    }
    Ok(segments.join("/"))
}

impl fmt::Debug for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepoPath({self})")
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.repo_key, REPO_PATH_SEP, self.path)
    }
}

impl FromStr for RepoPath {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
