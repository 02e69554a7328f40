//! Repository key prefixes and path normalization.

use crate::{Result, StorageError};
use std::fmt;

/// The key prefix under which every object of one repository lives.
///
/// Derived from the owner id and repository name; the constructor rejects
/// components that could make two repositories share keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoPrefix(String);

impl RepoPrefix {
    /// Derives the prefix `repos/<owner_id>/<name>.git`.
    ///
    /// A trailing `.git` on `name` is not doubled.
    pub fn new(owner_id: &str, name: &str) -> Result<Self> {
        validate_component(owner_id)?;
        let name = name.strip_suffix(".git").unwrap_or(name);
        validate_component(name)?;
        Ok(Self(format!("repos/{}/{}.git", owner_id, name)))
    }

    /// Wraps an already-normalized prefix verbatim.
    pub fn from_raw(prefix: impl Into<String>) -> Self {
        Self(normalize(&prefix.into()))
    }

    /// Returns the prefix string (no trailing slash).
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Maps a filesystem path onto an object-store key.
    ///
    /// The path is normalized first; a path that already carries this prefix
    /// is used as-is, anything else is joined under it.
    pub fn key_for(&self, path: &str) -> String {
        let normalized = normalize(path);
        if self.0.is_empty() {
            return normalized;
        }
        if normalized == self.0 || normalized.starts_with(&format!("{}/", self.0)) {
            return normalized;
        }
        if normalized.is_empty() {
            return self.0.clone();
        }
        format!("{}/{}", self.0, normalized)
    }

    /// Strips this prefix from a store key, returning the repository path.
    pub fn path_of<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(self.0.as_str())
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(key)
    }
}

impl fmt::Display for RepoPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_component(component: &str) -> Result<()> {
    let bad = component.is_empty()
        || component == "."
        || component == ".."
        || component
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control());
    if bad {
        return Err(StorageError::InvalidKey(component.to_string()));
    }
    Ok(())
}

/// Normalizes a path: collapses repeated slashes, drops `.` segments, and
/// strips leading and trailing slashes.
pub fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_derivation() {
        let prefix = RepoPrefix::new("42", "demo").unwrap();
        assert_eq!(prefix.as_str(), "repos/42/demo.git");

        let same = RepoPrefix::new("42", "demo.git").unwrap();
        assert_eq!(prefix, same);
    }

    #[test]
    fn test_prefix_rejects_escaping_components() {
        assert!(RepoPrefix::new("..", "demo").is_err());
        assert!(RepoPrefix::new("42", "a/b").is_err());
        assert!(RepoPrefix::new("", "demo").is_err());
        assert!(RepoPrefix::new("42", "..").is_err());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("//refs//heads/main/"), "refs/heads/main");
        assert_eq!(normalize("/./objects/pack"), "objects/pack");
        assert_eq!(normalize("/"), "");
    }

    #[test]
    fn test_key_for_joins_and_passes_through() {
        let prefix = RepoPrefix::new("7", "site").unwrap();
        assert_eq!(prefix.key_for("/refs/heads/main"), "repos/7/site.git/refs/heads/main");
        assert_eq!(
            prefix.key_for("repos/7/site.git/HEAD"),
            "repos/7/site.git/HEAD"
        );
        assert_eq!(prefix.key_for("/"), "repos/7/site.git");
    }

    #[test]
    fn test_key_for_does_not_match_sibling_prefix() {
        let prefix = RepoPrefix::new("7", "site").unwrap();
        // "repos/7/site.git2" shares a string prefix but is another repository.
        assert_eq!(
            prefix.key_for("repos/7/site.git2/HEAD"),
            "repos/7/site.git/repos/7/site.git2/HEAD"
        );
    }

    #[test]
    fn test_path_of() {
        let prefix = RepoPrefix::new("7", "site").unwrap();
        assert_eq!(prefix.path_of("repos/7/site.git/refs/tags/v1"), "refs/tags/v1");
    }
}
