//! Parsing of the three path syntaxes accepted by the gateway.
//!
//! - tree path: `/docs/report.pdf`
//! - id path: `home:4821`
//! - mixed path: `home:4821/sub/file`
//!
//! Incoming strings are parsed once into [`VirtualPath`], so that the mount
//! table never has to look at the raw string again.

use crate::storage::StorageError;
use std::fmt::Display;

/// An opaque id qualified by the storage id of the mount that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespacedId {
    pub namespace: String,
    pub local_id: String,
}

impl NamespacedId {
    /// Parses `<namespace>:<id>`. Neither part may be empty, the namespace may
    /// not contain `/` and the id may not contain `/`.
    pub fn parse(s: &str) -> Option<Self> {
        let (namespace, local_id) = s.split_once(':')?;

        if namespace.is_empty() || namespace.contains('/') {
            return None;
        }

        if local_id.is_empty() || local_id.contains('/') {
            return None;
        }

        Some(Self {
            namespace: namespace.to_owned(),
            local_id: local_id.to_owned(),
        })
    }
}

impl Display for NamespacedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.local_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualPath {
    Tree(String),
    Id(NamespacedId),
    /// An id followed by a relative tail, which is already cleaned and never empty.
    Mixed(NamespacedId, String),
}

impl VirtualPath {
    pub fn parse(path: &str) -> Result<Self, StorageError> {
        if path.starts_with('/') {
            return Ok(VirtualPath::Tree(clean_path(path)));
        }

        let invalid = || {
            StorageError::InvalidPath(format!(
                "`{}` matches none of the tree, id or mixed path layouts",
                path
            ))
        };

        let (head, tail) = match path.split_once('/') {
            Some((head, tail)) => (head, Some(tail)),
            None => (path, None),
        };
        let id = NamespacedId::parse(head).ok_or_else(invalid)?;

        let tail = tail.map(clean_path).filter(|tail| tail != ".");
        match tail {
            Some(tail) => Ok(VirtualPath::Mixed(id, tail)),
            None => Ok(VirtualPath::Id(id)),
        }
    }
}

/// Lexically cleans a slash separated path, in the manner of Go's `path.Clean`:
/// repeated slashes collapse, `.` segments vanish and `..` removes the preceding
/// segment. `..` never climbs above the root of an absolute path.
/// An empty result is `.` for relative paths and `/` for absolute ones.
pub fn clean_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            segment => segments.push(segment),
        }
    }

    let joined = segments.join("/");

    if absolute {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_owned()
    } else {
        joined
    }
}

/// Joins `tail` onto `base` and cleans the result.
pub fn join_path(base: &str, tail: &str) -> String {
    if tail.is_empty() {
        return clean_path(base);
    }

    clean_path(&format!("{}/{}", base, tail))
}

/// Returns the remainder of `path` below `prefix`, or `None` when `path` is
/// not inside `prefix`. Matching honours segment boundaries, so `/docs` owns
/// `/docs` and `/docs/a` but not `/docsx`. Both inputs must be cleaned.
pub fn strip_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix == "/" {
        return path.strip_prefix('/').map(|_| path);
    }

    let rest = path.strip_prefix(prefix)?;

    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}
