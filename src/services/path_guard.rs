//! Confines client-supplied paths to the asset root.
//!
//! Every handler that accepts a path funnels it through [`guard`] before the
//! value reaches a store call. The result is a [`SafePath`]: a `/`-joined,
//! relative path with no empty, `.` or dot-only components.

use std::fmt;

/// Public URL prefix under which stored assets are served.
pub const PUBLIC_PREFIX: &str = "/assets/";

const MAX_PATH_LEN: usize = 1024;

/// A normalized relative path that cannot leave the asset root.
/// The empty path is the root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SafePath(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("path `{path}` rejected: {reason}")]
pub struct PathRejected {
    pub path: String,
    pub reason: &'static str,
}

impl SafePath {
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Append one already-sanitized name (a canonical file or folder name).
    pub fn join(&self, name: &str) -> SafePath {
        if self.0.is_empty() {
            SafePath(name.to_string())
        } else {
            SafePath(format!("{}/{}", self.0, name))
        }
    }

    /// Split into (parent, last component). The root has no file name.
    pub fn split_last(&self) -> Option<(SafePath, &str)> {
        if self.0.is_empty() {
            return None;
        }
        match self.0.rsplit_once('/') {
            Some((parent, name)) => Some((SafePath(parent.to_string()), name)),
            None => Some((SafePath::root(), self.0.as_str())),
        }
    }

    /// URL under which this path is served, e.g. `/assets/photos/a.png`.
    pub fn public_url(&self) -> String {
        format!("{}{}", PUBLIC_PREFIX, self.0)
    }
}

impl fmt::Display for SafePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize `raw` into a path inside the asset root.
///
/// Both `/` and `\` separate components. Empty components, `.` and any
/// component made only of dots are dropped, which trims separators and
/// removes parent-directory traversal. Control characters are rejected.
pub fn guard(raw: &str) -> Result<SafePath, PathRejected> {
    if raw.len() > MAX_PATH_LEN {
        return Err(PathRejected {
            path: truncate(raw),
            reason: "path too long",
        });
    }
    if raw.chars().any(|c| c.is_control()) {
        return Err(PathRejected {
            path: truncate(raw),
            reason: "control characters are not allowed",
        });
    }

    let components: Vec<&str> = raw
        .split(['/', '\\'])
        .map(str::trim)
        .filter(|part| !part.is_empty() && !part.chars().all(|c| c == '.'))
        .collect();

    Ok(SafePath(components.join("/")))
}

/// Like [`guard`], but first strips the public `/assets/` URL prefix so that
/// paths echoed back from listings are accepted.
pub fn guard_public(raw: &str) -> Result<SafePath, PathRejected> {
    let trimmed = raw.trim();
    let relative = trimmed.strip_prefix(PUBLIC_PREFIX).unwrap_or(trimmed);
    guard(relative)
}

fn truncate(raw: &str) -> String {
    raw.chars().take(64).collect()
}
