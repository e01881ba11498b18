//! Dotted module paths (`layers.3.mlp.up_proj`).

use crate::error::{Error, Result};

/// Split a path into its parent path and leaf name.
///
/// Top-level names have an empty parent: `"norm"` → `("", "norm")`.
pub fn split_path(path: &str) -> Result<(&str, &str)> {
    let (parent, leaf) = path.rsplit_once('.').unwrap_or(("", path));
    if leaf.is_empty() || path.starts_with('.') {
        return Err(Error::UnresolvedPath {
            path: path.to_string(),
        });
    }
    Ok((parent, leaf))
}

/// Join a parent path and a child name.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}
