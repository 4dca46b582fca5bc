//! Per-branch policy for concurrent joins: required branches propagate their
//! error, optional branches are logged and replaced by a default.

use std::fmt::Display;

use tracing::warn;

/// Collapse an optional branch. Failures are logged and become `None`.
pub fn optional<T, E: Display>(branch: &str, result: Result<T, E>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("Optional branch '{branch}' failed, continuing without it: {err}");
            None
        }
    }
}

/// Like [`optional`], falling back to `fallback()` on failure.
pub fn degrade<T, E, F>(branch: &str, result: Result<T, E>, fallback: F) -> T
where
    E: Display,
    F: FnOnce() -> T,
{
    optional(branch, result).unwrap_or_else(fallback)
}
