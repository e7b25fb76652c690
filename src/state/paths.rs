//! Storage-path mapping for scoped plugin state.
//!
//! Layout (stable contract):
//!
//! ```text
//! {cache_dir}/plugins/{plugin_id}/global.json
//! {cache_dir}/plugins/{plugin_id}/channel/{channel_id}.json
//! {cache_dir}/plugins/{plugin_id}/epic/{channel_id}.json
//! ```

use std::path::{Path, PathBuf};

use crate::error::{QuillError, QuillResult};
use crate::types::Scope;

/// Reject identifiers that would escape their directory when used as a
/// path component.
pub fn validate_identifier(id: &str) -> QuillResult<()> {
    if id.is_empty()
        || id.contains('/')
        || id.contains('\\')
        || id.contains(std::path::MAIN_SEPARATOR)
        || id == "."
        || id == ".."
    {
        return Err(QuillError::InvalidIdentifier(id.to_string()));
    }
    Ok(())
}

fn plugin_dir(cache_dir: &Path, plugin_id: &str) -> QuillResult<PathBuf> {
    validate_identifier(plugin_id)?;
    Ok(cache_dir.join("plugins").join(plugin_id))
}

pub fn global_path(cache_dir: &Path, plugin_id: &str) -> QuillResult<PathBuf> {
    Ok(plugin_dir(cache_dir, plugin_id)?.join("global.json"))
}

pub fn channel_path(cache_dir: &Path, plugin_id: &str, channel_id: &str) -> QuillResult<PathBuf> {
    validate_identifier(channel_id)?;
    Ok(plugin_dir(cache_dir, plugin_id)?
        .join("channel")
        .join(format!("{channel_id}.json")))
}

pub fn epic_path(cache_dir: &Path, plugin_id: &str, channel_id: &str) -> QuillResult<PathBuf> {
    validate_identifier(channel_id)?;
    Ok(plugin_dir(cache_dir, plugin_id)?
        .join("epic")
        .join(format!("{channel_id}.json")))
}

/// Unified mapper over all three scopes. Channel and epic scopes require a
/// channel id.
pub fn state_path(
    cache_dir: &Path,
    plugin_id: &str,
    scope: Scope,
    channel_id: Option<&str>,
) -> QuillResult<PathBuf> {
    match scope {
        Scope::Global => global_path(cache_dir, plugin_id),
        Scope::Channel | Scope::Epic => {
            let channel_id = channel_id.ok_or_else(|| {
                QuillError::InvalidIdentifier(format!("{scope} scope requires a channel id"))
            })?;
            match scope {
                Scope::Channel => channel_path(cache_dir, plugin_id, channel_id),
                _ => epic_path(cache_dir, plugin_id, channel_id),
            }
        }
    }
}
