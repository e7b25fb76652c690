//! Scoped plugin state — file-backed, cached in memory.
//!
//! One process owns a cache directory. The in-memory caches are
//! authoritative for that process; files are the durability layer. Three
//! scopes with different consistency models:
//!
//! - `global`: one blob per plugin, read and written in place
//! - `channel`: one blob per (plugin, channel) with metadata, one-hop
//!   copy-by-value inheritance on miss
//! - `epic`: an event log per (plugin, channel), replayed through a
//!   plugin-supplied reducer

pub mod paths;
pub mod replay;

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{QuillError, QuillResult};
use crate::types::{ChannelMetadata, InheritanceInfo, StateEvent};

pub use replay::{replay, FnReducer, Reducer};

/// On-disk and cached form of channel-scope state. Blob and metadata are
/// one document so a reader sees both or neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub state: Value,
    pub metadata: ChannelMetadata,
}

/// Process-singleton store for all plugin state under one cache directory.
///
/// Cache entries are populated on first read and updated on every write.
/// `None` in a cache slot means the file is known absent. Guards are never
/// held across file I/O; concurrent activations race as last-write-wins,
/// which is the documented operating regime.
pub struct StateStore {
    cache_dir: PathBuf,
    globals: DashMap<String, Option<Value>>,
    channels: DashMap<(String, String), Option<ChannelRecord>>,
    events: DashMap<(String, String), Vec<StateEvent>>,
}

impl StateStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            globals: DashMap::new(),
            channels: DashMap::new(),
            events: DashMap::new(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    // ─── Global scope ───────────────────────────────────────────────────────

    pub async fn get_global(&self, plugin_id: &str) -> QuillResult<Option<Value>> {
        if let Some(cached) = self.globals.get(plugin_id) {
            return Ok(cached.clone());
        }
        let path = paths::global_path(&self.cache_dir, plugin_id)?;
        let value: Option<Value> = read_json(&path).await?;
        self.globals.insert(plugin_id.to_string(), value.clone());
        Ok(value)
    }

    pub async fn set_global(&self, plugin_id: &str, value: Value) -> QuillResult<()> {
        let path = paths::global_path(&self.cache_dir, plugin_id)?;
        write_json_atomic(&path, &value).await?;
        self.globals.insert(plugin_id.to_string(), Some(value));
        Ok(())
    }

    // ─── Channel scope ──────────────────────────────────────────────────────

    /// Channel state with inheritance.
    ///
    /// A miss consults `inheritance`: history origin first, then thread
    /// parent. The ancestor's blob is returned *by value* — the ancestor is
    /// never mutated, and a later write on this channel creates this
    /// channel's own file. Returned metadata carries the ancestor's
    /// last-modified id and records which hint resolved.
    pub async fn get_channel(
        &self,
        plugin_id: &str,
        channel_id: &str,
        inheritance: Option<&InheritanceInfo>,
    ) -> QuillResult<(Option<Value>, ChannelMetadata)> {
        if let Some(record) = self.load_channel(plugin_id, channel_id).await? {
            return Ok((Some(record.state), record.metadata));
        }

        if let Some(info) = inheritance {
            if let Some(origin) = info.history_origin_channel_id.as_deref() {
                if let Some(record) = self.load_channel(plugin_id, origin).await? {
                    let metadata = ChannelMetadata {
                        last_modified_message_id: record.metadata.last_modified_message_id,
                        parent_channel_id: None,
                        history_origin_channel_id: Some(origin.to_string()),
                    };
                    return Ok((Some(record.state), metadata));
                }
            }
            if let Some(parent) = info.parent_channel_id.as_deref() {
                if let Some(record) = self.load_channel(plugin_id, parent).await? {
                    let metadata = ChannelMetadata {
                        last_modified_message_id: record.metadata.last_modified_message_id,
                        parent_channel_id: Some(parent.to_string()),
                        history_origin_channel_id: None,
                    };
                    return Ok((Some(record.state), metadata));
                }
            }
        }

        Ok((None, ChannelMetadata::default()))
    }

    pub async fn set_channel(
        &self,
        plugin_id: &str,
        channel_id: &str,
        value: Value,
        message_id: Option<&str>,
    ) -> QuillResult<()> {
        let record = ChannelRecord {
            state: value,
            metadata: ChannelMetadata {
                last_modified_message_id: message_id.map(String::from),
                parent_channel_id: None,
                history_origin_channel_id: None,
            },
        };
        let path = paths::channel_path(&self.cache_dir, plugin_id, channel_id)?;
        write_json_atomic(&path, &record).await?;
        self.channels.insert(
            (plugin_id.to_string(), channel_id.to_string()),
            Some(record),
        );
        Ok(())
    }

    /// Physical channel state only — no inheritance.
    async fn load_channel(
        &self,
        plugin_id: &str,
        channel_id: &str,
    ) -> QuillResult<Option<ChannelRecord>> {
        let key = (plugin_id.to_string(), channel_id.to_string());
        if let Some(cached) = self.channels.get(&key) {
            return Ok(cached.clone());
        }
        let path = paths::channel_path(&self.cache_dir, plugin_id, channel_id)?;
        let record: Option<ChannelRecord> = read_json(&path).await?;
        self.channels.insert(key, record.clone());
        Ok(record)
    }

    // ─── Epic scope ─────────────────────────────────────────────────────────

    /// The channel's event log, sorted by message id.
    pub async fn get_events(
        &self,
        plugin_id: &str,
        channel_id: &str,
    ) -> QuillResult<Vec<StateEvent>> {
        let key = (plugin_id.to_string(), channel_id.to_string());
        if let Some(cached) = self.events.get(&key) {
            return Ok(cached.clone());
        }
        let path = paths::epic_path(&self.cache_dir, plugin_id, channel_id)?;
        let log: Vec<StateEvent> = read_json(&path).await?.unwrap_or_default();
        self.events.insert(key, log.clone());
        Ok(log)
    }

    /// Append an event, replacing any prior event for the same message id.
    /// The log stays sorted regardless of arrival order.
    pub async fn append_or_replace_event(
        &self,
        plugin_id: &str,
        channel_id: &str,
        event: StateEvent,
    ) -> QuillResult<()> {
        let mut log = self.get_events(plugin_id, channel_id).await?;
        log.retain(|e| e.message_id != event.message_id);
        let pos = log.partition_point(|e| e.message_id < event.message_id);
        log.insert(pos, event);

        let path = paths::epic_path(&self.cache_dir, plugin_id, channel_id)?;
        write_json_atomic(&path, &log).await?;
        self.events
            .insert((plugin_id.to_string(), channel_id.to_string()), log);
        Ok(())
    }

    /// Copy the parent log's prefix (message id ≤ `upto_message_id`) into a
    /// new channel's log. Events appended to either channel afterwards
    /// diverge. Returns the number of events copied.
    pub async fn fork_events(
        &self,
        plugin_id: &str,
        from_channel_id: &str,
        to_channel_id: &str,
        upto_message_id: &str,
    ) -> QuillResult<usize> {
        let parent = self.get_events(plugin_id, from_channel_id).await?;
        let forked = replay::prefix_upto(&parent, upto_message_id);
        let count = forked.len();

        let path = paths::epic_path(&self.cache_dir, plugin_id, to_channel_id)?;
        write_json_atomic(&path, &forked).await?;
        self.events
            .insert((plugin_id.to_string(), to_channel_id.to_string()), forked);
        Ok(count)
    }
}

/// Read and parse a JSON file. Absent file is a successful `None`; a file
/// that exists but does not parse is `CorruptData`.
async fn read_json<T: DeserializeOwned>(path: &Path) -> QuillResult<Option<T>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| QuillError::CorruptData {
                path: path.display().to_string(),
                message: e.to_string(),
            }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Serialize to a temp sibling, then rename over the target. A crash
/// mid-write leaves either the old file or the new one, never a torn blob.
async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> QuillResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
