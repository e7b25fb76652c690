use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── State Scopes ────────────────────────────────────────────────────────────

/// Consistency model for a plugin's persisted state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// One blob per plugin, shared across all channels. Not rewindable.
    Global,
    /// One blob per (plugin, channel), with one-hop inheritance on miss.
    #[default]
    Channel,
    /// Event-sourced per (plugin, channel), with rollback and fork semantics.
    Epic,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Global => write!(f, "global"),
            Scope::Channel => write!(f, "channel"),
            Scope::Epic => write!(f, "epic"),
        }
    }
}

// ─── Scoped State ────────────────────────────────────────────────────────────

/// One event in an epic-scope log.
///
/// Message ids are snowflake-like: lexicographic order matches temporal
/// order. This is an input contract, not something the core enforces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateEvent {
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
    pub delta: serde_json::Value,
}

impl StateEvent {
    pub fn new(message_id: impl Into<String>, delta: serde_json::Value) -> Self {
        Self {
            message_id: message_id.into(),
            timestamp: Utc::now(),
            delta,
        }
    }
}

/// Metadata stored alongside a channel-scope blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMetadata {
    pub last_modified_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_origin_channel_id: Option<String>,
}

/// Ancestry hints consulted when a channel has no state of its own.
///
/// `history_origin_channel_id` takes precedence over `parent_channel_id`.
/// Resolution is one-hop: the ancestor's state is read directly, never
/// through its own ancestors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct InheritanceInfo {
    #[serde(default)]
    pub parent_channel_id: Option<String>,
    #[serde(default)]
    pub history_origin_channel_id: Option<String>,
}

impl InheritanceInfo {
    pub fn from_parent(parent_channel_id: impl Into<String>) -> Self {
        Self {
            parent_channel_id: Some(parent_channel_id.into()),
            history_origin_channel_id: None,
        }
    }

    pub fn from_history(history_origin_channel_id: impl Into<String>) -> Self {
        Self {
            parent_channel_id: None,
            history_origin_channel_id: Some(history_origin_channel_id.into()),
        }
    }
}

// ─── Transcript ──────────────────────────────────────────────────────────────

/// One entry in the transcript the LLM sees.
///
/// Entries are rendered text: platform messages arrive pre-formatted from
/// the host, and plugin injections are formatted by the placer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub text: String,
}

impl TranscriptEntry {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// A participant entry: `{speaker}> {body}`
    pub fn message(speaker: &str, body: &str) -> Self {
        Self {
            text: format!("{speaker}> {body}"),
        }
    }

    /// A system entry attributed to a plugin: `System>[{plugin_id}]: {body}`
    pub fn system(plugin_id: &str, body: &str) -> Self {
        Self {
            text: format!("System>[{plugin_id}]: {body}"),
        }
    }
}

/// A structured block within injection content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { media_type: String, data: String },
}

impl ContentBlock {
    pub fn text(s: impl Into<String>) -> Self {
        ContentBlock::Text { text: s.into() }
    }

    /// Inline rendering of this block for the transcript
    pub fn render(&self) -> String {
        match self {
            ContentBlock::Text { text } => text.clone(),
            ContentBlock::Image { media_type, .. } => format!("[image: {media_type}]"),
        }
    }
}

// ─── Tools ───────────────────────────────────────────────────────────────────

/// Schema for a tool's input parameters, as declared by a plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Output from a tool execution
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
    pub metadata: serde_json::Value,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scope_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Scope::Global).unwrap(), "\"global\"");
        assert_eq!(
            serde_json::from_str::<Scope>("\"epic\"").unwrap(),
            Scope::Epic
        );
    }

    #[test]
    fn scope_defaults_to_channel() {
        assert_eq!(Scope::default(), Scope::Channel);
    }

    #[test]
    fn state_event_wire_format() {
        let event = StateEvent::new("100200300", json!({"counter": 1}));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["messageId"], "100200300");
        assert!(value["timestamp"].is_string());
        assert_eq!(value["delta"]["counter"], 1);
    }

    #[test]
    fn channel_metadata_omits_absent_ancestry() {
        let meta = ChannelMetadata {
            last_modified_message_id: Some("42".into()),
            ..Default::default()
        };
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["lastModifiedMessageId"], "42");
        assert!(value.get("parentChannelId").is_none());
        assert!(value.get("historyOriginChannelId").is_none());
    }

    #[test]
    fn transcript_entry_formats() {
        let entry = TranscriptEntry::message("alice", "hello");
        assert_eq!(entry.text, "alice> hello");

        let entry = TranscriptEntry::system("notes", "2 notes stored");
        assert_eq!(entry.text, "System>[notes]: 2 notes stored");
    }

    #[test]
    fn content_block_renders() {
        assert_eq!(ContentBlock::text("hi").render(), "hi");
        let img = ContentBlock::Image {
            media_type: "image/png".into(),
            data: "…".into(),
        };
        assert_eq!(img.render(), "[image: image/png]");
    }

    #[test]
    fn tool_output_helpers() {
        let output = ToolOutput::success("done").with_metadata(json!({"ms": 3}));
        assert!(!output.is_error);
        assert_eq!(output.metadata["ms"], 3);

        let output = ToolOutput::error("boom");
        assert!(output.is_error);
    }
}
