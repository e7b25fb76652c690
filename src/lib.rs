//! # quill-core
//!
//! Plugin runtime for a conversational bot — the engine that lets small,
//! independently authored extensions expose LLM-callable tools, inject
//! durable fragments into context at computed positions, and persist state
//! under three consistency models.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use quill_core::config::RuntimeConfig;
//! use quill_core::context::{ActivationParams, ContextFactory};
//! use quill_core::host::NullHost;
//! use quill_core::inject::build_transcript;
//! use quill_core::plugin::{NotesPlugin, PluginRegistry};
//! use quill_core::state::StateStore;
//! use quill_core::types::TranscriptEntry;
//!
//! # async fn example() -> quill_core::error::QuillResult<()> {
//! let mut registry = PluginRegistry::new();
//! registry.register(Arc::new(NotesPlugin))?;
//!
//! let store = Arc::new(StateStore::new("/var/cache/quill"));
//! let config: RuntimeConfig = serde_json::from_value(serde_json::json!({
//!     "enabledPlugins": ["notes"]
//! }))?;
//!
//! // One factory per activation.
//! let factory = ContextFactory::new(store, Arc::new(NullHost), ActivationParams {
//!     channel_id: "c42".into(),
//!     guild_id: None,
//!     current_message_id: "m3".into(),
//!     message_ids: vec!["m1".into(), "m2".into(), "m3".into()],
//!     bot_name: "quill".into(),
//! });
//! let bound = factory.bind_enabled(&registry, &config, None).await?;
//!
//! let transcript = vec![TranscriptEntry::message("alice", "hello")];
//! let augmented = build_transcript(transcript, &bound, &factory.snapshot()).await;
//! # let _ = augmented;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`types`] | Core types: `Scope`, `StateEvent`, `TranscriptEntry`, `ToolDefinition` |
//! | [`state`] | File-backed scoped state: global blobs, channel blobs with inheritance, epic event logs with replay/fork |
//! | [`inject`] | Depth-aged context injections and their deterministic placement |
//! | [`plugin`] | The `Plugin` trait, descriptor validation, and the registry |
//! | [`context`] | Per-activation factory and the narrow handle plugins write against |
//! | [`dispatch`] | Schema-validated tool-call routing with post-execution hooks |
//! | [`host`] | The chat-platform seam (`send_message`, `pin_message`) |
//! | [`config`] | Configuration shapes the core consumes |
//! | [`error`] | Error types with thiserror: `UnknownPlugin`, `InvalidInput`, `CorruptData`, … |
//!
//! ## State Scopes: The Core Idea
//!
//! Each plugin picks a consistency model per channel of interaction:
//!
//! - **global** — one blob, shared everywhere, never rewound
//! - **channel** — one blob per channel; a thread without its own state
//!   reads a *copy* of its parent's (one hop, never mutating the parent)
//! - **epic** — an event log keyed by message id; state is replayed through
//!   a plugin-supplied reducer, filtered by the messages still live in the
//!   channel, so deleting a message rolls its effects back and forking a
//!   thread forks the log prefix

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod inject;
pub mod plugin;
pub mod state;
pub mod types;

pub use error::{QuillError, QuillResult};
pub use types::*;
