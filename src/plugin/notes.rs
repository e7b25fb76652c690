//! The `notes` plugin — the reference plugin exercising the whole runtime
//! surface: tools, scoped state in all three models, a reducer, the
//! post-execution hook, host passthrough, and a context injection.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::Plugin;
use crate::context::PluginHandle;
use crate::error::{QuillError, QuillResult};
use crate::inject::ContextInjection;
use crate::state::{FnReducer, Reducer};
use crate::types::{Scope, ToolDefinition, ToolOutput};

/// Default target depth for the notes injection when the config is silent.
const DEFAULT_INJECTION_DEPTH: usize = 6;

pub struct NotesPlugin;

impl NotesPlugin {
    fn injection_depth(handle: &PluginHandle) -> usize {
        handle
            .config_value("injection_depth")
            .and_then(Value::as_u64)
            .map(|d| d as usize)
            .unwrap_or(DEFAULT_INJECTION_DEPTH)
    }

    async fn notes(handle: &PluginHandle) -> QuillResult<Vec<Value>> {
        let state = handle.get_state(handle.configured_scope()).await?;
        Ok(state
            .and_then(|s| s.as_array().cloned())
            .unwrap_or_default())
    }

    async fn save(handle: &PluginHandle, text: &str) -> QuillResult<usize> {
        let note = json!({"text": text, "at": handle.current_message_id()});
        match handle.configured_scope() {
            // Epic scope: the note is the delta; the reducer folds it in.
            Scope::Epic => {
                handle.set_state(Scope::Epic, note).await?;
            }
            // Global and channel scopes store the whole list.
            scope => {
                let mut notes = Self::notes(handle).await?;
                notes.push(note);
                handle.set_state(scope, Value::Array(notes)).await?;
            }
        }
        Ok(Self::notes(handle).await?.len())
    }
}

#[async_trait]
impl Plugin for NotesPlugin {
    fn name(&self) -> &str {
        "notes"
    }

    fn description(&self) -> &str {
        "Remembers short notes per channel and keeps them in context"
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "save_note".into(),
                description: "Save a short note to remember in this channel".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "text": {
                            "type": "string",
                            "description": "The note to remember"
                        }
                    },
                    "required": ["text"]
                }),
            },
            ToolDefinition {
                name: "list_notes".into(),
                description: "List the notes saved in this channel".into(),
                input_schema: json!({"type": "object", "properties": {}}),
            },
        ]
    }

    fn reducer(&self) -> Option<Arc<dyn Reducer>> {
        Some(Arc::new(FnReducer::new(
            |state: Option<Value>, delta: &Value| {
                let mut notes = state
                    .and_then(|s| s.as_array().cloned())
                    .unwrap_or_default();
                notes.push(delta.clone());
                Some(Value::Array(notes))
            },
        )))
    }

    async fn injections(&self, handle: &PluginHandle) -> QuillResult<Vec<ContextInjection>> {
        let notes = Self::notes(handle).await?;
        if notes.is_empty() {
            return Ok(Vec::new());
        }

        let lines: Vec<String> = notes
            .iter()
            .filter_map(|n| n["text"].as_str())
            .map(|text| format!("- {text}"))
            .collect();
        let last_modified = notes
            .last()
            .and_then(|n| n["at"].as_str())
            .map(String::from);

        let mut injection = ContextInjection::new(
            "notes",
            format!("Saved notes:\n{}", lines.join("\n")),
        )
        .with_depth(Self::injection_depth(handle))
        .as_system();
        injection.last_modified_at = last_modified;
        Ok(vec![injection])
    }

    async fn call_tool(
        &self,
        tool: &str,
        input: Value,
        handle: &PluginHandle,
    ) -> QuillResult<ToolOutput> {
        match tool {
            "save_note" => {
                let text = input.get("text").and_then(Value::as_str).unwrap_or("");
                let count = Self::save(handle, text).await?;
                Ok(ToolOutput::success(format!("Saved. {count} note(s) stored."))
                    .with_metadata(json!({"count": count})))
            }
            "list_notes" => {
                let notes = Self::notes(handle).await?;
                if notes.is_empty() {
                    return Ok(ToolOutput::success("No notes saved in this channel."));
                }
                let lines: Vec<String> = notes
                    .iter()
                    .filter_map(|n| n["text"].as_str())
                    .enumerate()
                    .map(|(i, text)| format!("{}. {text}", i + 1))
                    .collect();
                Ok(ToolOutput::success(lines.join("\n")))
            }
            other => Err(QuillError::UnknownTool {
                plugin: self.name().to_string(),
                tool: other.to_string(),
            }),
        }
    }

    async fn on_tool_execution(
        &self,
        tool: &str,
        _input: &Value,
        result: &ToolOutput,
        handle: &PluginHandle,
    ) -> QuillResult<()> {
        // Confirm saves in-channel and pin the confirmation so the note
        // survives scrollback.
        if tool == "save_note" && !result.is_error {
            let sent = handle.send_message(&result.content).await?;
            if let Some(first) = sent.first() {
                handle.pin_message(first).await?;
            }
        }
        Ok(())
    }
}
