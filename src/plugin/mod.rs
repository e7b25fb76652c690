//! Plugins — in-process extensions that expose tools to the LLM, inject
//! context fragments, and keep scoped state.
//!
//! Plugins are trusted code, registered once at process start. The registry
//! validates each descriptor up front and keeps the compiled input schemas
//! for the dispatcher.

pub mod inject;
pub mod notes;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

use crate::context::PluginHandle;
use crate::error::{QuillError, QuillResult};
use crate::inject::ContextInjection;
use crate::state::Reducer;
use crate::types::{ToolDefinition, ToolOutput};

pub use inject::InjectPlugin;
pub use notes::NotesPlugin;

/// A bot extension. Only `name` and `description` are required; every
/// lifecycle hook has a no-op default.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Short name, unique within the registry (e.g. `notes`).
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Display persona for participant-style injections. Defaults to the
    /// plugin name.
    fn persona(&self) -> &str {
        self.name()
    }

    /// Tools this plugin exposes to the LLM.
    fn tools(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }

    /// Reducer for epic-scope state. Without one, epic reads degrade to
    /// channel semantics.
    fn reducer(&self) -> Option<Arc<dyn Reducer>> {
        None
    }

    /// Initial-setup hook, run when the plugin is bound for an activation.
    async fn setup(&self, handle: &PluginHandle) -> QuillResult<()> {
        let _ = handle;
        Ok(())
    }

    /// Context-injection provider. Called once per context build.
    async fn injections(&self, handle: &PluginHandle) -> QuillResult<Vec<ContextInjection>> {
        let _ = handle;
        Ok(Vec::new())
    }

    /// Execute one of this plugin's tools. Input has already been validated
    /// against the tool's declared schema.
    async fn call_tool(
        &self,
        tool: &str,
        input: Value,
        handle: &PluginHandle,
    ) -> QuillResult<ToolOutput> {
        let _ = (input, handle);
        Err(QuillError::UnknownTool {
            plugin: self.name().to_string(),
            tool: tool.to_string(),
        })
    }

    /// Post-execution callback, run after every tool call. Failures here
    /// are logged and never alter the tool result.
    async fn on_tool_execution(
        &self,
        tool: &str,
        input: &Value,
        result: &ToolOutput,
        handle: &PluginHandle,
    ) -> QuillResult<()> {
        let _ = (tool, input, result, handle);
        Ok(())
    }
}

/// Startup-time map from short name to plugin, plus the compiled tool
/// schemas. Immutable once the host finishes registration.
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
    schemas: HashMap<(String, String), JSONSchema>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            schemas: HashMap::new(),
        }
    }

    /// Register a plugin, validating its descriptor: a unique plugin name,
    /// unique tool names, non-empty descriptions, and input schemas that
    /// compile as JSON Schema Draft 7.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> QuillResult<()> {
        let name = plugin.name().to_string();
        if self.get(&name).is_some() {
            return Err(QuillError::DuplicatePlugin(name));
        }
        if name.is_empty() {
            return Err(QuillError::InvalidDescriptor {
                plugin: name,
                message: "plugin name is empty".into(),
            });
        }

        let mut seen = HashSet::new();
        let mut schemas = Vec::new();
        for tool in plugin.tools() {
            if !seen.insert(tool.name.clone()) {
                return Err(QuillError::InvalidDescriptor {
                    plugin: name,
                    message: format!("duplicate tool name {:?}", tool.name),
                });
            }
            if tool.description.trim().is_empty() {
                return Err(QuillError::InvalidDescriptor {
                    plugin: name,
                    message: format!("tool {:?} has an empty description", tool.name),
                });
            }
            let compiled = JSONSchema::options()
                .with_draft(Draft::Draft7)
                .compile(&tool.input_schema)
                .map_err(|e| QuillError::InvalidDescriptor {
                    plugin: name.clone(),
                    message: format!("tool {:?} schema does not compile: {e}", tool.name),
                })?;
            schemas.push((tool.name, compiled));
        }

        for (tool_name, compiled) in schemas {
            self.schemas.insert((name.clone(), tool_name), compiled);
        }
        self.plugins.push(plugin);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.iter().find(|p| p.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// The registered plugins selected by `enabled_plugins`, in the
    /// configured order. An unknown name is startup-fatal.
    pub fn enabled(&self, names: &[String]) -> QuillResult<Vec<Arc<dyn Plugin>>> {
        names
            .iter()
            .map(|name| {
                self.get(name)
                    .ok_or_else(|| QuillError::UnknownPlugin(name.clone()))
            })
            .collect()
    }

    /// Compiled input schema for a tool, if the tool exists.
    pub(crate) fn schema(&self, plugin: &str, tool: &str) -> Option<&JSONSchema> {
        self.schemas.get(&(plugin.to_string(), tool.to_string()))
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
