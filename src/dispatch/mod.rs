//! Tool-call routing — the bridge between the LLM's tool calls and plugin
//! handlers.
//!
//! Raw input is validated against the tool's declared schema before the
//! handler runs, so handlers can assume shape. Handler failures carry the
//! plugin's identity and are returned to the LLM as structured error
//! results rather than crashing the activation.

use std::sync::Arc;

use serde_json::Value;

use crate::context::PluginHandle;
use crate::error::{QuillError, QuillResult};
use crate::plugin::PluginRegistry;
use crate::types::ToolOutput;

pub struct ToolDispatcher {
    registry: Arc<PluginRegistry>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }

    /// Route one tool call: look up the plugin and tool, validate the
    /// input, run the handler, then the plugin's post-execution hook.
    ///
    /// Hook failures are logged and never alter the tool result.
    pub async fn dispatch(
        &self,
        plugin_name: &str,
        tool_name: &str,
        input: Value,
        handle: &PluginHandle,
    ) -> QuillResult<ToolOutput> {
        let plugin = self
            .registry
            .get(plugin_name)
            .ok_or_else(|| QuillError::UnknownPlugin(plugin_name.to_string()))?;

        let schema = self
            .registry
            .schema(plugin_name, tool_name)
            .ok_or_else(|| QuillError::UnknownTool {
                plugin: plugin_name.to_string(),
                tool: tool_name.to_string(),
            })?;

        if let Err(errors) = schema.validate(&input) {
            let message = errors
                .map(|e| format!("{e} at {}", e.instance_path))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(QuillError::InvalidInput {
                plugin: plugin_name.to_string(),
                tool: tool_name.to_string(),
                message,
            });
        }

        let result = plugin
            .call_tool(tool_name, input.clone(), handle)
            .await
            .map_err(|e| match e {
                already @ QuillError::ToolExecution { .. } => already,
                other => QuillError::ToolExecution {
                    plugin: plugin_name.to_string(),
                    tool: tool_name.to_string(),
                    message: other.to_string(),
                },
            })?;

        if let Err(e) = plugin
            .on_tool_execution(tool_name, &input, &result, handle)
            .await
        {
            tracing::warn!(
                plugin = plugin_name,
                tool = tool_name,
                "post-execution hook failed: {e}"
            );
        }

        Ok(result)
    }

    /// Like [`dispatch`](Self::dispatch), but folds failures into an error
    /// `ToolOutput` so the LLM can see what went wrong and self-correct.
    pub async fn dispatch_for_llm(
        &self,
        plugin_name: &str,
        tool_name: &str,
        input: Value,
        handle: &PluginHandle,
    ) -> ToolOutput {
        match self.dispatch(plugin_name, tool_name, input, handle).await {
            Ok(output) => output,
            Err(e) => ToolOutput::error(e.to_string()),
        }
    }
}
