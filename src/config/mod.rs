//! Configuration types consumed by the runtime.
//!
//! Loading and merging (YAML or otherwise) is the host's job; the core only
//! defines the shapes it deserializes from the parsed value.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::inject::{Anchor, ContextInjection, InjectionContent};
use crate::types::Scope;

/// Top-level runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    #[serde(default)]
    pub enabled_plugins: Vec<String>,
    #[serde(default)]
    pub plugin_config: HashMap<String, PluginSettings>,
}

impl RuntimeConfig {
    /// Settings for one plugin, defaulted when the config has no entry.
    pub fn settings_for(&self, plugin_id: &str) -> PluginSettings {
        self.plugin_config.get(plugin_id).cloned().unwrap_or_default()
    }
}

/// Per-plugin configuration block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginSettings {
    /// Which consistency model `get_state`/`set_state` use by default.
    #[serde(default)]
    pub state_scope: Scope,
    /// Statically configured injections, placed before the plugin's dynamic
    /// list so dynamic entries win id collisions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub injections: Vec<StaticInjection>,
    /// Plugin-specific keys, passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PluginSettings {
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.extra.get(key)
    }
}

/// A configuration-sourced injection: the dynamic shape plus an anchor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticInjection {
    pub id: String,
    pub content: InjectionContent,
    #[serde(default)]
    pub depth: usize,
    #[serde(default)]
    pub anchor: Anchor,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub as_system: bool,
}

impl StaticInjection {
    /// The equivalent dynamic injection. Static entries have no
    /// last-modified id, so they are settled at their configured depth.
    pub fn to_injection(&self) -> ContextInjection {
        ContextInjection {
            id: self.id.clone(),
            content: self.content.clone(),
            target_depth: self.depth,
            last_modified_at: None,
            priority: self.priority,
            as_system: self.as_system,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn runtime_config_from_parsed_value() {
        let config: RuntimeConfig = serde_json::from_value(json!({
            "enabledPlugins": ["notes", "inject"],
            "pluginConfig": {
                "notes": {"state_scope": "epic", "max_notes": 20},
                "inject": {
                    "injections": [
                        {"id": "rules", "content": "be nice", "depth": 8}
                    ]
                }
            }
        }))
        .unwrap();

        assert_eq!(config.enabled_plugins, vec!["notes", "inject"]);

        let notes = config.settings_for("notes");
        assert_eq!(notes.state_scope, Scope::Epic);
        assert_eq!(notes.get("max_notes"), Some(&json!(20)));

        let inject = config.settings_for("inject");
        assert_eq!(inject.state_scope, Scope::Channel);
        assert_eq!(inject.injections.len(), 1);
        assert_eq!(inject.injections[0].depth, 8);
        assert_eq!(inject.injections[0].anchor, Anchor::Latest);
    }

    #[test]
    fn settings_default_when_absent() {
        let config = RuntimeConfig::default();
        let settings = config.settings_for("anything");
        assert_eq!(settings.state_scope, Scope::Channel);
        assert!(settings.injections.is_empty());
    }

    #[test]
    fn static_injection_defaults() {
        let injection: StaticInjection = serde_json::from_value(json!({
            "id": "persona",
            "content": "You are Quill.",
            "depth": 12
        }))
        .unwrap();
        assert_eq!(injection.anchor, Anchor::Latest);
        assert_eq!(injection.priority, 0);
        assert!(!injection.as_system);

        let dynamic = injection.to_injection();
        assert_eq!(dynamic.target_depth, 12);
        assert!(dynamic.last_modified_at.is_none());
    }

    #[test]
    fn static_injection_earliest_anchor() {
        let injection: StaticInjection = serde_json::from_value(json!({
            "id": "preamble",
            "content": "transcript begins",
            "depth": 0,
            "anchor": "earliest"
        }))
        .unwrap();
        assert_eq!(injection.anchor, Anchor::Earliest);
    }
}
