//! Per-activation context — the factory that binds plugins to a channel,
//! message stream, and inheritance lineage.
//!
//! One `ContextFactory` per activation; factories are never shared across
//! concurrent activations. The factory freezes the ordered message-id
//! snapshot so every plugin sees one consistent view of which messages are
//! live throughout injection building and tool execution. The snapshot may
//! be refreshed between activations with [`ContextFactory::update_message_ids`],
//! never during one build.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::config::{PluginSettings, RuntimeConfig};
use crate::error::{QuillError, QuillResult};
use crate::host::ChatHost;
use crate::plugin::{Plugin, PluginRegistry};
use crate::state::{replay, Reducer, StateStore};
use crate::types::{InheritanceInfo, Scope, StateEvent};

/// Frozen view of the ordered message-id sequence (oldest to newest), with
/// the derived set and position map.
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    ids: Vec<String>,
    id_set: HashSet<String>,
    positions: HashMap<String, usize>,
}

impl ContextSnapshot {
    pub fn new(ids: Vec<String>) -> Self {
        let id_set = ids.iter().cloned().collect();
        let positions = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        Self {
            ids,
            id_set,
            positions,
        }
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn id_set(&self) -> &HashSet<String> {
        &self.id_set
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.positions.contains_key(message_id)
    }

    pub fn position(&self, message_id: &str) -> Option<usize> {
        self.positions.get(message_id).copied()
    }

    /// Messages that arrived after `message_id`: `n - 1 - pos`, or
    /// `usize::MAX` when the id is not in the context.
    pub fn messages_since(&self, message_id: &str) -> usize {
        match self.position(message_id) {
            Some(pos) => self.len() - 1 - pos,
            None => usize::MAX,
        }
    }
}

/// Everything an activation is born with
#[derive(Debug, Clone)]
pub struct ActivationParams {
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub current_message_id: String,
    /// Ordered oldest to newest.
    pub message_ids: Vec<String>,
    pub bot_name: String,
}

/// Per-plugin binding inputs for [`ContextFactory::bind`]
#[derive(Default)]
pub struct PluginBinding {
    pub inheritance: Option<InheritanceInfo>,
    pub settings: PluginSettings,
    /// Overrides the plugin's own [`Plugin::reducer`] when set.
    pub reducer: Option<Arc<dyn Reducer>>,
}

/// A plugin paired with its bound handle for one activation
pub struct BoundPlugin {
    pub plugin: Arc<dyn Plugin>,
    pub handle: PluginHandle,
}

/// Creates bound plugin interfaces for one activation
pub struct ContextFactory {
    store: Arc<StateStore>,
    host: Arc<dyn ChatHost>,
    snapshot: Arc<RwLock<ContextSnapshot>>,
    channel_id: String,
    guild_id: Option<String>,
    current_message_id: String,
    bot_name: String,
}

impl ContextFactory {
    pub fn new(store: Arc<StateStore>, host: Arc<dyn ChatHost>, params: ActivationParams) -> Self {
        Self {
            store,
            host,
            snapshot: Arc::new(RwLock::new(ContextSnapshot::new(params.message_ids))),
            channel_id: params.channel_id,
            guild_id: params.guild_id,
            current_message_id: params.current_message_id,
            bot_name: params.bot_name,
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn current_message_id(&self) -> &str {
        &self.current_message_id
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        self.snapshot.read().expect("snapshot lock poisoned").clone()
    }

    /// Replace the frozen snapshot. Only between activations — handles
    /// bound earlier observe the new ids on their next read, so calling
    /// this mid-build would break snapshot consistency.
    pub fn update_message_ids(&self, message_ids: Vec<String>) {
        *self.snapshot.write().expect("snapshot lock poisoned") =
            ContextSnapshot::new(message_ids);
    }

    /// Bind one plugin. The handle carries the narrow interface the plugin
    /// writes against; everything else stays behind the factory.
    pub fn bind(&self, plugin: &Arc<dyn Plugin>, binding: PluginBinding) -> PluginHandle {
        let reducer = binding.reducer.or_else(|| plugin.reducer());
        PluginHandle {
            plugin_id: plugin.name().to_string(),
            persona: plugin.persona().to_string(),
            store: self.store.clone(),
            host: self.host.clone(),
            snapshot: self.snapshot.clone(),
            channel_id: self.channel_id.clone(),
            guild_id: self.guild_id.clone(),
            current_message_id: self.current_message_id.clone(),
            bot_name: self.bot_name.clone(),
            inheritance: binding.inheritance,
            settings: binding.settings,
            reducer,
        }
    }

    /// Bind every enabled plugin from the registry, running each plugin's
    /// setup hook. A failing setup is logged and does not block the
    /// activation or the other plugins.
    pub async fn bind_enabled(
        &self,
        registry: &PluginRegistry,
        config: &RuntimeConfig,
        inheritance: Option<&InheritanceInfo>,
    ) -> QuillResult<Vec<BoundPlugin>> {
        let mut bound = Vec::new();
        for plugin in registry.enabled(&config.enabled_plugins)? {
            let handle = self.bind(
                &plugin,
                PluginBinding {
                    inheritance: inheritance.cloned(),
                    settings: config.settings_for(plugin.name()),
                    reducer: None,
                },
            );
            if let Err(e) = plugin.setup(&handle).await {
                tracing::warn!(plugin = plugin.name(), "setup failed: {e}");
            }
            bound.push(BoundPlugin { plugin, handle });
        }
        Ok(bound)
    }
}

/// The narrow interface a plugin is handed for one activation.
///
/// State operations are pre-bound to this plugin and channel; chat
/// operations are passed through to the host untouched.
#[derive(Clone)]
pub struct PluginHandle {
    plugin_id: String,
    persona: String,
    store: Arc<StateStore>,
    host: Arc<dyn ChatHost>,
    snapshot: Arc<RwLock<ContextSnapshot>>,
    channel_id: String,
    guild_id: Option<String>,
    current_message_id: String,
    bot_name: String,
    inheritance: Option<InheritanceInfo>,
    settings: PluginSettings,
    reducer: Option<Arc<dyn Reducer>>,
}

impl PluginHandle {
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn guild_id(&self) -> Option<&str> {
        self.guild_id.as_deref()
    }

    pub fn current_message_id(&self) -> &str {
        &self.current_message_id
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    pub fn inheritance(&self) -> Option<&InheritanceInfo> {
        self.inheritance.as_ref()
    }

    pub fn settings(&self) -> &PluginSettings {
        &self.settings
    }

    /// The scope `state_scope` configured for this plugin (default channel).
    pub fn configured_scope(&self) -> Scope {
        self.settings.state_scope
    }

    /// Plugin-specific configuration key.
    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    pub fn context_message_ids(&self) -> Vec<String> {
        self.read_snapshot().ids().to_vec()
    }

    pub fn contains_message(&self, message_id: &str) -> bool {
        self.read_snapshot().contains(message_id)
    }

    /// `n - 1 - pos(id)`, or `usize::MAX` when `id` is `None` or absent
    /// from the frozen context.
    pub fn messages_since(&self, message_id: Option<&str>) -> usize {
        match message_id {
            Some(id) => self.read_snapshot().messages_since(id),
            None => usize::MAX,
        }
    }

    fn read_snapshot(&self) -> ContextSnapshot {
        self.snapshot.read().expect("snapshot lock poisoned").clone()
    }

    // ─── Scoped state ───────────────────────────────────────────────────────

    pub async fn get_state(&self, scope: Scope) -> QuillResult<Option<Value>> {
        match scope {
            Scope::Global => self.store.get_global(&self.plugin_id).await,
            Scope::Channel => self.get_channel_state().await,
            Scope::Epic => self.get_epic_state().await,
        }
    }

    pub async fn set_state(&self, scope: Scope, value: Value) -> QuillResult<()> {
        match scope {
            Scope::Global => self.store.set_global(&self.plugin_id, value).await,
            Scope::Channel => {
                self.store
                    .set_channel(
                        &self.plugin_id,
                        &self.channel_id,
                        value,
                        Some(&self.current_message_id),
                    )
                    .await
            }
            Scope::Epic => {
                let event = StateEvent::new(self.current_message_id.clone(), value);
                self.store
                    .append_or_replace_event(&self.plugin_id, &self.channel_id, event)
                    .await
            }
        }
    }

    /// Epic state as of `message_id`, with deleted messages rolled back via
    /// the frozen context. Needs a reducer; without one this warns and
    /// returns `None`.
    pub async fn get_state_at(&self, message_id: &str) -> QuillResult<Option<Value>> {
        let Some(reducer) = self.reducer.clone() else {
            let err = QuillError::ReducerRequired(self.plugin_id.clone());
            tracing::warn!(plugin = %self.plugin_id, "{err}");
            return Ok(None);
        };
        let log = self.tolerated_events().await?;
        let snapshot = self.read_snapshot();
        Ok(replay(
            &log,
            Some(message_id),
            Some(snapshot.id_set()),
            reducer.as_ref(),
        ))
    }

    async fn get_channel_state(&self) -> QuillResult<Option<Value>> {
        let result = self
            .store
            .get_channel(
                &self.plugin_id,
                &self.channel_id,
                self.inheritance.as_ref(),
            )
            .await;
        match result {
            Ok((value, _metadata)) => Ok(value),
            Err(e) if read_is_tolerable(&e) => {
                tracing::warn!(plugin = %self.plugin_id, channel = %self.channel_id, "channel state unreadable: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn get_epic_state(&self) -> QuillResult<Option<Value>> {
        let Some(reducer) = self.reducer.clone() else {
            tracing::warn!(
                plugin = %self.plugin_id,
                "epic scope read without a reducer; falling back to channel state"
            );
            return self.get_channel_state().await;
        };
        let log = self.tolerated_events().await?;
        let snapshot = self.read_snapshot();
        Ok(replay(&log, None, Some(snapshot.id_set()), reducer.as_ref()))
    }

    async fn tolerated_events(&self) -> QuillResult<Vec<StateEvent>> {
        match self
            .store
            .get_events(&self.plugin_id, &self.channel_id)
            .await
        {
            Ok(log) => Ok(log),
            Err(e) if read_is_tolerable(&e) => {
                tracing::warn!(plugin = %self.plugin_id, channel = %self.channel_id, "event log unreadable: {e}");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    // ─── Host passthrough ───────────────────────────────────────────────────

    pub async fn send_message(&self, content: &str) -> QuillResult<Vec<String>> {
        self.host.send_message(&self.channel_id, content).await
    }

    pub async fn pin_message(&self, message_id: &str) -> QuillResult<()> {
        self.host.pin_message(&self.channel_id, message_id).await
    }
}

/// Missing or unreadable state is tolerable on the read paths whose
/// semantics allow `None` (channel, epic). Write failures never are.
fn read_is_tolerable(e: &QuillError) -> bool {
    matches!(e, QuillError::Io(_) | QuillError::CorruptData { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullHost;
    use crate::state::FnReducer;
    use serde_json::json;

    struct BarePlugin;

    #[async_trait::async_trait]
    impl Plugin for BarePlugin {
        fn name(&self) -> &str {
            "bare"
        }
        fn description(&self) -> &str {
            "no tools, no hooks"
        }
    }

    struct CountingPlugin;

    #[async_trait::async_trait]
    impl Plugin for CountingPlugin {
        fn name(&self) -> &str {
            "counting"
        }
        fn description(&self) -> &str {
            "epic counter"
        }
        fn reducer(&self) -> Option<Arc<dyn Reducer>> {
            Some(Arc::new(FnReducer::new(
                |state: Option<Value>, delta: &Value| {
                    let current = state.and_then(|s| s.as_i64()).unwrap_or(0);
                    Some(json!(current + delta.as_i64().unwrap_or(0)))
                },
            )))
        }
    }

    fn factory(store: Arc<StateStore>, ids: &[&str], current: &str) -> ContextFactory {
        ContextFactory::new(
            store,
            Arc::new(NullHost),
            ActivationParams {
                channel_id: "c1".into(),
                guild_id: Some("g1".into()),
                current_message_id: current.into(),
                message_ids: ids.iter().map(|s| s.to_string()).collect(),
                bot_name: "quill".into(),
            },
        )
    }

    fn bind_bare(factory: &ContextFactory) -> PluginHandle {
        let plugin: Arc<dyn Plugin> = Arc::new(BarePlugin);
        factory.bind(&plugin, PluginBinding::default())
    }

    #[test]
    fn snapshot_positions_and_membership() {
        let snap = ContextSnapshot::new(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(snap.len(), 3);
        assert!(snap.contains("b"));
        assert_eq!(snap.position("c"), Some(2));
        assert_eq!(snap.messages_since("a"), 2);
        assert_eq!(snap.messages_since("c"), 0);
        assert_eq!(snap.messages_since("zz"), usize::MAX);
    }

    #[tokio::test]
    async fn handle_exposes_activation_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateStore::new(dir.path()));
        let factory = factory(store, &["a", "b", "c"], "c");
        let handle = bind_bare(&factory);

        assert_eq!(handle.plugin_id(), "bare");
        assert_eq!(handle.channel_id(), "c1");
        assert_eq!(handle.guild_id(), Some("g1"));
        assert_eq!(handle.current_message_id(), "c");
        assert_eq!(handle.bot_name(), "quill");
        assert_eq!(handle.configured_scope(), Scope::Channel);
        assert_eq!(handle.context_message_ids(), vec!["a", "b", "c"]);
        assert_eq!(handle.messages_since(Some("a")), 2);
        assert_eq!(handle.messages_since(None), usize::MAX);
    }

    #[tokio::test]
    async fn channel_state_round_trip_through_handle() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateStore::new(dir.path()));
        let factory = factory(store.clone(), &["a", "b"], "b");
        let handle = bind_bare(&factory);

        assert!(handle.get_state(Scope::Channel).await.unwrap().is_none());
        handle
            .set_state(Scope::Channel, json!({"v": 1}))
            .await
            .unwrap();
        let value = handle.get_state(Scope::Channel).await.unwrap().unwrap();
        assert_eq!(value["v"], 1);

        // The write stamps the current message id.
        let (_, meta) = store.get_channel("bare", "c1", None).await.unwrap();
        assert_eq!(meta.last_modified_message_id.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn epic_state_replays_through_reducer() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateStore::new(dir.path()));
        let plugin: Arc<dyn Plugin> = Arc::new(CountingPlugin);

        // Three activations, one event each.
        for (ids, current) in [
            (vec!["m1"], "m1"),
            (vec!["m1", "m2"], "m2"),
            (vec!["m1", "m2", "m3"], "m3"),
        ] {
            let factory = ContextFactory::new(
                store.clone(),
                Arc::new(NullHost),
                ActivationParams {
                    channel_id: "c1".into(),
                    guild_id: None,
                    current_message_id: current.into(),
                    message_ids: ids.iter().map(|s| s.to_string()).collect(),
                    bot_name: "quill".into(),
                },
            );
            let handle = factory.bind(&plugin, PluginBinding::default());
            handle.set_state(Scope::Epic, json!(1)).await.unwrap();
        }

        let factory = factory(store, &["m1", "m2", "m3"], "m3");
        let handle = factory.bind(&plugin, PluginBinding::default());
        assert_eq!(handle.get_state(Scope::Epic).await.unwrap(), Some(json!(3)));

        // Rollback: a context where m2 was deleted.
        factory.update_message_ids(vec!["m1".into(), "m3".into()]);
        assert_eq!(handle.get_state(Scope::Epic).await.unwrap(), Some(json!(2)));

        // Bounded replay.
        factory.update_message_ids(vec!["m1".into(), "m2".into(), "m3".into()]);
        assert_eq!(handle.get_state_at("m2").await.unwrap(), Some(json!(2)));
        assert_eq!(handle.get_state_at("m1").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn epic_without_reducer_falls_back_to_channel() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateStore::new(dir.path()));
        let factory = factory(store, &["a"], "a");
        let handle = bind_bare(&factory);

        handle
            .set_state(Scope::Channel, json!("channel value"))
            .await
            .unwrap();
        // No reducer: epic read degrades to channel semantics.
        let value = handle.get_state(Scope::Epic).await.unwrap();
        assert_eq!(value, Some(json!("channel value")));

        // But an epic write still records the event.
        handle.set_state(Scope::Epic, json!(1)).await.unwrap();
        let log = handle.store.get_events("bare", "c1").await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].message_id, "a");
    }

    #[tokio::test]
    async fn get_state_at_without_reducer_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateStore::new(dir.path()));
        let factory = factory(store, &["a"], "a");
        let handle = bind_bare(&factory);

        handle.set_state(Scope::Epic, json!(1)).await.unwrap();
        assert!(handle.get_state_at("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_channel_read_degrades_to_none() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("plugins/bare/channel"))
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("plugins/bare/channel/c1.json"), "{broken")
            .await
            .unwrap();

        let store = Arc::new(StateStore::new(dir.path()));
        let factory = factory(store, &["a"], "a");
        let handle = bind_bare(&factory);
        assert!(handle.get_state(Scope::Channel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn binding_reducer_overrides_plugin_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateStore::new(dir.path()));
        let factory = factory(store, &["m1"], "m1");

        let plugin: Arc<dyn Plugin> = Arc::new(CountingPlugin);
        let binding = PluginBinding {
            reducer: Some(Arc::new(FnReducer::new(
                |_state: Option<Value>, _delta: &Value| Some(json!("override")),
            ))),
            ..Default::default()
        };
        let handle = factory.bind(&plugin, binding);
        handle.set_state(Scope::Epic, json!(1)).await.unwrap();
        assert_eq!(
            handle.get_state(Scope::Epic).await.unwrap(),
            Some(json!("override"))
        );
    }

    #[tokio::test]
    async fn update_message_ids_refreshes_between_activations() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateStore::new(dir.path()));
        let factory = factory(store, &["a", "b"], "b");
        let handle = bind_bare(&factory);

        assert_eq!(handle.messages_since(Some("a")), 1);
        factory.update_message_ids(vec!["a".into(), "b".into(), "c".into(), "d".into()]);
        assert_eq!(handle.messages_since(Some("a")), 3);
    }
}
