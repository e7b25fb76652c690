//! Context injection — plugin-authored fragments placed into the transcript.
//!
//! A fragment's depth *ages*: a freshly-modified injection starts at the
//! newest end of the transcript (depth 0) and drifts toward its target depth
//! as more messages arrive, then stays there. Recently-changed state is
//! prominent; settled state has a bounded long-term context cost.

pub mod placer;

use serde::{Deserialize, Serialize};

use crate::context::ContextSnapshot;
use crate::types::ContentBlock;

pub use placer::{build_transcript, place_injections, PreparedInjection};

/// Which end of the transcript depth is measured from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
    /// Depth counts back from the newest message.
    #[default]
    Latest,
    /// Depth counts forward from the start of the transcript.
    Earliest,
}

/// Injection content: plain text or a list of structured blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InjectionContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl InjectionContent {
    /// Render to transcript text. Block lists are rendered block-wise,
    /// inlined one per line.
    pub fn render(&self) -> String {
        match self {
            InjectionContent::Text(text) => text.clone(),
            InjectionContent::Blocks(blocks) => blocks
                .iter()
                .map(ContentBlock::render)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<&str> for InjectionContent {
    fn from(s: &str) -> Self {
        InjectionContent::Text(s.to_string())
    }
}

impl From<String> for InjectionContent {
    fn from(s: String) -> Self {
        InjectionContent::Text(s)
    }
}

/// A fragment authored by a plugin during one context build.
///
/// Ids are unique per plugin per build; a later submission with the same id
/// overwrites an earlier one. An injection without `last_modified_at` is
/// settled at `target_depth`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextInjection {
    pub id: String,
    pub content: InjectionContent,
    #[serde(default)]
    pub target_depth: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_at: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub as_system: bool,
}

impl ContextInjection {
    pub fn new(id: impl Into<String>, content: impl Into<InjectionContent>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            target_depth: 0,
            last_modified_at: None,
            priority: 0,
            as_system: false,
        }
    }

    pub fn with_depth(mut self, target_depth: usize) -> Self {
        self.target_depth = target_depth;
        self
    }

    pub fn with_last_modified(mut self, message_id: impl Into<String>) -> Self {
        self.last_modified_at = Some(message_id.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn as_system(mut self) -> Self {
        self.as_system = true;
        self
    }
}

/// Current depth of an injection, aged toward its target.
///
/// With a last-modified position `p` in a context of `n` messages the
/// injection has aged `n - 1 - p` messages; the effective depth is
/// `min(aged, target_depth)`. An injection never modified, or modified at a
/// message no longer in the context, sits at `target_depth`.
pub fn effective_depth(
    last_modified_at: Option<&str>,
    target_depth: usize,
    snapshot: &ContextSnapshot,
) -> usize {
    match last_modified_at.and_then(|id| snapshot.position(id)) {
        Some(pos) => {
            let aged = snapshot.len().saturating_sub(1).saturating_sub(pos);
            aged.min(target_depth)
        }
        None => target_depth,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(ids: &[&str]) -> ContextSnapshot {
        ContextSnapshot::new(ids.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn depth_settles_at_target_without_modification() {
        let snap = snapshot(&["a", "b", "c"]);
        assert_eq!(effective_depth(None, 4, &snap), 4);
    }

    #[test]
    fn depth_settles_when_id_left_context() {
        let snap = snapshot(&["a", "b", "c"]);
        assert_eq!(effective_depth(Some("gone"), 4, &snap), 4);
    }

    #[test]
    fn depth_ages_toward_target() {
        // Aged two messages past c, capped at the target of 1.
        let snap = snapshot(&["a", "b", "c", "d", "e"]);
        assert_eq!(effective_depth(Some("c"), 1, &snap), 1);

        // Freshly modified at the newest message: depth 0.
        assert_eq!(effective_depth(Some("e"), 3, &snap), 0);

        // One message old, target not yet reached.
        assert_eq!(effective_depth(Some("d"), 3, &snap), 1);
    }

    #[test]
    fn depth_is_monotone_as_context_grows() {
        let target = 3;
        let mut prev = 0;
        for n in 1..=6 {
            let ids: Vec<String> = (0..n).map(|i| format!("m{i}")).collect();
            let snap = ContextSnapshot::new(ids);
            let depth = effective_depth(Some("m0"), target, &snap);
            assert!(depth >= prev);
            prev = depth;
        }
        assert_eq!(prev, target);
    }

    #[test]
    fn depth_on_empty_context() {
        let snap = snapshot(&[]);
        assert_eq!(effective_depth(Some("a"), 2, &snap), 2);
        assert_eq!(effective_depth(None, 0, &snap), 0);
    }

    #[test]
    fn injection_content_renders_blocks() {
        let content = InjectionContent::Blocks(vec![
            ContentBlock::text("first"),
            ContentBlock::text("second"),
        ]);
        assert_eq!(content.render(), "first\nsecond");
    }

    #[test]
    fn injection_content_deserializes_both_shapes() {
        let text: InjectionContent = serde_json::from_value(json!("plain")).unwrap();
        assert_eq!(text.render(), "plain");

        let blocks: InjectionContent =
            serde_json::from_value(json!([{"type": "text", "text": "block"}])).unwrap();
        assert_eq!(blocks.render(), "block");
    }

    #[test]
    fn injection_builder() {
        let injection = ContextInjection::new("pins", "pinned: budget review")
            .with_depth(4)
            .with_last_modified("m9")
            .with_priority(10)
            .as_system();
        assert_eq!(injection.target_depth, 4);
        assert_eq!(injection.last_modified_at.as_deref(), Some("m9"));
        assert_eq!(injection.priority, 10);
        assert!(injection.as_system);
    }

    #[test]
    fn anchor_defaults_to_latest() {
        assert_eq!(Anchor::default(), Anchor::Latest);
        assert_eq!(
            serde_json::from_str::<Anchor>("\"earliest\"").unwrap(),
            Anchor::Earliest
        );
    }
}
