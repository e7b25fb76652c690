//! Deterministic placement of injections into an ordered transcript.
//!
//! Placement order is fully specified: insertion index ascending, then
//! priority descending, then plugin id, then injection id. Given identical
//! inputs the output transcript is byte-identical.

use std::collections::HashMap;

use crate::context::{BoundPlugin, ContextSnapshot};
use crate::types::TranscriptEntry;

use super::{effective_depth, Anchor, ContextInjection};

/// An injection with its effective depth resolved, ready for placement
#[derive(Debug, Clone)]
pub struct PreparedInjection {
    pub plugin_id: String,
    pub persona: String,
    pub injection: ContextInjection,
    pub anchor: Anchor,
    pub depth: usize,
}

impl PreparedInjection {
    pub fn prepare(
        plugin_id: impl Into<String>,
        persona: impl Into<String>,
        injection: ContextInjection,
        anchor: Anchor,
        snapshot: &ContextSnapshot,
    ) -> Self {
        let depth = effective_depth(
            injection.last_modified_at.as_deref(),
            injection.target_depth,
            snapshot,
        );
        Self {
            plugin_id: plugin_id.into(),
            persona: persona.into(),
            injection,
            anchor,
            depth,
        }
    }

    /// Where this injection lands in a transcript of length `n`. Depths
    /// beyond the transcript clamp to the boundary; nothing is dropped.
    fn insertion_index(&self, n: usize) -> usize {
        match self.anchor {
            Anchor::Latest => n.saturating_sub(self.depth),
            Anchor::Earliest => self.depth.min(n),
        }
    }

    fn render(&self) -> TranscriptEntry {
        let body = self.injection.content.render();
        if self.injection.as_system {
            TranscriptEntry::system(&self.plugin_id, &body)
        } else {
            TranscriptEntry::message(&self.persona, &body)
        }
    }
}

/// Insert prepared injections into the transcript.
///
/// Duplicates by (plugin id, injection id) resolve last-wins, so a plugin's
/// dynamic list overrides its configured baseline when the caller collects
/// config entries first. Indices are computed against the transcript length
/// before any insertion, and groups are spliced from the highest index down
/// so earlier insertions never shift later ones.
pub fn place_injections(transcript: &mut Vec<TranscriptEntry>, prepared: Vec<PreparedInjection>) {
    let mut by_key: HashMap<(String, String), usize> = HashMap::new();
    let mut slots: Vec<Option<PreparedInjection>> = Vec::new();
    for injection in prepared {
        let key = (
            injection.plugin_id.clone(),
            injection.injection.id.clone(),
        );
        match by_key.get(&key) {
            Some(&slot) => slots[slot] = Some(injection),
            None => {
                by_key.insert(key, slots.len());
                slots.push(Some(injection));
            }
        }
    }
    let mut ordered: Vec<PreparedInjection> = slots.into_iter().flatten().collect();

    let n = transcript.len();
    ordered.sort_by(|a, b| {
        a.insertion_index(n)
            .cmp(&b.insertion_index(n))
            .then(b.injection.priority.cmp(&a.injection.priority))
            .then(a.plugin_id.cmp(&b.plugin_id))
            .then(a.injection.id.cmp(&b.injection.id))
    });

    let mut end = ordered.len();
    while end > 0 {
        let index = ordered[end - 1].insertion_index(n);
        let mut start = end;
        while start > 0 && ordered[start - 1].insertion_index(n) == index {
            start -= 1;
        }
        let entries: Vec<TranscriptEntry> =
            ordered[start..end].iter().map(|p| p.render()).collect();
        transcript.splice(index..index, entries);
        end = start;
    }
}

/// Collect every bound plugin's injections and place them.
///
/// Per plugin: configured entries first, then the dynamic provider, so
/// dynamic entries win id collisions. A provider failure drops that
/// plugin's injections (configured ones included) with a warning; the build
/// never fails the activation.
pub async fn build_transcript(
    transcript: Vec<TranscriptEntry>,
    bound: &[BoundPlugin],
    snapshot: &ContextSnapshot,
) -> Vec<TranscriptEntry> {
    let mut prepared = Vec::new();
    for entry in bound {
        let plugin_id = entry.plugin.name();
        let persona = entry.plugin.persona();

        let mut from_plugin = Vec::new();
        for config in &entry.handle.settings().injections {
            from_plugin.push(PreparedInjection::prepare(
                plugin_id,
                persona,
                config.to_injection(),
                config.anchor,
                snapshot,
            ));
        }

        match entry.plugin.injections(&entry.handle).await {
            Ok(dynamic) => {
                for injection in dynamic {
                    from_plugin.push(PreparedInjection::prepare(
                        plugin_id,
                        persona,
                        injection,
                        Anchor::Latest,
                        snapshot,
                    ));
                }
                prepared.extend(from_plugin);
            }
            Err(e) => {
                tracing::warn!(
                    plugin = plugin_id,
                    "injection build failed, dropping this plugin's injections: {e}"
                );
            }
        }
    }

    let mut transcript = transcript;
    place_injections(&mut transcript, prepared);
    transcript
}
