//! Epic-state reconstruction.
//!
//! Replay is a pure function of (log, upper bound, live set, reducer): no
//! caches, no side effects. Rollback of deleted messages falls out of the
//! live-set filter; fork semantics fall out of prefix copying.

use std::collections::HashSet;

use serde_json::Value;

use crate::types::StateEvent;

/// Folds one epic delta into accumulated state.
///
/// Deltas are opaque to the core; only the plugin's reducer interprets
/// them. `state` is `None` before the first retained event.
pub trait Reducer: Send + Sync {
    fn apply(&self, state: Option<Value>, delta: &Value) -> Option<Value>;
}

/// Adapter so a closure can be passed wherever a [`Reducer`] is expected.
pub struct FnReducer<F>(F);

impl<F> FnReducer<F>
where
    F: Fn(Option<Value>, &Value) -> Option<Value> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Reducer for FnReducer<F>
where
    F: Fn(Option<Value>, &Value) -> Option<Value> + Send + Sync,
{
    fn apply(&self, state: Option<Value>, delta: &Value) -> Option<Value> {
        (self.0)(state, delta)
    }
}

/// Reconstruct epic state from a sorted event log.
///
/// Events after `upto_message_id` (lexicographic compare) are ignored;
/// `None` replays everything. Events whose message id is missing from
/// `live_message_ids` are skipped — that is the rollback path for deleted
/// messages. `None` for the live set disables filtering.
pub fn replay(
    log: &[StateEvent],
    upto_message_id: Option<&str>,
    live_message_ids: Option<&HashSet<String>>,
    reducer: &dyn Reducer,
) -> Option<Value> {
    let mut state = None;
    for event in log {
        if let Some(upto) = upto_message_id {
            if event.message_id.as_str() > upto {
                break;
            }
        }
        if let Some(live) = live_message_ids {
            if !live.contains(&event.message_id) {
                continue;
            }
        }
        state = reducer.apply(state, &event.delta);
    }
    state
}

/// The sorted prefix with `message_id <= upto_message_id`. Fork copies this
/// into the new channel's log.
pub fn prefix_upto(log: &[StateEvent], upto_message_id: &str) -> Vec<StateEvent> {
    let end = log.partition_point(|e| e.message_id.as_str() <= upto_message_id);
    log[..end].to_vec()
}
