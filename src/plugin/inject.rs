//! The `inject` plugin — a carrier for configuration-driven injections.
//!
//! The context pipeline collects the `injections` list from every enabled
//! plugin's settings; this plugin exists so operators can configure
//! injections that belong to no other plugin. It contributes nothing
//! dynamically, so its configured entries always place as written.

use async_trait::async_trait;

use super::Plugin;

pub struct InjectPlugin;

#[async_trait]
impl Plugin for InjectPlugin {
    fn name(&self) -> &str {
        "inject"
    }

    fn description(&self) -> &str {
        "Places statically configured context fragments into the transcript"
    }
}
