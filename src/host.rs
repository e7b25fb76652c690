//! The chat-platform seam. The runtime never talks to the platform itself;
//! plugins get these two operations passed through untouched.

use async_trait::async_trait;

use crate::error::QuillResult;

/// Host-provided chat operations
#[async_trait]
pub trait ChatHost: Send + Sync {
    /// Send a message to a channel. Long content may be split by the
    /// platform client; all resulting message ids are returned.
    async fn send_message(&self, channel_id: &str, content: &str) -> QuillResult<Vec<String>>;

    /// Pin a message in a channel.
    async fn pin_message(&self, channel_id: &str, message_id: &str) -> QuillResult<()>;
}

/// A host that discards sends and pins. For hosts without a chat surface
/// and for plugin tests.
pub struct NullHost;

#[async_trait]
impl ChatHost for NullHost {
    async fn send_message(&self, _channel_id: &str, _content: &str) -> QuillResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn pin_message(&self, _channel_id: &str, _message_id: &str) -> QuillResult<()> {
        Ok(())
    }
}
