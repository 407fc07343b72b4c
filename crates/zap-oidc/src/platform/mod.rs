//! Browser adapter.
//!
//! The flow touches the host page in a handful of ways: reading the current
//! URL, navigating, rewriting the history entry and driving one hidden iframe
//! for session checks. [`BrowserPlatform`] captures exactly that so the
//! protocol core runs without a DOM. Incoming cross-document messages are
//! delivered to the client as [`WindowMessage`]s over a channel.

pub mod memory;

pub use memory::RecordingPlatform;

/// Host page capabilities used by the flow.
pub trait BrowserPlatform: Send + Sync {
    /// The full current URL, including the query string.
    fn current_url(&self) -> String;

    /// Performs a full-page navigation.
    fn redirect_to(&self, url: &str);

    /// Replaces the current history entry without navigating.
    fn replace_url_state(&self, url: &str);

    /// Mounts the hidden session-check iframe.
    fn mount_hidden_iframe(&self, src: &str);

    /// Posts `message` into the iframe's window, scoped to `target_origin`.
    fn post_to_iframe(&self, message: &str, target_origin: &str);

    /// Removes the session-check iframe.
    fn remove_iframe(&self);
}

impl std::fmt::Debug for dyn BrowserPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BrowserPlatform")
    }
}

/// A message event received by the host window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowMessage {
    /// Origin of the sender.
    pub origin: String,
    /// The message payload.
    pub data: String,
}

impl WindowMessage {
    /// Creates a message.
    #[must_use]
    pub fn new(origin: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            data: data.into(),
        }
    }
}
