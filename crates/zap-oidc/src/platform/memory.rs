//! Headless platform that records every side effect.

use std::sync::Mutex;

use super::BrowserPlatform;

#[derive(Debug, Default)]
struct Recorded {
    current_url: String,
    redirects: Vec<String>,
    replaced_urls: Vec<String>,
    iframe_src: Option<String>,
    posted: Vec<(String, String)>,
}

/// A [`BrowserPlatform`] for headless hosts and tests.
///
/// Navigation updates the current URL; every call is kept for inspection.
#[derive(Debug, Default)]
pub struct RecordingPlatform {
    inner: Mutex<Recorded>,
}

impl RecordingPlatform {
    /// Creates a platform positioned at `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(Recorded {
                current_url: url.into(),
                ..Recorded::default()
            }),
        }
    }

    /// Moves the platform to `url` without recording a redirect.
    pub fn set_current_url(&self, url: impl Into<String>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.current_url = url.into();
        }
    }

    /// Full-page navigations, oldest first.
    #[must_use]
    pub fn redirects(&self) -> Vec<String> {
        self.read(|r| r.redirects.clone())
    }

    /// The most recent full-page navigation.
    #[must_use]
    pub fn last_redirect(&self) -> Option<String> {
        self.read(|r| r.redirects.last().cloned())
    }

    /// History replacements, oldest first.
    #[must_use]
    pub fn replaced_urls(&self) -> Vec<String> {
        self.read(|r| r.replaced_urls.clone())
    }

    /// Source of the mounted iframe, if any.
    #[must_use]
    pub fn iframe_src(&self) -> Option<String> {
        self.read(|r| r.iframe_src.clone())
    }

    /// Messages posted to the iframe as `(message, target_origin)`.
    #[must_use]
    pub fn posted_messages(&self) -> Vec<(String, String)> {
        self.read(|r| r.posted.clone())
    }

    fn read<T: Default>(&self, f: impl FnOnce(&Recorded) -> T) -> T {
        self.inner.lock().map(|r| f(&r)).unwrap_or_default()
    }

    fn write(&self, f: impl FnOnce(&mut Recorded)) {
        if let Ok(mut inner) = self.inner.lock() {
            f(&mut inner);
        }
    }
}

impl BrowserPlatform for RecordingPlatform {
    fn current_url(&self) -> String {
        self.read(|r| r.current_url.clone())
    }

    fn redirect_to(&self, url: &str) {
        self.write(|r| {
            r.redirects.push(url.to_string());
            r.current_url = url.to_string();
        });
    }

    fn replace_url_state(&self, url: &str) {
        self.write(|r| {
            r.replaced_urls.push(url.to_string());
            r.current_url = url.to_string();
        });
    }

    fn mount_hidden_iframe(&self, src: &str) {
        self.write(|r| r.iframe_src = Some(src.to_string()));
    }

    fn post_to_iframe(&self, message: &str, target_origin: &str) {
        self.write(|r| {
            r.posted
                .push((message.to_string(), target_origin.to_string()));
        });
    }

    fn remove_iframe(&self) {
        self.write(|r| r.iframe_src = None);
    }
}
