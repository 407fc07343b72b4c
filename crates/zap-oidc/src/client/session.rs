//! Check-session polling and silent renew (OpenID Connect Session Management).
//!
//! Once authenticated, the client mounts the provider's check-session iframe
//! and periodically posts `"{client_id} {session_state}"` into it, scoped to
//! the issuer origin. The provider answers with `changed`, `unchanged` or
//! `error`. Messages from the application's own origin carry the query
//! string of a silent-renew callback and are redeemed like a normal callback.
//! Messages from any other origin are ignored.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::{OidcClient, authorization_code, params};
use crate::config::AuthConfig;
use crate::error::OidcError;
use crate::events::Event;
use crate::platform::{BrowserPlatform, WindowMessage};
use crate::storage::CacheKey;

/// Reply of the provider iframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionStatus {
    Changed,
    Unchanged,
    Error,
}

impl SessionStatus {
    fn parse(data: &str) -> Option<Self> {
        match data {
            "changed" => Some(Self::Changed),
            "unchanged" => Some(Self::Unchanged),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Handle to a running check-session monitor.
#[derive(Debug)]
pub struct SessionMonitor {
    handle: JoinHandle<()>,
    platform: Arc<dyn BrowserPlatform>,
}

impl SessionMonitor {
    /// Stops polling, drops the message listener and removes the iframe.
    pub fn stop(self) {
        self.handle.abort();
        self.platform.remove_iframe();
    }

    /// Returns `true` once the monitor task has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl OidcClient {
    /// Starts the check-session monitor.
    ///
    /// `messages` delivers the message events received by the host window.
    /// Returns `None` when the provider has no check-session iframe or the
    /// feature is disabled.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `init_auth` has not succeeded or the
    /// issuer or redirect URI has no usable origin.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start_session_monitor(
        self: &Arc<Self>,
        messages: mpsc::Receiver<WindowMessage>,
    ) -> Result<Option<SessionMonitor>, OidcError> {
        let config = self.active_config()?;
        let Some(iframe) = config.check_session_iframe.clone() else {
            tracing::debug!("Provider has no check_session_iframe, session monitor not started");
            return Ok(None);
        };
        if config.disable_check_session {
            return Ok(None);
        }

        let issuer_origin = config.issuer_origin()?;
        let app_origin = config.redirect_origin()?;

        self.platform.mount_hidden_iframe(&iframe);
        tracing::debug!("Mounted check-session iframe {}", iframe);

        let client = Arc::clone(self);
        let handle = tokio::spawn(async move {
            client
                .monitor_session(config, issuer_origin, app_origin, messages)
                .await;
        });

        Ok(Some(SessionMonitor {
            handle,
            platform: Arc::clone(&self.platform),
        }))
    }

    async fn monitor_session(
        &self,
        config: AuthConfig,
        issuer_origin: String,
        app_origin: String,
        mut messages: mpsc::Receiver<WindowMessage>,
    ) {
        let period = config.check_session_iframe_timeout;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut polling = true;

        loop {
            tokio::select! {
                _ = ticker.tick(), if polling => {
                    self.post_session_check(&config, &issuer_origin);
                }
                message = messages.recv() => {
                    let Some(message) = message else {
                        tracing::debug!("Message channel closed, session monitor stopped");
                        break;
                    };

                    let status = (message.origin == issuer_origin)
                        .then(|| SessionStatus::parse(&message.data))
                        .flatten();

                    if let Some(status) = status {
                        polling &= self.on_session_status(status);
                    } else if message.origin == app_origin {
                        if let Err(e) = self.handle_silent_renew(&message.data).await {
                            tracing::warn!(error = %e, "Silent renew failed");
                        }
                    } else {
                        tracing::warn!(origin = %message.origin, "Ignoring message from unknown origin");
                    }
                }
            }
        }
    }

    fn post_session_check(&self, config: &AuthConfig, issuer_origin: &str) {
        let Some(session_state) = self.cache.get::<String>(CacheKey::SessionState) else {
            tracing::trace!("No session_state cached, skipping session check");
            return;
        };

        tracing::trace!("Posting session check to {}", issuer_origin);
        let message = format!("{} {}", config.client_id, session_state);
        self.platform.post_to_iframe(&message, issuer_origin);
    }

    /// Emits the event for a provider reply and returns whether polling continues.
    fn on_session_status(&self, status: SessionStatus) -> bool {
        let events = &self.events;
        match status {
            SessionStatus::Changed => {
                tracing::info!("Session changed on server");
                events.emit_event(Event::SessionChangedOnServer);
                false
            }
            SessionStatus::Unchanged => {
                tracing::trace!("Session unchanged on server");
                events.emit_event(Event::SessionUnchangedOnServer);
                true
            }
            SessionStatus::Error => {
                tracing::warn!("Session check failed on server");
                events.emit_event(Event::SessionErrorOnServer);
                false
            }
        }
    }

    /// Redeems the callback query carried by a silent-renew message.
    ///
    /// # Errors
    ///
    /// Returns the same errors as callback processing. The cached session is
    /// untouched on failure.
    pub async fn handle_silent_renew(&self, data: &str) -> Result<(), OidcError> {
        let config = self.active_config()?;
        let _guard = self.flow_lock.lock().await;

        let query = params::parse_query(data);
        self.check_state(&query)?;
        let code = authorization_code(&query)?;

        let (result, _) = self.redeem_code(&config, code).await?;
        self.store_tokens(&result, &query)?;
        self.events.emit_event(Event::TokensRefreshed);

        tracing::info!("Tokens renewed silently");
        Ok(())
    }
}
