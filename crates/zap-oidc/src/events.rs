//! Authentication state and lifecycle events.
//!
//! [`AuthStateStore`] holds the current [`AuthenticationState`] and at most one
//! handler of each kind. Handlers run synchronously inside the call that
//! triggers them and must not block; a handler that needs to do async work
//! should hand the notification off to a channel.

use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

/// Where the session stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticationState {
    /// No valid session.
    #[default]
    Unauthenticated,
    /// A login redirect or callback is in progress.
    Authenticating,
    /// A validated ID token is cached.
    Authenticated,
}

impl fmt::Display for AuthenticationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
        };
        f.write_str(s)
    }
}

/// Lifecycle notifications. Carry no payload; subscribers read current data
/// back from the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    /// A login redirect is about to happen.
    AuthStarted,
    /// The discovery document was fetched and cached.
    DiscoveryDocumentLoaded,
    /// The key set was fetched and cached.
    JwksLoaded,
    /// A callback was processed and the session is authenticated.
    AuthComplete,
    /// New tokens replaced the cached ones.
    TokensRefreshed,
    /// The provider reported a changed session.
    SessionChangedOnServer,
    /// The provider reported an unchanged session.
    SessionUnchangedOnServer,
    /// The provider could not check the session.
    SessionErrorOnServer,
    /// The local session was discarded.
    Logout,
}

type StateHandler = Arc<dyn Fn(AuthenticationState) + Send + Sync>;
type EventHandler = Arc<dyn Fn(Event) + Send + Sync>;

/// Event bus and single owner of the [`AuthenticationState`].
#[derive(Default)]
pub struct AuthStateStore {
    state: Mutex<AuthenticationState>,
    on_state_change: RwLock<Option<StateHandler>>,
    on_event: RwLock<Option<EventHandler>>,
}

impl fmt::Debug for AuthStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthStateStore")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl AuthStateStore {
    /// Creates a store in the `Unauthenticated` state without handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> AuthenticationState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or_default()
    }

    /// Transitions to `state` and notifies the state handler.
    ///
    /// Any transition is accepted, including to the current state.
    pub fn set_auth_state(&self, state: AuthenticationState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
        tracing::debug!(%state, "Authentication state changed");

        // Called outside the slot lock so a handler may re-register.
        let handler = self
            .on_state_change
            .read()
            .ok()
            .and_then(|slot| slot.clone());
        if let Some(handler) = handler {
            handler(state);
        }
    }

    /// Notifies the event handler.
    pub fn emit_event(&self, event: Event) {
        tracing::debug!(?event, "Emitting event");

        let handler = self.on_event.read().ok().and_then(|slot| slot.clone());
        if let Some(handler) = handler {
            handler(event);
        }
    }

    /// Registers the state handler, replacing any previous one.
    pub fn on_state_change(&self, handler: impl Fn(AuthenticationState) + Send + Sync + 'static) {
        if let Ok(mut slot) = self.on_state_change.write() {
            *slot = Some(Arc::new(handler));
        }
    }

    /// Registers the event handler, replacing any previous one.
    pub fn on_event(&self, handler: impl Fn(Event) + Send + Sync + 'static) {
        if let Ok(mut slot) = self.on_event.write() {
            *slot = Some(Arc::new(handler));
        }
    }
}
