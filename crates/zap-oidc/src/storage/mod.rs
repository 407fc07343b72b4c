//! Namespaced session cache.
//!
//! All flow state lives inside a single JSON object stored under one opaque
//! root key of the host's key/value medium. Every operation reads the whole
//! object, mutates one field and writes it back, so no other key of the medium
//! is ever touched and [`StorageCache::clear`] discards the whole session at
//! once.
//!
//! The cache performs no locking. Writers are serialized by the flow guard of
//! [`OidcClient`](crate::client::OidcClient).

pub mod memory;

use std::sync::Arc;

use jsonwebtoken::jwk::JwkSet;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::discovery::DiscoveryDocument;
use crate::types::{AuthResult, FlowState};

pub use memory::InMemoryStorage;

/// Key of the root entry in the storage medium.
pub const ROOT_KEY: &str = "HW*!p!5Ie%VmHLf%935P4NisfE9";

/// Key/value storage contract provided by the host (e.g. `localStorage`).
pub trait StorageMedium: Send + Sync {
    /// Returns the value stored under `key`.
    fn get_item(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`.
    fn set_item(&self, key: &str, value: String);

    /// Removes `key`.
    fn remove_item(&self, key: &str);

    /// Removes every key.
    fn clear(&self);
}

/// Fields of the cache object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// The `state` parameter of the pending login.
    State,
    /// The [`FlowState`] of the pending or current session.
    AppState,
    /// The current [`AuthResult`].
    AuthResult,
    /// The provider's [`DiscoveryDocument`].
    DiscoveryDocument,
    /// The provider's key set.
    Jwks,
    /// The `session_state` returned with the last callback.
    SessionState,
}

impl CacheKey {
    /// Field name inside the root object.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::State => "state",
            Self::AppState => "appState",
            Self::AuthResult => "authResult",
            Self::DiscoveryDocument => "discoveryDocument",
            Self::Jwks => "jwks",
            Self::SessionState => "session_state",
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed view of the whole cache object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    /// Pending `state` parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Flow state of the current login attempt or session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_state: Option<FlowState>,

    /// Current tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_result: Option<AuthResult>,

    /// Cached discovery document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_document: Option<DiscoveryDocument>,

    /// Cached key set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks: Option<JwkSet>,

    /// Provider session state.
    #[serde(
        rename = "session_state",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub session_state: Option<String>,
}

/// Cache errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A value could not be serialized into the cache object.
    #[error("Failed to serialize cache entry {key}: {source}")]
    Serialize {
        /// The entry being written.
        key: CacheKey,
        /// The serializer error.
        #[source]
        source: serde_json::Error,
    },
}

/// Namespaced wrapper over a [`StorageMedium`].
#[derive(Clone)]
pub struct StorageCache {
    medium: Arc<dyn StorageMedium>,
}

impl std::fmt::Debug for StorageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageCache").finish_non_exhaustive()
    }
}

impl StorageCache {
    /// Wraps a storage medium.
    #[must_use]
    pub fn new(medium: Arc<dyn StorageMedium>) -> Self {
        Self { medium }
    }

    /// Reads a single field. Missing or undecodable fields yield `None`.
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: CacheKey) -> Option<T> {
        let mut root = self.read_root()?;
        let value = root.remove(key.as_str())?;
        match serde_json::from_value(value) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Ignoring undecodable cache entry");
                None
            }
        }
    }

    /// Reads the whole cache object, or `None` if nothing is stored.
    #[must_use]
    pub fn get_all(&self) -> Option<CacheSnapshot> {
        let root = self.read_root()?;
        match serde_json::from_value(Value::Object(root)) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring undecodable cache object");
                None
            }
        }
    }

    /// Writes a single field, leaving the others intact.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Serialize` if `value` cannot be represented as JSON.
    pub fn set<T: Serialize + ?Sized>(&self, key: CacheKey, value: &T) -> Result<(), CacheError> {
        let value =
            serde_json::to_value(value).map_err(|source| CacheError::Serialize { key, source })?;
        let mut root = self.read_root().unwrap_or_default();
        root.insert(key.as_str().to_string(), value);
        self.write_root(&root);
        Ok(())
    }

    /// Removes a single field.
    pub fn remove(&self, key: CacheKey) {
        if let Some(mut root) = self.read_root()
            && root.remove(key.as_str()).is_some()
        {
            self.write_root(&root);
        }
    }

    /// Removes the root entry and with it the whole session.
    pub fn clear(&self) {
        self.medium.remove_item(ROOT_KEY);
    }

    fn read_root(&self) -> Option<Map<String, Value>> {
        let raw = self.medium.get_item(ROOT_KEY)?;
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Some(map),
            Ok(_) => {
                tracing::warn!("Cache root is not an object, treating as empty");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cache root is corrupt, treating as empty");
                None
            }
        }
    }

    fn write_root(&self, root: &Map<String, Value>) {
        // A map of JSON values always serializes.
        let raw = Value::Object(root.clone()).to_string();
        self.medium.set_item(ROOT_KEY, raw);
    }
}
