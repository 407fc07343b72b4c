//! In-memory storage medium.

use std::collections::HashMap;
use std::sync::RwLock;

use super::StorageMedium;

/// A [`StorageMedium`] backed by a `HashMap`, for headless hosts and tests.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    items: RwLock<HashMap<String, String>>,
}

impl InMemoryStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageMedium for InMemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.read().ok()?.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: String) {
        if let Ok(mut items) = self.items.write() {
            items.insert(key.to_string(), value);
        }
    }

    fn remove_item(&self, key: &str) {
        if let Ok(mut items) = self.items.write() {
            items.remove(key);
        }
    }

    fn clear(&self) {
        if let Ok(mut items) = self.items.write() {
            items.clear();
        }
    }
}
