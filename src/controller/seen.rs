//! Last applied resource version per object

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Thread-safe map from object key to the last resource version applied
///
/// Only consulted when `unique_apply_for_resource_version` is enabled. Entries
/// are not persisted; after a restart they repopulate as events arrive.
#[derive(Clone, Default)]
pub struct SeenVersions {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl SeenVersions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, key: &str) -> Option<String> {
        let seen = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        seen.get(key).cloned()
    }

    pub fn store(&self, key: String, resource_version: String) {
        let mut seen = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        seen.insert(key, resource_version);
    }

    pub fn delete(&self, key: &str) {
        let mut seen = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        seen.remove(key);
    }

    /// True unless `resource_version` is exactly the one last stored for `key`
    pub fn is_new(&self, key: &str, resource_version: &str) -> bool {
        self.load(key).as_deref() != Some(resource_version)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
