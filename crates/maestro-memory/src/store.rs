use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use maestro_core::error::{MaestroError, Result};
use maestro_core::traits::MemoryWriter;
use maestro_core::types::{MemorySnapshot, MemoryView};

/// Namespaced key-value memory shared by the agents of one run.
///
/// Reads and writes go through policy-scoped handles: agents see only the
/// namespaces their declaration allows, flattened into a [`MemoryView`], and
/// write to at most one namespace.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    namespaces: MemorySnapshot,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-seeded with the given namespaces.
    pub fn from_snapshot(snapshot: MemorySnapshot) -> Self {
        Self {
            namespaces: snapshot,
        }
    }

    /// Store one key. The namespace is created on first write.
    pub fn put(&mut self, namespace: &str, key: impl Into<String>, value: serde_json::Value) {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.into(), value);
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<&serde_json::Value> {
        self.namespaces.get(namespace)?.get(key)
    }

    /// Shallow-merge a payload into a namespace. Top-level keys overwrite
    /// existing entries; nested values are replaced wholesale, never merged.
    pub fn merge_payload(
        &mut self,
        namespace: &str,
        payload: &serde_json::Map<String, serde_json::Value>,
    ) {
        let ns = self.namespaces.entry(namespace.to_string()).or_default();
        for (key, value) in payload {
            ns.insert(key.clone(), value.clone());
        }
        debug!(
            namespace = %namespace,
            keys = payload.len(),
            "Merged payload into memory"
        );
    }

    /// Flatten the listed namespaces into a read view keyed `namespace.key`.
    /// Namespaces outside the list are invisible; listed namespaces that do
    /// not exist contribute nothing.
    pub fn view(&self, read_from: &[String]) -> MemoryView {
        let mut entries = BTreeMap::new();
        for namespace in read_from {
            if let Some(ns) = self.namespaces.get(namespace) {
                for (key, value) in ns {
                    entries.insert(format!("{}.{}", namespace, key), value.clone());
                }
            }
        }
        MemoryView::new(entries)
    }

    /// Copy of the full store contents.
    pub fn snapshot(&self) -> MemorySnapshot {
        self.namespaces.clone()
    }

    /// Names of all namespaces currently present.
    pub fn namespaces(&self) -> Vec<String> {
        self.namespaces.keys().cloned().collect()
    }
}

/// Shared handle used by the engine and namespace writers.
pub type SharedMemory = Arc<Mutex<MemoryStore>>;

/// Build a shared store from seeded namespaces.
pub fn shared(snapshot: MemorySnapshot) -> SharedMemory {
    Arc::new(Mutex::new(MemoryStore::from_snapshot(snapshot)))
}

/// Write handle scoped to a single namespace, handed to agents whose policy
/// declares a `write_to` target.
pub struct NamespaceWriter {
    store: SharedMemory,
    namespace: String,
}

impl NamespaceWriter {
    pub fn new(store: SharedMemory, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }
}

impl MemoryWriter for NamespaceWriter {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let mut store = self
            .store
            .lock()
            .map_err(|e| MaestroError::Memory(e.to_string()))?;
        store.put(&self.namespace, key, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_creates_namespace() {
        let mut store = MemoryStore::new();
        assert!(store.get("research", "topic").is_none());

        store.put("research", "topic", json!("rust"));
        assert_eq!(store.get("research", "topic"), Some(&json!("rust")));
        assert_eq!(store.namespaces(), vec!["research".to_string()]);
    }

    #[test]
    fn test_merge_payload_overwrites_top_level_keys() {
        let mut store = MemoryStore::new();
        store.put("results", "count", json!(1));
        store.put("results", "nested", json!({"a": 1, "b": 2}));

        let mut payload = serde_json::Map::new();
        payload.insert("count".into(), json!(2));
        payload.insert("nested".into(), json!({"a": 9}));
        store.merge_payload("results", &payload);

        assert_eq!(store.get("results", "count"), Some(&json!(2)));
        // Nested values are replaced, not deep-merged.
        assert_eq!(store.get("results", "nested"), Some(&json!({"a": 9})));
    }

    #[test]
    fn test_view_flattens_allowed_namespaces() {
        let mut store = MemoryStore::new();
        store.put("research", "topic", json!("rust"));
        store.put("results", "count", json!(3));
        store.put("secrets", "token", json!("hidden"));

        let view = store.view(&["research".into(), "results".into()]);
        assert_eq!(view.get("research.topic"), Some(&json!("rust")));
        assert_eq!(view.get("results.count"), Some(&json!(3)));
        assert!(view.get("secrets.token").is_none());
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn test_view_of_missing_namespace_is_empty() {
        let store = MemoryStore::new();
        let view = store.view(&["nowhere".into()]);
        assert!(view.is_empty());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut store = MemoryStore::new();
        store.put("a", "k", json!(1));
        let snapshot = store.snapshot();

        store.put("a", "k", json!(2));
        assert_eq!(snapshot["a"]["k"], json!(1));
    }

    #[test]
    fn test_namespace_writer_puts_through_shared_handle() {
        let memory = shared(MemorySnapshot::new());
        let writer = NamespaceWriter::new(Arc::clone(&memory), "results");

        assert_eq!(writer.namespace(), "results");
        writer.put("status", json!("done")).unwrap();

        let store = memory.lock().unwrap();
        assert_eq!(store.get("results", "status"), Some(&json!("done")));
    }
}
