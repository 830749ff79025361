//! Generic transactional keyed store.
//!
//! The persistence engine is a collaborator at this boundary: the core only
//! requires `get`, `upsert`, `delete_by_key`, and `list_all`, with the
//! guarantee that a single logical write executes atomically. [`MemoryStore`]
//! is the in-process realization backed by a `tokio::sync::RwLock`; holding
//! the write guard across the replace makes upserts atomic with respect to
//! every reader, so no caller observes zero or two rows for a key.

use std::collections::HashMap;
use std::hash::Hash;

use async_trait::async_trait;
use tokio::sync::RwLock;

#[async_trait]
pub trait KeyedStore<K, V>: Send + Sync
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Option<V>;

    /// Atomically replace any existing row for `key` with `value`.
    async fn upsert(&self, key: K, value: V);

    /// Delete the row for `key`, returning whether one existed.
    async fn delete_by_key(&self, key: &K) -> bool;

    async fn list_all(&self) -> Vec<V>;
}

/// In-memory keyed store.
#[derive(Debug, Default)]
pub struct MemoryStore<K, V> {
    rows: RwLock<HashMap<K, V>>,
}

impl<K, V> MemoryStore<K, V> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<K, V> KeyedStore<K, V> for MemoryStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Option<V> {
        self.rows.read().await.get(key).cloned()
    }

    async fn upsert(&self, key: K, value: V) {
        let mut rows = self.rows.write().await;
        rows.remove(&key);
        rows.insert(key, value);
    }

    async fn delete_by_key(&self, key: &K) -> bool {
        self.rows.write().await.remove(key).is_some()
    }

    async fn list_all(&self) -> Vec<V> {
        self.rows.read().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_replaces_existing_row() {
        let store: MemoryStore<String, u32> = MemoryStore::new();
        store.upsert("a".to_string(), 1).await;
        store.upsert("a".to_string(), 2).await;

        assert_eq!(store.get(&"a".to_string()).await, Some(2));
        assert_eq!(store.list_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let store: MemoryStore<String, u32> = MemoryStore::new();
        store.upsert("a".to_string(), 1).await;

        assert!(store.delete_by_key(&"a".to_string()).await);
        assert!(!store.delete_by_key(&"a".to_string()).await);
        assert!(store.get(&"a".to_string()).await.is_none());
    }

    #[tokio::test]
    async fn test_list_all_returns_every_row() {
        let store: MemoryStore<u32, u32> = MemoryStore::new();
        for i in 0..5 {
            store.upsert(i, i * 10).await;
        }
        let mut values = store.list_all().await;
        values.sort_unstable();
        assert_eq!(values, vec![0, 10, 20, 30, 40]);
    }
}
