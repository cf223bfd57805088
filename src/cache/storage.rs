//! The store registry, looked up by name.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use super::{CacheKey, CacheStore};
use crate::http::Response;

/// Registry of named stores.
///
/// Stores are created on first [`open`](Self::open) and kept in creation
/// order, which is the order [`keys`](Self::keys) reports.
/// Handles returned by `open` stay usable after the store is deleted from
/// the registry; they just stop being reachable by name.
#[derive(Debug, Default)]
pub struct CacheStorage {
    stores: RwLock<Vec<Arc<CacheStore>>>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the store called `name`, creating it if needed.
    pub async fn open(&self, name: &str) -> Arc<CacheStore> {
        if let Some(store) = self.get(name).await {
            return store;
        }

        let mut stores = self.stores.write().await;
        // Another task may have created it between the two locks.
        if let Some(store) = stores.iter().find(|s| s.name() == name) {
            return Arc::clone(store);
        }
        debug!(store = name, "creating cache store");
        let store = Arc::new(CacheStore::new(name));
        stores.push(Arc::clone(&store));
        store
    }

    /// Returns the store called `name` without creating it.
    pub async fn get(&self, name: &str) -> Option<Arc<CacheStore>> {
        self.stores
            .read()
            .await
            .iter()
            .find(|s| s.name() == name)
            .cloned()
    }

    pub async fn has(&self, name: &str) -> bool {
        self.get(name).await.is_some()
    }

    /// Drops the store called `name` and all its entries.
    ///
    /// Returns `true` if the store existed.
    pub async fn delete(&self, name: &str) -> bool {
        let mut stores = self.stores.write().await;
        let before = stores.len();
        stores.retain(|s| s.name() != name);
        stores.len() < before
    }

    /// Returns the names of all stores in creation order.
    pub async fn keys(&self) -> Vec<String> {
        self.stores
            .read()
            .await
            .iter()
            .map(|s| s.name().to_owned())
            .collect()
    }

    /// Looks `key` up in the stores called `names`, in that order, and
    /// returns the first hit. Names with no store are skipped.
    pub async fn match_any<S: AsRef<str>>(&self, names: &[S], key: &CacheKey) -> Option<Response> {
        for name in names {
            let Some(store) = self.get(name.as_ref()).await else {
                continue;
            };
            if let Some(hit) = store.match_key(key).await {
                return Some(hit);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StatusCode;

    #[tokio::test]
    async fn open_creates_once() {
        let storage = CacheStorage::new();
        let a = storage.open("photographer-portfolio-v1").await;
        let b = storage.open("photographer-portfolio-v1").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(storage.keys().await, vec!["photographer-portfolio-v1"]);
    }

    #[tokio::test]
    async fn keys_keep_creation_order() {
        let storage = CacheStorage::new();
        storage.open("b").await;
        storage.open("a").await;
        storage.open("c").await;
        assert_eq!(storage.keys().await, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn delete_removes_store_and_entries() {
        let storage = CacheStorage::new();
        let key = CacheKey::get("/index.html");
        storage
            .open("old")
            .await
            .put(key.clone(), Response::new(StatusCode::OK))
            .await
            .unwrap();

        assert!(storage.delete("old").await);
        assert!(!storage.has("old").await);
        assert!(storage.match_any(&["old"], &key).await.is_none());
        assert!(!storage.delete("old").await);

        let reopened = storage.open("old").await;
        assert!(reopened.is_empty().await);
    }

    #[tokio::test]
    async fn match_any_follows_given_order() {
        let storage = CacheStorage::new();
        let key = CacheKey::get("/script.js");
        storage
            .open("first")
            .await
            .put(key.clone(), Response::new(StatusCode::OK).body("first"))
            .await
            .unwrap();
        storage
            .open("second")
            .await
            .put(key.clone(), Response::new(StatusCode::OK).body("second"))
            .await
            .unwrap();

        let hit = storage.match_any(&["missing", "second", "first"], &key).await.unwrap();
        assert_eq!(hit.body_bytes().as_ref(), b"second");
        assert!(storage.match_any(&["missing"], &key).await.is_none());
    }
}
