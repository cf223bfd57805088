//! A single named store of captured responses.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::RwLock;

use super::CacheKey;
use crate::http::{Method, Response};

/// Errors returned by store writes.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("responses to {0} requests cannot be stored")]
    UnsupportedMethod(Method),
}

/// A single named store of request → response entries.
///
/// Every operation is one atomic call under the store's lock. Concurrent
/// writers to the same key race and the last write wins.
///
/// # Examples
///
/// ```
/// use folio_cache::cache::{CacheKey, CacheStore};
/// use folio_cache::http::{Response, StatusCode};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = CacheStore::new("assets-cache-v1");
/// let key = CacheKey::get("/assets/hero-image.jpg");
/// store.put(key.clone(), Response::new(StatusCode::OK).body("jpeg")).await.unwrap();
///
/// let hit = store.match_key(&key).await.unwrap();
/// assert_eq!(hit.body_bytes().as_ref(), b"jpeg");
/// # }
/// ```
#[derive(Debug)]
pub struct CacheStore {
    name: String,
    entries: RwLock<HashMap<CacheKey, Response>>,
}

impl CacheStore {
    /// Creates an empty store.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the store's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a copy of the response stored under `key`, if any.
    ///
    /// A miss is a valid result, not an error.
    pub async fn match_key(&self, key: &CacheKey) -> Option<Response> {
        self.entries.read().await.get(key).cloned()
    }

    /// Stores `response` under `key`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// [`CacheError::UnsupportedMethod`] when the key's method is not `GET`.
    pub async fn put(&self, key: CacheKey, response: Response) -> Result<(), CacheError> {
        if !key.method().is_cacheable() {
            return Err(CacheError::UnsupportedMethod(key.method().clone()));
        }
        self.entries.write().await.insert(key, response);
        Ok(())
    }

    /// Removes the entry under `key`. Returns `true` if one existed.
    pub async fn delete(&self, key: &CacheKey) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    /// Returns every key currently stored, in no particular order.
    pub async fn keys(&self) -> Vec<CacheKey> {
        self.entries.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Request, StatusCode};

    #[tokio::test]
    async fn put_then_match_returns_same_status_and_body() {
        let store = CacheStore::new("api-cache-v1");
        let key = CacheKey::get("/api/photos?category=all");
        let response = Response::new(StatusCode::OK)
            .header("Content-Type", "application/json")
            .body(r#"{"photos":[]}"#);

        store.put(key.clone(), response.clone()).await.unwrap();

        let hit = store.match_key(&key).await.unwrap();
        assert_eq!(hit.status(), response.status());
        assert_eq!(hit.body_bytes(), response.body_bytes());
    }

    #[tokio::test]
    async fn miss_is_none() {
        let store = CacheStore::new("s");
        assert!(store.match_key(&CacheKey::get("/nope")).await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn last_write_wins() {
        let store = CacheStore::new("s");
        let key = CacheKey::get("/styles.css");
        store
            .put(key.clone(), Response::new(StatusCode::OK).body("old"))
            .await
            .unwrap();
        store
            .put(key.clone(), Response::new(StatusCode::OK).body("new"))
            .await
            .unwrap();
        assert_eq!(store.len().await, 1);
        let hit = store.match_key(&key).await.unwrap();
        assert_eq!(hit.body_bytes().as_ref(), b"new");
    }

    #[tokio::test]
    async fn non_get_keys_are_rejected() {
        let store = CacheStore::new("s");
        let key = CacheKey::from_request(&Request::new(Method::Post, "/api/auth"));
        let err = store
            .put(key, Response::new(StatusCode::OK))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::UnsupportedMethod(Method::Post)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn delete_entry() {
        let store = CacheStore::new("s");
        let key = CacheKey::get("/a");
        store.put(key.clone(), Response::default()).await.unwrap();
        assert!(store.delete(&key).await);
        assert!(!store.delete(&key).await);
        assert!(store.keys().await.is_empty());
    }
}
