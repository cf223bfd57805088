//! The three caching strategies.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::{FetchOutcome, ResponseSource, ServiceWorker, WorkerError};
use crate::background::Revalidation;
use crate::cache::{CacheKey, StoreRole};
use crate::http::{Destination, Request, Response};
use crate::router::Strategy;

impl ServiceWorker {
    /// Network first, falling back to the stores when the fetch rejects.
    ///
    /// A 2xx `GET` response is written to the API store before it is returned.
    pub(super) async fn network_first(&self, request: Request) -> Result<FetchOutcome, WorkerError> {
        let strategy = Strategy::NetworkFirst;
        let cacheable = request.method().is_cacheable();
        let key = CacheKey::from_request(&request);

        match self.network.fetch(request).await {
            Ok(response) => {
                if cacheable && response.is_ok() {
                    self.store(StoreRole::Api, key, response.clone()).await;
                }
                Ok(FetchOutcome::new(response, strategy, ResponseSource::Network))
            }
            Err(err) => {
                if cacheable {
                    if let Some(hit) = self.lookup(StoreRole::Api, &key).await {
                        debug!(key = %key, error = %err, "network failed, serving cached response");
                        return Ok(FetchOutcome::new(hit, strategy, ResponseSource::Cache));
                    }
                }
                warn!(key = %key, error = %err, "network failed with nothing cached");
                Err(err.into())
            }
        }
    }

    /// Cache first; on a miss, fetch and keep a copy in the asset store.
    ///
    /// A failed image fetch is answered with the placeholder image when the
    /// primary store holds one.
    pub(super) async fn cache_first(&self, request: Request) -> Result<FetchOutcome, WorkerError> {
        let strategy = Strategy::CacheFirst;
        let cacheable = request.method().is_cacheable();
        let key = CacheKey::from_request(&request);

        if cacheable {
            if let Some(hit) = self.lookup(StoreRole::Asset, &key).await {
                debug!(key = %key, "cache hit");
                return Ok(FetchOutcome::new(hit, strategy, ResponseSource::Cache));
            }
        }

        let destination = request.destination();
        match self.network.fetch(request).await {
            Ok(response) => {
                if cacheable && response.is_ok() {
                    self.store(StoreRole::Asset, key, response.clone()).await;
                }
                Ok(FetchOutcome::new(response, strategy, ResponseSource::Network))
            }
            Err(err) => {
                if destination == Destination::Image {
                    if let Some(placeholder) = self.placeholder().await {
                        debug!(key = %key, error = %err, "image unavailable, serving placeholder");
                        return Ok(FetchOutcome::new(
                            placeholder,
                            strategy,
                            ResponseSource::Placeholder,
                        ));
                    }
                }
                warn!(key = %key, error = %err, "network failed with nothing cached");
                Err(err.into())
            }
        }
    }

    /// Answer from the primary store immediately while a detached task
    /// refreshes it from the network.
    ///
    /// On a miss the caller waits for the network response, which is handed
    /// over before the store write happens.
    pub(super) async fn stale_while_revalidate(
        &self,
        request: Request,
    ) -> Result<FetchOutcome, WorkerError> {
        let strategy = Strategy::StaleWhileRevalidate;
        let cacheable = request.method().is_cacheable();
        let key = CacheKey::from_request(&request);

        let cached = if cacheable {
            self.lookup(StoreRole::Primary, &key).await
        } else {
            None
        };

        let (tx, rx) = oneshot::channel();
        let network = Arc::clone(&self.network);
        let storage = Arc::clone(&self.storage);
        let store_name = self.generation.store_name(StoreRole::Primary);
        let task_key = key.clone();

        let revalidation = Revalidation::spawn(async move {
            let response = match network.fetch(request).await {
                Ok(response) => response,
                Err(err) => {
                    debug!(key = %task_key, error = %err, "revalidation fetch failed");
                    let _ = tx.send(Err(err));
                    return false;
                }
            };

            let fresh = (cacheable && response.is_ok()).then(|| response.clone());
            // The caller may have been answered from the store already.
            let _ = tx.send(Ok(response));

            let Some(fresh) = fresh else {
                return false;
            };
            match storage.open(&store_name).await.put(task_key.clone(), fresh).await {
                Ok(()) => {
                    debug!(key = %task_key, store = %store_name, "revalidated");
                    true
                }
                Err(e) => {
                    warn!(key = %task_key, error = %e, "revalidated response not stored");
                    false
                }
            }
        });

        if let Some(hit) = cached {
            debug!(key = %key, "serving stale entry while revalidating");
            return Ok(FetchOutcome::new(hit, strategy, ResponseSource::Cache)
                .revalidating(revalidation));
        }

        let response = rx.await.map_err(|_| WorkerError::BackgroundFetchLost)??;
        Ok(FetchOutcome::new(response, strategy, ResponseSource::Network).revalidating(revalidation))
    }

    /// Looks `key` up in the current store for `role`, then in the other
    /// current-generation stores.
    async fn lookup(&self, role: StoreRole, key: &CacheKey) -> Option<Response> {
        let designated = self.generation.store_name(role);
        let current = self.generation.store_names();
        let order: Vec<&str> = std::iter::once(designated.as_str())
            .chain(
                current
                    .iter()
                    .map(String::as_str)
                    .filter(|name| *name != designated),
            )
            .collect();
        self.storage.match_any(order.as_slice(), key).await
    }

    async fn store(&self, role: StoreRole, key: CacheKey, response: Response) {
        let store = self.storage.open(&self.generation.store_name(role)).await;
        if let Err(e) = store.put(key, response).await {
            warn!(store = store.name(), error = %e, "response not stored");
        }
    }

    async fn placeholder(&self) -> Option<Response> {
        let primary = self
            .storage
            .get(&self.generation.store_name(StoreRole::Primary))
            .await?;
        primary.match_key(&self.placeholder).await
    }
}
