//! The offline cache worker.
//!
//! [`ServiceWorker`] owns nothing global: it is handed a [`CacheStorage`]
//! registry and a [`Fetcher`] and drives them through three phases.
//!
//! 1. [`install`](ServiceWorker::install) — precache the manifest into the
//!    current generation's primary store, each entry best effort.
//! 2. [`activate`](ServiceWorker::activate) — delete every store that does
//!    not belong to the current generation.
//! 3. [`handle_fetch`](ServiceWorker::handle_fetch) — route each intercepted
//!    request to exactly one strategy (see [`crate::router`]).

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::background::Revalidation;
use crate::cache::{CacheKey, CacheStorage, Generation, StoreRole};
use crate::config::CacheConfig;
use crate::fetch::{FetchError, Fetcher};
use crate::http::{Request, Response};
use crate::router::{CacheRouter, Strategy};

mod strategy;

/// Errors surfaced to whoever issued the intercepted request.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("network request failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("background fetch ended without delivering a response")]
    BackgroundFetchLost,

    #[error("cannot activate while {0}; install first")]
    NotInstalled(LifecycleState),
}

/// Where the worker is in its install/activate lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
        })
    }
}

/// Where a returned response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    Placeholder,
}

impl ResponseSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Cache => "hit",
            Self::Placeholder => "placeholder",
        }
    }
}

/// The answer to one intercepted request.
#[derive(Debug)]
pub struct FetchOutcome {
    pub response: Response,
    pub strategy: Strategy,
    pub source: ResponseSource,
    /// Background store refresh started by stale-while-revalidate.
    pub revalidation: Option<Revalidation>,
}

impl FetchOutcome {
    fn new(response: Response, strategy: Strategy, source: ResponseSource) -> Self {
        Self {
            response,
            strategy,
            source,
            revalidation: None,
        }
    }

    fn revalidating(mut self, revalidation: Revalidation) -> Self {
        self.revalidation = Some(revalidation);
        self
    }
}

/// Result of precaching the manifest.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Manifest paths now present in the primary store, in manifest order.
    pub cached: Vec<String>,
    /// Manifest paths that failed to fetch or came back non-2xx, in manifest order.
    pub failed: Vec<String>,
}

/// Offline cache worker sitting between the page and the network.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use folio_cache::cache::CacheStorage;
/// use folio_cache::config::CacheConfig;
/// use folio_cache::http::{Request, Response, StatusCode};
/// use folio_cache::testing::StubNetwork;
/// use folio_cache::worker::{ResponseSource, ServiceWorker};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let network = Arc::new(StubNetwork::new());
/// network.respond("/api/photos?category=all", Response::new(StatusCode::OK).body(r#"{"photos":[]}"#));
///
/// let worker = ServiceWorker::new(Arc::new(CacheStorage::new()), network.clone(), &CacheConfig::default());
/// let live = worker.handle_fetch(Request::get("/api/photos?category=all")).await.unwrap();
/// assert_eq!(live.source, ResponseSource::Network);
///
/// network.set_online(false);
/// let offline = worker.handle_fetch(Request::get("/api/photos?category=all")).await.unwrap();
/// assert_eq!(offline.source, ResponseSource::Cache);
/// assert_eq!(offline.response.body_bytes(), live.response.body_bytes());
/// # }
/// ```
pub struct ServiceWorker {
    storage: Arc<CacheStorage>,
    network: Arc<dyn Fetcher>,
    router: CacheRouter,
    generation: Generation,
    precache: Vec<String>,
    placeholder: CacheKey,
    state: watch::Sender<LifecycleState>,
}

impl fmt::Debug for ServiceWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("generation", &self.generation)
            .field("router", &self.router)
            .field("precache", &self.precache.len())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ServiceWorker {
    /// Creates a worker in the [`LifecycleState::Parsed`] state.
    pub fn new(storage: Arc<CacheStorage>, network: Arc<dyn Fetcher>, config: &CacheConfig) -> Self {
        let (state, _) = watch::channel(LifecycleState::Parsed);
        Self {
            storage,
            network,
            router: CacheRouter::new(config.network_first_prefixes.iter().cloned()),
            generation: Generation::new(config.generation.clone()),
            precache: config.precache.clone(),
            placeholder: CacheKey::get(&config.placeholder),
            state,
        }
    }

    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    pub fn storage(&self) -> &Arc<CacheStorage> {
        &self.storage
    }

    pub fn router(&self) -> &CacheRouter {
        &self.router
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Subscribes to lifecycle state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Precaches the manifest into the current primary store.
    ///
    /// Entries are fetched concurrently and independently: a failed fetch or
    /// non-2xx response is logged and skipped, never aborting the rest.
    pub async fn install(&self) -> InstallReport {
        self.state.send_replace(LifecycleState::Installing);

        let store = self
            .storage
            .open(&self.generation.store_name(StoreRole::Primary))
            .await;
        info!(
            generation = %self.generation,
            store = store.name(),
            entries = self.precache.len(),
            "installing precache manifest"
        );

        let mut fetches = JoinSet::new();
        for (index, path) in self.precache.iter().enumerate() {
            let network = Arc::clone(&self.network);
            let request = Request::get(path.as_str());
            fetches.spawn(async move { (index, network.fetch(request).await) });
        }

        let mut results: Vec<Option<Result<Response, FetchError>>> =
            self.precache.iter().map(|_| None).collect();
        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => error!(error = %e, "precache task failed"),
            }
        }

        let mut report = InstallReport::default();
        for (path, result) in self.precache.iter().zip(results) {
            match result {
                Some(Ok(response)) if response.is_ok() => {
                    match store.put(CacheKey::get(path), response).await {
                        Ok(()) => report.cached.push(path.clone()),
                        Err(e) => {
                            warn!(path = %path, error = %e, "precache entry not stored");
                            report.failed.push(path.clone());
                        }
                    }
                }
                Some(Ok(response)) => {
                    warn!(
                        path = %path,
                        status = response.status().as_u16(),
                        "precache entry not stored: non-success status"
                    );
                    report.failed.push(path.clone());
                }
                Some(Err(e)) => {
                    warn!(path = %path, error = %e, "precache fetch failed");
                    report.failed.push(path.clone());
                }
                // The fetch task panicked.
                None => report.failed.push(path.clone()),
            }
        }

        self.state.send_replace(LifecycleState::Installed);
        info!(
            generation = %self.generation,
            cached = report.cached.len(),
            failed = report.failed.len(),
            "install complete"
        );
        report
    }

    /// Deletes every store that is not one of the current generation's
    /// primary, API, or asset stores. Returns the deleted store names.
    ///
    /// # Errors
    ///
    /// [`WorkerError::NotInstalled`] unless the worker is installed or already active.
    pub async fn activate(&self) -> Result<Vec<String>, WorkerError> {
        let current = self.state();
        if !matches!(current, LifecycleState::Installed | LifecycleState::Activated) {
            return Err(WorkerError::NotInstalled(current));
        }
        self.state.send_replace(LifecycleState::Activating);

        let mut deleted = Vec::new();
        for name in self.storage.keys().await {
            if self.generation.is_current(&name) {
                debug!(store = %name, "keeping current store");
                continue;
            }
            if self.storage.delete(&name).await {
                info!(store = %name, "deleted stale cache store");
                deleted.push(name);
            }
        }

        self.state.send_replace(LifecycleState::Activated);
        info!(
            generation = %self.generation,
            deleted = deleted.len(),
            "activation complete"
        );
        Ok(deleted)
    }

    /// Resolves one intercepted request with the strategy its class selects.
    ///
    /// # Errors
    ///
    /// [`WorkerError::Fetch`] when the network fails and neither a store entry
    /// nor (for images) the placeholder can stand in.
    pub async fn handle_fetch(&self, request: Request) -> Result<FetchOutcome, WorkerError> {
        let class = self.router.classify(&request);
        let strategy = class.strategy();
        debug!(
            method = %request.method(),
            url = request.target(),
            class = ?class,
            strategy = %strategy,
            "routing request"
        );

        match strategy {
            Strategy::NetworkFirst => self.network_first(request).await,
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
        }
    }
}
