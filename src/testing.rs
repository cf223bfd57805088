//! Test doubles for the network seam.
//!
//! [`StubNetwork`] is an in-memory [`Fetcher`] with scripted responses, an
//! online/offline switch, a gate that holds fetches pending, and a call log.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::cache::CacheKey;
use crate::fetch::{FetchError, FetchFuture, Fetcher};
use crate::http::{Request, Response, StatusCode};

/// Scriptable fake network.
///
/// Unknown URLs answer `404 Not Found`. While offline every fetch rejects
/// with [`FetchError::Offline`]. While [paused](Self::pause) every fetch
/// stays pending until [`resume`](Self::resume).
///
/// # Examples
///
/// ```
/// use folio_cache::fetch::Fetcher;
/// use folio_cache::http::{Request, Response, StatusCode};
/// use folio_cache::testing::StubNetwork;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let network = StubNetwork::new();
/// network.respond("/styles.css", Response::new(StatusCode::OK).body("body{}"));
///
/// let res = network.fetch(Request::get("./styles.css")).await.unwrap();
/// assert_eq!(res.body_bytes().as_ref(), b"body{}");
/// assert_eq!(network.calls(), 1);
///
/// network.set_online(false);
/// assert!(network.fetch(Request::get("/styles.css")).await.is_err());
/// # }
/// ```
#[derive(Debug)]
pub struct StubNetwork {
    routes: Mutex<HashMap<String, Response>>,
    log: Mutex<Vec<CacheKey>>,
    online: AtomicBool,
    gate: watch::Sender<bool>,
}

impl Default for StubNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl StubNetwork {
    /// Creates an online network with no scripted responses.
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            routes: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            online: AtomicBool::new(true),
            gate,
        }
    }

    /// Scripts the response for `GET url` (and any method on the same URL).
    pub fn respond(&self, url: &str, response: Response) {
        let key = CacheKey::get(url);
        lock(&self.routes).insert(key.url().to_owned(), response);
    }

    /// Switches the network on or off.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Holds every fetch, including ones already in flight, until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.gate.send_replace(false);
    }

    /// Releases held fetches.
    pub fn resume(&self) {
        self.gate.send_replace(true);
    }

    /// Returns how many fetches were issued.
    pub fn calls(&self) -> usize {
        lock(&self.log).len()
    }

    /// Returns how many fetches were issued for `url`, any method.
    pub fn calls_to(&self, url: &str) -> usize {
        let wanted = CacheKey::get(url);
        lock(&self.log)
            .iter()
            .filter(|key| key.url() == wanted.url())
            .count()
    }

    async fn answer(&self, request: Request) -> Result<Response, FetchError> {
        let key = CacheKey::from_request(&request);
        lock(&self.log).push(key.clone());

        let mut gate = self.gate.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = gate.wait_for(|open| *open).await;

        if !self.online.load(Ordering::SeqCst) {
            return Err(FetchError::Offline);
        }

        let scripted = lock(&self.routes).get(key.url()).cloned();
        Ok(scripted.unwrap_or_else(|| Response::new(StatusCode::NOT_FOUND).body("Not Found")))
    }
}

impl Fetcher for StubNetwork {
    fn fetch(&self, request: Request) -> FetchFuture<'_> {
        Box::pin(self.answer(request))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
