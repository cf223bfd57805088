//! The network seam — everything that leaves the process goes through [`Fetcher`].
//!
//! A fetch either resolves to a [`Response`] of any status, or fails with a
//! [`FetchError`]. Only the latter counts as a network failure: a `404` or
//! `503` is a successful fetch that the strategies simply decline to store.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::http::{Request, Response};

mod client;

pub use client::HttpFetcher;

/// Boxed future returned by [`Fetcher::fetch`].
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Response, FetchError>> + Send + 'a>>;

/// Errors that make a fetch reject rather than resolve.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to connect to {origin}: {source}")]
    Connect {
        origin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error talking to upstream: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed upstream response: {0}")]
    Malformed(#[from] httparse::Error),

    #[error("malformed chunked body in upstream response")]
    InvalidChunk,

    #[error("upstream closed the connection before the response was complete")]
    Truncated,

    #[error("upstream sent an invalid status code {0}")]
    InvalidStatus(u16),

    #[error("network unavailable")]
    Offline,
}

/// Performs network fetches on behalf of the worker.
///
/// Implementations must be shareable across tasks: the stale-while-revalidate
/// strategy moves an `Arc<dyn Fetcher>` into a detached background task.
///
/// # Contract
///
/// - No retries and no deadline; a hung fetch stays pending.
/// - Any HTTP status is a resolved fetch. Only transport-level failures are errors.
pub trait Fetcher: Send + Sync + 'static {
    /// Sends `request` to the network.
    fn fetch(&self, request: Request) -> FetchFuture<'_>;
}
