//! # folio-cache
//!
//! An offline-first caching proxy for the photographer portfolio site.
//!
//! Every request from the page is routed to one of three strategies:
//! API calls go network first; documents, stylesheets and scripts are served
//! stale while a background fetch revalidates them; images and everything
//! else go cache first. Cache stores are named after a generation tag;
//! installing precaches the site shell and activating deletes every store
//! left over from older generations.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use folio_cache::cache::CacheStorage;
//! use folio_cache::config::CacheConfig;
//! use folio_cache::fetch::HttpFetcher;
//! use folio_cache::middleware::{LoggerMiddleware, OfflineCache, Pipeline, from_middleware};
//! use folio_cache::server::Server;
//! use folio_cache::worker::ServiceWorker;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let worker = Arc::new(ServiceWorker::new(
//!         Arc::new(CacheStorage::new()),
//!         Arc::new(HttpFetcher::new("127.0.0.1:8000")),
//!         &CacheConfig::default(),
//!     ));
//!     worker.install().await;
//!     worker.activate().await?;
//!
//!     let pipeline = Pipeline::new(vec![
//!         from_middleware(Arc::new(LoggerMiddleware)),
//!         from_middleware(Arc::new(OfflineCache::new(worker))),
//!     ]);
//!     Server::bind("127.0.0.1:8080").await?.serve(pipeline).await?;
//!     Ok(())
//! }
//! ```

pub mod background;
pub mod cache;
pub mod config;
pub mod fetch;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;
pub mod testing;
pub mod worker;

pub use http::{Destination, Headers, Method, Request, Response, StatusCode};
pub use router::{CacheRouter, RequestClass, Strategy};
pub use server::{Server, ServerError};
pub use worker::{FetchOutcome, ResponseSource, ServiceWorker, WorkerError};
