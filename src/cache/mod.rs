//! Caching layer — named, versioned response stores.
//!
//! - [`CacheKey`] — canonical identity of a request (method + normalized URL).
//! - [`CacheStore`] — one named store mapping keys to captured responses.
//! - [`CacheStorage`] — the registry of stores, injected into the worker
//!   instead of living in global state.
//! - [`Generation`] / [`StoreRole`] — which store names belong to the
//!   current deploy and are therefore protected from pruning.

mod generation;
mod key;
mod storage;
mod store;

pub use generation::{Generation, StoreRole};
pub use key::CacheKey;
pub(crate) use key::normalize_path;
pub use storage::CacheStorage;
pub use store::{CacheError, CacheStore};
