//! Request routing — pick exactly one caching strategy per intercepted request.
//!
//! Routing is a pure function of the URL path and the declared destination.
//! Each request is first reduced to a closed [`RequestClass`] tag, which then
//! maps onto a [`Strategy`]:
//!
//! | Condition (checked in order)            | Class          | Strategy                 |
//! |-----------------------------------------|----------------|--------------------------|
//! | path starts with a network-first prefix | `ApiPrefixed`  | network-first            |
//! | destination `image`                     | `Image`        | cache-first              |
//! | destination `document`                  | `Document`     | stale-while-revalidate   |
//! | destination `style`                     | `Style`        | stale-while-revalidate   |
//! | destination `script`                    | `Script`       | stale-while-revalidate   |
//! | anything else                           | `Other`        | cache-first              |
//!
//! Prefixes default to `/api/` and `/backend/`.

use std::fmt;

use crate::cache::normalize_path;
use crate::http::{Destination, Request};

/// Prefixes routed network-first when none are configured.
pub const DEFAULT_NETWORK_FIRST_PREFIXES: &[&str] = &["/api/", "/backend/"];

/// Closed classification of an intercepted request, computed once before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestClass {
    ApiPrefixed,
    Image,
    Document,
    Style,
    Script,
    Other,
}

impl RequestClass {
    /// Returns the strategy that serves this class.
    pub fn strategy(self) -> Strategy {
        match self {
            Self::ApiPrefixed => Strategy::NetworkFirst,
            Self::Image | Self::Other => Strategy::CacheFirst,
            Self::Document | Self::Style | Self::Script => Strategy::StaleWhileRevalidate,
        }
    }
}

/// Policy for resolving a request against the network and the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    NetworkFirst,
    CacheFirst,
    StaleWhileRevalidate,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NetworkFirst => "network-first",
            Self::CacheFirst => "cache-first",
            Self::StaleWhileRevalidate => "stale-while-revalidate",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies requests and selects their strategy.
///
/// # Examples
///
/// ```
/// use folio_cache::http::{Destination, Request};
/// use folio_cache::router::{CacheRouter, RequestClass, Strategy};
///
/// let router = CacheRouter::default();
///
/// // The prefix check wins over the destination.
/// let req = Request::get("/api/photos?category=all").with_destination(Destination::Image);
/// assert_eq!(router.classify(&req), RequestClass::ApiPrefixed);
/// assert_eq!(router.route(&req), Strategy::NetworkFirst);
///
/// let css = Request::get("/styles.css").with_destination(Destination::Style);
/// assert_eq!(router.route(&css), Strategy::StaleWhileRevalidate);
/// ```
#[derive(Debug, Clone)]
pub struct CacheRouter {
    network_first_prefixes: Vec<String>,
}

impl Default for CacheRouter {
    fn default() -> Self {
        Self::new(DEFAULT_NETWORK_FIRST_PREFIXES.iter().copied())
    }
}

impl CacheRouter {
    /// Creates a router with the given network-first path prefixes.
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            network_first_prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the configured network-first prefixes.
    pub fn prefixes(&self) -> &[String] {
        &self.network_first_prefixes
    }

    /// Reduces `request` to its [`RequestClass`].
    ///
    /// Prefixes are matched against the same normalized path the cache key
    /// uses, so `/assets/../api/x` and `./api/x` both count as `/api/x`.
    pub fn classify(&self, request: &Request) -> RequestClass {
        let path = normalize_path(request.path());
        if self
            .network_first_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return RequestClass::ApiPrefixed;
        }

        match request.destination() {
            Destination::Image => RequestClass::Image,
            Destination::Document => RequestClass::Document,
            Destination::Style => RequestClass::Style,
            Destination::Script => RequestClass::Script,
            Destination::Other => RequestClass::Other,
        }
    }

    /// Returns the single strategy that will serve `request`.
    pub fn route(&self, request: &Request) -> Strategy {
        self.classify(request).strategy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    fn req(path: &str, dest: Destination) -> Request {
        Request::get(path).with_destination(dest)
    }

    #[test]
    fn api_and_backend_prefixes_are_network_first() {
        let router = CacheRouter::default();
        for path in ["/api/photos", "/backend/api/settings", "/api/"] {
            assert_eq!(
                router.route(&req(path, Destination::Other)),
                Strategy::NetworkFirst,
                "{path}"
            );
        }
    }

    #[test]
    fn prefix_beats_destination() {
        let router = CacheRouter::default();
        for dest in [
            Destination::Image,
            Destination::Document,
            Destination::Style,
            Destination::Script,
        ] {
            assert_eq!(
                router.classify(&req("/backend/index.php", dest)),
                RequestClass::ApiPrefixed
            );
        }
    }

    #[test]
    fn prefix_needs_trailing_slash_match() {
        let router = CacheRouter::default();
        assert_eq!(
            router.classify(&req("/apiary.jpg", Destination::Image)),
            RequestClass::Image
        );
        assert_eq!(
            router.classify(&req("/assets/api/x.js", Destination::Script)),
            RequestClass::Script
        );
    }

    #[test]
    fn prefix_matches_normalized_path() {
        let router = CacheRouter::default();
        for path in [
            "/assets/../api/photos",
            "./api/photos",
            "api/photos",
            "//api/photos",
            "/./backend/index.php",
        ] {
            assert_eq!(
                router.classify(&req(path, Destination::Image)),
                RequestClass::ApiPrefixed,
                "{path}"
            );
        }
        assert_eq!(
            router.classify(&req("/api/../assets/hero-image.jpg", Destination::Image)),
            RequestClass::Image
        );
    }

    #[test]
    fn destinations_map_to_strategies() {
        let router = CacheRouter::default();
        assert_eq!(
            router.route(&req("/assets/portfolio/wedding1.jpg", Destination::Image)),
            Strategy::CacheFirst
        );
        assert_eq!(
            router.route(&req("/", Destination::Document)),
            Strategy::StaleWhileRevalidate
        );
        assert_eq!(
            router.route(&req("/script.js", Destination::Script)),
            Strategy::StaleWhileRevalidate
        );
        assert_eq!(
            router.route(&req("/manifest.json", Destination::Other)),
            Strategy::CacheFirst
        );
    }

    #[test]
    fn query_does_not_affect_prefix_check() {
        let router = CacheRouter::default();
        let r = Request::get("/photos?next=/api/");
        assert_eq!(router.classify(&r), RequestClass::Other);
    }

    #[test]
    fn custom_prefixes_replace_defaults() {
        let router = CacheRouter::new(["/graphql"]);
        assert_eq!(router.prefixes().to_vec(), vec!["/graphql".to_string()]);
        let r = Request::new(Method::Post, "/graphql");
        assert_eq!(router.route(&r), Strategy::NetworkFirst);
        assert_eq!(
            router.route(&req("/api/photos", Destination::Other)),
            Strategy::CacheFirst
        );
    }
}
