//! Cache keys: the normalized identity of a request inside a store.

use std::fmt;

use crate::http::{Method, Request};

/// Canonical identity of a cached request.
///
/// Two requests share a key when they use the same method and their URLs
/// normalize to the same origin-relative path and query. Normalization:
///
/// - scheme and authority of absolute URLs are dropped (the proxy fronts a
///   single origin);
/// - the fragment is dropped;
/// - manifest-relative forms (`./styles.css`, `styles.css`) resolve against `/`;
/// - `.` and `..` segments collapse and repeated slashes merge;
/// - the query string is kept verbatim.
///
/// # Examples
///
/// ```
/// use folio_cache::cache::CacheKey;
///
/// assert_eq!(CacheKey::get("./assets/placeholder.jpg"), CacheKey::get("/assets/placeholder.jpg"));
/// assert_eq!(CacheKey::get("./").url(), "/");
/// assert_eq!(
///     CacheKey::get("http://localhost:8080/api/photos?category=all#grid").url(),
///     "/api/photos?category=all"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    method: Method,
    url: String,
}

impl CacheKey {
    /// Derives the key for an intercepted request.
    pub fn from_request(request: &Request) -> Self {
        let mut url = normalize_path(request.path());
        if let Some(query) = request.query_string().filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        Self {
            method: request.method().clone(),
            url,
        }
    }

    /// Key for a `GET` of `url`, the form manifest entries take.
    pub fn get(url: &str) -> Self {
        Self::from_request(&Request::get(url))
    }

    /// Returns the request method part of the key.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the normalized URL (path plus optional query).
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Resolves `path` against `/`, collapsing dot segments and repeated slashes.
pub(crate) fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut normalized = String::with_capacity(path.len() + 1);
    normalized.push('/');
    normalized.push_str(&segments.join("/"));

    let directory = path.ends_with('/') || path.ends_with("/.") || path.ends_with("/..");
    if directory && !segments.is_empty() {
        normalized.push('/');
    }
    normalized
}
