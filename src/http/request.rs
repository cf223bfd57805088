//! HTTP/1.1 requests: parsing intercepted traffic with [`httparse`] and
//! building requests by hand for precaching and tests.

use std::fmt;

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Header the browser uses to announce what a request will be used for.
pub const FETCH_DEST_HEADER: &str = "Sec-Fetch-Dest";

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// The declared use of a request's response, as sent in `Sec-Fetch-Dest`.
///
/// Only the destinations that influence caching get their own variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Image,
    Document,
    Style,
    Script,
    Other,
}

impl Destination {
    /// Maps a `Sec-Fetch-Dest` value onto a destination. Unknown values are [`Destination::Other`].
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "image" => Self::Image,
            "document" => Self::Document,
            "style" => Self::Style,
            "script" => Self::Script,
            _ => Self::Other,
        }
    }

    /// Returns the header value for this destination.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Document => "document",
            Self::Style => "style",
            Self::Script => "script",
            Self::Other => "empty",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An intercepted HTTP request.
///
/// Created by [`Request::parse`] from a raw byte buffer, or built with
/// [`Request::new`] / [`Request::get`]. Cloning is cheap: the body is a [`Bytes`].
///
/// # Examples
///
/// ```
/// use folio_cache::http::{Destination, Request};
///
/// let raw = b"GET /api/photos?category=all HTTP/1.1\r\nHost: localhost\r\nSec-Fetch-Dest: empty\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method().as_str(), "GET");
/// assert_eq!(request.path(), "/api/photos");
/// assert_eq!(request.query_string(), Some("category=all"));
/// assert_eq!(request.destination(), Destination::Other);
///
/// let image = Request::get("/assets/hero-image.jpg").with_destination(Destination::Image);
/// assert_eq!(image.destination(), Destination::Image);
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    target: String,
    path: String,
    query: Option<String>,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Builds an HTTP/1.1 request for `target`, which may be an origin-form
    /// path (`/api/photos?x=1`), a manifest-relative path (`./styles.css`), or
    /// an absolute URL.
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        let target = target.into();
        let (path, query) = split_target(&target);
        Self {
            method,
            target,
            path,
            query,
            version: 1,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Shorthand for a `GET` request.
    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::Get, target)
    }

    /// Appends a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Declares the request's destination by setting `Sec-Fetch-Dest`.
    #[must_use]
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.headers.set(FETCH_DEST_HEADER, destination.as_str());
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Parse a raw HTTP/1.1 request from a byte slice.
    ///
    /// Returns the parsed `Request` and the byte offset at which the body begins
    /// in `buf` (i.e. immediately after the `\r\n\r\n` header terminator). The
    /// body holds at most `Content-Length` bytes of whatever follows.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — more data is needed to complete the request headers.
    /// - [`RequestError::Parse`] — the data is malformed and cannot be parsed.
    /// - [`RequestError::MissingField`] — a required field (method, path, version) is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = match raw_req.method {
            Some(m) => m.parse::<Method>().unwrap_or_else(|never| match never {}),
            None => return Err(RequestError::MissingField { field: "method" }),
        };

        let target = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?
            .to_owned();

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let available = &buf[body_offset..];
        let declared = header_map
            .get("content-length")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let body = Bytes::copy_from_slice(&available[..declared.min(available.len())]);

        let (path, query) = split_target(&target);

        Ok((
            Self {
                method,
                target,
                path,
                query,
                version,
                headers: header_map,
                body,
            },
            body_offset,
        ))
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request target exactly as received or built.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns the URL path (without scheme, authority, query or fragment).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the declared destination, [`Destination::Other`] when absent.
    pub fn destination(&self) -> Destination {
        self.headers
            .get(FETCH_DEST_HEADER)
            .map(Destination::from_header)
            .unwrap_or(Destination::Other)
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }

    /// Returns the value of the `Content-Length` header parsed as a `usize`, if present.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.trim().parse().ok()
    }
}

/// Splits a request target into its path and query.
///
/// Absolute URLs lose their scheme and authority, and fragments are dropped.
/// A target starting with `/` is never absolute, whatever its query holds.
fn split_target(target: &str) -> (String, Option<String>) {
    let without_fragment = target.split('#').next().unwrap_or_default();

    let relative = match absolute_url_rest(without_fragment) {
        Some(after_scheme) => match after_scheme.find(['/', '?']) {
            Some(slash) => &after_scheme[slash..],
            None => "",
        },
        None => without_fragment,
    };

    let (path, query) = match relative.split_once('?') {
        Some((path, query)) => (path, Some(query.to_owned())),
        None => (relative, None),
    };

    let path = if path.is_empty() { "/" } else { path };
    (path.to_owned(), query)
}

/// Returns what follows `scheme://` when `target` is an absolute URL.
fn absolute_url_rest(target: &str) -> Option<&str> {
    if target.starts_with('/') {
        return None;
    }
    let pos = target.find("://")?;
    let scheme = &target[..pos];
    let is_scheme = !scheme.is_empty()
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    is_scheme.then(|| &target[pos + 3..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.method().as_str(), "GET");
        assert_eq!(req.path(), "/");
        assert_eq!(req.version(), 1);
        assert_eq!(req.headers().get("host"), Some("localhost"));
        assert_eq!(offset, raw.len());
    }

    #[test]
    fn parse_keeps_target_and_query() {
        let raw = b"GET /api/photos?category=all&limit=12 HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.target(), "/api/photos?category=all&limit=12");
        assert_eq!(req.path(), "/api/photos");
        assert_eq!(req.query_string(), Some("category=all&limit=12"));
    }

    #[test]
    fn incomplete_request() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn connection_close() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert!(!req.is_keep_alive());
    }

    #[test]
    fn body_is_limited_to_content_length() {
        let raw = b"POST /api/contact HTTP/1.1\r\nContent-Length: 5\r\n\r\nhelloGET / HTTP/1.1\r\n";
        let (req, body_offset) = Request::parse(raw).unwrap();
        assert_eq!(req.content_length(), Some(5));
        assert_eq!(req.body().as_ref(), b"hello");
        assert_eq!(&raw[body_offset..body_offset + 5], b"hello");
    }

    #[test]
    fn destination_from_header() {
        let raw = b"GET /styles.css HTTP/1.1\r\nSec-Fetch-Dest: Style\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.destination(), Destination::Style);

        let bare = Request::get("/anything");
        assert_eq!(bare.destination(), Destination::Other);

        let odd = Request::get("/font.woff2").header("sec-fetch-dest", "font");
        assert_eq!(odd.destination(), Destination::Other);
    }

    #[test]
    fn built_target_forms() {
        let abs = Request::get("https://Example.com/backend/api/photos?x=1#top");
        assert_eq!(abs.path(), "/backend/api/photos");
        assert_eq!(abs.query_string(), Some("x=1"));

        let host_only = Request::get("http://example.com");
        assert_eq!(host_only.path(), "/");

        let relative = Request::get("./assets/placeholder.jpg");
        assert_eq!(relative.path(), "./assets/placeholder.jpg");
    }

    #[test]
    fn url_inside_query_is_not_an_authority() {
        let req = Request::get("/api/photos?ref=http://example.com/");
        assert_eq!(req.path(), "/api/photos");
        assert_eq!(req.query_string(), Some("ref=http://example.com/"));

        let relative = Request::get("./gallery.html?next=https://site.example/x");
        assert_eq!(relative.path(), "./gallery.html");
        assert_eq!(relative.query_string(), Some("next=https://site.example/x"));

        let raw = b"GET /backend/login?return=https://a.example/b HTTP/1.1\r\nHost: x\r\n\r\n";
        let (parsed, _) = Request::parse(raw).unwrap();
        assert_eq!(parsed.path(), "/backend/login");
    }
}
