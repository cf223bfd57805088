//! HTTP/1.1 response builder.
//!
//! Responses are produced by the network, replayed from a store, or built
//! locally by the proxy. They serialize to a byte buffer for transmission
//! back to the page.

use bytes::{BufMut, Bytes, BytesMut};

use super::{Headers, StatusCode};

/// An HTTP/1.1 response.
///
/// Cloning is cheap (the body is a reference-counted [`Bytes`]) and yields a
/// byte-identical copy, which is what a store keeps.
///
/// # Examples
///
/// ```
/// use folio_cache::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::OK)
///     .header("Content-Type", "application/json")
///     .body(r#"{"photos":[]}"#);
///
/// let stored = response.clone();
/// assert_eq!(stored.body_bytes(), response.body_bytes());
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 13\r\n"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
    keep_alive: bool,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Bytes::new(),
            keep_alive: true,
        }
    }

    /// Assembles a response from already-parsed parts, e.g. an upstream reply.
    pub fn from_parts(status: StatusCode, headers: Headers, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
            keep_alive: true,
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets a header in-place, replacing existing values. Intended for
    /// middleware that decorates a response it received from downstream.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// Sets the response body from a string.
    ///
    /// The `Content-Length` header is written automatically by [`into_bytes`](Self::into_bytes).
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Bytes::from(body.into());
        self
    }

    /// Sets the response body from raw bytes.
    #[must_use]
    pub fn with_body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Controls whether the `Connection: keep-alive` or `Connection: close` header is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns `true` for a `2xx` status, the only responses worth storing.
    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the response body.
    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// Serializes the response into a `BytesMut` buffer using HTTP/1.1 wire format.
    ///
    /// Connection-scoped headers carried over from upstream are dropped first,
    /// then `Content-Length` and `Connection` are written from this response.
    /// A non-empty body without a `Content-Type` gets `application/octet-stream`.
    pub fn into_bytes(self) -> BytesMut {
        let content_length = self.body.len();
        let mut headers = self.headers.end_to_end();

        if !self.body.is_empty() && !headers.contains("content-type") {
            headers.insert("Content-Type", "application/octet-stream");
        }

        let connection = if self.keep_alive {
            "keep-alive"
        } else {
            "close"
        };
        headers.insert("Connection", connection);

        let estimated_size = 128 + headers.len() * 64 + content_length;
        let mut buf = BytesMut::with_capacity(estimated_size);

        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );

        for (name, value) in headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        // Content-Length is always the last header before the blank line
        buf.put(format!("Content-Length: {content_length}\r\n").as_bytes());
        buf.put(&b"\r\n"[..]);

        if !self.body.is_empty() {
            buf.put(self.body.as_ref());
        }

        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_string(bytes: BytesMut) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn simple_ok_response() {
        let r = Response::new(StatusCode::OK).body("Hello");
        let s = to_string(r.into_bytes());
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn upstream_framing_headers_are_not_repeated() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "image/jpeg");
        headers.insert("Transfer-Encoding", "chunked");
        headers.insert("Content-Length", "999");
        let r = Response::from_parts(StatusCode::OK, headers, Bytes::from_static(b"jpeg"));

        let s = to_string(r.into_bytes());
        assert!(!s.contains("Transfer-Encoding"));
        assert!(!s.contains("999"));
        assert!(s.contains("Content-Type: image/jpeg\r\n"));
        assert!(s.contains("Content-Length: 4\r\n"));
    }

    #[test]
    fn no_body_no_content_type() {
        let r = Response::new(StatusCode::NO_CONTENT);
        let s = to_string(r.into_bytes());
        assert!(!s.contains("Content-Type"));
        assert!(s.contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn connection_close() {
        let r = Response::new(StatusCode::OK).keep_alive(false);
        let s = to_string(r.into_bytes());
        assert!(s.contains("Connection: close\r\n"));
    }

    #[test]
    fn clone_is_byte_identical() {
        let r = Response::new(StatusCode::OK)
            .header("ETag", "\"v1\"")
            .with_body_bytes(vec![0xff, 0xd8, 0xff]);
        let copy = r.clone();
        assert_eq!(copy, r);
        assert_eq!(copy.into_bytes(), r.into_bytes());
    }
}
