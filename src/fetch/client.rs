//! Minimal HTTP/1.1 client for a single upstream origin.
//!
//! One TCP connection per fetch, `Connection: close`, response read to EOF.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use super::{FetchError, FetchFuture, Fetcher};
use crate::cache::CacheKey;
use crate::http::{Headers, Method, Request, Response, StatusCode};

/// Maximum number of headers accepted in an upstream response.
const MAX_HEADERS: usize = 64;

/// Initial read buffer capacity per upstream response.
const INITIAL_BUF_SIZE: usize = 8 * 1024;

/// Fetches requests from one origin server (`host:port`) over plain HTTP/1.1.
///
/// # Examples
///
/// ```rust,no_run
/// use folio_cache::fetch::{Fetcher, HttpFetcher};
/// use folio_cache::http::Request;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let origin = HttpFetcher::new("127.0.0.1:8000");
/// let response = origin.fetch(Request::get("/api/photos?category=all")).await?;
/// println!("{}", response.status());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    origin: String,
}

impl HttpFetcher {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
        }
    }

    /// Returns the upstream `host:port`.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    async fn send(&self, request: Request) -> Result<Response, FetchError> {
        let mut stream =
            TcpStream::connect(&self.origin)
                .await
                .map_err(|source| FetchError::Connect {
                    origin: self.origin.clone(),
                    source,
                })?;

        let head_only = *request.method() == Method::Head;
        let wire = encode_request(&request, &self.origin);
        stream.write_all(&wire).await?;
        stream.flush().await?;

        let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);
        while stream.read_buf(&mut buf).await? != 0 {}
        trace!(origin = %self.origin, bytes = buf.len(), "upstream response read");

        parse_response(&buf, head_only)
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, request: Request) -> FetchFuture<'_> {
        Box::pin(async move {
            debug!(
                origin = %self.origin,
                method = %request.method(),
                url = request.target(),
                "fetching from upstream"
            );
            self.send(request).await
        })
    }
}

/// Serializes `request` in origin form for `host`.
fn encode_request(request: &Request, host: &str) -> BytesMut {
    let key = CacheKey::from_request(request);
    let headers = request.headers().end_to_end();
    let body = request.body();

    let mut buf = BytesMut::with_capacity(256 + headers.len() * 64 + body.len());
    buf.put(format!("{} {} HTTP/1.1\r\n", request.method(), key.url()).as_bytes());
    buf.put(format!("Host: {host}\r\n").as_bytes());
    for (name, value) in headers.iter() {
        buf.put(format!("{name}: {value}\r\n").as_bytes());
    }
    if !body.is_empty() || matches!(request.method(), Method::Post | Method::Put | Method::Patch) {
        buf.put(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    }
    buf.put(&b"Connection: close\r\n\r\n"[..]);
    buf.put(body.as_ref());
    buf
}

/// Parses a complete upstream response read up to EOF.
///
/// `head_only` marks a reply to `HEAD`, which never carries a body.
fn parse_response(buf: &[u8], head_only: bool) -> Result<Response, FetchError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut raw = httparse::Response::new(&mut headers);

    let body_offset = match raw.parse(buf)? {
        httparse::Status::Complete(offset) => offset,
        httparse::Status::Partial => return Err(FetchError::Truncated),
    };

    let code = raw.code.ok_or(FetchError::Truncated)?;
    let status = StatusCode::from_u16(code).ok_or(FetchError::InvalidStatus(code))?;

    let mut header_map = Headers::with_capacity(raw.headers.len());
    for header in raw.headers.iter() {
        if let Ok(value) = std::str::from_utf8(header.value) {
            header_map.insert(header.name, value);
        }
    }

    let rest = &buf[body_offset..];
    let bodiless = head_only
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
        || code < 200;

    let body = if bodiless {
        Bytes::new()
    } else if header_map
        .get("transfer-encoding")
        .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"))
    {
        decode_chunked(rest)?
    } else if let Some(len) = header_map
        .get("content-length")
        .and_then(|v| v.trim().parse::<usize>().ok())
    {
        if rest.len() < len {
            return Err(FetchError::Truncated);
        }
        Bytes::copy_from_slice(&rest[..len])
    } else {
        Bytes::copy_from_slice(rest)
    };

    Ok(Response::from_parts(status, header_map.end_to_end(), body))
}

/// Decodes a `Transfer-Encoding: chunked` body. Trailers are discarded.
fn decode_chunked(mut rest: &[u8]) -> Result<Bytes, FetchError> {
    let mut body = BytesMut::with_capacity(rest.len());
    loop {
        let (consumed, size) = match httparse::parse_chunk_size(rest) {
            Ok(httparse::Status::Complete(pair)) => pair,
            Ok(httparse::Status::Partial) => return Err(FetchError::Truncated),
            Err(_) => return Err(FetchError::InvalidChunk),
        };
        rest = &rest[consumed..];

        if size == 0 {
            return Ok(body.freeze());
        }

        let size = usize::try_from(size).map_err(|_| FetchError::InvalidChunk)?;
        let framed = size.checked_add(2).ok_or(FetchError::InvalidChunk)?;
        if rest.len() < framed {
            return Err(FetchError::Truncated);
        }
        body.put(&rest[..size]);
        if &rest[size..framed] != b"\r\n" {
            return Err(FetchError::InvalidChunk);
        }
        rest = &rest[framed..];
    }
}
