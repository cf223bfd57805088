//! Async TCP front end of the proxy.
//!
//! Accepts TCP connections from the page and dispatches each HTTP/1.1 request
//! to a handler (normally a middleware [`Pipeline`](crate::middleware::Pipeline)
//! ending in the cache worker). Persistent connections are supported.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};
use crate::middleware::Pipeline;

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Largest request (head plus body) buffered before answering `413`.
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// The proxy's HTTP listener.
///
/// Binds to a TCP address and dispatches incoming HTTP/1.1 requests to a
/// handler function.
///
/// # Examples
///
/// ```rust,no_run
/// use folio_cache::server::Server;
/// use folio_cache::http::{Request, Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server.run(|_req: Request| async {
///         Response::new(StatusCode::OK).body("Hello!")
///     }).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections forever, dispatching requests to `handler`.
    ///
    /// The handler is shared across every connection task, so it must be
    /// `Send + Sync + 'static`.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        self.run_until(handler, std::future::pending()).await
    }

    /// Accepts connections until `shutdown` resolves.
    ///
    /// Connections already accepted keep running on their own tasks; only
    /// the listener stops.
    ///
    /// # Errors
    ///
    /// Currently infallible once bound: accept errors are logged and the
    /// loop carries on.
    pub async fn run_until<H, F, S>(self, handler: H, shutdown: S) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
        S: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        tokio::pin!(shutdown);
        info!(address = %self.local_addr, "proxy listening");

        loop {
            let accepted = tokio::select! {
                _ = &mut shutdown => {
                    info!(address = %self.local_addr, "listener stopped");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer_addr) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }

    /// Serves every request through `pipeline` until the process exits.
    pub async fn serve(self, pipeline: Pipeline) -> Result<(), ServerError> {
        self.serve_until(pipeline, std::future::pending()).await
    }

    /// Serves every request through `pipeline` until `shutdown` resolves.
    pub async fn serve_until<S>(self, pipeline: Pipeline, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()>,
    {
        let handler = move |request: Request| {
            let pipeline = pipeline.clone();
            async move { pipeline.run(request).await }
        };
        self.run_until(handler, shutdown).await
    }
}

/// What the next read from a connection produced.
enum Frame {
    Request(Request),
    /// The peer closed the connection between requests.
    Closed,
    /// The bytes on the wire cannot become a request; answer and hang up.
    Reject(Response),
}

/// Reads one complete request (head and `Content-Length` body) into `buf`.
///
/// Bytes past the request stay in `buf` for the next call, so pipelined
/// requests are served in order.
async fn read_request(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    peer_addr: SocketAddr,
) -> std::io::Result<Frame> {
    loop {
        if !buf.is_empty() {
            match Request::parse(&buf[..]) {
                Ok((request, body_offset)) => {
                    let needed = body_offset
                        .checked_add(request.content_length().unwrap_or(0))
                        .filter(|total| *total <= MAX_REQUEST_SIZE);
                    let Some(needed) = needed else {
                        warn!(peer = %peer_addr, "declared body too large, sending 413");
                        return Ok(too_large());
                    };
                    if buf.len() >= needed {
                        let _ = buf.split_to(needed);
                        return Ok(Frame::Request(request));
                    }
                }
                Err(RequestError::Incomplete) => {}
                Err(e) => {
                    warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                    return Ok(Frame::Reject(
                        Response::new(StatusCode::BAD_REQUEST).body(format!("Bad Request: {e}")),
                    ));
                }
            }
        }

        if buf.len() > MAX_REQUEST_SIZE {
            warn!(peer = %peer_addr, bytes = buf.len(), "request too large, sending 413");
            return Ok(too_large());
        }

        if stream.read_buf(buf).await? == 0 {
            return Ok(Frame::Closed);
        }
    }
}

fn too_large() -> Frame {
    Frame::Reject(Response::new(StatusCode::PAYLOAD_TOO_LARGE).body("Request entity too large"))
}

/// Serves requests on one connection until either side closes it.
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let request = match read_request(&mut stream, &mut buf, peer_addr).await? {
            Frame::Request(request) => request,
            Frame::Closed => {
                debug!(peer = %peer_addr, "connection closed by peer");
                return Ok(());
            }
            Frame::Reject(response) => {
                stream.write_all(&response.keep_alive(false).into_bytes()).await?;
                return Ok(());
            }
        };

        let keep_alive = request.is_keep_alive();
        debug!(
            peer = %peer_addr,
            method = %request.method(),
            url = request.target(),
            "dispatching request"
        );

        let response = handler(request).await.keep_alive(keep_alive);
        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        if !keep_alive {
            debug!(peer = %peer_addr, "closing connection after response");
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn exchange(addr: SocketAddr, raw: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn answers_through_handler() {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        let task = tokio::spawn(server.run(|req: Request| async move {
            Response::new(StatusCode::OK).body(req.target().to_owned())
        }));

        let reply = exchange(
            addr,
            b"GET /assets/hero-image.jpg HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(reply.ends_with("/assets/hero-image.jpg"));
        task.abort();
    }

    #[tokio::test]
    async fn malformed_request_gets_400() {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        let task = tokio::spawn(server.run(|_req: Request| async {
            Response::new(StatusCode::OK)
        }));

        let reply = exchange(addr, b"NOT A REQUEST\r\n\r\n").await;
        assert!(reply.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        task.abort();
    }

    #[tokio::test]
    async fn stops_accepting_after_shutdown() {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(server.run_until(
            |_req: Request| async { Response::new(StatusCode::OK) },
            async move {
                let _ = stopped.await;
            },
        ));

        stop.send(()).unwrap();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn pipelined_requests_are_answered_in_order() {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        let task = tokio::spawn(server.run(|req: Request| async move {
            Response::new(StatusCode::OK).body(req.path().to_owned())
        }));

        let reply = exchange(
            addr,
            b"GET /one HTTP/1.1\r\nHost: x\r\n\r\nGET /two HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
        )
        .await;
        let one = reply.find("/one").unwrap();
        let two = reply.find("/two").unwrap();
        assert!(one < two);
        task.abort();
    }

    #[tokio::test]
    async fn oversized_content_length_gets_413() {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        let task = tokio::spawn(server.run(|_req: Request| async {
            Response::new(StatusCode::OK)
        }));

        for length in ["18446744073709551615", "9000000"] {
            let raw = format!("POST /api/contact HTTP/1.1\r\nHost: x\r\nContent-Length: {length}\r\n\r\n");
            let reply = exchange(addr, raw.as_bytes()).await;
            assert!(reply.starts_with("HTTP/1.1 413 Payload Too Large\r\n"), "{length}: {reply}");
        }
        task.abort();
    }
}
