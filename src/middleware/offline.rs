use std::sync::Arc;

use tracing::warn;

use super::{Middleware, Next, ResponseFuture};
use crate::worker::ServiceWorker;
use crate::{Request, Response, StatusCode};

/// Header reporting where a proxied response came from.
pub const CACHE_STATUS_HEADER: &str = "X-Cache";

/// Terminal middleware that answers every request through a [`ServiceWorker`].
///
/// Successful outcomes are tagged with `X-Cache: network | hit | placeholder`.
/// A propagated network failure becomes `502 Bad Gateway` so the page sees a
/// failed load rather than a dropped connection. Revalidation handles are
/// dropped, leaving background store writes detached.
pub struct OfflineCache {
    worker: Arc<ServiceWorker>,
}

impl OfflineCache {
    pub fn new(worker: Arc<ServiceWorker>) -> Self {
        Self { worker }
    }
}

impl Middleware for OfflineCache {
    fn handle(&self, request: Request, _next: Next) -> ResponseFuture {
        let worker = Arc::clone(&self.worker);
        Box::pin(async move {
            let target = request.target().to_owned();
            match worker.handle_fetch(request).await {
                Ok(outcome) => {
                    let mut response = outcome.response;
                    response.set_header(CACHE_STATUS_HEADER, outcome.source.as_str());
                    response
                }
                Err(e) => {
                    warn!(url = %target, error = %e, "request failed");
                    Response::new(StatusCode::BAD_GATEWAY)
                        .header(CACHE_STATUS_HEADER, "miss")
                        .body(e.to_string())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStorage;
    use crate::config::CacheConfig;
    use crate::http::Destination;
    use crate::middleware::{Pipeline, from_middleware};
    use crate::testing::StubNetwork;

    fn pipeline(network: Arc<StubNetwork>) -> Pipeline {
        let worker = ServiceWorker::new(
            Arc::new(CacheStorage::new()),
            network,
            &CacheConfig::default(),
        );
        Pipeline::new(vec![from_middleware(Arc::new(OfflineCache::new(Arc::new(
            worker,
        ))))])
    }

    #[tokio::test]
    async fn tags_network_then_hit() {
        let network = Arc::new(StubNetwork::new());
        network.respond("/manifest.json", Response::new(StatusCode::OK).body("{}"));
        let pipeline = pipeline(Arc::clone(&network));

        let first = pipeline.run(Request::get("/manifest.json")).await;
        assert_eq!(first.headers().get("x-cache"), Some("network"));

        let second = pipeline.run(Request::get("/manifest.json")).await;
        assert_eq!(second.headers().get("x-cache"), Some("hit"));
        assert_eq!(network.calls(), 1);
    }

    #[tokio::test]
    async fn failure_becomes_bad_gateway() {
        let network = Arc::new(StubNetwork::new());
        network.set_online(false);
        let pipeline = pipeline(network);

        let res = pipeline
            .run(Request::get("/assets/new.jpg").with_destination(Destination::Image))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(res.headers().get("x-cache"), Some("miss"));
        assert_eq!(res.body_bytes().as_ref(), b"network request failed: network unavailable");
    }
}
