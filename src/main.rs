//! `folio-cache` — offline-first caching proxy for the portfolio site.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use folio_cache::cache::CacheStorage;
use folio_cache::config::ProxyConfig;
use folio_cache::fetch::HttpFetcher;
use folio_cache::middleware::{LoggerMiddleware, OfflineCache, Pipeline, from_middleware};
use folio_cache::server::Server;
use folio_cache::worker::ServiceWorker;

/// Offline-first caching proxy for the photographer portfolio site
#[derive(Parser, Debug)]
#[command(name = "folio-cache")]
#[command(about = "Offline-first caching proxy for the photographer portfolio site")]
#[command(version)]
struct Cli {
    /// JSON config file; every field is optional
    #[arg(long, short, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the config file
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,

    /// Upstream origin (host:port), overriding the config file
    #[arg(long, value_name = "ADDR")]
    origin: Option<String>,

    /// Cache generation tag, overriding the config file
    #[arg(long, value_name = "TAG")]
    generation: Option<String>,
}

impl Cli {
    fn load_config(&self) -> Result<ProxyConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => ProxyConfig::from_file(path)?,
            None => ProxyConfig::default(),
        };
        if let Some(listen) = &self.listen {
            config.listen = listen.clone();
        }
        if let Some(origin) = &self.origin {
            config.origin = origin.clone();
        }
        if let Some(generation) = &self.generation {
            config.cache.generation = generation.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;

    let worker = Arc::new(ServiceWorker::new(
        Arc::new(CacheStorage::new()),
        Arc::new(HttpFetcher::new(config.origin.clone())),
        &config.cache,
    ));

    let report = worker.install().await;
    if !report.failed.is_empty() {
        warn!(failed = ?report.failed, "some precache entries are unavailable offline");
    }
    worker.activate().await?;

    let pipeline = Pipeline::new(vec![
        from_middleware(Arc::new(LoggerMiddleware)),
        from_middleware(Arc::new(OfflineCache::new(worker))),
    ]);

    let server = Server::bind(&config.listen).await?;
    info!(origin = %config.origin, generation = %config.cache.generation, "proxying");

    server.serve_until(pipeline, shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl-C, shutting down"),
        Err(e) => warn!(error = %e, "cannot listen for Ctrl-C; stopping now"),
    }
}
