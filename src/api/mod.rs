//! HTTP interface of the metrics server
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Shared state**: one `Arc<dyn Repository>` plus the integrity hasher
//! - **gzip** in both directions: compressed responses for clients that
//!   accept them, transparent decoding of `Content-Encoding: gzip` bodies
//!
//! ## Endpoints
//!
//! - `POST /update/{kind}/{id}/{value}` - Raw single-metric update
//! - `POST /update/` - JSON single-metric update
//! - `POST /updates/` - JSON batch update
//! - `GET /value/{kind}/{id}` - Raw single-metric read
//! - `POST /value/` - JSON single-metric read
//! - `GET /` - HTML table of all metrics
//! - `GET /ping` - Durable-medium liveness probe

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::future::Future;
use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::{TcpListener, ToSocketAddrs};
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::hash::IntegrityHasher;
use crate::storage::select_repository;

/// Build the router with every endpoint and the transport layers
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(routes::index::list_metrics))
        .route("/ping", get(routes::ping::ping))
        .route("/update/", post(routes::update::update_json))
        .route("/update/:kind/:id/:value", post(routes::update::update_raw))
        .route("/updates/", post(routes::update::update_batch))
        .route("/value/", post(routes::value::value_json))
        .route("/value/:kind/:id", get(routes::value::value_raw))
        .with_state(state)
        .layer(RequestDecompressionLayer::new())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// Serve on `listener` until `shutdown` resolves
///
/// In-flight requests are completed before this returns.
pub async fn serve<F>(listener: TcpListener, state: ApiState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("API server listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("API server stopped");
    Ok(())
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_server(addr: impl ToSocketAddrs, state: ApiState) -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = serve(listener, state, std::future::pending()).await {
            error!("API server error: {}", e);
        }
    });

    Ok(addr)
}

/// Run the server described by `config` until `shutdown` resolves
///
/// The address is bound before any repository is selected, so a bind
/// failure returns without opening a durable medium. Once serving stops
/// the repository gets its final flush.
pub async fn run<F>(config: &ServerConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let hasher = match config.key() {
        Some(key) => IntegrityHasher::new(key),
        None => {
            warn!("no key configured, metric hashes are not checked");
            IntegrityHasher::disabled()
        }
    };

    let listener = TcpListener::bind(&config.address)
        .await
        .with_context(|| format!("failed to bind {}", config.address))?;

    let repository = select_repository(&config.storage_settings()).await;
    let served = serve(listener, ApiState::new(repository.clone(), hasher), shutdown).await;

    info!("flushing {} repository", repository.name());
    repository.shutdown().await;

    served
}
