//! GatewayServer and its accept loop.

use super::handler::{handle_request, GatewayState};
use crate::config::Config;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// The gateway: one listener serving proxied traffic and the control endpoints.
pub struct GatewayServer {
    state: Arc<GatewayState>,
}

impl GatewayServer {
    pub fn new(config: Config) -> Self {
        Self {
            state: Arc::new(GatewayState::new(config)),
        }
    }

    pub fn state(&self) -> Arc<GatewayState> {
        Arc::clone(&self.state)
    }

    /// Bind the configured port on all interfaces and serve until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<(), anyhow::Error>
    where
        F: Future<Output = ()>,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow::anyhow!("failed to bind {addr}: {e}"))?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from `listener` until `shutdown` resolves.
    ///
    /// On shutdown the listener is closed first and open connections finish
    /// the requests they are serving. Outstanding capture tasks and pending
    /// records are then waited for while the flush loop keeps running, and
    /// finally the flush loop is stopped.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), anyhow::Error>
    where
        F: Future<Output = ()>,
    {
        let state = self.state;
        let local_addr = listener.local_addr()?;

        info!("Listening on http://{}", local_addr);
        info!("Base URL {}", state.config.base_url);
        info!("Stub directory {}", state.config.stub_dir.display());
        info!("Default target {}", state.targets.default.url());
        for target in &state.targets.prefixes {
            info!("Prefix {} -> {}", target.prefix(), target.url());
        }

        let (flush_stop_tx, flush_stop_rx) = broadcast::channel(1);
        let flush_handle = tokio::spawn(
            Arc::clone(&state.store).run_flush_loop(state.config.flush_interval, flush_stop_rx),
        );

        let graceful = GracefulShutdown::new();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, remote_addr)) => {
                            let state = Arc::clone(&state);
                            let service = service_fn(move |req| {
                                handle_request(Arc::clone(&state), req)
                            });
                            let connection = graceful.watch(
                                http1::Builder::new().serve_connection(TokioIo::new(stream), service),
                            );
                            tokio::spawn(async move {
                                if let Err(err) = connection.await {
                                    debug!("Error serving connection from {}: {}", remote_addr, err);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = &mut shutdown => {
                    break;
                }
            }
        }

        drop(listener);
        info!("shutting down, draining open connections");
        // Requests already accepted run to completion, so their captures are counted below.
        graceful.shutdown().await;

        info!(
            outstanding = state.in_flight.count(),
            "waiting for outstanding recordings"
        );
        state.in_flight.wait_idle().await;

        // The receiver is gone only if the flush loop already ended.
        let _ = flush_stop_tx.send(());
        if let Err(e) = flush_handle.await {
            error!("flush loop failed: {}", e);
        }
        info!("shutdown complete");
        Ok(())
    }
}
