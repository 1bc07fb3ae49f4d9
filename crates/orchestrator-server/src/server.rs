//! HTTP server runner.

use axum::Router;
use orchestrator_config::ServerConfig;
use std::future::{Future, IntoFuture};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{routes::create_router, state::AppState};

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Could not bind the listen address
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Address that failed
        address: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Server failed while running
    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Orchestrator HTTP server
pub struct Server {
    config: ServerConfig,
    router: Router,
}

impl Server {
    /// Create a server for the given state
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        let router = create_router(state, &config);
        Self { config, router }
    }

    /// The configured router
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Bind and serve until `shutdown` resolves, then drain in-flight
    /// requests for at most the configured shutdown timeout.
    ///
    /// # Errors
    /// Returns error if the address cannot be bound or serving fails
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future + Send + 'static,
    {
        let address = self.config.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ServerError::Bind {
                address: address.clone(),
                source,
            })?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    ///
    /// # Errors
    /// Returns error if serving fails
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future + Send + 'static,
    {
        let local = listener.local_addr()?;
        info!(address = %local, "Orchestrator listening");

        let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
        let graceful = async move {
            shutdown.await;
            let _ = signalled_tx.send(());
        };

        let serve = axum::serve(listener, self.router)
            .with_graceful_shutdown(graceful)
            .into_future();
        tokio::pin!(serve);

        let drain_limit = self.config.shutdown_timeout;
        tokio::select! {
            result = &mut serve => result?,
            () = async {
                if signalled_rx.await.is_ok() {
                    tokio::time::sleep(drain_limit).await;
                } else {
                    std::future::pending::<()>().await;
                }
            } => {
                warn!(timeout = ?drain_limit, "Shutdown timeout elapsed with requests in flight");
            }
        }

        info!("Server stopped");
        Ok(())
    }
}
