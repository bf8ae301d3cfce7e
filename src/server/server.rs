//! The review HTTP server: router construction and graceful shutdown.

use std::future::Future;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::conversation::DirSource;
use crate::danger::DangerMap;
use crate::progress::ProgressStore;
use crate::registry::SpawnRegistry;

use super::handlers::{
    get_dangers, get_progress, get_session_content, get_sessions, post_progress, AppState,
};

/// HTTP server exposing the review API.
pub struct ReviewServer {
    config: ServerConfig,
    state: AppState,
}

impl ReviewServer {
    /// Create a server over a session directory and its scanned registries,
    /// with default configuration.
    #[must_use]
    pub fn new(
        source: DirSource,
        registry: SpawnRegistry,
        dangers: DangerMap,
        progress: ProgressStore,
    ) -> Self {
        Self {
            config: ServerConfig::default(),
            state: AppState::new(source, registry, dangers, progress),
        }
    }

    /// Set the server configuration (builder pattern).
    #[must_use]
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// The configured bind address.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Build the router with all API routes and middleware.
    #[must_use]
    pub fn build_router(&self) -> Router {
        let router = Router::new()
            .route("/api/sessions", get(get_sessions))
            .route("/api/sessions/:name", get(get_session_content))
            .route("/api/progress", get(get_progress).post(post_progress))
            .route("/api/dangers", get(get_dangers))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if self.config.cors_permissive {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Run the server until interrupted (ctrl-c), then shut down gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or serve.
    pub async fn run(self) -> std::io::Result<()> {
        self.run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    }

    /// Run the server until the given future completes.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or serve.
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let address = self.address();
        let app = self.build_router();

        let listener = TcpListener::bind(&address).await?;
        tracing::info!(address = %address, "Review server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("Review server shutting down");
            })
            .await
    }
}
