//! HTTP control surface for the talk runtime

pub mod health;
pub mod talk;

use std::future::Future;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::talk::TalkRuntime;

/// API server
pub struct ApiServer {
    runtime: TalkRuntime,
    port: u16,
}

impl ApiServer {
    /// Create a server controlling `runtime`
    #[must_use]
    pub const fn new(runtime: TalkRuntime, port: u16) -> Self {
        Self { runtime, port }
    }

    /// Build the router with all routes
    ///
    /// No CORS layer: the API is unauthenticated, so browsers must not be
    /// able to drive it from other origins.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .nest("/api/talk", talk::router(self.runtime.clone()))
            .merge(health::router())
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server until `shutdown` resolves
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("127.0.0.1:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }
}
