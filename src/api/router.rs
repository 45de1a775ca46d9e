//! API router configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

use super::handlers::{
    api_info, delete_history_entry, export_history, export_snapshot, health, import_snapshot,
    list_sessions, replace_history, rest_mutation, rest_query, rest_state, turn_commit,
    turn_context, AppState,
};
use crate::error::VibeStateError;
use crate::session::SessionRegistry;

/// Create the API router with default state.
pub fn create_router() -> Router {
    create_router_with_state(AppState::new())
}

/// Create the API router with custom state.
pub fn create_router_with_state(state: AppState) -> Router {
    let turn_routes = Router::new()
        .route("/context", post(turn_context))
        .route("/commit", post(turn_commit));

    let rest_routes = Router::new()
        .route("/", get(rest_state))
        .route("/mutations", post(rest_mutation))
        .route("/queries", post(rest_query));

    let admin_routes = Router::new()
        .route("/sessions", get(list_sessions))
        .route("/history", get(export_history).put(replace_history))
        .route("/history/{id}", delete(delete_history_entry))
        .route("/snapshot", get(export_snapshot).put(import_snapshot));

    // API v1 routes
    let api_v1 = Router::new()
        .route("/", get(api_info))
        .nest("/turns", turn_routes)
        .nest("/rest", rest_routes)
        .nest("/admin", admin_routes);

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Wait for in-flight requests on Ctrl+C.
    pub graceful_shutdown: bool,
    /// Seconds between background prune passes; 0 disables the sweep.
    pub sweep_interval_secs: u64,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn without_graceful_shutdown(mut self) -> Self {
        self.graceful_shutdown = false;
        self
    }

    pub fn with_sweep_interval_secs(mut self, secs: u64) -> Self {
        self.sweep_interval_secs = secs;
        self
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            graceful_shutdown: true,
            sweep_interval_secs: 60,
        }
    }
}

/// Start the API server with default state.
pub async fn serve(config: ServerConfig) -> crate::Result<()> {
    serve_with_state(config, AppState::new()).await
}

/// Start the API server with custom state.
pub async fn serve_with_state(config: ServerConfig, state: AppState) -> crate::Result<()> {
    let addr = config.bind_address();

    let sweeper = (config.sweep_interval_secs > 0).then(|| {
        spawn_sweeper(
            Arc::clone(&state.registry),
            Duration::from_secs(config.sweep_interval_secs),
        )
    });

    let router = create_router_with_state(state);

    info!("Starting vibe-state API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(VibeStateError::Io)?;

    let served = if config.graceful_shutdown {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    } else {
        axum::serve(listener, router).await
    };

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    served.map_err(VibeStateError::Io)?;
    info!("Server stopped");

    Ok(())
}

/// Periodically drop expired sessions and enforce capacity.
fn spawn_sweeper(registry: Arc<SessionRegistry>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match registry.prune() {
                Ok(report) if report.removed() > 0 => {
                    debug!(
                        expired = report.expired.len(),
                        evicted = report.evicted.len(),
                        "Session sweep"
                    );
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Session sweep failed"),
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert_eq!(config.bind_address(), "127.0.0.1:3000");
        assert!(config.graceful_shutdown);
    }

    #[test]
    fn test_server_config_custom() {
        let config = ServerConfig::new("0.0.0.0", 8080)
            .without_graceful_shutdown()
            .with_sweep_interval_secs(0);
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert!(!config.graceful_shutdown);
        assert_eq!(config.sweep_interval_secs, 0);
    }

    #[test]
    fn test_router_creation() {
        let _router = create_router();
    }

    #[tokio::test]
    async fn test_sweeper_prunes_expired_sessions() {
        use crate::cookies::PendingCookies;
        use crate::session::RegistryConfig;
        use std::collections::HashMap;

        let registry = Arc::new(SessionRegistry::new(RegistryConfig::new(1, 10)));
        let mut sink = PendingCookies::new();
        registry
            .get_or_create_session_id(&HashMap::new(), &mut sink)
            .unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let handle = spawn_sweeper(Arc::clone(&registry), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.abort();

        assert!(registry.is_empty());
    }
}
