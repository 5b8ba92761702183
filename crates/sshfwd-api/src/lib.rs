pub mod handlers;
pub mod models;

use axum::{
    http::Method,
    routing::{get, patch, post},
    Json, Router,
};
use sshfwd_supervisor::Supervisor;
use std::future::Future;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;
use utoipa::OpenApi;

/// Default API bind address
pub const DEFAULT_BIND_ADDR: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), 4140);

/// Application state shared across handlers
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "sshfwd API",
        version = "0.1.0",
        description = "REST API for managing supervised SSH port forwards"
    ),
    paths(
        handlers::tunnel_status,
        handlers::add_tunnel,
        handlers::remove_tunnel,
        handlers::update_tunnel,
        handlers::health_check,
    ),
    components(
        schemas(
            models::Tunnel,
            models::NewTunnel,
            models::TunnelStatusEntry,
            models::TunnelStatusList,
            models::StatusResponse,
            models::AddTunnelResponse,
            models::RemoveTunnelRequest,
            models::HealthResponse,
        )
    ),
    tags(
        (name = "tunnels", description = "Tunnel management endpoints"),
        (name = "system", description = "System health and info endpoints")
    )
)]
pub struct ApiDoc;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Address to bind the API server
    pub bind_addr: SocketAddr,
    /// Allow cross-origin requests from any origin
    pub enable_cors: bool,
    /// Directory served for every path no API route matches
    pub static_dir: Option<PathBuf>,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR,
            enable_cors: true,
            static_dir: None,
        }
    }
}

/// API Server
pub struct ApiServer {
    config: ApiServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, supervisor: Arc<Supervisor>) -> Self {
        Self {
            config,
            state: Arc::new(AppState { supervisor }),
        }
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let api_router = Router::new()
            .route("/api/health", get(handlers::health_check))
            .route("/api/v1/tunnel_status", get(handlers::tunnel_status))
            .route("/api/v1/add_tunnel", post(handlers::add_tunnel))
            .route("/api/v1/remove_tunnel", post(handlers::remove_tunnel))
            .route("/api/v1/update_tunnel", patch(handlers::update_tunnel))
            .with_state(self.state.clone());

        let mut router = Router::new()
            .route("/api/openapi.json", get(openapi_json))
            .merge(api_router);

        if let Some(dir) = &self.config.static_dir {
            info!("Serving static files from {:?}", dir);
            router = router.fallback_service(ServeDir::new(dir));
        }

        let mut router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods([
                        Method::GET,
                        Method::POST,
                        Method::PATCH,
                        Method::PUT,
                        Method::DELETE,
                        Method::OPTIONS,
                    ])
                    .allow_headers(Any),
            );
        }

        router
    }

    /// Serve until `shutdown` resolves, then finish in-flight requests.
    pub async fn start<F>(self, shutdown: F) -> Result<(), anyhow::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", self.config.bind_addr, e))?;

        info!("Starting API server on {}", self.config.bind_addr);
        info!(
            "OpenAPI spec: http://{}/api/openapi.json",
            self.config.bind_addr
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        info!("API server stopped");
        Ok(())
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_generation() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json["paths"]["/api/v1/add_tunnel"]["post"].is_object());
        assert!(json["paths"]["/api/v1/update_tunnel"]["patch"].is_object());
    }

    #[test]
    fn test_default_bind_addr() {
        assert_eq!(
            ApiServerConfig::default().bind_addr.to_string(),
            "127.0.0.1:4140"
        );
    }
}
