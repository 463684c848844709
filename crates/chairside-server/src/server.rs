//! `ChairsideServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::emit::EventEmitter;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::status::AgentStatusTracker;
use crate::websocket::broadcast::Broadcaster;
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Connection and subscription registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Event fan-out over the registry.
    pub broadcaster: Arc<Broadcaster>,
    /// Typed emit surface for domain events.
    pub emitter: Arc<EventEmitter>,
    /// Last-known agent statuses.
    pub status: Arc<AgentStatusTracker>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
}

/// The main Chairside realtime server.
pub struct ChairsideServer {
    state: AppState,
}

impl ChairsideServer {
    /// Create a new server with its full event pipeline wired up.
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(registry.clone()));
        let emitter = Arc::new(EventEmitter::new(broadcaster.clone()));
        let status = Arc::new(AgentStatusTracker::new(emitter.clone()));
        Self {
            state: AppState {
                registry,
                broadcaster,
                emitter,
                status,
                shutdown: Arc::new(ShutdownCoordinator::new()),
                config: Arc::new(config),
                start_time: Instant::now(),
            },
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .with_state(self.state.clone())
            .layer(CorsLayer::permissive())
    }

    /// Bind and serve. Returns the bound address and the serve task.
    ///
    /// Serving stops when the shutdown coordinator fires; in-flight sessions
    /// get a close frame from their own shutdown branch.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), std::io::Error> {
        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "chairside server listening");

        let router = self.router();
        let token = self.state.shutdown.token();
        let handle = tokio::spawn(async move {
            let serve =
                axum::serve(listener, router).with_graceful_shutdown(token.cancelled_owned());
            if let Err(e) = serve.await {
                error!(error = %e, "server task failed");
            }
        });
        Ok((local_addr, handle))
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.state.registry
    }

    /// Get the broadcaster.
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.state.broadcaster
    }

    /// Get the event emitter.
    pub fn emitter(&self) -> &Arc<EventEmitter> {
        &self.state.emitter
    }

    /// Get the agent status tracker.
    pub fn status(&self) -> &Arc<AgentStatusTracker> {
        &self.state.status
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

/// GET /ws: upgrade to a realtime session.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.registry.connection_count() >= state.config.max_connections {
        warn!(
            limit = state.config.max_connections,
            "connection limit reached, refusing upgrade"
        );
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let client_id = format!("client_{}", Uuid::now_v7());
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| session::run_ws_session(socket, client_id, state))
        .into_response()
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let resp = health::health_check(
        state.start_time,
        state.registry.connection_count(),
        state.status.tracked_count(),
    );
    Json(resp)
}
