//! HTTP surface: the call page and the signaling WebSocket endpoint

use crate::session::{run_session, SessionRegistry};
use crate::signaling::websocket;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Shared state of the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,

    /// HTML page served at `/call`
    pub page_path: Arc<PathBuf>,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, page_path: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            page_path: Arc::new(page_path.into()),
        }
    }
}

/// Build the router
///
/// Must be served with `into_make_service_with_connect_info::<SocketAddr>()`
/// since the WebSocket handler keys sessions by remote address.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/call", get(call_page))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

async fn call_page(State(state): State<AppState>) -> Response {
    match tokio::fs::read_to_string(state.page_path.as_path()).await {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            warn!("Failed to read {}: {}", state.page_path.display(), e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        info!("New client connected: {}", addr);

        let (writer, reader) = websocket::split(socket);
        if let Err(e) = run_session(state.registry, addr.to_string(), Arc::new(writer), reader).await {
            error!("Session for {} ended with error: {}", addr, e);
        }
    })
}
