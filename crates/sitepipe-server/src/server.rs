//! Preview server implementation.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, OnceCell};
use tower_http::services::ServeDir;

use crate::websocket::{
    inject_client_script, reload_client_script, ReloadHub, ReloadMessage, RELOAD_SCRIPT_PATH,
    RELOAD_SOCKET_PATH,
};

/// Configuration for the preview server.
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    /// Directories to serve from, tried in order
    pub roots: Vec<PathBuf>,

    /// Port to listen on; a busy port falls back to an ephemeral one
    pub port: u16,

    /// Host to bind to
    pub host: String,

    /// Open browser on start
    pub open: bool,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from("dist"), PathBuf::from("src"), PathBuf::from(".")],
            port: 3000,
            host: "127.0.0.1".to_string(),
            open: true,
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {message}")]
    BindError { addr: String, message: String },
}

/// Static preview server with live reload.
///
/// Starting is idempotent: the first [`PreviewServer::start`] binds and
/// spawns the server, later calls return the address it is listening on.
pub struct PreviewServer {
    config: PreviewConfig,
    hub: ReloadHub,
    addr: OnceCell<SocketAddr>,
}

impl PreviewServer {
    /// Create a new preview server broadcasting through `hub`.
    pub fn new(config: PreviewConfig, hub: ReloadHub) -> Self {
        Self {
            config,
            hub,
            addr: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    pub fn hub(&self) -> &ReloadHub {
        &self.hub
    }

    /// Address the server listens on, once started.
    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr.get().copied()
    }

    /// Start the server if it is not running yet.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        self.addr.get_or_try_init(|| self.launch()).await.copied()
    }

    async fn launch(&self) -> Result<SocketAddr, ServerError> {
        let listener = self.bind().await?;
        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError {
                addr: self.config.host.clone(),
                message: e.to_string(),
            })?;

        let app = self.router();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Preview server stopped: {}", e);
            }
        });

        let url = format!("http://{}", addr);
        tracing::info!("Serving {} at {}", self.describe_roots(), url);

        if self.config.open {
            if let Err(e) = open::that(&url) {
                tracing::warn!("Failed to open browser: {}", e);
            }
        }

        Ok(addr)
    }

    async fn bind(&self) -> Result<TcpListener, ServerError> {
        let host = self.config.host.as_str();
        let port = self.config.port;

        match TcpListener::bind((host, port)).await {
            Ok(listener) => Ok(listener),
            Err(e) if port != 0 => {
                tracing::warn!("Port {} unavailable ({}), using a random port", port, e);
                TcpListener::bind((host, 0))
                    .await
                    .map_err(|e| ServerError::BindError {
                        addr: format!("{}:0", host),
                        message: e.to_string(),
                    })
            }
            Err(e) => Err(ServerError::BindError {
                addr: format!("{}:{}", host, port),
                message: e.to_string(),
            }),
        }
    }

    fn describe_roots(&self) -> String {
        self.config
            .roots
            .iter()
            .map(|r| r.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Build the application router.
    pub fn router(&self) -> Router {
        Router::new()
            .route(RELOAD_SOCKET_PATH, get(ws_handler))
            .route(RELOAD_SCRIPT_PATH, get(reload_script_handler))
            .fallback_service(static_files(&self.config.roots))
            .layer(middleware::map_response(inject_reload_script))
            .with_state(self.hub.clone())
    }
}

/// Serve files from each root in turn; the first root holding a file wins.
fn static_files(roots: &[PathBuf]) -> Router {
    roots.iter().rev().fold(Router::new(), |next, root| {
        Router::new().fallback_service(ServeDir::new(root).fallback(next))
    })
}

/// Add the reload client to HTML responses.
async fn inject_reload_script(response: Response) -> Response {
    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));

    if !is_html || response.status() != StatusCode::OK {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to read HTML response: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject_client_script(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);

    Response::from_parts(parts, Body::from(html))
}

/// Handler for the reload WebSocket endpoint.
async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<ReloadHub>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, hub))
}

/// Handle a WebSocket connection.
async fn handle_ws(mut socket: WebSocket, hub: ReloadHub) {
    let mut rx = hub.subscribe();

    if !send(&mut socket, &ReloadMessage::Connected).await {
        return;
    }

    // Forward reload messages to the client
    loop {
        match rx.recv().await {
            Ok(msg) => {
                if !send(&mut socket, &msg).await {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn send(socket: &mut WebSocket, msg: &ReloadMessage) -> bool {
    let Ok(json) = serde_json::to_string(msg) else {
        return false;
    };
    socket.send(Message::Text(json.into())).await.is_ok()
}

/// Handler for the reload client script.
async fn reload_script_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        reload_client_script(),
    )
}
