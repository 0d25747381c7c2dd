//! `SwitchboardServer`: Axum HTTP + websocket front end for the coordinator.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{Extensions, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use switchboard_core::{MessageRouter, MessageWriter};
use switchboard_mux::{AdmissionSender, Coordinator, MuxHandle};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::assets;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Producer side of the admission queue.
    pub admission: AdmissionSender,
    /// Control and stats handle for the coordinator.
    pub mux: MuxHandle,
    /// Directory holding the static client.
    pub static_dir: Arc<PathBuf>,
    /// Max inbound websocket message size.
    pub max_message_bytes: usize,
    /// When the server started.
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The switchboard server, before it binds.
pub struct SwitchboardServer {
    config: ServerConfig,
    coordinator: Coordinator,
    state: AppState,
    shutdown: Arc<ShutdownCoordinator>,
}

impl SwitchboardServer {
    pub fn new(config: ServerConfig, router: MessageRouter) -> Self {
        let (coordinator, admission) = Coordinator::new(config.mux.clone(), router);
        let state = AppState {
            admission,
            mux: coordinator.handle(),
            static_dir: Arc::new(config.static_dir.clone()),
            max_message_bytes: config.max_message_bytes,
            start_time: Instant::now(),
            started_at: Utc::now(),
            metrics: None,
        };
        Self {
            config,
            coordinator,
            state,
            shutdown: Arc::new(ShutdownCoordinator::new()),
        }
    }

    /// Serve `/metrics` from this Prometheus handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub fn mux(&self) -> &MuxHandle {
        &self.state.mux
    }

    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the listener, then spawn the coordinator loop and the HTTP server.
    pub async fn listen(self) -> Result<RunningServer, ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let app = self.router();
        let token = self.shutdown.token();

        let coordinator = tokio::spawn(self.coordinator.run(token.clone()));
        let http = tokio::spawn(async move {
            let service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(err) = axum::serve(listener, service)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %err, "http server exited with error");
            }
        });

        info!(%local_addr, static_dir = %self.config.static_dir.display(), "switchboard listening");

        Ok(RunningServer {
            local_addr,
            mux: self.state.mux,
            shutdown: self.shutdown,
            tasks: vec![coordinator, http],
            timeout: self.config.shutdown_timeout,
        })
    }
}

/// A bound, running server.
#[derive(Debug)]
pub struct RunningServer {
    local_addr: SocketAddr,
    mux: MuxHandle,
    shutdown: Arc<ShutdownCoordinator>,
    tasks: Vec<JoinHandle<()>>,
    timeout: Duration,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn mux(&self) -> &MuxHandle {
        &self.mux
    }

    /// Cancel everything and wait for the coordinator to close its sessions.
    pub async fn stop(self) {
        info!(local_addr = %self.local_addr, "stopping switchboard");
        self.shutdown
            .graceful_shutdown(self.tasks, Some(self.timeout))
            .await;
        info!("switchboard stopped");
    }
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/client.js", get(client_js_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(not_found)
        .with_state(state)
        .layer(middleware::from_fn(reject_non_get))
        .layer(middleware::from_fn(log_request))
        .layer(TraceLayer::new_for_http())
}

fn remote_addr(extensions: &Extensions) -> String {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_owned(), |info| info.0.to_string())
}

/// GET /: websocket upgrade, or the client page for plain requests.
async fn root_handler(
    State(state): State<AppState>,
    extensions: Extensions,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match upgrade {
        Ok(ws) => {
            let remote = remote_addr(&extensions);
            let admission = state.admission.clone();
            ws.max_message_size(state.max_message_bytes)
                .on_upgrade(move |socket| admit_socket(socket, remote, admission))
        }
        Err(_) => assets::serve_file(&state.static_dir, assets::CLIENT_HTML).await,
    }
}

async fn admit_socket(socket: WebSocket, remote: String, admission: AdmissionSender) {
    debug!(remote_addr = %remote, "websocket upgraded");
    let conn = websocket::into_connection(socket, remote);
    if let Err(err) = admission.admit(conn).await {
        warn!(error = ?err, "admission refused websocket");
        let (_, _, _, mut writer) = err.into_connection().into_parts();
        let _ = writer.close().await;
    }
}

/// GET /client.js
async fn client_js_handler(State(state): State<AppState>) -> Response {
    assets::serve_file(&state.static_dir, assets::CLIENT_JS).await
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.started_at, state.mux.stats()))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn reject_non_get(req: Request, next: Next) -> Response {
    if req.method() != Method::GET {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    next.run(req).await
}

async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let remote = remote_addr(req.extensions());
    let resp = next.run(req).await;
    info!(
        %method,
        %uri,
        remote_addr = %remote,
        status = resp.status().as_u16(),
        "http request"
    );
    resp
}
