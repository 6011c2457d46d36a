//! Gateway service: the public server and the admin server.
//!
//! | server | routes |
//! |---|---|
//! | public (`http`, default 127.0.0.1:2222) | `POST /call`, `GET /streaming`, `GET /health` |
//! | admin (`admin`, default 127.0.0.1:2223) | see [`crate::admin`] |
//!
//! Both stop when the shutdown token is cancelled; streaming sessions are
//! cancelled with it.

use crate::admin::build_admin_router;
use crate::dispatch::{dispatch_call, CallContext};
use crate::domain::config::GatewayConfig;
use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::request::{Procedure, RpcCall};
use crate::middleware::{create_cors_layer, GatewayMetrics, RequestTimer, TracingLayer};
use crate::registry::{key_fingerprint, Registry};
use crate::ws::WebSocketHandler;
use axum::{
    extract::{ws::WebSocketUpgrade, DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tracing::{debug, error, info};

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub config: Arc<GatewayConfig>,
    pub metrics: Arc<GatewayMetrics>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: GatewayConfig, registry: Arc<Registry>) -> Self {
        Self {
            registry,
            config: Arc::new(config),
            metrics: Arc::new(GatewayMetrics::new()),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Gateway service
pub struct GatewayService {
    state: AppState,
}

impl GatewayService {
    /// Validate `config` and wrap the registry.
    pub fn new(config: GatewayConfig, registry: Arc<Registry>) -> GatewayResult<Self> {
        config
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;
        Ok(Self {
            state: AppState::new(config, registry),
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.state.metrics)
    }

    /// Token that stops both servers when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        self.state.shutdown.cancel();
    }

    pub fn http_router(&self) -> Router {
        build_http_router(self.state.clone())
    }

    pub fn admin_router(&self) -> Router {
        build_admin_router(self.state.clone())
    }

    /// Bind the configured addresses and serve until shutdown.
    pub async fn start(&self) -> GatewayResult<()> {
        let config = &self.state.config;
        let http = bind(config.http_addr()).await?;
        let admin = if config.admin.enabled {
            Some(bind(config.admin_addr()).await?)
        } else {
            None
        };
        self.serve(http, admin).await
    }

    /// Serve on already-bound listeners until shutdown or a server error.
    pub async fn serve(&self, http: TcpListener, admin: Option<TcpListener>) -> GatewayResult<()> {
        let shutdown = self.shutdown_token();

        info!(addr = %local_addr(&http), "Starting HTTP server");
        let http_task = spawn_server(http, self.http_router(), shutdown.clone());

        let admin_task = admin.map(|listener| {
            info!(addr = %local_addr(&listener), "Starting Admin server");
            spawn_server(listener, self.admin_router(), shutdown.clone())
        });

        info!(
            connections = self.state.registry.connection_count(),
            "Gateway started"
        );

        let result = join_server("HTTP", http_task).await;

        // the admin server never outlives the public one
        shutdown.cancel();
        if let Some(task) = admin_task {
            join_server("Admin", task).await?;
        }

        info!("Gateway stopped");
        result
    }
}

async fn bind(addr: SocketAddr) -> GatewayResult<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::Bind(format!("{}: {}", addr, e)))
}

fn local_addr(listener: &TcpListener) -> String {
    listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

fn spawn_server(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<std::io::Result<()>> {
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
    })
}

async fn join_server(
    name: &str,
    task: tokio::task::JoinHandle<std::io::Result<()>>,
) -> GatewayResult<()> {
    match task.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!(server = name, error = %e, "Server error");
            Err(GatewayError::Internal(format!("{} server: {}", name, e)))
        }
        Err(e) => {
            error!(server = name, error = %e, "Server task failed");
            Err(GatewayError::Internal(format!("{} server task: {}", name, e)))
        }
    }
}

/// Public router
pub fn build_http_router(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TracingLayer::new())
        .layer(create_cors_layer(&state.config.cors));

    Router::new()
        .route("/call", post(handle_call))
        .route("/streaming", get(handle_streaming))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(state.config.limits.max_request_size))
        .layer(middleware)
        .with_state(state)
}

/// `POST /call`: one query or publish under the configured deadline.
async fn handle_call(State(state): State<AppState>, body: Bytes) -> Response {
    let call = match RpcCall::from_slice(&body) {
        Ok(call) => call,
        Err(e) => {
            state.metrics.record_call(Procedure::Unknown, Err(&e), 0);
            return e.into_response();
        }
    };

    let timer = RequestTimer::new(Arc::clone(&state.metrics), call.proc);
    let result = run_call(&state, &call).await;
    timer.finish(&result);

    match result {
        Ok(body) if body.is_empty() => StatusCode::OK.into_response(),
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            debug!(
                key_id = %key_fingerprint(&call.key),
                proc = %call.proc,
                error = %e,
                "Call failed"
            );
            e.into_response()
        }
    }
}

async fn run_call(state: &AppState, call: &RpcCall) -> GatewayResult<Bytes> {
    let (record, conn) = state.registry.resolve(&call.key)?;
    let ctx = CallContext::from_token(state.shutdown.child_token())
        .deadline_in(state.config.timeouts.call);
    dispatch_call(&ctx, conn.as_ref(), &record, call).await
}

/// `GET /streaming`
async fn handle_streaming(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.max_message_size(state.config.websocket.max_message_size)
        .on_upgrade(move |socket| WebSocketHandler::new(state).handle(socket))
}

pub(crate) async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "capgate",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.registry.connection_count(),
    }))
}
