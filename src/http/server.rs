//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the single tunnel handler
//! - Wire up middleware (timeout, request ID, tracing, static headers, body limit)
//! - Serve plain HTTP or HTTPS with the same router
//! - Tie the reaper and session cleanup to the server lifecycle

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::DefaultBodyLimit, routing::any, Router};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::TunnelConfig;
use crate::http::response::with_disguise_headers;
use crate::http::tunnel::{tunnel_handler, AppState};
use crate::tunnel::{Dialer, ProcessDialer, Reaper, SessionStore, TcpDialer};

/// HTTP(S) front end of the tunnel.
pub struct HttpServer {
    router: Router,
    config: TunnelConfig,
    sessions: Arc<SessionStore>,
}

impl HttpServer {
    /// Create a server whose dialer follows the configuration: a spawned
    /// application when `upstream.app_command` is set, TCP otherwise.
    pub fn new(config: TunnelConfig) -> Self {
        let dialer = dialer_from_config(&config);
        Self::with_dialer(config, dialer)
    }

    /// Create a server with an explicit dialer.
    pub fn with_dialer(config: TunnelConfig, dialer: Arc<dyn Dialer>) -> Self {
        let sessions = Arc::new(SessionStore::new(dialer));

        let state = AppState {
            sessions: sessions.clone(),
            allow_direct: config.access.allow_direct,
            poll: config.polling.limits(),
            max_body_size: config.security.max_body_size,
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            sessions,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &TunnelConfig, state: AppState) -> Router {
        let router = Router::new()
            .route("/{*path}", any(tunnel_handler))
            .route("/", any(tunnel_handler))
            .with_state(state)
            .layer(DefaultBodyLimit::max(config.security.max_body_size));

        with_disguise_headers(router)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The session store shared with the handler.
    pub fn sessions(&self) -> Arc<SessionStore> {
        self.sessions.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    /// Serve plain HTTP on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let reaper = Reaper::new(self.sessions.clone(), &self.config.sessions)
            .spawn(shutdown.resubscribe());

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await;

        Self::finish(&self.sessions, reaper).await;
        tracing::info!("HTTP server stopped");
        served
    }

    /// Serve HTTPS on `listener` until `shutdown` fires.
    pub async fn run_tls(
        self,
        listener: TcpListener,
        tls: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTPS server starting");
        let listener = listener.into_std()?;

        let reaper = Reaper::new(self.sessions.clone(), &self.config.sessions)
            .spawn(shutdown.resubscribe());

        let handle = axum_server::Handle::new();
        let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            shutdown_handle.graceful_shutdown(Some(grace));
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let served = axum_server::from_tcp_rustls(listener, tls)
            .handle(handle)
            .serve(app)
            .await;

        Self::finish(&self.sessions, reaper).await;
        tracing::info!("HTTPS server stopped");
        served
    }

    async fn finish(sessions: &SessionStore, reaper: tokio::task::JoinHandle<()>) {
        if let Err(e) = reaper.await {
            tracing::error!(error = %e, "Session reaper task failed");
        }
        let closed = sessions.close_all().await;
        tracing::info!(closed, "Closed remaining sessions");
    }
}

/// Pick the dialer for the configured backend mode.
pub fn dialer_from_config(config: &TunnelConfig) -> Arc<dyn Dialer> {
    if let Some(dialer) = config
        .upstream
        .app_command
        .as_deref()
        .and_then(ProcessDialer::from_command_line)
    {
        tracing::info!(command = ?config.upstream.app_command, "Application backend mode");
        return Arc::new(dialer);
    }
    Arc::new(TcpDialer::new(Duration::from_secs(
        config.upstream.connect_timeout_secs,
    )))
}
