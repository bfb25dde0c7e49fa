//! The tunnel request handler.
//!
//! One HTTP request performs one step of a session:
//!
//! ```text
//! identity → access check → destination → session id → [POST: read body]
//!     → get_or_create → touch
//!     ├─ X-Connection-Close: true → close session, empty 200
//!     ├─ POST                     → write body upstream, empty 200
//!     └─ anything else            → drain upstream, hex body (or empty) 200
//! ```
//!
//! The step runs on its own task, so a client that goes away mid-request does
//! not cut an upstream read or write short.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Method, Request, StatusCode},
    response::{IntoResponse, Response},
};

use crate::error::TunnelError;
use crate::http::request::{
    encoded_destination, request_id, session_id, wants_close, ClientIdentity,
};
use crate::observability::metrics;
use crate::tunnel::{store::short_id, Destination, PollLimits, SessionStore};

/// Application state injected into the handler.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub allow_direct: bool,
    pub poll: PollLimits,
    pub max_body_size: usize,
}

/// Entry point for every request, whatever its path.
pub async fn tunnel_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let request_id = request_id(request.headers()).to_string();

    let result = match tokio::spawn(handle(state, request)).await {
        Ok(result) => result,
        Err(e) => Err(TunnelError::Task(e)),
    };

    let response = match result {
        Ok(response) => response,
        Err(e) => {
            let status = e.status();
            if status.is_server_error() {
                tracing::warn!(request_id = %request_id, status = %status, error = %e, "Tunnel request failed");
            } else {
                tracing::debug!(request_id = %request_id, status = %status, error = %e, "Tunnel request rejected");
            }
            e.into_response()
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

async fn handle(state: AppState, request: Request<Body>) -> Result<Response, TunnelError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (parts, body) = request.into_parts();
    let headers = &parts.headers;

    let client = ClientIdentity::resolve(headers, peer);
    tracing::debug!(
        request_id = %request_id(headers),
        method = %parts.method,
        path = %parts.uri.path(),
        client = %client.address,
        "Tunnel request"
    );

    if !client.is_fronted() && !state.allow_direct {
        return Err(TunnelError::IdentityMissing);
    }

    let encoded = encoded_destination(headers).ok_or(TunnelError::MissingDestination)?;
    let destination = Destination::decode(encoded)?;
    let session_id = session_id(headers).ok_or(TunnelError::MissingSessionId)?;
    let close = wants_close(headers);

    // The body is read before the session is locked, so a slow upload never
    // holds the session.
    let upload = if parts.method == Method::POST && !close {
        let data = axum::body::to_bytes(body, state.max_body_size)
            .await
            .map_err(TunnelError::Body)?;
        Some(data)
    } else {
        None
    };

    let mut session = state.sessions.get_or_create(&session_id, &destination).await?;
    session.touch();

    if close {
        state.sessions.close(session).await;
        return Ok(StatusCode::OK.into_response());
    }

    if let Some(data) = upload {
        if !data.is_empty() {
            session.write(&data).await.map_err(TunnelError::Write)?;
            metrics::record_bytes("upstream", data.len());
            tracing::debug!(
                session = %short_id(&session_id),
                bytes = data.len(),
                "Wrote to destination"
            );
        }
        return Ok(StatusCode::OK.into_response());
    }

    let data = session.drain(&state.poll).await.map_err(TunnelError::Read)?;
    if data.is_empty() {
        tracing::trace!(session = %short_id(&session_id), "No data to send");
        return Ok(StatusCode::OK.into_response());
    }

    let encoded = hex::encode(&data);
    metrics::record_bytes("downstream", data.len());
    tracing::debug!(
        session = %short_id(&session_id),
        bytes = data.len(),
        encoded = encoded.len(),
        "Sending destination data"
    );
    Ok((StatusCode::OK, encoded).into_response())
}
