//! WebSocket server: subscriber sockets and the gateway channel.
//!
//! | route     | direction | frames                              |
//! |-----------|-----------|-------------------------------------|
//! | `/ws`     | out       | `hello`, then every `nfc` and `ble` |
//! | `/stream` | out       | `hello`, then every relayed `uid`   |
//! | `/gw`     | in        | `uid` from authenticated gateways   |
//! | `/health` | -         | JSON status                         |

use crate::broadcast::Broadcaster;
use crate::event::{Channel, Frame};
use crate::source::gateway::{GatewayRelay, PresentedToken, RelayError, TOKEN_HEADER, TOKEN_QUERY_PARAM};
use axum::Json;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

static NEXT_CONNECTION_ID: AtomicUsize = AtomicUsize::new(1);

/// Shared state of every route.
#[derive(Debug, Clone)]
pub struct AppState {
    pub broadcaster: Broadcaster,
    pub relay: GatewayRelay,
}

/// JSON body of a refused request.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let error = match self {
            RelayError::Unauthorized => "unauthorized",
            RelayError::NotConfigured => "gateway_disabled",
        };
        let body = ErrorResponse {
            error,
            message: self.to_string(),
        };
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(public_handler))
        .route("/stream", get(stream_handler))
        .route("/gw", get(gateway_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "relay listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn public_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    // Subscribe before the upgrade so nothing published after the hello is missed.
    let rx = state.broadcaster.subscribe(Channel::Public);
    ws.on_upgrade(move |socket| subscriber_socket(socket, rx, Channel::Public))
}

async fn stream_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let rx = state.broadcaster.subscribe(Channel::Stream);
    ws.on_upgrade(move |socket| subscriber_socket(socket, rx, Channel::Stream))
}

async fn gateway_handler(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let presented = PresentedToken {
        credential: bearer_token(&headers),
        query: query.get(TOKEN_QUERY_PARAM).map(String::as_str),
        header: headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()),
    };
    if let Err(e) = state.relay.authorize(&presented) {
        warn!(error = %e, "gateway connection refused");
        return e.into_response();
    }

    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| gateway_socket(socket, state.relay)),
        Err(rejection) => rejection.into_response(),
    }
}

/// Token from an `Authorization: Bearer <token>` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), axum::Error> {
    match frame.to_json() {
        Ok(json) => socket.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!(error = %e, "failed to encode frame");
            Ok(())
        }
    }
}

async fn subscriber_socket(
    mut socket: WebSocket,
    mut frames: broadcast::Receiver<Arc<Frame>>,
    channel: Channel,
) {
    let connection = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
    info!(connection, ?channel, "subscriber connected");

    if send_frame(&mut socket, &Frame::hello()).await.is_ok() {
        loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Ok(frame) => {
                        if send_frame(&mut socket, &frame).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(connection, skipped, "subscriber lagging, frames dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
                message = socket.recv() => match message {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    info!(connection, "subscriber disconnected");
}

async fn gateway_socket(mut socket: WebSocket, relay: GatewayRelay) {
    let connection = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
    info!(connection, "gateway connected");

    while let Some(message) = socket.recv().await {
        match message {
            Ok(Message::Text(text)) => {
                relay.handle_message(text.as_str());
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(connection, error = %e, "gateway socket error");
                break;
            }
        }
    }

    info!(connection, "gateway disconnected");
}
