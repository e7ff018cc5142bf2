//! Connection handlers for the Easel server.
//!
//! This module handles the connection lifecycle: the join handshake on the
//! WebSocket upgrade, the per-connection message loop, and disconnect
//! cleanup.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use bytes::BytesMut;
use easel_core::{validate_room_id, RegistryConfig, RoomRegistry};
use easel_protocol::{codec, ClientFrame, ProtocolError, ServerFrame};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The room registry.
    pub registry: RoomRegistry,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let registry_config = RegistryConfig {
            max_rooms: config.limits.max_rooms,
            room_capacity: config.room.capacity,
            undo_strategy: config.room.undo,
        };

        Self {
            registry: RoomRegistry::with_config(registry_config),
            config,
        }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    // Build router
    let app = Router::new()
        .route(&config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Easel server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}?room=<id>&name=<name>",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Connect-time parameters, carried as query parameters on the upgrade
/// request the way socket.io clients pass their handshake query.
#[derive(Debug, Deserialize)]
struct JoinParams {
    room: Option<String>,
    name: Option<String>,
}

/// Resolve the room id from the handshake query.
///
/// Applies the same rules the registry enforces, so an unacceptable room
/// id is caught while a plain HTTP response is still possible.
fn resolve_room(room: Option<String>) -> Result<String, &'static str> {
    let room = room.ok_or("missing room id")?;
    validate_room_id(&room)?;
    Ok(room)
}

/// WebSocket upgrade handler.
///
/// A missing or invalid room id is fatal to the connection: the upgrade is
/// refused with HTTP 400 before any room state is touched.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<JoinParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let room = match resolve_room(params.room) {
        Ok(room) => room,
        Err(reason) => {
            debug!(reason, "Rejected connection at handshake");
            return (StatusCode::BAD_REQUEST, reason).into_response();
        }
    };
    let name = params.name.unwrap_or_else(|| "anonymous".to_string());

    ws.on_upgrade(move |socket| handle_websocket(socket, state, room, name))
        .into_response()
}

/// Handle a WebSocket connection for its whole lifetime in one room.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>, room: String, name: String) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    // Server-assigned identity, stable for the connection lifetime. This is
    // the author tag on every event the connection produces.
    let connection_id = format!(
        "conn_{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    );

    debug!(connection = %connection_id, room = %room, name = %name, "WebSocket connected");

    // Split the WebSocket
    let (mut sender, mut receiver) = socket.split();

    // Join the room: subscription and history snapshot are taken under the
    // room's lock, so the replay below and the live stream from room_rx
    // partition the room's events exactly.
    let joined = match state.registry.join(&connection_id, &room, &name) {
        Ok(joined) => joined,
        Err(e) => {
            warn!(connection = %connection_id, room = %room, error = %e, "Join refused");
            metrics::record_error("join");
            let _ = sender.close().await;
            return;
        }
    };
    let mut room_rx = joined.receiver;
    metrics::set_active_rooms(state.registry.stats().room_count);

    // Join ack, then full history replay, before any live event.
    let ack = ServerFrame::joined(&connection_id, &room);
    let history = ServerFrame::history(joined.history);
    if send_frame(&mut sender, &ack).await.is_err()
        || send_frame(&mut sender, &history).await.is_err()
    {
        error!(connection = %connection_id, "Failed to send join replay");
        state.registry.leave(&connection_id, &room);
        return;
    }

    // Read buffer for partial frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    // Message processing loop
    loop {
        tokio::select! {
            biased;

            // Receive room broadcasts; audience filtering happens here so
            // a sender never gets its own draw or cursor echo back.
            msg = room_rx.recv() => {
                match msg {
                    Ok(msg) => {
                        if !msg.is_for(&connection_id) {
                            continue;
                        }
                        metrics::record_message(msg.payload_size(), "outbound");
                        if sender.send(Message::Binary(msg.payload.to_vec())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Slow consumer: it missed broadcasts but must not
                        // stall the room. Keep going with what remains.
                        warn!(connection = %connection_id, skipped, "Receiver lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        read_buffer.extend_from_slice(&data);

                        if !drain_frames(&mut read_buffer, &connection_id, &room, &state, &mut sender).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(_))) => {
                        // The protocol is binary; a text frame is malformed
                        // input and is dropped without closing.
                        warn!(connection = %connection_id, "Dropped text frame");
                        metrics::record_error("protocol");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup: membership only. The log keeps any open stroke as-is and no
    // peer is notified.
    state.registry.leave(&connection_id, &room);

    debug!(connection = %connection_id, room = %room, "WebSocket disconnected");
}

/// Decode and dispatch every complete frame in the read buffer.
///
/// Returns `false` when the connection should close (delivery to this
/// socket failed, or the stream cannot be resynced).
async fn drain_frames(
    read_buffer: &mut BytesMut,
    connection_id: &str,
    room: &str,
    state: &Arc<AppState>,
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
) -> bool {
    // The configured limit is enforced on the declared frame length, so an
    // over-limit frame is refused before its body is buffered and the
    // stream is never left mid-frame by a drop.
    let max_frame_size = state.config.limits.max_message_size;

    loop {
        let before = read_buffer.len();
        match codec::decode_from_limited::<ClientFrame>(read_buffer, max_frame_size) {
            Ok(Some(frame)) => {
                metrics::record_message(before - read_buffer.len(), "inbound");
                if let Err(e) = handle_frame(&frame, connection_id, room, state, sender).await {
                    error!(connection = %connection_id, error = %e, "Frame handling error");
                    return false;
                }
            }
            Ok(None) => return true,
            Err(ProtocolError::Decode(e)) => {
                // Malformed frame body: the framing layer already consumed
                // it, so drop it and stay open.
                warn!(connection = %connection_id, error = %e, "Dropped malformed frame");
                metrics::record_error("protocol");
            }
            Err(e) => {
                // Oversized or otherwise unrecoverable: the stream cannot
                // be resynced past it.
                warn!(connection = %connection_id, error = %e, "Unrecoverable protocol error");
                metrics::record_error("protocol");
                return false;
            }
        }
    }
}

/// Handle a decoded frame.
///
/// Registry-level failures (unknown room, membership races) drop the frame
/// and keep the connection open; only failures to deliver on this socket
/// propagate as errors.
async fn handle_frame(
    frame: &ClientFrame,
    connection_id: &str,
    room: &str,
    state: &Arc<AppState>,
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
) -> Result<()> {
    match frame {
        // The inbound `author` field is a client claim and is discarded:
        // the registry tags events with the connection id.
        ClientFrame::Draw {
            kind,
            x,
            y,
            color,
            width,
            author: _,
        } => {
            match state
                .registry
                .draw(connection_id, room, *kind, *x, *y, color.clone(), *width)
            {
                Ok(_) => metrics::record_event(),
                Err(e) => {
                    warn!(connection = %connection_id, room = %room, error = %e, "Draw dropped");
                    metrics::record_error("draw");
                }
            }
        }

        ClientFrame::Cursor { x, y, author: _ } => {
            if let Err(e) = state.registry.cursor(connection_id, room, *x, *y) {
                warn!(connection = %connection_id, room = %room, error = %e, "Cursor dropped");
                metrics::record_error("cursor");
            }
        }

        ClientFrame::Chat { text } => {
            if let Err(e) = state.registry.chat(connection_id, room, text.clone()) {
                warn!(connection = %connection_id, room = %room, error = %e, "Chat dropped");
                metrics::record_error("chat");
            }
        }

        ClientFrame::Undo => match state.registry.undo(connection_id, room) {
            Ok(outcome) => {
                debug!(connection = %connection_id, room = %room, ?outcome, "Undo");
                metrics::record_undo(outcome.changed());
            }
            Err(e) => {
                warn!(connection = %connection_id, room = %room, error = %e, "Undo dropped");
                metrics::record_error("undo");
            }
        },

        ClientFrame::Clear => match state.registry.clear(connection_id, room) {
            Ok(_) => metrics::record_clear(),
            Err(e) => {
                warn!(connection = %connection_id, room = %room, error = %e, "Clear dropped");
                metrics::record_error("clear");
            }
        },

        ClientFrame::Ping { timestamp } => {
            send_frame(sender, &ServerFrame::pong(*timestamp)).await?;
        }
    }

    Ok(())
}

/// Send a frame to the WebSocket.
async fn send_frame(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<()> {
    let data = codec::encode(frame)?;
    metrics::record_message(data.len(), "outbound");
    sender.send(Message::Binary(data.to_vec())).await?;
    Ok(())
}
