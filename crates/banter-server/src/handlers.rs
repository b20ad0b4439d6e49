//! Connection and upload handlers for the Banter server.
//!
//! This module binds the hub to its transport: a WebSocket session task per
//! chat client, multipart HTTP endpoints for out-of-band uploads, and a
//! download route serving the local object store.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::storage::LocalStore;
use anyhow::Result;
use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use banter_core::{ChatHub, ConnectionId, HubError, Outbox, UploadCoordinator, UploadError};
use banter_protocol::{codec, ClientFrame, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The chat hub.
    pub hub: ChatHub,
    /// Upload coordination over the local object store.
    pub uploads: UploadCoordinator,
    /// The object store itself, for serving downloads.
    pub store: Arc<LocalStore>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let store = Arc::new(LocalStore::new(&config.uploads.dir, config.public_base()));
        Self {
            hub: ChatHub::new(),
            uploads: UploadCoordinator::new(store.clone()),
            store,
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

    // Build router. Upload payloads have no size cap here; enforcement, if
    // any, belongs in front of the hub.
    let app = Router::new()
        .route(&config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/api/uploads/image", post(upload_handler))
        .route("/api/uploads/file", post(upload_handler))
        .route("/uploads/:name", get(download_handler))
        .layer(DefaultBodyLimit::disable())
        .with_state(state);

    // Bind and serve
    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr).await?;

    info!("Banter hub listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
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

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle one WebSocket chat session.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection_id = ConnectionId::generate();
    debug!(connection = %connection_id, "WebSocket connected");

    // The hub enqueues events here; this task drains them onto the socket,
    // so a slow client only ever stalls itself.
    let (outbox, mut events) = mpsc::unbounded_channel::<Arc<ServerEvent>>();
    state.hub.on_connect(connection_id.clone(), outbox.clone());

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            biased;

            // Drain hub events to the client.
            Some(event) = events.recv() => {
                match codec::encode(&event) {
                    Ok(text) => {
                        metrics::record_message(text.len(), "outbound");
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(connection = %connection_id, error = %e, "Failed to encode event");
                    }
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        metrics::record_message(text.len(), "inbound");
                        handle_frame(&text, &connection_id, &state, &outbox);
                    }
                    Some(Ok(Message::Binary(_))) => {
                        // Chat frames are text; binary payloads belong on
                        // the upload endpoints.
                        warn!(connection = %connection_id, "Ignoring binary frame");
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

    if state.hub.registry().identity_of(&connection_id).is_some() {
        metrics::record_presence_broadcast();
    }
    state.hub.on_disconnect(&connection_id);
    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Decode one inbound text frame and dispatch it to the hub.
///
/// A malformed or rejected frame is reported back on this connection's own
/// outbox only; it never disturbs the session loop or other clients.
fn handle_frame(text: &str, connection_id: &ConnectionId, state: &AppState, outbox: &Outbox) {
    let frame = match codec::decode(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(connection = %connection_id, error = %e, "Undecodable frame");
            metrics::record_error("protocol");
            let _ = outbox.send(Arc::new(ServerEvent::error(format!("Bad frame: {e}"))));
            return;
        }
    };

    match frame {
        ClientFrame::Register { username } => {
            match state.hub.register(connection_id, &username) {
                Ok(()) => metrics::record_presence_broadcast(),
                Err(e @ HubError::InvalidIdentity) => {
                    warn!(connection = %connection_id, "Register rejected");
                    metrics::record_error("register");
                    let _ = outbox.send(Arc::new(ServerEvent::error(e.to_string())));
                }
            }
        }
        ClientFrame::Message { sender, payload } => {
            let recipients = state.hub.send_message(&sender, &payload);
            debug!(connection = %connection_id, user = %sender, recipients, "Relayed message");
        }
        ClientFrame::Typing { sender } => {
            state.hub.typing(connection_id, &sender);
        }
        ClientFrame::StopTyping { sender } => {
            state.hub.stop_typing(connection_id, &sender);
        }
    }
}

/// Multipart upload handler shared by the image and file endpoints.
///
/// Streams the `file` field through the upload coordinator; the payload is
/// never buffered whole. Responds `{"url": ...}` on success.
async fn upload_handler(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Response {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Malformed multipart upload");
                metrics::record_error("upload");
                return (StatusCode::BAD_REQUEST, "Malformed upload").into_response();
            }
        };

        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload").to_string();
        let payload = field
            .inspect(|chunk| {
                if let Ok(chunk) = chunk {
                    metrics::record_upload_bytes(chunk.len());
                }
            })
            .map(|chunk| chunk.map_err(std::io::Error::other))
            .boxed();

        return match state.uploads.upload(&filename, payload).await {
            Ok(artifact) => {
                metrics::record_upload();
                info!(original = %artifact.original_filename, stored = %artifact.stored_name, "Upload complete");
                axum::Json(serde_json::json!({ "url": artifact.url })).into_response()
            }
            Err(e @ UploadError::EmptyPayload) => {
                metrics::record_error("upload");
                (StatusCode::BAD_REQUEST, e.to_string()).into_response()
            }
            Err(UploadError::Payload(e)) => {
                warn!(error = %e, "Upload payload aborted");
                metrics::record_error("upload");
                (StatusCode::BAD_REQUEST, "Payload read failed").into_response()
            }
            Err(UploadError::Storage(e)) => {
                error!(error = %e, "Upload storage failure");
                metrics::record_error("upload");
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage failure").into_response()
            }
        };
    }

    (StatusCode::BAD_REQUEST, "No file").into_response()
}

/// Serve a stored upload back to clients.
async fn download_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    // Stored names are flat tokens; anything path-like is not ours.
    if name.contains('/') || name.contains("..") {
        return StatusCode::NOT_FOUND.into_response();
    }

    match state.store.read(&name).await {
        Ok(stream) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            Body::from_stream(stream),
        )
            .into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}
