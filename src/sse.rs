//! SSE Transport
//!
//! HTTP transport for the MCP protocol using Server-Sent Events, mirroring
//! the reference SSE handshake: `GET /sse` opens the event stream and
//! announces a per-session message endpoint via an `endpoint` event, then
//! `POST /messages?sessionId=...` carries JSON-RPC requests. Each POST is
//! acknowledged with `202 Accepted` and the JSON-RPC response is delivered
//! asynchronously as a `message` event on the stream.

use axum::{
    extract::{Query, State},
    http::{header, Method, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Router,
};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{mpsc, RwLock};
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::mcp::{McpRequest, McpResponse, McpServer};

/// Buffered responses per session before POST dispatch backpressures
const SESSION_CHANNEL_CAPACITY: usize = 32;

/// Active SSE sessions, keyed by the uuid announced in the `endpoint` event
type SessionMap = Arc<RwLock<HashMap<String, mpsc::Sender<McpResponse>>>>;

/// Type alias for boxed SSE stream
type BoxedSseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

/// Shared state for the SSE transport handlers
#[derive(Clone)]
pub struct SseState {
    server: McpServer,
    sessions: SessionMap,
}

impl SseState {
    fn new(server: McpServer) -> Self {
        Self {
            server,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Open a new session: allocate an id and a response channel
    async fn register(&self) -> (String, mpsc::Receiver<McpResponse>) {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);

        let mut sessions = self.sessions.write().await;
        sessions.insert(id.clone(), tx);

        (id, rx)
    }

    /// Look up the response channel for a session
    async fn sender(&self, session_id: &str) -> Option<mpsc::Sender<McpResponse>> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).cloned()
    }

    /// Number of live sessions
    async fn session_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }
}

/// Removes the session from the registry when the event stream is dropped,
/// i.e. when the client disconnects.
struct SessionGuard {
    session_id: String,
    sessions: SessionMap,
}

impl SessionGuard {
    fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let sessions = self.sessions.clone();
        let session_id = std::mem::take(&mut self.session_id);
        tokio::spawn(async move {
            sessions.write().await.remove(&session_id);
            debug!("SSE session {} closed", session_id);
        });
    }
}

/// Query parameters for POST /messages
#[derive(Debug, Deserialize)]
struct MessageParams {
    #[serde(rename = "sessionId")]
    session_id: String,
}

/// GET /sse - open the event stream for a new session
///
/// The first event is `endpoint` carrying the relative URL the client must
/// POST its JSON-RPC requests to. Every subsequent `message` event is a
/// JSON-RPC response.
async fn sse_handler(State(state): State<SseState>) -> Response {
    let (session_id, rx) = state.register().await;
    info!("SSE session {} connected", session_id);

    let endpoint = format!("/messages?sessionId={}", session_id);
    let guard = SessionGuard {
        session_id,
        sessions: state.sessions.clone(),
    };

    let announce = stream::once(async move {
        Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint))
    });

    // The guard lives inside the stream closure so cleanup runs whenever
    // the connection ends, including mid-request disconnects.
    let responses = ReceiverStream::new(rx).map(move |response| {
        debug!("SSE session {} delivering response", guard.session_id());
        Ok::<_, Infallible>(
            Event::default()
                .event("message")
                .data(serde_json::to_string(&response).unwrap_or_default()),
        )
    });

    let boxed: BoxedSseStream = Box::pin(announce.chain(responses));
    Sse::new(boxed)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(30))
                .text("keep-alive"),
        )
        .into_response()
}

/// POST /messages?sessionId=... - submit a JSON-RPC request
///
/// Returns `202 Accepted` immediately; the response arrives on the session's
/// event stream. Dispatch runs on its own task so concurrent requests on one
/// session do not serialize behind a slow tool call.
async fn message_handler(
    State(state): State<SseState>,
    Query(params): Query<MessageParams>,
    body: String,
) -> Response {
    let Some(tx) = state.sender(&params.session_id).await else {
        warn!("Rejected message for unknown SSE session {}", params.session_id);
        return (StatusCode::NOT_FOUND, "Unknown sessionId").into_response();
    };

    let request: McpRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Invalid JSON-RPC payload on /messages: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid JSON-RPC request").into_response();
        }
    };

    let server = state.server.clone();
    tokio::spawn(async move {
        let response = server.handle_request(request).await;
        if response.is_notification() {
            return;
        }
        if tx.send(response).await.is_err() {
            debug!("SSE client disconnected before response delivery");
        }
    });

    StatusCode::ACCEPTED.into_response()
}

/// SSE transport server
pub struct SseServer {
    host: String,
    port: u16,
    state: SseState,
}

impl SseServer {
    /// Create a new SSE server wrapping the given MCP handler
    pub fn new(config: &Config, server: McpServer) -> Self {
        Self {
            host: config.sse_host.clone(),
            port: config.sse_port,
            state: SseState::new(server),
        }
    }

    /// Build the router with all routes and middleware
    fn build_router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE]);

        Router::new()
            .route("/sse", get(sse_handler))
            .route("/messages", post(message_handler))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the server and run until shutdown signal
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let router = self.build_router();

        info!("Starting MCP SSE server on {}", addr);
        info!("Event stream at http://{}/sse", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("SSE server shut down gracefully");
        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
