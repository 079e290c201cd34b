//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create Axum Router that hands every request to registered listeners
//! - Wire up middleware (tracing, timeout)
//! - Expose listener registration (`on`, `add_listener`) as joinpoints
//! - Serve until the shutdown signal fires
//!
//! # Design Decisions
//! - Listeners are plain callbacks; they end the response whenever their
//!   (possibly spawned) work is done
//! - A response never ended inside the request timeout becomes a 408 from
//!   the timeout layer; a response dropped unended becomes a 500

use std::collections::HashMap;
use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::aspect::{Interceptable, Joinpoint, TargetId};
use crate::config::ServerConfig;
use crate::http::response::{IncomingRequest, ServerResponse};

/// Event carrying each incoming request.
pub const REQUEST_EVENT: &str = "request";

/// Callback run for every incoming request.
pub type RequestListener = Arc<dyn Fn(IncomingRequest, ServerResponse) + Send + Sync>;

/// Arguments of [`HttpServer::on`] and [`HttpServer::add_listener`].
pub struct ListenerArgs {
    pub event: String,
    pub listener: Option<RequestListener>,
}

impl std::fmt::Debug for ListenerArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerArgs")
            .field("event", &self.event)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

#[derive(Default)]
struct ListenerTable {
    listeners: RwLock<HashMap<String, Vec<RequestListener>>>,
}

impl ListenerTable {
    fn add(&self, event: &str, listener: RequestListener) {
        let mut listeners = self.listeners.write().expect("listener table poisoned");
        listeners.entry(event.to_string()).or_default().push(listener);
    }

    fn snapshot(&self, event: &str) -> Vec<RequestListener> {
        let listeners = self.listeners.read().expect("listener table poisoned");
        listeners.get(event).cloned().unwrap_or_default()
    }
}

/// Application state injected into the dispatch handler.
#[derive(Clone)]
struct AppState {
    table: Arc<ListenerTable>,
    max_body_bytes: usize,
}

/// Event-dispatching HTTP server whose listener registration accepts advice.
pub struct HttpServer {
    id: TargetId,
    config: ServerConfig,
    table: Arc<ListenerTable>,
    on: Joinpoint<HttpServer>,
    add_listener: Joinpoint<HttpServer>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            id: TargetId::new(),
            config,
            table: Arc::new(ListenerTable::default()),
            on: Joinpoint::new("on"),
            add_listener: Joinpoint::new("add_listener"),
        }
    }

    /// Register `listener` for `event`.
    ///
    /// The only event ever dispatched is [`REQUEST_EVENT`]; listeners for
    /// any other event are ignored.
    pub fn on<F>(&self, event: &str, listener: F)
    where
        F: Fn(IncomingRequest, ServerResponse) + Send + Sync + 'static,
    {
        let args = ListenerArgs {
            event: event.to_string(),
            listener: Some(Arc::new(listener)),
        };
        self.on.invoke(self, args, |args| self.register(args))
    }

    /// Same as [`HttpServer::on`].
    pub fn add_listener<F>(&self, event: &str, listener: F)
    where
        F: Fn(IncomingRequest, ServerResponse) + Send + Sync + 'static,
    {
        let args = ListenerArgs {
            event: event.to_string(),
            listener: Some(Arc::new(listener)),
        };
        self.add_listener.invoke(self, args, |args| self.register(args))
    }

    fn register(&self, args: &mut ListenerArgs) {
        if args.event != REQUEST_EVENT {
            tracing::warn!(server_id = %self.id, event = %args.event, "Only \"request\" is dispatched, listener ignored");
            return;
        }
        if let Some(listener) = args.listener.clone() {
            self.table.add(&args.event, listener);
            tracing::debug!(server_id = %self.id, event = %args.event, "Listener registered");
        }
    }

    /// Number of listeners registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.table.snapshot(event).len()
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        let state = AppState {
            table: self.table.clone(),
            max_body_bytes: self.config.max_body_bytes,
        };
        Router::new()
            .route("/{*path}", any(dispatch_handler))
            .route("/", any(dispatch_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(Duration::from_secs(self.config.request_timeout_secs))),
            )
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        &self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            server_id = %self.id,
            "HTTP server starting"
        );

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl Interceptable for HttpServer {
    type Args = ListenerArgs;
    type Output = ();

    fn target_id(&self) -> TargetId {
        self.id
    }

    fn joinpoint(&self, method: &str) -> Option<&Joinpoint<Self>> {
        match method {
            "on" => Some(&self.on),
            "add_listener" => Some(&self.add_listener),
            _ => None,
        }
    }
}

/// Buffers the request, emits it to every `"request"` listener and waits
/// for one of them to end the response.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let listeners = state.table.snapshot(REQUEST_EVENT);
    if listeners.is_empty() {
        tracing::warn!(path = %parts.uri.path(), "No request listener registered");
        return (StatusCode::NOT_FOUND, "No request listener registered").into_response();
    }

    let incoming = IncomingRequest {
        method: parts.method,
        url: parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string()),
        headers: parts.headers,
        body,
        remote_addr,
    };
    let (response, receiver) = ServerResponse::new();

    for listener in listeners {
        let req = incoming.clone();
        let res = response.clone();
        if catch_unwind(AssertUnwindSafe(|| listener(req, res))).is_err() {
            tracing::error!(url = %incoming.url, "Request listener panicked");
        }
    }
    drop(response);

    match receiver.await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(url = %incoming.url, "Response dropped without being ended");
            (StatusCode::INTERNAL_SERVER_ERROR, "Response was never ended").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn dispatches_to_request_listener() {
        let server = HttpServer::new(ServerConfig::default());
        server.on(REQUEST_EVENT, |req, res| {
            res.set_header("x-url", &req.url);
            res.end(format!("{} {}", req.method, req.url));
        });
        server.on("close", |_, _| {});
        assert_eq!(server.listener_count(REQUEST_EVENT), 1);
        assert_eq!(server.listener_count("close"), 0);

        let response = server
            .router()
            .oneshot(Request::builder().uri("/items?id=4").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-url"], "/items?id=4");
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"GET /items?id=4");
    }

    #[tokio::test]
    async fn async_listener_ends_later() {
        let server = HttpServer::new(ServerConfig::default());
        server.add_listener(REQUEST_EVENT, |_, res| {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                res.set_status(StatusCode::ACCEPTED);
                res.end("later");
            });
        });

        let response = server
            .router()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn no_listener_is_404_and_unended_is_500() {
        let server = HttpServer::new(ServerConfig::default());
        let response = server
            .router()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        server.on(REQUEST_EVENT, |_, res| drop(res));
        let response = server
            .router()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
