//! Response types on both sides of the wire.
//!
//! # Responsibilities
//! - Carry a buffered upstream response back to client callers
//! - Let server listeners build and end a response asynchronously
//! - Signal `"end"` when a server response is finished
//!
//! # Design Decisions
//! - `"end"` fires before the response is handed to the connection, so
//!   end-of-request work is done by the time the peer sees the reply
//! - Ending twice is a logged no-op

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Weak};

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Response, StatusCode};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::aspect::Emitter;

/// Event emitted when a response is complete.
pub const END_EVENT: &str = "end";

/// A buffered response received by the client.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Why an outgoing request did not produce a response.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("invalid request target: {0}")]
    InvalidTarget(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("request task ended without a result")]
    Dropped,
}

/// Outcome of an outgoing request.
pub type ClientResult = Result<ClientResponse, ClientError>;

/// A request received by the server, body already buffered.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub method: Method,
    /// Path and query as received, e.g. `/search?q=x`.
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub remote_addr: Option<SocketAddr>,
}

struct ResponseState {
    status: StatusCode,
    headers: HeaderMap,
    sender: Option<oneshot::Sender<Response<Body>>>,
}

/// Reads a response's status without keeping the response alive.
#[derive(Clone)]
pub struct StatusHandle(Weak<Mutex<ResponseState>>);

impl StatusHandle {
    /// `None` once the response is gone.
    pub fn get(&self) -> Option<StatusCode> {
        let state = self.0.upgrade()?;
        let status = state.lock().expect("response mutex poisoned").status;
        Some(status)
    }
}

impl std::fmt::Debug for StatusHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StatusHandle").field(&self.get()).finish()
    }
}

/// The response a request listener writes.
///
/// Clones share state: any clone may end it, once.
#[derive(Clone)]
pub struct ServerResponse {
    state: Arc<Mutex<ResponseState>>,
    emitter: Emitter,
}

impl ServerResponse {
    /// A fresh response and the receiver the connection waits on.
    pub fn new() -> (Self, oneshot::Receiver<Response<Body>>) {
        let (tx, rx) = oneshot::channel();
        let response = Self {
            state: Arc::new(Mutex::new(ResponseState {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                sender: Some(tx),
            })),
            emitter: Emitter::new(),
        };
        (response, rx)
    }

    pub fn status(&self) -> StatusCode {
        self.state.lock().expect("response mutex poisoned").status
    }

    /// For `"end"` listeners; capturing a clone of the response there would
    /// keep an unended response alive forever.
    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle(Arc::downgrade(&self.state))
    }

    pub fn set_status(&self, status: StatusCode) {
        self.state.lock().expect("response mutex poisoned").status = status;
    }

    /// Set a header. Returns false if the name or value is invalid.
    pub fn set_header(&self, name: &str, value: &str) -> bool {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) else {
            return false;
        };
        self.state
            .lock()
            .expect("response mutex poisoned")
            .headers
            .insert(name, value);
        true
    }

    pub fn is_ended(&self) -> bool {
        self.state.lock().expect("response mutex poisoned").sender.is_none()
    }

    /// Events of this response (`"end"`).
    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    /// Finish the response with `body`. Returns false if it was already ended.
    pub fn end(&self, body: impl Into<Bytes>) -> bool {
        let (sender, status, headers) = {
            let mut state = self.state.lock().expect("response mutex poisoned");
            match state.sender.take() {
                Some(sender) => (sender, state.status, state.headers.clone()),
                None => {
                    tracing::debug!("Response already ended");
                    return false;
                }
            }
        };

        let mut response = Response::new(Body::from(body.into()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;

        self.emitter.emit(END_EVENT);

        if sender.send(response).is_err() {
            tracing::debug!(status = %status, "Connection gone before response was sent");
        }
        true
    }
}

impl std::fmt::Debug for ServerResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerResponse")
            .field("status", &self.status())
            .field("ended", &self.is_ended())
            .finish()
    }
}
