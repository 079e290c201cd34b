//! Interceptable HTTP client.
//!
//! # Responsibilities
//! - Issue requests described by a [`RequestTarget`]
//! - Report completion through an optional callback and an `"end"` event
//! - Expose `request` and `get` as joinpoints
//!
//! # Design Decisions
//! - Requests run on a spawned task that inherits the caller's execution
//!   context, so callbacks observe the caller's active span
//! - The callback runs and `"end"` fires before the result reaches
//!   [`ClientRequest::response`]

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{Method, Request, StatusCode};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::sync::oneshot;

use crate::aspect::{Emitter, Interceptable, Joinpoint, TargetId};
use crate::config::ClientConfig;
use crate::context;
use crate::http::request::{request_uri, RequestArgs, RequestOptions};
use crate::http::response::{ClientError, ClientResponse, ClientResult, END_EVENT};

/// Status code or error message of a finished request, readable by
/// `"end"` listeners that never see the result itself.
#[derive(Debug, Clone, Default)]
pub struct Outcome(Arc<OnceLock<Result<StatusCode, String>>>);

impl Outcome {
    pub fn get(&self) -> Option<&Result<StatusCode, String>> {
        self.0.get()
    }

    fn record(&self, result: &ClientResult) {
        let _ = self
            .0
            .set(result.as_ref().map(|r| r.status).map_err(|e| e.to_string()));
    }
}

/// Handle to a request in flight.
#[derive(Debug)]
pub struct ClientRequest {
    emitter: Emitter,
    outcome: Outcome,
    result: oneshot::Receiver<ClientResult>,
}

impl ClientRequest {
    /// Events of this request (`"end"`).
    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    /// Filled in before the callback runs and `"end"` fires.
    pub fn outcome(&self) -> Outcome {
        self.outcome.clone()
    }

    /// Wait for the outcome.
    pub async fn response(self) -> ClientResult {
        self.result.await.unwrap_or(Err(ClientError::Dropped))
    }
}

/// HTTP client whose `request` and `get` methods accept advice.
pub struct HttpClient {
    id: TargetId,
    client: Client<HttpConnector, Body>,
    max_body_bytes: usize,
    request: Joinpoint<HttpClient>,
    get: Joinpoint<HttpClient>,
}

impl HttpClient {
    pub fn new(config: &ClientConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.connect_timeout_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            id: TargetId::new(),
            client,
            max_body_bytes: config.max_body_bytes,
            request: Joinpoint::new("request"),
            get: Joinpoint::new("get"),
        }
    }

    /// Send a request with the method from the target (default `GET`).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn request(&self, args: RequestArgs) -> ClientRequest {
        self.request.invoke(self, args, |args| self.dispatch(args, None))
    }

    /// Send a `GET` request, whatever method the target names.
    pub fn get(&self, args: RequestArgs) -> ClientRequest {
        self.get.invoke(self, args, |args| self.dispatch(args, Some(Method::GET)))
    }

    fn dispatch(&self, args: &mut RequestArgs, force: Option<Method>) -> ClientRequest {
        let options = args.target.to_options();
        let method = force.unwrap_or_else(|| args.target.method());
        let built = build_request(&options, method, std::mem::take(&mut args.body));
        let mut callback = args.callback.take();

        let emitter = Emitter::new();
        let outcome = Outcome::default();
        let (tx, rx) = oneshot::channel();
        let client = self.client.clone();
        let limit = self.max_body_bytes;
        let done = emitter.clone();
        let recorded = outcome.clone();

        context::spawn(async move {
            let result = match built {
                Ok(request) => send(&client, request, limit).await,
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                tracing::debug!(error = %e, "Outgoing request failed");
            }
            recorded.record(&result);
            if let Some(callback) = callback.as_mut() {
                callback.call(&result);
            }
            done.emit(END_EVENT);
            let _ = tx.send(result);
        });

        ClientRequest {
            emitter,
            outcome,
            result: rx,
        }
    }
}

impl Interceptable for HttpClient {
    type Args = RequestArgs;
    type Output = ClientRequest;

    fn target_id(&self) -> TargetId {
        self.id
    }

    fn joinpoint(&self, method: &str) -> Option<&Joinpoint<Self>> {
        match method {
            "request" => Some(&self.request),
            "get" => Some(&self.get),
            _ => None,
        }
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("id", &self.id)
            .field("request", &self.request)
            .field("get", &self.get)
            .finish()
    }
}

fn build_request(options: &RequestOptions, method: Method, body: Bytes) -> Result<Request<Body>, ClientError> {
    let uri = request_uri(options)?;
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(headers) = &options.headers {
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }
    builder
        .body(Body::from(body))
        .map_err(|e| ClientError::InvalidTarget(e.to_string()))
}

async fn send(client: &Client<HttpConnector, Body>, request: Request<Body>, limit: usize) -> ClientResult {
    let response: hyper::Response<hyper::body::Incoming> = client
        .request(request)
        .await
        .map_err(|e| ClientError::Request(e.to_string()))?;
    let (parts, body) = response.into_parts();
    let body = axum::body::to_bytes(Body::new(body), limit)
        .await
        .map_err(|e| ClientError::Body(e.to_string()))?;

    Ok(ClientResponse {
        status: parts.status,
        headers: parts.headers,
        body,
    })
}
