//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound:
//!     TCP connection
//!         → server.rs (Axum setup, body buffering)
//!         → "request" listeners (IncomingRequest, ServerResponse)
//!         → response.rs ServerResponse::end → "end" event → connection
//!
//! Outbound:
//!     request.rs (RequestTarget: URL string or options)
//!         → client.rs request()/get() (spawned, context-carrying task)
//!         → callback and/or "end" event
//!         → ClientRequest::response()
//! ```
//!
//! Both sides route their interceptable methods through joinpoints; see
//! the `probes` module for the advice that traces them.

pub mod client;
pub mod request;
pub mod response;
pub mod server;

pub use client::{ClientRequest, HttpClient, Outcome};
pub use request::{format_url, RequestArgs, RequestOptions, RequestTarget};
pub use response::{
    ClientError, ClientResponse, ClientResult, IncomingRequest, ServerResponse, StatusHandle,
    END_EVENT,
};
pub use server::{HttpServer, ListenerArgs, RequestListener, REQUEST_EVENT};
