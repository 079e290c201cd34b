//! HTTP instrumentation probes.
//!
//! # Data Flow
//! ```text
//! HttpServer::on("request", handler)
//!     → inbound.rs wraps handler
//!     → per request: extract headers → server span → new execution context
//!     → handler runs; response "end" finishes the span
//!
//! HttpClient::request/get(args)   (inside the handler's context)
//!     → outbound.rs: child of active span, headers injected
//!     → callback or "end" finishes the client span
//! ```

pub mod filters;
pub mod inbound;
pub mod outbound;

pub use filters::{normalize_path, FilterSet};
pub use inbound::InboundProbe;
pub use outbound::OutboundProbe;
