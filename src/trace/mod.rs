//! Tracing subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound headers
//!     → carrier.rs (case-insensitive header view)
//!     → codec.rs extract → Option<SpanContext> (None = root)
//!     → tracer.rs start_span(name, child_of)
//!
//! Outbound request
//!     → tracer.rs start_span(child of active span)
//!     → codec.rs inject → request headers
//!
//! span.finish()
//!     → recorder.rs (FinishedSpan buffer + structured log)
//! ```

pub mod carrier;
pub mod codec;
pub mod recorder;
pub mod tracer;

pub use carrier::HeaderCarrier;
pub use codec::{extract, inject, SpanContext, SpanId, TraceId};
pub use recorder::{FinishedSpan, Recorder};
pub use tracer::{Format, Span, SpanRef, Tracer};
