//! The tracer interface the probes drive.

use std::sync::Arc;

use crate::trace::carrier::HeaderCarrier;
use crate::trace::codec::{self, SpanContext};

/// Carrier formats understood by [`Tracer::inject`] and [`Tracer::extract`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Format {
    /// A flat textual header mapping.
    HttpHeaders,
}

/// A timed unit of work handed out by a [`Tracer`].
pub trait Span: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn context(&self) -> SpanContext;

    fn set_tag(&self, key: &str, value: &str);

    /// Close the span. Calling it again is a no-op.
    fn finish(&self);

    fn is_finished(&self) -> bool;
}

/// Shared handle to a span.
pub type SpanRef = Arc<dyn Span>;

/// Creates spans and moves their context across wire boundaries.
pub trait Tracer: Send + Sync {
    /// Start a span, as child of `child_of` or as a new root.
    fn start_span(&self, name: &str, child_of: Option<&SpanContext>) -> SpanRef;

    fn inject(&self, ctx: &SpanContext, format: Format, carrier: &mut dyn HeaderCarrier) {
        match format {
            Format::HttpHeaders => codec::inject(ctx, carrier),
        }
    }

    fn extract(&self, format: Format, carrier: &dyn HeaderCarrier) -> Option<SpanContext> {
        match format {
            Format::HttpHeaders => codec::extract(carrier),
        }
    }
}
