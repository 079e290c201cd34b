//! Server-side span creation around request listeners.
//!
//! # Responsibilities
//! - Wrap the first `"request"` listener registered on each server
//! - Continue the caller's trace from propagation headers, or start a new one
//! - Publish the server span in a fresh execution context for the handler
//! - Finish the span when the response ends, not when the handler returns

use std::sync::Arc;

use crate::aspect::{Advice, Interceptable, Interceptor, ProbeData, ProbeError, WrapOutcome};
use crate::context::{ContextStore, SPAN_KEY};
use crate::http::{HttpServer, IncomingRequest, ListenerArgs, ServerResponse, END_EVENT, REQUEST_EVENT};
use crate::observability::metrics;
use crate::probes::filters::FilterSet;
use crate::trace::{Format, Tracer};

/// Capability name claimed on each instrumented server.
pub const CAPABILITY: &str = "inbound-http";

/// Guard claimed by the first wrapped request listener of a server.
pub const DISPATCH_GUARD: &str = "inbound-http-dispatch";

/// Methods of [`HttpServer`] the probe wraps.
pub const METHODS: &[&str] = &["on", "add_listener"];

const KIND: &str = "inbound";

/// Traces requests handled by an [`HttpServer`].
pub struct InboundProbe {
    tracer: Arc<dyn Tracer>,
    store: ContextStore,
    filters: Arc<FilterSet>,
    engine: Arc<Interceptor>,
}

impl InboundProbe {
    pub fn new(
        tracer: Arc<dyn Tracer>,
        store: ContextStore,
        filters: Arc<FilterSet>,
        engine: Arc<Interceptor>,
    ) -> Self {
        Self {
            tracer,
            store,
            filters,
            engine,
        }
    }

    /// Attach to `server`. Repeated calls for the same server are no-ops.
    pub fn attach(self: &Arc<Self>, server: &HttpServer) -> WrapOutcome {
        self.engine.wrap(server, CAPABILITY, METHODS, self.clone())
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }
}

impl std::fmt::Debug for InboundProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundProbe")
            .field("store", &self.store)
            .field("filters", &self.filters)
            .finish_non_exhaustive()
    }
}

impl Advice<HttpServer> for InboundProbe {
    fn before(
        &self,
        server: &HttpServer,
        _method: &str,
        args: &mut ListenerArgs,
        _probe: &mut ProbeData,
    ) -> Result<(), ProbeError> {
        if args.event != REQUEST_EVENT {
            return Ok(());
        }
        let Some(listener) = args.listener.take() else {
            return Ok(());
        };
        if !self.engine.claim(server.target_id(), DISPATCH_GUARD) {
            tracing::debug!(server_id = %server.target_id(), "Request listener already traced, leaving as is");
            args.listener = Some(listener);
            return Ok(());
        }

        let tracer = self.tracer.clone();
        let store = self.store.clone();
        let filters = self.filters.clone();

        args.listener = Some(Arc::new(move |req: IncomingRequest, res: ServerResponse| {
            let Some(path) = filters.apply(&req.url) else {
                return listener(req, res);
            };

            let parent = tracer.extract(Format::HttpHeaders, &req.headers);
            let span = tracer.start_span(&format!("Inbound http:{path}"), parent.as_ref());
            span.set_tag("http.method", req.method.as_str());
            metrics::record_span_started(KIND);
            tracing::debug!(
                path = %path,
                trace_id = %span.context().trace_id,
                continued = parent.is_some(),
                "Inbound span started"
            );

            let ctx = store.enter();
            ctx.set(SPAN_KEY, span.clone());

            let status = res.status_handle();
            ctx.sync_scope(|| {
                res.emitter().once(END_EVENT, move || {
                    if let Some(code) = status.get() {
                        span.set_tag("http.status_code", code.as_str());
                    }
                    span.finish();
                    metrics::record_span_finished(KIND);
                });
                listener(req, res)
            })
        }));
        tracing::debug!(server_id = %server.target_id(), "Request listener wrapped");
        Ok(())
    }
}
