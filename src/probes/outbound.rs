//! Client-side span creation and header injection.
//!
//! Per call: `before` starts `"outbound http:<url>"` under the active span
//! and injects its context into the request headers; `around` routes the
//! callback through a completion hook; `after` falls back to the request's
//! `"end"` event when there was no callback.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use axum::http::{Method, StatusCode};

use crate::aspect::{
    around_callback, Advice, Completed, Completion, CompletionHook, Interceptor, ProbeData,
    ProbeError, WrapOutcome,
};
use crate::context;
use crate::http::{ClientRequest, ClientResult, HttpClient, Outcome, RequestArgs, END_EVENT};
use crate::observability::metrics;
use crate::trace::{Format, SpanRef, Tracer};

/// Capability name claimed on each instrumented client.
pub const CAPABILITY: &str = "outbound-http";

/// Methods of [`HttpClient`] the probe wraps.
pub const METHODS: &[&str] = &["request", "get"];

const KIND: &str = "outbound";

/// Filled by `after` so an event-driven completion can still tag the status.
type OutcomeSlot = Arc<OnceLock<Outcome>>;

/// Traces outgoing requests of an [`HttpClient`].
pub struct OutboundProbe {
    tracer: Arc<dyn Tracer>,
}

impl OutboundProbe {
    pub fn new(tracer: Arc<dyn Tracer>) -> Self {
        Self { tracer }
    }

    /// Attach to `client`. Repeated calls for the same client are no-ops.
    pub fn attach(self: &Arc<Self>, engine: &Interceptor, client: &HttpClient) -> WrapOutcome {
        engine.wrap(client, CAPABILITY, METHODS, self.clone())
    }
}

impl std::fmt::Debug for OutboundProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundProbe").finish_non_exhaustive()
    }
}

impl Advice<HttpClient> for OutboundProbe {
    fn before(
        &self,
        _client: &HttpClient,
        method: &str,
        args: &mut RequestArgs,
        probe: &mut ProbeData,
    ) -> Result<(), ProbeError> {
        let url = args.target.display_url();
        let http_method = if method == "get" {
            Method::GET
        } else {
            args.target.method()
        };

        let parent = context::active_span().map(|span| span.context());
        let span = self
            .tracer
            .start_span(&format!("outbound http:{url}"), parent.as_ref());
        span.set_tag("http.method", http_method.as_str());
        span.set_tag("http.url", &url);

        let headers = args.target.options_mut().headers.get_or_insert_with(HashMap::new);
        self.tracer.inject(&span.context(), Format::HttpHeaders, headers);

        tracing::debug!(
            url = %url,
            trace_id = %span.context().trace_id,
            rooted = parent.is_none(),
            "Outbound span started"
        );
        metrics::record_span_started(KIND);
        probe.insert::<SpanRef>(span);
        Ok(())
    }

    fn around(
        &self,
        _client: &HttpClient,
        _method: &str,
        args: &mut RequestArgs,
        probe: &mut ProbeData,
    ) -> Result<(), ProbeError> {
        let span = probe
            .get::<SpanRef>()
            .cloned()
            .ok_or(ProbeError::MissingState("outbound span"))?;
        let slot: OutcomeSlot = Arc::new(OnceLock::new());
        let pending = slot.clone();

        let hook = CompletionHook::new(move |how: Completed<'_, ClientResult>| {
            let outcome = match how {
                Completed::Callback(result) => Some(
                    result
                        .as_ref()
                        .map(|response| response.status)
                        .map_err(|e| e.to_string()),
                ),
                Completed::Event(_) => pending.get().and_then(|o| o.get().cloned()),
            };
            finish(&span, outcome);
        });

        let completion = around_callback(&mut args.callback, hook);
        probe.insert(completion);
        probe.insert(slot);
        Ok(())
    }

    fn after(
        &self,
        _client: &HttpClient,
        _method: &str,
        _args: &RequestArgs,
        probe: &mut ProbeData,
        ret: &ClientRequest,
    ) -> Result<(), ProbeError> {
        if let Some(slot) = probe.get::<OutcomeSlot>() {
            let _ = slot.set(ret.outcome());
        }
        let completion = probe
            .remove::<Completion<ClientResult>>()
            .ok_or(ProbeError::MissingState("outbound completion"))?;
        completion.schedule_on(ret.emitter(), END_EVENT);
        Ok(())
    }
}

fn finish(span: &SpanRef, outcome: Option<Result<StatusCode, String>>) {
    match &outcome {
        Some(Ok(status)) => span.set_tag("http.status_code", status.as_str()),
        Some(Err(error)) => span.set_tag("error", error),
        None => {}
    }
    span.finish();
    metrics::record_span_finished(KIND);
}
