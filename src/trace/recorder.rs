//! In-process reference tracer.
//!
//! # Responsibilities
//! - Hand out spans with B3-compatible identities
//! - Keep a bounded buffer of finished spans for inspection
//! - Log every finished span as a structured event
//!
//! # Design Decisions
//! - Finished spans are Zipkin v2 shaped so they can be shipped as-is
//! - Export transport is someone else's job; the buffer just drops oldest

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::config::TracerConfig;
use crate::trace::codec::{SpanContext, SpanId, TraceId};
use crate::trace::tracer::{Span, SpanRef, Tracer};

/// Service the spans are reported for.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub service_name: String,
}

/// A closed span, as reported.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedSpan {
    pub trace_id: TraceId,
    pub id: SpanId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<SpanId>,
    pub name: String,
    /// Start, microseconds since the epoch.
    pub timestamp: u64,
    /// Microseconds.
    pub duration: u64,
    pub local_endpoint: Endpoint,
    pub tags: BTreeMap<String, String>,
}

struct RecorderInner {
    service_name: String,
    sampled: bool,
    capacity: usize,
    finished: Mutex<VecDeque<FinishedSpan>>,
}

impl RecorderInner {
    fn record(&self, span: FinishedSpan) {
        tracing::info!(
            target: "span_probes::span",
            trace_id = %span.trace_id,
            span_id = %span.id,
            parent_id = ?span.parent_id.map(|p| p.to_string()),
            name = %span.name,
            duration_us = span.duration,
            "Span finished"
        );

        let mut finished = self.finished.lock().expect("recorder mutex poisoned");
        if finished.len() >= self.capacity {
            finished.pop_front();
        }
        finished.push_back(span);
    }
}

/// Tracer that records finished spans in memory.
#[derive(Clone)]
pub struct Recorder {
    inner: Arc<RecorderInner>,
}

impl Recorder {
    pub fn new(service_name: impl Into<String>, config: &TracerConfig) -> Self {
        Self {
            inner: Arc::new(RecorderInner {
                service_name: service_name.into(),
                sampled: config.sampled,
                capacity: config.max_finished_spans.max(1),
                finished: Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.inner.service_name
    }

    /// Snapshot of the finished spans, oldest first.
    pub fn finished_spans(&self) -> Vec<FinishedSpan> {
        let finished = self.inner.finished.lock().expect("recorder mutex poisoned");
        finished.iter().cloned().collect()
    }

    /// Take every finished span out of the buffer.
    pub fn drain(&self) -> Vec<FinishedSpan> {
        let mut finished = self.inner.finished.lock().expect("recorder mutex poisoned");
        finished.drain(..).collect()
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("service_name", &self.inner.service_name)
            .field("sampled", &self.inner.sampled)
            .finish()
    }
}

impl Tracer for Recorder {
    fn start_span(&self, name: &str, child_of: Option<&SpanContext>) -> SpanRef {
        let context = match child_of {
            Some(parent) => parent.child(),
            None => SpanContext::root(Some(self.inner.sampled)),
        };
        Arc::new(RecordedSpan {
            name: name.to_string(),
            context,
            wall_start: SystemTime::now(),
            start: Instant::now(),
            tags: Mutex::new(BTreeMap::new()),
            finished: AtomicBool::new(false),
            sink: self.inner.clone(),
        })
    }
}

struct RecordedSpan {
    name: String,
    context: SpanContext,
    wall_start: SystemTime,
    start: Instant,
    tags: Mutex<BTreeMap<String, String>>,
    finished: AtomicBool,
    sink: Arc<RecorderInner>,
}

impl std::fmt::Debug for RecordedSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordedSpan")
            .field("name", &self.name)
            .field("context", &self.context)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl Span for RecordedSpan {
    fn name(&self) -> &str {
        &self.name
    }

    fn context(&self) -> SpanContext {
        self.context
    }

    fn set_tag(&self, key: &str, value: &str) {
        let mut tags = self.tags.lock().expect("span tags mutex poisoned");
        tags.insert(key.to_string(), value.to_string());
    }

    fn finish(&self) {
        if self.finished.swap(true, Ordering::AcqRel) {
            tracing::debug!(span_id = %self.context.span_id, name = %self.name, "Span already finished");
            return;
        }

        let timestamp = self
            .wall_start
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or_default();
        let tags = self.tags.lock().expect("span tags mutex poisoned").clone();

        self.sink.record(FinishedSpan {
            trace_id: self.context.trace_id,
            id: self.context.span_id,
            parent_id: self.context.parent_id,
            name: self.name.clone(),
            timestamp,
            duration: self.start.elapsed().as_micros() as u64,
            local_endpoint: Endpoint {
                service_name: self.sink.service_name.clone(),
            },
            tags,
        });
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}
