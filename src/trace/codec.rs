//! Span propagation context and its wire encoding.
//!
//! Encodes as Zipkin B3 multi-headers:
//! `x-b3-traceid`, `x-b3-spanid`, `x-b3-parentspanid`, `x-b3-sampled`.
//! Extraction never fails loudly: anything absent, incomplete or malformed
//! yields `None` ("no parent").

use serde::{Serialize, Serializer};

use crate::trace::carrier::HeaderCarrier;

pub const TRACE_ID_HEADER: &str = "x-b3-traceid";
pub const SPAN_ID_HEADER: &str = "x-b3-spanid";
pub const PARENT_SPAN_ID_HEADER: &str = "x-b3-parentspanid";
pub const SAMPLED_HEADER: &str = "x-b3-sampled";
pub const FLAGS_HEADER: &str = "x-b3-flags";

/// 64- or 128-bit trace identifier. Keeps the width it was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId {
    value: u128,
    wide: bool,
}

impl TraceId {
    /// A fresh random 128-bit trace id.
    pub fn random() -> Self {
        Self {
            value: nonzero_u128(),
            wide: true,
        }
    }

    /// Parse 1 to 32 hex digits. Zero is not a valid trace id.
    pub fn from_hex(s: &str) -> Option<Self> {
        let value = parse_hex_u128(s, 32)?;
        Some(Self {
            value,
            wide: s.len() > 16,
        })
    }

    pub fn as_u128(&self) -> u128 {
        self.value
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.wide {
            write!(f, "{:032x}", self.value)
        } else {
            write!(f, "{:016x}", self.value)
        }
    }
}

impl Serialize for TraceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 64-bit span identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(u64);

impl SpanId {
    pub fn random() -> Self {
        loop {
            let id: u64 = rand::random();
            if id != 0 {
                return Self(id);
            }
        }
    }

    /// Parse 1 to 16 hex digits. Zero is not a valid span id.
    pub fn from_hex(s: &str) -> Option<Self> {
        let value = parse_hex_u128(s, 16)?;
        Some(Self(value as u64))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SpanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl Serialize for SpanId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The propagation identity of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<SpanId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampled: Option<bool>,
}

impl SpanContext {
    /// Start a new trace.
    pub fn root(sampled: Option<bool>) -> Self {
        Self {
            trace_id: TraceId::random(),
            span_id: SpanId::random(),
            parent_id: None,
            sampled,
        }
    }

    /// A new span in the same trace, parented to `self`.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: SpanId::random(),
            parent_id: Some(self.span_id),
            sampled: self.sampled,
        }
    }
}

/// Write `ctx` into `carrier` without touching unrelated keys.
///
/// B3 keys `ctx` has no value for are removed, so headers left over from an
/// earlier hop never leak into the extracted context.
pub fn inject<C: HeaderCarrier + ?Sized>(ctx: &SpanContext, carrier: &mut C) {
    carrier.set(TRACE_ID_HEADER, ctx.trace_id.to_string());
    carrier.set(SPAN_ID_HEADER, ctx.span_id.to_string());
    match ctx.parent_id {
        Some(parent) => carrier.set(PARENT_SPAN_ID_HEADER, parent.to_string()),
        None => carrier.remove(PARENT_SPAN_ID_HEADER),
    }
    match ctx.sampled {
        Some(sampled) => carrier.set(SAMPLED_HEADER, if sampled { "1" } else { "0" }.to_string()),
        None => carrier.remove(SAMPLED_HEADER),
    }
    carrier.remove(FLAGS_HEADER);
}

/// Read a span context from `carrier`, or `None` if there is no usable one.
pub fn extract<C: HeaderCarrier + ?Sized>(carrier: &C) -> Option<SpanContext> {
    let trace_id = TraceId::from_hex(carrier.get(TRACE_ID_HEADER)?.trim())?;
    let span_id = SpanId::from_hex(carrier.get(SPAN_ID_HEADER)?.trim())?;

    // A malformed optional header is ignored rather than poisoning the context.
    let parent_id = carrier
        .get(PARENT_SPAN_ID_HEADER)
        .and_then(|v| SpanId::from_hex(v.trim()));

    let debug = carrier.get(FLAGS_HEADER).map(str::trim) == Some("1");
    let sampled = if debug {
        Some(true)
    } else {
        carrier
            .get(SAMPLED_HEADER)
            .and_then(|v| match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "d" => Some(true),
                "0" | "false" => Some(false),
                _ => None,
            })
    };

    Some(SpanContext {
        trace_id,
        span_id,
        parent_id,
        sampled,
    })
}

fn parse_hex_u128(s: &str, max_digits: usize) -> Option<u128> {
    if s.is_empty() || s.len() > max_digits || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    match u128::from_str_radix(s, 16) {
        Ok(0) | Err(_) => None,
        Ok(v) => Some(v),
    }
}

fn nonzero_u128() -> u128 {
    loop {
        let v: u128 = rand::random();
        if v != 0 {
            return v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn extracts_trace_and_span_ids() {
        let h = headers(&[
            ("x-b3-traceid", "4bf92f3577b34da6a3ce929d0e0e4736"),
            ("x-b3-spanid", "00f067aa0ba902b7"),
        ]);

        let ctx = extract(&h).expect("valid headers");
        assert_eq!(ctx.trace_id.to_string(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(ctx.span_id.to_string(), "00f067aa0ba902b7");
        assert_eq!(ctx.parent_id, None);
        assert_eq!(ctx.sampled, None);
    }

    #[test]
    fn keeps_64_bit_trace_id_width() {
        let h = headers(&[("X-B3-TraceId", "463ac35c9f6413ad"), ("X-B3-SpanId", "a2fb4a1d1a96d312")]);
        let ctx = extract(&h).unwrap();
        assert_eq!(ctx.trace_id.to_string(), "463ac35c9f6413ad");
    }

    #[test]
    fn missing_or_garbage_headers_mean_no_parent() {
        assert_eq!(extract(&headers(&[])), None);
        assert_eq!(extract(&headers(&[("x-b3-traceid", "abc")])), None);
        assert_eq!(extract(&headers(&[("x-b3-spanid", "abc")])), None);
        assert_eq!(
            extract(&headers(&[("x-b3-traceid", "not-hex!"), ("x-b3-spanid", "abc")])),
            None
        );
        assert_eq!(
            extract(&headers(&[("x-b3-traceid", ""), ("x-b3-spanid", "abc")])),
            None
        );
        assert_eq!(
            extract(&headers(&[("x-b3-traceid", "0000"), ("x-b3-spanid", "abc")])),
            None
        );
        assert_eq!(
            extract(&headers(&[("x-b3-traceid", "abc"), ("x-b3-spanid", "1234567890abcdef1")])),
            None
        );
        assert_eq!(
            extract(&headers(&[("x-b3-traceid", "ü"), ("x-b3-spanid", "ü")])),
            None
        );
    }

    #[test]
    fn sampling_and_parent_are_read() {
        let h = headers(&[
            ("x-b3-traceid", "abc"),
            ("x-b3-spanid", "def"),
            ("x-b3-parentspanid", "123"),
            ("x-b3-sampled", "0"),
        ]);
        let ctx = extract(&h).unwrap();
        assert_eq!(ctx.parent_id, SpanId::from_hex("123"));
        assert_eq!(ctx.sampled, Some(false));

        let debug = headers(&[("x-b3-traceid", "abc"), ("x-b3-spanid", "def"), ("x-b3-flags", "1")]);
        assert_eq!(extract(&debug).unwrap().sampled, Some(true));
    }

    #[test]
    fn malformed_parent_is_ignored() {
        let h = headers(&[
            ("x-b3-traceid", "abc"),
            ("x-b3-spanid", "def"),
            ("x-b3-parentspanid", "zzz"),
        ]);
        assert_eq!(extract(&h).unwrap().parent_id, None);
    }

    #[test]
    fn inject_keeps_unrelated_headers() {
        let ctx = SpanContext::root(Some(true)).child();
        let mut h = headers(&[("accept", "application/json"), ("X-B3-TraceId", "stale")]);

        inject(&ctx, &mut h);

        assert_eq!(h["accept"], "application/json");
        assert_eq!(h["X-B3-TraceId"], ctx.trace_id.to_string());
        assert_eq!(h["x-b3-spanid"], ctx.span_id.to_string());
        assert_eq!(h["x-b3-parentspanid"], ctx.parent_id.unwrap().to_string());
        assert_eq!(h["x-b3-sampled"], "1");

        assert_eq!(extract(&h), Some(ctx));
    }

    #[test]
    fn child_stays_in_trace() {
        let root = SpanContext::root(None);
        let child = root.child();
        assert_eq!(child.trace_id, root.trace_id);
        assert_eq!(child.parent_id, Some(root.span_id));
        assert_ne!(child.span_id, root.span_id);
    }

    #[test]
    fn serializes_ids_as_hex() {
        let h = headers(&[("x-b3-traceid", "463ac35c9f6413ad"), ("x-b3-spanid", "a2fb4a1d1a96d312")]);
        let json = serde_json::to_value(extract(&h).unwrap()).unwrap();
        assert_eq!(json["traceId"], "463ac35c9f6413ad");
        assert_eq!(json["spanId"], "a2fb4a1d1a96d312");
        assert!(json.get("parentId").is_none());
    }

    #[test]
    fn inject_clears_stale_b3_headers() {
        let mut h = headers(&[
            ("X-B3-ParentSpanId", "1111111111111111"),
            ("x-b3-flags", "1"),
            ("x-b3-sampled", "1"),
            ("accept", "application/json"),
        ]);
        let ctx = SpanContext::root(Some(false));
        inject(&ctx, &mut h);
        assert_eq!(extract(&h), Some(ctx));
        assert_eq!(h["accept"], "application/json");

        let unsampled = SpanContext::root(None);
        inject(&unsampled, &mut h);
        assert_eq!(extract(&h), Some(unsampled));
        assert!(!h.contains_key("x-b3-sampled"));
    }
}
