//! Flat header mappings that propagation headers travel in.

use std::collections::HashMap;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

/// A flat string→string mapping with case-insensitive keys.
pub trait HeaderCarrier {
    /// Value for `key`, ignoring ASCII case.
    fn get(&self, key: &str) -> Option<&str>;

    /// Write `value` under `key`, leaving every other key untouched.
    fn set(&mut self, key: &str, value: String);

    /// Drop every entry under `key`, ignoring ASCII case.
    fn remove(&mut self, key: &str);
}

impl HeaderCarrier for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        if let Some(v) = HashMap::get(self, key) {
            return Some(v.as_str());
        }
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    fn set(&mut self, key: &str, value: String) {
        let existing = self
            .keys()
            .find(|k| k.eq_ignore_ascii_case(key))
            .cloned();
        match existing {
            Some(k) => {
                self.insert(k, value);
            }
            None => {
                self.insert(key.to_ascii_lowercase(), value);
            }
        }
    }

    fn remove(&mut self, key: &str) {
        self.retain(|k, _| !k.eq_ignore_ascii_case(key));
    }
}

impl HeaderCarrier for HeaderMap {
    fn get(&self, key: &str) -> Option<&str> {
        HeaderMap::get(self, key).and_then(|v| v.to_str().ok())
    }

    fn set(&mut self, key: &str, value: String) {
        let name = match HeaderName::from_bytes(key.to_ascii_lowercase().as_bytes()) {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!(key, error = %e, "Dropping header with invalid name");
                return;
            }
        };
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                self.insert(name, value);
            }
            Err(e) => tracing::debug!(key, error = %e, "Dropping header with invalid value"),
        }
    }

    fn remove(&mut self, key: &str) {
        if let Ok(name) = HeaderName::from_bytes(key.to_ascii_lowercase().as_bytes()) {
            HeaderMap::remove(self, name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashmap_lookup_ignores_case() {
        let mut headers: HashMap<String, String> = HashMap::new();
        headers.insert("X-B3-TraceId".into(), "abc".into());

        assert_eq!(HeaderCarrier::get(&headers, "x-b3-traceid"), Some("abc"));
        assert_eq!(HeaderCarrier::get(&headers, "X-B3-TRACEID"), Some("abc"));
        assert_eq!(HeaderCarrier::get(&headers, "x-b3-spanid"), None);
    }

    #[test]
    fn hashmap_set_overwrites_same_key_only() {
        let mut headers: HashMap<String, String> = HashMap::new();
        headers.insert("X-B3-TraceId".into(), "old".into());
        headers.insert("accept".into(), "text/plain".into());

        HeaderCarrier::set(&mut headers, "x-b3-traceid", "new".into());
        HeaderCarrier::set(&mut headers, "x-b3-spanid", "span".into());

        assert_eq!(headers.len(), 3);
        assert_eq!(headers["X-B3-TraceId"], "new");
        assert_eq!(headers["x-b3-spanid"], "span");
        assert_eq!(headers["accept"], "text/plain");
    }

    #[test]
    fn header_map_round_trip() {
        let mut headers = HeaderMap::new();
        HeaderCarrier::set(&mut headers, "X-B3-SpanId", "00f067aa0ba902b7".into());
        HeaderCarrier::set(&mut headers, "bad header", "x".into());

        assert_eq!(headers.len(), 1);
        assert_eq!(HeaderCarrier::get(&headers, "x-b3-spanid"), Some("00f067aa0ba902b7"));
    }

    #[test]
    fn remove_ignores_case_on_both_carriers() {
        let mut map: HashMap<String, String> = HashMap::new();
        map.insert("X-B3-Flags".into(), "1".into());
        map.insert("accept".into(), "*/*".into());
        HeaderCarrier::remove(&mut map, "x-b3-flags");
        assert_eq!(map.len(), 1);
        assert_eq!(HeaderCarrier::get(&map, "x-b3-flags"), None);

        let mut headers = HeaderMap::new();
        HeaderCarrier::set(&mut headers, "x-b3-flags", "1".into());
        HeaderCarrier::remove(&mut headers, "X-B3-Flags");
        assert!(headers.is_empty());
    }
}
