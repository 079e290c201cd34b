//! Inbound path normalization and configured URL filters.
//!
//! # Design Decisions
//! - Matching is by path prefix, case-sensitive, first filter wins
//! - No regex to guarantee O(n) matching
//! - The filter list is swapped atomically on config reload

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::UrlFilter;

/// Strip everything from the first `?` and from the first `#`.
pub fn normalize_path(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// The configured filters applied to every inbound request path.
#[derive(Debug, Default)]
pub struct FilterSet {
    filters: ArcSwap<Vec<UrlFilter>>,
}

impl FilterSet {
    pub fn new(filters: Vec<UrlFilter>) -> Self {
        Self {
            filters: ArcSwap::from_pointee(filters),
        }
    }

    /// Install a new filter list.
    pub fn replace(&self, filters: Vec<UrlFilter>) {
        tracing::info!(count = filters.len(), "URL filters replaced");
        self.filters.store(Arc::new(filters));
    }

    pub fn len(&self) -> usize {
        self.filters.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path to put in the span name, or `None` when the request should not
    /// be traced.
    pub fn apply(&self, url: &str) -> Option<String> {
        let path = normalize_path(url);
        if path.is_empty() {
            return None;
        }

        let filters = self.filters.load();
        match filters.iter().find(|f| path.starts_with(&f.pattern)) {
            Some(filter) if filter.to.is_empty() => {
                tracing::trace!(path, pattern = %filter.pattern, "Path excluded from tracing");
                None
            }
            Some(filter) => Some(filter.to.clone()),
            None => Some(path.to_string()),
        }
    }
}
