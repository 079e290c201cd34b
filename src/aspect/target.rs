//! Interceptable targets and their identity.
//!
//! # Responsibilities
//! - Generate process-unique target IDs for attach bookkeeping
//! - Describe what a host object must expose to be intercepted
//!
//! # Design Decisions
//! - Identity is an explicit counter, never a pointer address (targets move)
//! - All joinpoints of one target share a single argument/return signature

use std::sync::atomic::{AtomicU64, Ordering};

use crate::aspect::joinpoint::Joinpoint;

/// Global atomic counter for target IDs.
/// Relaxed ordering is enough: only uniqueness matters.
static TARGET_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an interceptable target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(u64);

impl TargetId {
    /// Generate a new unique target ID.
    pub fn new() -> Self {
        Self(TARGET_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "target-{}", self.0)
    }
}

/// A host object whose named methods can carry advice.
///
/// The host owns its joinpoints and routes every call of an interceptable
/// method through [`Joinpoint::invoke`]. The engine only decorates them.
pub trait Interceptable: Sized + Send + Sync + 'static {
    /// Argument bundle shared by every interceptable method.
    type Args: Send + 'static;
    /// Return value shared by every interceptable method.
    type Output: 'static;

    /// Identity used for idempotent attach.
    fn target_id(&self) -> TargetId;

    /// Look up the joinpoint for a method name.
    fn joinpoint(&self, method: &str) -> Option<&Joinpoint<Self>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_id_unique() {
        let id1 = TargetId::new();
        let id2 = TargetId::new();
        assert_ne!(id1, id2);
        assert!(id2.as_u64() > id1.as_u64());
    }

    #[test]
    fn target_id_display() {
        let id = TargetId::new();
        assert_eq!(id.to_string(), format!("target-{}", id.as_u64()));
    }
}
