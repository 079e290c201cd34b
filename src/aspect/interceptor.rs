//! The interception engine.
//!
//! Owns the registry of (target, capability) pairs already instrumented so
//! repeated attach attempts from several entry points stay harmless.

use dashmap::DashSet;

use crate::aspect::advice::AdviceRef;
use crate::aspect::target::{Interceptable, TargetId};
use crate::observability::metrics;

/// Result of a [`Interceptor::wrap`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapOutcome {
    /// Advice was attached to the named joinpoints.
    Attached,
    /// The capability was already attached to this target; nothing changed.
    AlreadyAttached,
}

/// Attaches advice to interceptable targets, at most once per capability.
#[derive(Debug, Default)]
pub struct Interceptor {
    attached: DashSet<(TargetId, String)>,
}

impl Interceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `advice` to each of `methods` on `target` under `capability`.
    ///
    /// A second call for the same target and capability is a no-op.
    /// Method names the target does not expose are skipped.
    pub fn wrap<T: Interceptable>(
        &self,
        target: &T,
        capability: &str,
        methods: &[&str],
        advice: AdviceRef<T>,
    ) -> WrapOutcome {
        let id = target.target_id();
        if !self.claim(id, capability) {
            tracing::debug!(target_id = %id, capability, "Capability already attached, skipping");
            metrics::record_attach(capability, "already_attached");
            return WrapOutcome::AlreadyAttached;
        }

        for method in methods {
            match target.joinpoint(method) {
                Some(joinpoint) => {
                    joinpoint.attach(advice.clone());
                    tracing::debug!(target_id = %id, capability, method, "Advice attached");
                }
                None => {
                    tracing::warn!(target_id = %id, capability, method, "Target exposes no such method");
                }
            }
        }

        metrics::record_attach(capability, "attached");
        WrapOutcome::Attached
    }

    /// Mark (target, capability) as taken. Returns false if it already was.
    ///
    /// Also usable by advice for finer-grained guards, e.g. one request
    /// listener per server instance.
    pub fn claim(&self, id: TargetId, capability: &str) -> bool {
        self.attached.insert((id, capability.to_string()))
    }

    /// Whether (target, capability) has been claimed.
    pub fn is_attached(&self, id: TargetId, capability: &str) -> bool {
        self.attached.contains(&(id, capability.to_string()))
    }

    /// Drop every claim held for `id`. Returns how many were dropped.
    ///
    /// Call once the target is gone; claims are never dropped otherwise.
    pub fn forget(&self, id: TargetId) -> usize {
        let before = self.attached.len();
        self.attached.retain(|(target, _)| *target != id);
        let forgotten = before.saturating_sub(self.attached.len());
        tracing::debug!(target_id = %id, forgotten, "Target claims released");
        forgotten
    }

    /// Number of (target, capability) claims held.
    pub fn claims(&self) -> usize {
        self.attached.len()
    }
}
