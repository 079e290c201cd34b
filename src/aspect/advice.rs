//! Advice hooks and per-invocation scratch state.

use std::sync::Arc;

use axum::http::Extensions;
use thiserror::Error;

use crate::aspect::target::Interceptable;

/// Failure raised by an advice hook.
///
/// Never reaches the caller of the intercepted method: the joinpoint logs
/// and counts it, then carries on with the original call.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("advice failed: {0}")]
    Advice(String),

    #[error("probe state missing: {0}")]
    MissingState(&'static str),

    #[error("invalid header value for {name}: {reason}")]
    Header { name: String, reason: String },
}

/// Typed scratch space shared by the hooks of one advice for one invocation.
///
/// A fresh instance is allocated per call, so concurrent invocations of the
/// same method never see each other's data.
#[derive(Debug, Default)]
pub struct ProbeData {
    slots: Extensions,
}

impl ProbeData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning the previous one of the same type.
    pub fn insert<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.slots.insert(value)
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.slots.get::<T>()
    }

    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.slots.get_mut::<T>()
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.slots.remove::<T>()
    }
}

/// Shared handle to an advice attached to joinpoints of `T`.
pub type AdviceRef<T> = Arc<dyn Advice<T>>;

/// Before / around / after hooks for the methods of an interceptable target.
///
/// Every hook is optional. For one invocation the order is
/// `before` → `around` → original → `after`, all on the caller's stack.
pub trait Advice<T: Interceptable>: Send + Sync {
    /// Runs first. May rewrite `args` before the original sees them.
    fn before(
        &self,
        _target: &T,
        _method: &str,
        _args: &mut T::Args,
        _probe: &mut ProbeData,
    ) -> Result<(), ProbeError> {
        Ok(())
    }

    /// Runs after `before`. Usually registers completion logic through
    /// [`around_callback`](crate::aspect::callback::around_callback).
    fn around(
        &self,
        _target: &T,
        _method: &str,
        _args: &mut T::Args,
        _probe: &mut ProbeData,
    ) -> Result<(), ProbeError> {
        Ok(())
    }

    /// Runs once the original returned. Sees the call's return value, not
    /// the completion of whatever asynchronous work it started.
    fn after(
        &self,
        _target: &T,
        _method: &str,
        _args: &T::Args,
        _probe: &mut ProbeData,
        _ret: &T::Output,
    ) -> Result<(), ProbeError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Marker(u32);

    #[test]
    fn probe_data_is_typed() {
        let mut probe = ProbeData::new();
        assert!(probe.get::<Marker>().is_none());

        probe.insert(Marker(1));
        probe.insert(String::from("span"));
        assert_eq!(probe.get::<Marker>(), Some(&Marker(1)));
        assert_eq!(probe.get::<String>().map(String::as_str), Some("span"));

        if let Some(m) = probe.get_mut::<Marker>() {
            m.0 = 2;
        }
        assert_eq!(probe.remove::<Marker>(), Some(Marker(2)));
        assert!(probe.get::<Marker>().is_none());
    }
}
