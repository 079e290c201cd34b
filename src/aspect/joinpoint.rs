//! Interception points owned by host objects.
//!
//! # Responsibilities
//! - Hold the advice chain for one named method
//! - Run before / around / original / after in order for every call
//! - Isolate advice failures from the intercepted call
//!
//! # Design Decisions
//! - Advice chain is copy-on-write behind `ArcSwap`: attaching never blocks
//!   invocations in flight and an invocation sees one consistent chain
//! - A call with no advice attached goes straight to the original

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::aspect::advice::{AdviceRef, ProbeData, ProbeError};
use crate::aspect::target::Interceptable;
use crate::observability::metrics;

/// The interception point for one method of a target.
pub struct Joinpoint<T: Interceptable> {
    method: &'static str,
    chain: ArcSwap<Vec<AdviceRef<T>>>,
}

impl<T: Interceptable> Joinpoint<T> {
    /// Create an empty joinpoint for `method`.
    pub fn new(method: &'static str) -> Self {
        Self {
            method,
            chain: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Method name this joinpoint intercepts.
    pub fn method(&self) -> &'static str {
        self.method
    }

    /// Number of advices currently attached.
    pub fn advice_count(&self) -> usize {
        self.chain.load().len()
    }

    /// Append an advice to the chain.
    pub(crate) fn attach(&self, advice: AdviceRef<T>) {
        self.chain.rcu(|chain| {
            let mut next = Vec::with_capacity(chain.len() + 1);
            next.extend(chain.iter().cloned());
            next.push(advice.clone());
            next
        });
    }

    /// Run `original` with every attached advice around it.
    ///
    /// `original` receives the arguments after all `before` and `around`
    /// hooks had a chance to rewrite them. Its return value is handed to
    /// every `after` hook and then returned unchanged.
    pub fn invoke<F>(&self, target: &T, mut args: T::Args, original: F) -> T::Output
    where
        F: FnOnce(&mut T::Args) -> T::Output,
    {
        let chain: Arc<Vec<AdviceRef<T>>> = self.chain.load_full();
        if chain.is_empty() {
            return original(&mut args);
        }

        let mut probes: Vec<ProbeData> = chain.iter().map(|_| ProbeData::new()).collect();

        for (advice, probe) in chain.iter().zip(probes.iter_mut()) {
            isolate(self.method, "before", || {
                advice.before(target, self.method, &mut args, probe)
            });
        }
        for (advice, probe) in chain.iter().zip(probes.iter_mut()) {
            isolate(self.method, "around", || {
                advice.around(target, self.method, &mut args, probe)
            });
        }

        let ret = original(&mut args);

        for (advice, probe) in chain.iter().zip(probes.iter_mut()) {
            isolate(self.method, "after", || {
                advice.after(target, self.method, &args, probe, &ret)
            });
        }

        ret
    }
}

impl<T: Interceptable> std::fmt::Debug for Joinpoint<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Joinpoint")
            .field("method", &self.method)
            .field("advice", &self.advice_count())
            .finish()
    }
}

/// Run one advice hook, swallowing errors and panics.
fn isolate<F>(method: &str, phase: &'static str, hook: F)
where
    F: FnOnce() -> Result<(), ProbeError>,
{
    match catch_unwind(AssertUnwindSafe(hook)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(method = %method, phase, error = %e, "Advice failed, continuing with original call");
            metrics::record_advice_failure(method, phase);
        }
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::warn!(method = %method, phase, reason = %reason, "Advice panicked, continuing with original call");
            metrics::record_advice_failure(method, phase);
        }
    }
}
