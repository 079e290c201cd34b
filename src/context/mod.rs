//! Call-scoped context subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound unit of work begins
//!     → store.rs (ContextStore::enter → ExecutionContext)
//!     → set("span", server span)
//!     → propagate.rs (scope / sync_scope: context becomes current)
//!
//! Continuations spawned from there:
//!     → same task: .await keeps the task-local
//!     → spawn(): new task scoped with the current context
//!     → callbacks / event listeners: bind_current()
//!     → current().get("span") returns the originating span
//! ```
//!
//! # Design Decisions
//! - Context is bound to the logical execution, never to the call stack
//! - Propagation is explicit at the points where work leaves a task
//! - Store holds weak references: contexts die with their last continuation
//! - No locking across requests: each execution owns its own value map

pub mod propagate;
pub mod store;

pub use propagate::{bind_current, current, spawn, InContext};
pub use store::{ContextId, ContextStore, ExecutionContext};

use crate::trace::SpanRef;

/// Well-known key under which the active span is published.
pub const SPAN_KEY: &str = "span";

/// The span published in the current execution context, if any.
pub fn active_span() -> Option<SpanRef> {
    current()?.get::<SpanRef>(SPAN_KEY)
}
