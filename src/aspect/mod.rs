//! Interception engine subsystem.
//!
//! # Data Flow
//! ```text
//! Probe attach:
//!     interceptor.rs wrap(target, capability, methods, advice)
//!         → registry check (target, capability): at most once
//!         → joinpoint.rs attach(advice) per method
//!
//! Host call of an interceptable method:
//!     joinpoint.rs invoke(target, args, original)
//!         → advice.before (may rewrite args)
//!         → advice.around (callback.rs around_callback)
//!         → original(args)
//!         → advice.after (sees return value, may schedule on events.rs)
//!
//! Completion (later, possibly in another task):
//!     wrapped callback or emitted event → CompletionHook fires once
//! ```
//!
//! # Design Decisions
//! - Hosts expose joinpoints; nothing is patched behind their back
//! - Attach bookkeeping lives in the engine instance, not on targets
//! - Instrumentation fails open: advice errors and panics are contained

pub mod advice;
pub mod callback;
pub mod events;
pub mod interceptor;
pub mod joinpoint;
pub mod target;

pub use advice::{Advice, AdviceRef, ProbeData, ProbeError};
pub use callback::{around_callback, Callback, Completed, Completion, CompletionHook};
pub use events::Emitter;
pub use interceptor::{Interceptor, WrapOutcome};
pub use joinpoint::Joinpoint;
pub use target::{Interceptable, TargetId};
