//! Completion detection for intercepted calls.
//!
//! A host call completes either through a trailing callback or through an
//! event on its return value. [`around_callback`] gives advice one hook that
//! fires exactly once in both cases.

use std::sync::{Arc, Mutex};

use crate::aspect::events::Emitter;

/// A caller-supplied completion callback.
pub struct Callback<C> {
    f: Box<dyn FnMut(&C) + Send>,
}

impl<C> Callback<C> {
    pub fn new<F>(f: F) -> Self
    where
        F: FnMut(&C) + Send + 'static,
    {
        Self { f: Box::new(f) }
    }

    pub fn call(&mut self, value: &C) {
        (self.f)(value)
    }
}

impl<C> std::fmt::Debug for Callback<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Callback")
    }
}

/// How an invocation completed.
#[derive(Debug)]
pub enum Completed<'a, C> {
    /// The completion callback ran with this value.
    Callback(&'a C),
    /// The named event fired on the return value.
    Event(&'a str),
}

type HookFn<C> = Box<dyn for<'a> FnOnce(Completed<'a, C>) + Send>;

/// An at-most-once completion hook.
pub struct CompletionHook<C> {
    hook: Arc<Mutex<Option<HookFn<C>>>>,
}

impl<C> CompletionHook<C> {
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> FnOnce(Completed<'a, C>) + Send + 'static,
    {
        Self {
            hook: Arc::new(Mutex::new(Some(Box::new(f)))),
        }
    }

    /// Run the hook if it has not run yet. Returns whether it ran.
    pub fn fire(&self, how: Completed<'_, C>) -> bool {
        let hook = self.hook.lock().expect("completion hook mutex poisoned").take();
        match hook {
            Some(hook) => {
                hook(how);
                true
            }
            None => {
                tracing::debug!("Completion already signalled, suppressing repeat");
                false
            }
        }
    }

    pub fn has_fired(&self) -> bool {
        self.hook.lock().expect("completion hook mutex poisoned").is_none()
    }
}

impl<C> Clone for CompletionHook<C> {
    fn clone(&self) -> Self {
        Self {
            hook: self.hook.clone(),
        }
    }
}

impl<C> std::fmt::Debug for CompletionHook<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionHook")
            .field("fired", &self.has_fired())
            .finish()
    }
}

/// What [`around_callback`] did with the call's arguments.
#[derive(Debug)]
pub enum Completion<C> {
    /// The callback was wrapped; the hook fires when it is called.
    Wrapped,
    /// No callback: schedule the hook on the return value.
    Deferred(CompletionHook<C>),
}

impl<C> Clone for Completion<C> {
    fn clone(&self) -> Self {
        match self {
            Completion::Wrapped => Completion::Wrapped,
            Completion::Deferred(hook) => Completion::Deferred(hook.clone()),
        }
    }
}

impl<C: 'static> Completion<C> {
    /// Fire a deferred hook when `event` is emitted. Returns whether a hook
    /// was scheduled.
    pub fn schedule_on(self, emitter: &Emitter, event: &'static str) -> bool {
        match self {
            Completion::Wrapped => false,
            Completion::Deferred(hook) => {
                emitter.once(event, move || {
                    hook.fire(Completed::Event(event));
                });
                true
            }
        }
    }
}

/// Route completion of an intercepted call through `hook`.
///
/// With a callback in `slot`, it is replaced by one that fires `hook` and
/// then calls the original with the same value. Without one, the hook comes
/// back [`Completion::Deferred`] for the caller to schedule.
pub fn around_callback<C: 'static>(
    slot: &mut Option<Callback<C>>,
    hook: CompletionHook<C>,
) -> Completion<C> {
    match slot.take() {
        Some(mut original) => {
            *slot = Some(Callback::new(move |value: &C| {
                hook.fire(Completed::Callback(value));
                original.call(value);
            }));
            Completion::Wrapped
        }
        None => Completion::Deferred(hook),
    }
}
