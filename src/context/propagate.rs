//! Carrying the current execution context across continuations.
//!
//! Within one task the context survives every `.await` (timers, chained
//! I/O). Work that leaves the task (spawned tasks, callbacks, event
//! listeners) must be handed the context explicitly, through [`spawn`],
//! [`ExecutionContext::bind`] or [`InContext`].

use std::future::Future;

use tokio::task::futures::TaskLocalFuture;
use tokio::task::JoinHandle;

use crate::context::store::ExecutionContext;

tokio::task_local! {
    static CURRENT: Option<ExecutionContext>;
}

/// The execution context the running code belongs to, if any.
pub fn current() -> Option<ExecutionContext> {
    CURRENT.try_with(|ctx| ctx.clone()).ok().flatten()
}

impl ExecutionContext {
    /// Run `fut` with this context current.
    pub fn scope<F: Future>(&self, fut: F) -> TaskLocalFuture<Option<ExecutionContext>, F> {
        CURRENT.scope(Some(self.clone()), fut)
    }

    /// Run `f` synchronously with this context current.
    pub fn sync_scope<R, F: FnOnce() -> R>(&self, f: F) -> R {
        CURRENT.sync_scope(Some(self.clone()), f)
    }

    /// Wrap `f` so it runs inside this context whenever it is finally called.
    pub fn bind<R, F: FnOnce() -> R>(&self, f: F) -> impl FnOnce() -> R {
        let ctx = self.clone();
        move || ctx.sync_scope(f)
    }
}

/// Wrap `f` so it runs inside the context current at the time of binding.
/// With no current context `f` is returned as-is, boxed.
pub fn bind_current<F>(f: F) -> Box<dyn FnOnce() + Send>
where
    F: FnOnce() + Send + 'static,
{
    match current() {
        Some(ctx) => Box::new(ctx.bind(f)),
        None => Box::new(f),
    }
}

/// Spawn a task that inherits the current execution context.
pub fn spawn<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(fut.in_current_context())
}

/// Attach an execution context to a future.
pub trait InContext: Future + Sized {
    /// Poll this future with `ctx` current.
    fn in_context(self, ctx: ExecutionContext) -> TaskLocalFuture<Option<ExecutionContext>, Self> {
        CURRENT.scope(Some(ctx), self)
    }

    /// Poll this future with the context current right now, if any.
    fn in_current_context(self) -> TaskLocalFuture<Option<ExecutionContext>, Self> {
        CURRENT.scope(current(), self)
    }
}

impl<F: Future> InContext for F {}
