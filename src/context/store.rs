//! Execution contexts and the store that indexes them.

use std::any::Any;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use uuid::Uuid;

/// Identity of one logical execution (one inbound unit of work).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

type Registry = DashMap<ContextId, Weak<ContextInner>>;
type Value = Arc<dyn Any + Send + Sync>;

struct ContextInner {
    id: ContextId,
    values: DashMap<String, Value>,
    registry: Weak<Registry>,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        // Last continuation is gone: forget the id.
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id);
        }
        tracing::trace!(context_id = %self.id, "Execution context released");
    }
}

/// Values scoped to one logical request.
///
/// Cheap to clone; every clone is the same execution. The context lives as
/// long as some continuation still holds a clone.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<ContextInner>,
}

impl ExecutionContext {
    /// A context not indexed by any store.
    pub fn detached() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id: ContextId::new(),
                values: DashMap::new(),
                registry: Weak::new(),
            }),
        }
    }

    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set<T: Any + Send + Sync>(&self, key: &str, value: T) {
        self.inner.values.insert(key.to_string(), Arc::new(value));
    }

    /// Clone out the value under `key` if it exists and has type `T`.
    pub fn get<T: Any + Send + Sync + Clone>(&self, key: &str) -> Option<T> {
        self.inner
            .values
            .get(key)
            .and_then(|v| v.value().downcast_ref::<T>().cloned())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.values.contains_key(key)
    }

    /// Remove the value under `key`. Returns whether something was removed.
    pub fn remove(&self, key: &str) -> bool {
        self.inner.values.remove(key).is_some()
    }

    /// Whether both handles refer to the same execution.
    pub fn same_execution(&self, other: &ExecutionContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self.inner.values.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("ExecutionContext")
            .field("id", &self.inner.id)
            .field("keys", &keys)
            .finish()
    }
}

/// Index of live execution contexts.
///
/// Holds weak references only: a context disappears from the store as soon
/// as the last continuation referencing it is dropped.
#[derive(Clone, Default)]
pub struct ContextStore {
    registry: Arc<Registry>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new logical execution.
    pub fn enter(&self) -> ExecutionContext {
        let id = ContextId::new();
        let inner = Arc::new(ContextInner {
            id,
            values: DashMap::new(),
            registry: Arc::downgrade(&self.registry),
        });
        self.registry.insert(id, Arc::downgrade(&inner));
        tracing::trace!(context_id = %id, "Execution context entered");
        ExecutionContext { inner }
    }

    /// Look up a live execution by id.
    pub fn with_context(&self, id: ContextId) -> Option<ExecutionContext> {
        let inner = self.registry.get(&id).and_then(|w| w.value().upgrade())?;
        Some(ExecutionContext { inner })
    }

    /// Number of executions still referenced somewhere.
    pub fn live(&self) -> usize {
        self.registry.retain(|_, w| w.strong_count() > 0);
        self.registry.len()
    }
}

impl std::fmt::Debug for ContextStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextStore")
            .field("entries", &self.registry.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_are_typed() {
        let store = ContextStore::new();
        let ctx = store.enter();

        ctx.set("span", String::from("root"));
        ctx.set("attempt", 3u32);

        assert_eq!(ctx.get::<String>("span").as_deref(), Some("root"));
        assert_eq!(ctx.get::<u32>("attempt"), Some(3));
        // Wrong type reads as absent.
        assert_eq!(ctx.get::<u64>("attempt"), None);
        assert_eq!(ctx.get::<String>("missing"), None);
    }

    #[test]
    fn with_context_finds_the_same_execution() {
        let store = ContextStore::new();
        let ctx = store.enter();
        ctx.set("span", 7u8);

        let found = store.with_context(ctx.id()).expect("context should be live");
        assert!(found.same_execution(&ctx));
        found.set("span", 8u8);
        assert_eq!(ctx.get::<u8>("span"), Some(8));
    }

    #[test]
    fn independent_executions_do_not_share_values() {
        let store = ContextStore::new();
        let a = store.enter();
        let b = store.enter();

        a.set("span", "a");
        b.set("span", "b");

        assert_ne!(a.id(), b.id());
        assert_eq!(a.get::<&str>("span"), Some("a"));
        assert_eq!(b.get::<&str>("span"), Some("b"));
    }

    #[test]
    fn dropped_contexts_leave_the_store() {
        let store = ContextStore::new();
        let ctx = store.enter();
        let id = ctx.id();
        let continuation = ctx.clone();
        assert_eq!(store.live(), 1);

        drop(ctx);
        assert!(store.with_context(id).is_some());

        drop(continuation);
        assert!(store.with_context(id).is_none());
        assert_eq!(store.live(), 0);
    }

    #[test]
    fn remove_clears_key() {
        let ctx = ExecutionContext::detached();
        ctx.set("span", 1i32);
        assert!(ctx.contains("span"));
        assert!(ctx.remove("span"));
        assert!(!ctx.remove("span"));
    }
}
