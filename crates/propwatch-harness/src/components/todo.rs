#![forbid(unsafe_code)]

//! Todo list service persisted by an effect.
//!
//! The list lives in an observed `todos` property. A registered effect saves
//! it to a [`MemoryStore`] after every turn that changed an observed property
//! anywhere on the runtime, so mutations never call the store directly.
//! Mutations also dispatch [`TodoEvent`]s synchronously to subscribers.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use propwatch_core::{PropertyKey, PropertyRegistry, RegistryBuilder};
use propwatch_runtime::{BindError, Effect, Prop, Runtime, Tracker};
use tracing::debug;

/// Store key the service persists under.
pub const STORAGE_KEY: &str = "propwatch_todo";

const TODOS: PropertyKey = "todos";
const INITIALIZED: PropertyKey = "initialized";

static NEXT_TODO_ID: AtomicU64 = AtomicU64::new(1);

/// Declare the service's properties.
pub fn register(builder: &mut RegistryBuilder) {
    builder
        .class::<TodoService>()
        .observe(TODOS)
        .observe(INITIALIZED);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TodoStatus {
    Active,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Todo {
    pub id: String,
    pub name: String,
    pub status: TodoStatus,
}

impl Todo {
    /// New todo with a process-unique id.
    #[must_use]
    pub fn create(name: impl Into<String>, status: TodoStatus) -> Self {
        let n = NEXT_TODO_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("todo--{n}"),
            name: name.into(),
            status,
        }
    }
}

/// Partial update applied by [`TodoService::update_todo`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoPatch {
    pub name: Option<String>,
    pub status: Option<TodoStatus>,
}

impl TodoPatch {
    #[must_use]
    pub fn status(status: TodoStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    fn apply(&self, todo: &Todo) -> Todo {
        Todo {
            id: todo.id.clone(),
            name: self.name.clone().unwrap_or_else(|| todo.name.clone()),
            status: self.status.unwrap_or(todo.status),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodoEvent {
    Added(Todo),
    /// Id of the removed todo.
    Removed(String),
    Updated(Todo),
}

impl TodoEvent {
    #[must_use]
    pub fn kind(&self) -> TodoEventKind {
        match self {
            Self::Added(_) => TodoEventKind::Added,
            Self::Removed(_) => TodoEventKind::Removed,
            Self::Updated(_) => TodoEventKind::Updated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TodoEventKind {
    Added,
    Removed,
    Updated,
}

/// In-memory key/value store for todo lists.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<IndexMap<String, Vec<Todo>>>,
    saves: Cell<usize>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn save(&self, key: &str, todos: &[Todo]) {
        self.entries.borrow_mut().insert(key.to_owned(), todos.to_vec());
        self.saves.set(self.saves.get() + 1);
    }

    #[must_use]
    pub fn load(&self, key: &str) -> Option<Vec<Todo>> {
        self.entries.borrow().get(key).cloned()
    }

    /// Number of `save` calls so far.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.get()
    }
}

type EventCallback = Rc<dyn Fn(&TodoEvent)>;

struct ServiceInner {
    todos: Prop<Vec<Todo>>,
    initialized: Prop<bool>,
    store: Rc<MemoryStore>,
    subscribers: RefCell<Vec<(u64, TodoEventKind, EventCallback)>>,
    next_subscriber: Cell<u64>,
    _sync: Effect,
}

impl ServiceInner {
    fn sync_to_store(&self) {
        self.todos.with(|todos| {
            debug!(todos = todos.len(), "saving todos");
            self.store.save(STORAGE_KEY, todos);
        });
    }

    fn dispatch(&self, event: &TodoEvent) {
        let kind = event.kind();
        let targets: Vec<EventCallback> = self
            .subscribers
            .borrow()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, cb)| Rc::clone(cb))
            .collect();
        for cb in targets {
            cb(event);
        }
    }
}

/// Todo list service.
///
/// Cloning shares the service. The persisting effect is disposed when the
/// last clone is dropped.
#[derive(Clone)]
pub struct TodoService {
    inner: Rc<ServiceInner>,
}

impl TodoService {
    /// Build a service on `runtime` persisting to `store`.
    ///
    /// # Errors
    ///
    /// Returns [`BindError`] when `registry` lacks the service declaration
    /// (see [`register`]).
    pub fn new(
        runtime: &Runtime,
        registry: &PropertyRegistry,
        store: Rc<MemoryStore>,
    ) -> Result<Self, BindError> {
        let tracker = Tracker::for_class::<Self>(runtime, registry);
        let todos = tracker.prop(TODOS, Vec::new())?;
        let initialized = tracker.prop(INITIALIZED, false)?;
        let inner = Rc::new_cyclic(|weak: &Weak<ServiceInner>| {
            let weak = weak.clone();
            let sync = runtime.register_effect(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.sync_to_store();
                }
            });
            ServiceInner {
                todos,
                initialized,
                store,
                subscribers: RefCell::new(Vec::new()),
                next_subscriber: Cell::new(0),
                _sync: sync,
            }
        });
        Ok(Self { inner })
    }

    /// Current list, loading it from the store on first use.
    pub fn get_todos(&self) -> Vec<Todo> {
        let inner = &self.inner;
        if !inner.initialized.get() {
            let stored = inner.store.load(STORAGE_KEY);
            inner.initialized.set(true);
            if let Some(todos) = stored {
                inner.todos.set(todos);
            }
        }
        inner.todos.get()
    }

    /// Current list without touching the store.
    #[must_use]
    pub fn todos(&self) -> Vec<Todo> {
        self.inner.todos.get()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.get()
    }

    pub fn add_todo(&self, todo: Todo) {
        self.inner.todos.update(|todos| todos.push(todo.clone()));
        self.inner.dispatch(&TodoEvent::Added(todo));
    }

    pub fn remove_todo(&self, id: &str) {
        self.inner.todos.update(|todos| todos.retain(|t| t.id != id));
        self.inner.dispatch(&TodoEvent::Removed(id.to_owned()));
    }

    /// Apply `patch` to the todo with `id`. Unknown ids change nothing and
    /// dispatch nothing.
    pub fn update_todo(&self, id: &str, patch: &TodoPatch) {
        let mut updated = None;
        self.inner.todos.update(|todos| {
            if let Some(todo) = todos.iter_mut().find(|t| t.id == id) {
                *todo = patch.apply(todo);
                updated = Some(todo.clone());
            }
        });
        if let Some(todo) = updated {
            self.inner.dispatch(&TodoEvent::Updated(todo));
        }
    }

    /// Subscribe to events of `kind`. Dropping the returned handle
    /// unsubscribes.
    #[must_use]
    pub fn listen(&self, kind: TodoEventKind, callback: impl Fn(&TodoEvent) + 'static) -> Subscription {
        let id = self.inner.next_subscriber.get();
        self.inner.next_subscriber.set(id + 1);
        self.inner
            .subscribers
            .borrow_mut()
            .push((id, kind, Rc::new(callback)));
        Subscription {
            id,
            service: Rc::downgrade(&self.inner),
        }
    }
}

impl fmt::Debug for TodoService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TodoService")
            .field("todos", &self.inner.todos)
            .field("initialized", &self.inner.initialized)
            .field("subscribers", &self.inner.subscribers.borrow().len())
            .finish()
    }
}

/// Event subscription returned by [`TodoService::listen`].
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    service: Weak<ServiceInner>,
}

impl Subscription {
    /// Unsubscribe now.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.service.upgrade() {
            let removed = {
                let mut subs = inner.subscribers.borrow_mut();
                let pos = subs.iter().position(|(id, _, _)| *id == self.id);
                pos.map(|pos| subs.remove(pos))
            };
            // Callback captures drop outside the borrow.
            drop(removed);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn setup() -> (Runtime, Rc<MemoryStore>, TodoService) {
        let mut builder = PropertyRegistry::builder();
        register(&mut builder);
        let registry = builder.build().unwrap();
        let rt = Runtime::new();
        let store = MemoryStore::new();
        let service = TodoService::new(&rt, &registry, Rc::clone(&store)).unwrap();
        (rt, store, service)
    }

    #[test]
    fn patch_keeps_unset_fields() {
        let todo = Todo::create("write tests", TodoStatus::Active);
        let patched = TodoPatch::status(TodoStatus::Complete).apply(&todo);
        assert_eq!(patched.name, "write tests");
        assert_eq!(patched.id, todo.id);
        assert_eq!(patched.status, TodoStatus::Complete);
    }

    #[test]
    fn created_ids_are_unique() {
        let a = Todo::create("a", TodoStatus::Active);
        let b = Todo::create("a", TodoStatus::Active);
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("todo--"));
    }

    #[test]
    fn mutations_persist_once_per_turn() {
        let (rt, store, service) = setup();
        service.add_todo(Todo::create("one", TodoStatus::Active));
        service.add_todo(Todo::create("two", TodoStatus::Active));
        assert_eq!(store.save_count(), 0, "saving is deferred");

        rt.run_until_idle().unwrap();
        assert_eq!(store.save_count(), 1);
        let saved = store.load(STORAGE_KEY).unwrap();
        assert_eq!(saved.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), vec!["one", "two"]);
    }

    #[test]
    fn dropping_a_subscription_unsubscribes() {
        let (_rt, _store, service) = setup();
        let seen = Rc::new(Cell::new(0));
        let s = Rc::clone(&seen);
        let sub = service.listen(TodoEventKind::Added, move |_| s.set(s.get() + 1));

        service.add_todo(Todo::create("x", TodoStatus::Active));
        sub.cancel();
        service.add_todo(Todo::create("y", TodoStatus::Active));
        assert_eq!(seen.get(), 1);
    }
}
