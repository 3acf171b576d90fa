//! Reference components built on the public propwatch API.

pub mod counter;
pub mod todo;

pub use counter::CounterElement;
pub use todo::{MemoryStore, Subscription, Todo, TodoEvent, TodoEventKind, TodoPatch, TodoService, TodoStatus};

use propwatch_core::RegistryBuilder;

/// Declare every reference component's properties on `builder`.
pub fn register_all(builder: &mut RegistryBuilder) {
    counter::register(builder);
    todo::register(builder);
}
