#![forbid(unsafe_code)]

//! Counter element and todo service driven through a shared runtime.

use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use propwatch_core::PropertyRegistry;
use propwatch_harness::components::todo::STORAGE_KEY;
use propwatch_harness::components::{
    CounterElement, MemoryStore, Todo, TodoEvent, TodoEventKind, TodoPatch, TodoService, TodoStatus,
    register_all,
};
use propwatch_harness::{TestElement, init_test_logging};
use propwatch_runtime::{HostElement, Runtime};

fn registry() -> PropertyRegistry {
    let mut builder = PropertyRegistry::builder();
    register_all(&mut builder);
    builder.build().unwrap()
}

// ============================================================================
// Counter
// ============================================================================

#[test]
fn counter_buttons_update_attribute_and_text() {
    init_test_logging();
    let rt = Runtime::new();
    let reg = registry();
    let counter = CounterElement::new(&rt, &reg, TestElement::with_attributes([("value", "5")])).unwrap();
    counter.connect();
    assert_eq!(counter.element().inner_text(), "5");
    rt.tick();

    counter.increment();
    counter.increment();
    counter.decrement();
    rt.run_until_idle().unwrap();

    let element = counter.element();
    assert_eq!(counter.value(), 6);
    assert_eq!(element.get_attribute("value").as_deref(), Some("6"));
    assert_eq!(element.inner_text(), "6");
    // Hydration mirrors "5"; the three clicks coalesce into one "6".
    let written: Vec<String> = element.writes().into_iter().map(|w| w.value).collect();
    assert_eq!(written, vec!["5", "6"]);
}

#[test]
fn counter_follows_external_attribute_writes() {
    let rt = Runtime::new();
    let reg = registry();
    let counter = CounterElement::new(&rt, &reg, TestElement::new()).unwrap();
    counter.connect();
    assert_eq!(counter.element().inner_text(), "0");

    counter.element().set_attribute("value", "-3");
    assert_eq!(counter.value(), -3);
    assert_eq!(counter.element().inner_text(), "-3");

    rt.run_until_idle().unwrap();
    assert!(rt.is_idle());
    assert_eq!(counter.element().get_attribute("value").as_deref(), Some("-3"));
}

#[test]
fn counter_ignores_non_numeric_attribute() {
    let rt = Runtime::new();
    let reg = registry();
    let counter = CounterElement::new(&rt, &reg, TestElement::new()).unwrap();
    counter.set_value(2);
    rt.tick();

    counter.element().set_attribute("value", "two");
    assert_eq!(counter.value(), 2);
    assert_eq!(counter.element().inner_text(), "2");
}

// ============================================================================
// Todo service
// ============================================================================

#[test]
fn todo_changes_are_persisted_by_the_effect() {
    let rt = Runtime::new();
    let reg = registry();
    let store = MemoryStore::new();
    let service = TodoService::new(&rt, &reg, Rc::clone(&store)).unwrap();
    assert!(service.get_todos().is_empty());
    assert!(service.is_initialized());

    let milk = Todo::create("buy milk", TodoStatus::Active);
    let bread = Todo::create("buy bread", TodoStatus::Active);
    service.add_todo(milk.clone());
    service.add_todo(bread.clone());
    service.update_todo(&milk.id, &TodoPatch::status(TodoStatus::Complete));
    service.remove_todo(&bread.id);
    rt.run_until_idle().unwrap();

    assert_eq!(store.save_count(), 1, "one save for the whole turn");
    let saved = store.load(STORAGE_KEY).unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].id, milk.id);
    assert_eq!(saved[0].status, TodoStatus::Complete);
}

#[test]
fn todo_service_loads_previous_session() {
    let rt = Runtime::new();
    let reg = registry();
    let store = MemoryStore::new();
    store.save(STORAGE_KEY, &[Todo::create("carry over", TodoStatus::Active)]);

    let service = TodoService::new(&rt, &reg, Rc::clone(&store)).unwrap();
    assert!(service.todos().is_empty(), "nothing loaded before first read");
    let todos = service.get_todos();
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0].name, "carry over");

    // A second read does not go back to the store.
    store.save(STORAGE_KEY, &[]);
    assert_eq!(service.get_todos().len(), 1);
}

#[test]
fn todo_events_reach_matching_subscribers() {
    let rt = Runtime::new();
    let reg = registry();
    let service = TodoService::new(&rt, &reg, MemoryStore::new()).unwrap();
    let events = Rc::new(RefCell::new(Vec::new()));

    let sink = Rc::clone(&events);
    let _added = service.listen(TodoEventKind::Added, move |e| sink.borrow_mut().push(e.clone()));
    let sink = Rc::clone(&events);
    let _removed = service.listen(TodoEventKind::Removed, move |e| sink.borrow_mut().push(e.clone()));

    let todo = Todo::create("walk", TodoStatus::Active);
    service.add_todo(todo.clone());
    service.update_todo(&todo.id, &TodoPatch::name("run"));
    service.update_todo("missing", &TodoPatch::name("nope"));
    service.remove_todo(&todo.id);

    assert_eq!(
        *events.borrow(),
        vec![TodoEvent::Added(todo.clone()), TodoEvent::Removed(todo.id.clone())]
    );
}

#[test]
fn dropped_service_stops_persisting() {
    let rt = Runtime::new();
    let reg = registry();
    let store = MemoryStore::new();
    let service = TodoService::new(&rt, &reg, Rc::clone(&store)).unwrap();
    assert_eq!(rt.effect_count(), 1);

    service.add_todo(Todo::create("temp", TodoStatus::Active));
    drop(service);
    assert_eq!(rt.effect_count(), 0);
    rt.run_until_idle().unwrap();
    assert_eq!(store.save_count(), 0);
}

#[test]
fn effects_fan_out_across_components() {
    let rt = Runtime::new();
    let reg = registry();
    let store = MemoryStore::new();
    let service = TodoService::new(&rt, &reg, Rc::clone(&store)).unwrap();
    let counter = CounterElement::new(&rt, &reg, TestElement::new()).unwrap();
    rt.run_until_idle().unwrap();

    // The persisting effect re-runs after any observed write on the runtime.
    counter.increment();
    rt.run_until_idle().unwrap();
    assert_eq!(store.save_count(), 1);
    assert!(service.todos().is_empty());
}
