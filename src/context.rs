//! Request-scoped context.
//!
//! Each coroutine (or plain thread, outside a `may` scheduler) gets its own
//! scope holding a snapshot of the request being dispatched, typed slots for
//! collaborator state, and callbacks that run at teardown. The dispatcher
//! resets the scope on entry and destroys it before the response is handed
//! to the transport, so nothing leaks into the next request on the worker.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;

use crate::request::Request;

type Slot = Arc<dyn Any + Send + Sync>;
type DestroyCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Scope {
    request: Option<Arc<Request>>,
    slots: HashMap<String, Slot>,
    on_destroy: Vec<DestroyCallback>,
}

may::coroutine_local!(static SCOPE: RefCell<Scope> = RefCell::new(Scope::default()));

/// Start a fresh scope for `request`, dropping anything left behind.
pub fn reset(request: &Request) {
    let leftover = SCOPE.with(|s| {
        let mut scope = s.borrow_mut();
        let leftover = std::mem::take(&mut scope.on_destroy);
        scope.slots.clear();
        scope.request = Some(Arc::new(request.clone()));
        leftover
    });
    if !leftover.is_empty() {
        warn!(count = leftover.len(), "Discarding destroy callbacks from a previous request");
    }
}

/// Refresh the request snapshot once context fields are populated.
pub fn enter(request: &Request) {
    SCOPE.with(|s| s.borrow_mut().request = Some(Arc::new(request.clone())));
}

/// The request currently being dispatched on this coroutine.
pub fn current_request() -> Option<Arc<Request>> {
    SCOPE.with(|s| s.borrow().request.clone())
}

pub fn set<T: Any + Send + Sync>(key: &str, value: T) {
    SCOPE.with(|s| {
        s.borrow_mut()
            .slots
            .insert(key.to_string(), Arc::new(value));
    });
}

pub fn get<T: Any + Send + Sync>(key: &str) -> Option<Arc<T>> {
    SCOPE.with(|s| {
        s.borrow()
            .slots
            .get(key)
            .cloned()
            .and_then(|slot| slot.downcast::<T>().ok())
    })
}

pub fn has(key: &str) -> bool {
    SCOPE.with(|s| s.borrow().slots.contains_key(key))
}

/// Register a callback to run when the scope is destroyed.
pub fn on_destroy(callback: impl FnOnce() + Send + 'static) {
    SCOPE.with(|s| s.borrow_mut().on_destroy.push(Box::new(callback)));
}

/// Run destroy callbacks in registration order and clear the scope.
///
/// A panicking callback is logged and does not stop the others.
pub fn destroy() {
    let callbacks = SCOPE.with(|s| {
        let mut scope = s.borrow_mut();
        scope.request = None;
        scope.slots.clear();
        std::mem::take(&mut scope.on_destroy)
    });
    for callback in callbacks {
        if catch_unwind(AssertUnwindSafe(callback)).is_err() {
            warn!("Context destroy callback panicked");
        }
    }
}
