//! Callback registries for server notifications and status changes.
//!
//! Listeners are kept in registration order and are invoked without any
//! registry lock held, so a callback may subscribe, unsubscribe or call back
//! into the client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;
use slotmap::{SlotMap, new_key_type};

use crate::client::State;

new_key_type! { pub(crate) struct ListenerId; }

pub(crate) struct Listener<A> {
    active: AtomicBool,
    func: Mutex<Box<dyn FnMut(A) + Send + 'static>>,
}

impl<A> Listener<A> {
    fn new(func: impl FnMut(A) + Send + 'static) -> Self {
        Self {
            active: AtomicBool::new(true),
            func: Mutex::new(Box::new(func)),
        }
    }

    pub(crate) fn call(&self, arg: A) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        let mut func = self.func.lock().unwrap();
        // may have been removed while we waited for the lock
        if self.active.load(Ordering::Acquire) {
            func(arg);
        }
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }
}

/// Ordered set of callbacks sharing one argument type.
pub(crate) struct ListenerSet<A> {
    listeners: SlotMap<ListenerId, Arc<Listener<A>>>,
    order: Vec<ListenerId>,
}

impl<A> Default for ListenerSet<A> {
    fn default() -> Self {
        Self {
            listeners: SlotMap::with_key(),
            order: Vec::new(),
        }
    }
}

impl<A> ListenerSet<A> {
    pub(crate) fn insert(&mut self, func: impl FnMut(A) + Send + 'static) -> ListenerId {
        let id = self.listeners.insert(Arc::new(Listener::new(func)));
        self.order.push(id);
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        match self.listeners.remove(id) {
            Some(listener) => {
                listener.deactivate();
                self.order.retain(|other| *other != id);
                true
            }
            None => false,
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<Listener<A>>> {
        self.order
            .iter()
            .filter_map(|id| self.listeners.get(*id).cloned())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        for (_, listener) in self.listeners.drain() {
            listener.deactivate();
        }
        self.order.clear();
    }
}

/// All callbacks registered on a client.
#[derive(Default)]
pub(crate) struct Registry {
    events: HashMap<String, ListenerSet<Value>>,
    status: ListenerSet<State>,
    error: Option<Arc<Listener<anyhow::Error>>>,
}

impl Registry {
    pub(crate) fn add_event(
        &mut self,
        method: &str,
        func: impl FnMut(Value) + Send + 'static,
    ) -> ListenerId {
        self.events.entry(method.to_string()).or_default().insert(func)
    }

    pub(crate) fn add_status(&mut self, func: impl FnMut(State) + Send + 'static) -> ListenerId {
        self.status.insert(func)
    }

    pub(crate) fn set_error(&mut self, func: impl FnMut(anyhow::Error) + Send + 'static) {
        if let Some(old) = self.error.replace(Arc::new(Listener::new(func))) {
            old.deactivate();
        }
    }

    fn remove(&mut self, topic: &Topic, id: ListenerId) -> bool {
        match topic {
            Topic::Status => self.status.remove(id),
            Topic::Event(method) => {
                let Some(set) = self.events.get_mut(method) else {
                    return false;
                };
                let removed = set.remove(id);
                if set.is_empty() {
                    self.events.remove(method);
                }
                removed
            }
        }
    }

    pub(crate) fn event_listener_count(&self, method: &str) -> usize {
        self.events.get(method).map_or(0, ListenerSet::len)
    }

    pub(crate) fn clear(&mut self) {
        for (_, mut set) in self.events.drain() {
            set.clear();
        }
        self.status.clear();
        if let Some(error) = self.error.take() {
            error.deactivate();
        }
    }

    /// Invokes every listener of `method` with `params`, in registration order.
    pub(crate) fn emit_event(registry: &Mutex<Registry>, method: &str, params: Value) {
        let listeners = {
            let registry = registry.lock().unwrap();
            match registry.events.get(method) {
                Some(set) => set.snapshot(),
                None => {
                    log::trace!("no listener for notification {}", method);
                    return;
                }
            }
        };
        for listener in listeners {
            listener.call(params.clone());
        }
    }

    pub(crate) fn emit_status(registry: &Mutex<Registry>, state: State) {
        let listeners = registry.lock().unwrap().status.snapshot();
        for listener in listeners {
            listener.call(state);
        }
    }

    pub(crate) fn emit_error(registry: &Mutex<Registry>, err: anyhow::Error) {
        let listener = registry.lock().unwrap().error.clone();
        if let Some(listener) = listener {
            listener.call(err);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Topic {
    Status,
    Event(String),
}

/// Handle returned by [`Client::on`](crate::client::Client::on) and
/// [`Client::on_status_change`](crate::client::Client::on_status_change).
///
/// Dropping the handle keeps the callback registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    topic: Topic,
    id: ListenerId,
}

impl Subscription {
    pub(crate) fn event(registry: &Arc<Mutex<Registry>>, method: &str, id: ListenerId) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            topic: Topic::Event(method.to_string()),
            id,
        }
    }

    pub(crate) fn status(registry: &Arc<Mutex<Registry>>, id: ListenerId) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            topic: Topic::Status,
            id,
        }
    }

    /// Removes this callback. Calling it again has no effect.
    ///
    /// Returns `true` if the callback was still registered.
    pub fn unsubscribe(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut registry = registry.lock().unwrap();
        registry.remove(&self.topic, self.id)
    }

    /// Method name for notification subscriptions, `None` for status ones.
    pub fn method(&self) -> Option<&str> {
        match &self.topic {
            Topic::Event(method) => Some(method),
            Topic::Status => None,
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn FnMut(Value) + Send>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log1 = log.clone();
        let make = move |tag: &str| -> Box<dyn FnMut(Value) + Send> {
            let log = log1.clone();
            let tag = tag.to_string();
            Box::new(move |params: Value| log.lock().unwrap().push(format!("{tag}:{params}")))
        };
        (log, make)
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let registry = Arc::new(Mutex::new(Registry::default()));
        let (log, make) = recorder();
        registry.lock().unwrap().add_event("a", make("1"));
        registry.lock().unwrap().add_event("a", make("2"));
        registry.lock().unwrap().add_event("b", make("3"));

        Registry::emit_event(&registry, "a", json!(1));

        assert_eq!(*log.lock().unwrap(), vec!["1:1", "2:1"]);
    }

    #[test]
    fn unsubscribe_removes_exactly_one_and_is_idempotent() {
        let registry = Arc::new(Mutex::new(Registry::default()));
        let (log, make) = recorder();
        let first = registry.lock().unwrap().add_event("a", make("1"));
        registry.lock().unwrap().add_event("a", make("2"));
        let sub = Subscription::event(&registry, "a", first);

        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
        Registry::emit_event(&registry, "a", json!("x"));

        assert_eq!(*log.lock().unwrap(), vec![r#"2:"x""#]);
        assert_eq!(registry.lock().unwrap().event_listener_count("a"), 1);
    }

    #[test]
    fn listener_may_unsubscribe_itself() {
        let registry = Arc::new(Mutex::new(Registry::default()));
        let calls = Arc::new(Mutex::new(0));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let id = {
            let calls = calls.clone();
            let slot = slot.clone();
            registry.lock().unwrap().add_event("a", move |_| {
                *calls.lock().unwrap() += 1;
                if let Some(sub) = slot.lock().unwrap().as_ref() {
                    sub.unsubscribe();
                }
            })
        };
        *slot.lock().unwrap() = Some(Subscription::event(&registry, "a", id));

        Registry::emit_event(&registry, "a", Value::Null);
        Registry::emit_event(&registry, "a", Value::Null);

        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn status_listeners_receive_states() {
        let registry = Arc::new(Mutex::new(Registry::default()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen1 = seen.clone();
        registry
            .lock()
            .unwrap()
            .add_status(move |state| seen1.lock().unwrap().push(state));

        Registry::emit_status(&registry, State::Connecting);
        Registry::emit_status(&registry, State::Connected);

        assert_eq!(*seen.lock().unwrap(), vec![State::Connecting, State::Connected]);
    }

    #[test]
    fn clear_drops_everything() {
        let registry = Arc::new(Mutex::new(Registry::default()));
        let (log, make) = recorder();
        registry.lock().unwrap().add_event("a", make("1"));
        registry.lock().unwrap().clear();

        Registry::emit_event(&registry, "a", Value::Null);

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(registry.lock().unwrap().event_listener_count("a"), 0);
    }

    #[test]
    fn unsubscribe_after_registry_dropped() {
        let registry = Arc::new(Mutex::new(Registry::default()));
        let id = registry.lock().unwrap().add_status(|_| {});
        let sub = Subscription::status(&registry, id);
        drop(registry);
        assert!(!sub.unsubscribe());
    }
}
