//! Registration table mapping event kinds to handler callbacks.

use crate::error::LichessError;
use crate::event::{Event, EventKind, Filter};
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

pub type Callback = Arc<dyn Fn(&Event) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&LichessError) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

#[derive(Clone)]
struct Registration {
    id: HandlerId,
    filter: Filter,
    callback: Callback,
}

/// Thread safe table of handlers.
///
/// Handlers for one kind run in the order they were registered. Callbacks are
/// invoked without holding the table lock, so a callback may register or
/// remove handlers itself.
#[derive(Default)]
pub struct Dispatcher {
    handlers: RwLock<HashMap<EventKind, Vec<Registration>>>,
    error_handlers: RwLock<Vec<ErrorCallback>>,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, kind: EventKind, filter: Filter, callback: F) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        debug!("registering {} for {} ({:?})", id, kind, filter);

        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers.entry(kind).or_default().push(Registration {
            id,
            filter,
            callback: Arc::new(callback),
        });
        id
    }

    /// Removes a handler. Returns false if it was not registered.
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        for registrations in handlers.values_mut() {
            if let Some(pos) = registrations.iter().position(|r| r.id == id) {
                registrations.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn contains(&self, id: HandlerId) -> bool {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.values().flatten().any(|r| r.id == id)
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Invokes every matching handler once. Returns how many were invoked.
    pub fn dispatch(&self, event: &Event) -> usize {
        self.dispatch_while(event, || true)
    }

    /// Like [`Dispatcher::dispatch`], but checks `keep_going` before each handler
    /// and stops as soon as it returns false.
    ///
    /// A handler removed by an earlier handler of the same event is not invoked.
    pub fn dispatch_while(&self, event: &Event, keep_going: impl Fn() -> bool) -> usize {
        let matching: Vec<Registration> = {
            let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            match handlers.get(&event.kind()) {
                Some(registrations) => registrations
                    .iter()
                    .filter(|r| r.filter.accepts(event))
                    .cloned()
                    .collect(),
                None => return 0,
            }
        };

        let mut invoked = 0;
        for registration in matching {
            if !keep_going() {
                break;
            }
            if !self.contains(registration.id) {
                continue;
            }
            (registration.callback)(event);
            invoked += 1;
        }
        invoked
    }

    /// Registers a hook for stream errors (undecodable lines, transport failures).
    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&LichessError) + Send + Sync + 'static,
    {
        self.error_handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    pub fn report(&self, error: &LichessError) {
        let hooks = self
            .error_handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for hook in hooks {
            hook(error);
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<_, _> = handlers.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("Dispatcher").field("handlers", &counts).finish()
    }
}
