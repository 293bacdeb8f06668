// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Named-event emitter for the single-threaded engine.
//!
//! Every observable entity in the runtime (graph, socket, component,
//! network, loader) carries an [`EventEmitter`] parameterized over a tagged
//! event enum. Listeners subscribe either to a single event name or to the
//! wildcard (every event). Emission snapshots the listener list, so handlers
//! may subscribe or unsubscribe mid-emit without invalidating the dispatch.
//!
//! The engine runs on one logical executor (see `scheduler`), so callbacks
//! are plain `Rc<dyn Fn>` and the emitter uses interior mutability rather
//! than locks.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// A tagged event with a protocol-facing name (`"addNode"`, `"data"`, …).
pub trait Event {
    fn name(&self) -> &'static str;
}

/// Handle returned by subscription calls; pass to [`EventEmitter::remove`]
/// to detach that listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Entry<E> {
    id: ListenerId,
    /// `None` subscribes to every event (the wildcard path).
    name: Option<&'static str>,
    once: bool,
    callback: Rc<dyn Fn(&E)>,
}

pub struct EventEmitter<E> {
    entries: RefCell<Vec<Entry<E>>>,
    next_id: Cell<u64>,
}

impl<E: Event> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    fn subscribe(
        &self,
        name: Option<&'static str>,
        once: bool,
        callback: Rc<dyn Fn(&E)>,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        self.entries.borrow_mut().push(Entry {
            id,
            name,
            once,
            callback,
        });
        id
    }

    /// Subscribe to a single event name.
    pub fn on(&self, name: &'static str, f: impl Fn(&E) + 'static) -> ListenerId {
        self.subscribe(Some(name), false, Rc::new(f))
    }

    /// Subscribe to a single event name; the listener detaches before its
    /// first invocation runs.
    pub fn once(&self, name: &'static str, f: impl Fn(&E) + 'static) -> ListenerId {
        self.subscribe(Some(name), true, Rc::new(f))
    }

    /// Subscribe to every event (the `"all"` wildcard).
    pub fn on_any(&self, f: impl Fn(&E) + 'static) -> ListenerId {
        self.subscribe(None, false, Rc::new(f))
    }

    /// Remove a single listener by handle. Unknown handles are ignored.
    pub fn remove(&self, id: ListenerId) {
        self.entries.borrow_mut().retain(|e| e.id != id);
    }

    /// Remove every listener.
    pub fn off(&self) {
        self.entries.borrow_mut().clear();
    }

    /// Remove every listener registered for `name`.
    pub fn off_event(&self, name: &str) {
        self.entries.borrow_mut().retain(|e| e.name != Some(name));
    }

    /// Number of listeners registered for `name` (wildcard listeners not
    /// included).
    pub fn listener_count(&self, name: &str) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|e| e.name == Some(name))
            .count()
    }

    /// Emit an event to every matching listener, in registration order, then
    /// to the wildcard listeners. Missing listeners are not an error.
    ///
    /// Returns whether any listener observed the event.
    pub fn emit(&self, event: E) -> bool {
        let name = event.name();

        // Snapshot matching callbacks and drop `once` entries up front so a
        // recursive emit from inside a handler cannot re-enter it.
        let mut callbacks: Vec<Rc<dyn Fn(&E)>> = Vec::new();
        {
            let mut entries = self.entries.borrow_mut();
            for entry in entries.iter() {
                if entry.name.is_none() || entry.name == Some(name) {
                    callbacks.push(Rc::clone(&entry.callback));
                }
            }
            entries.retain(|e| !(e.once && e.name == Some(name)));
        }

        for callback in &callbacks {
            callback(&event);
        }

        !callbacks.is_empty()
    }
}

impl<E: Event> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}
