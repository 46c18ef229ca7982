//! Typed, stoppable event bus.
//!
//! The source dispatches control flow via named events with "stoppers"
//! (spec.md §9 design notes). We model that as an explicit listener vector
//! per event *type*, keyed in a registry — design note (a), preferred for
//! hot paths like mode handlers and channel fan-out. Cross-component
//! asynchronous signals (linkage results) are instead modeled as message
//! passing; see [`crate::linkage`].
//!
//! Each well-known event is a plain struct owned by the module that fires
//! it (e.g. [`crate::channel::ops::CanJoin`]); this module only provides
//! the registration/dispatch mechanism.

use std::any::{Any, TypeId};
use std::collections::HashMap;

type Listener<E> = Box<dyn Fn(&mut E) -> bool + Send + Sync>;

/// A registry of per-event-type listener vectors.
///
/// `fire` calls every registered listener for `E` in registration order and
/// stops at the first one that returns `false` ("this event is vetoed").
/// The return value mirrors that: `true` if no listener stopped it.
#[derive(Default)]
pub struct EventBus {
    registry: HashMap<TypeId, Vec<Box<dyn Any + Send + Sync>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for event type `E`. Returning `false` from the
    /// listener stops the event (vetoes it) and short-circuits later
    /// listeners.
    pub fn on<E: 'static>(&mut self, listener: impl Fn(&mut E) -> bool + Send + Sync + 'static) {
        self.registry
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Box::new(Box::new(listener) as Listener<E>));
    }

    /// Fire an event, running every registered listener in order.
    /// Returns `true` if the event was not stopped.
    pub fn fire<E: 'static>(&self, event: &mut E) -> bool {
        let Some(listeners) = self.registry.get(&TypeId::of::<E>()) else {
            return true;
        };
        for boxed in listeners {
            let Some(listener) = boxed.downcast_ref::<Listener<E>>() else {
                continue;
            };
            if !listener(event) {
                return false;
            }
        }
        true
    }

    /// Number of listeners registered for event type `E` (mainly for tests).
    pub fn listener_count<E: 'static>(&self) -> usize {
        self.registry.get(&TypeId::of::<E>()).map_or(0, Vec::len)
    }
}
