//! Discrete notifications for the UI layer.
//!
//! The [`Tracker`](crate::Tracker) returns each frame's events from
//! [`frame`](crate::Tracker::frame) and also publishes them on its [`EventBus`], for listeners that
//! prefer callbacks. A listener stays registered exactly as long as its [`Subscription`] lives.

use crate::display_mode::DisplayMode;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Something that happened to the active target during a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TrackingEvent {
    TargetSet { id: String },
    TargetCleared { id: String },
    /// The displayed mode changed. Fired when the switch is complete, ie at the end of a
    /// cross-fade.
    ModeChanged { from: DisplayMode, to: DisplayMode },
    EnteredCollectionRange,
    ExitedCollectionRange,
}

impl fmt::Display for TrackingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TargetSet { id } => write!(f, "target {id} set"),
            Self::TargetCleared { id } => write!(f, "target {id} cleared"),
            Self::ModeChanged { from, to } => write!(f, "mode changed from {from} to {to}"),
            Self::EnteredCollectionRange => f.write_str("entered collection range"),
            Self::ExitedCollectionRange => f.write_str("exited collection range"),
        }
    }
}

type Listener = Rc<RefCell<Box<dyn FnMut(&TrackingEvent)>>>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

impl Registry {
    fn contains(&self, id: u64) -> bool {
        self.listeners.iter().any(|(listener, _)| *listener == id)
    }
}

/// Single-threaded publish/subscribe hub for [`TrackingEvent`]s.
#[derive(Default)]
pub struct EventBus {
    registry: Rc<RefCell<Registry>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` until the returned [`Subscription`] is dropped.
    #[must_use = "the listener is removed as soon as the subscription is dropped"]
    pub fn subscribe(&self, listener: impl FnMut(&TrackingEvent) + 'static) -> Subscription {
        let mut registry = self.registry.borrow_mut();
        registry.next_id += 1;
        let id = registry.next_id;
        let listener: Box<dyn FnMut(&TrackingEvent)> = Box::new(listener);
        registry.listeners.push((id, Rc::new(RefCell::new(listener))));
        Subscription {
            id,
            registry: Rc::downgrade(&self.registry),
        }
    }

    /// Delivers `event` to every listener, in subscription order.
    ///
    /// Listeners may subscribe or unsubscribe from inside the callback. Those added during
    /// delivery first see the next event; those removed are not called again. A listener that
    /// publishes from inside its own callback does not receive that nested event.
    pub fn publish(&self, event: &TrackingEvent) {
        let snapshot: Vec<(u64, Listener)> = self.registry.borrow().listeners.clone();
        for (id, listener) in snapshot {
            if !self.registry.borrow().contains(id) {
                continue;
            }
            match listener.try_borrow_mut() {
                Ok(mut listener) => (*listener)(event),
                Err(_) => tracing::trace!(%event, "skipping re-entrant delivery"),
            }
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.registry.borrow().listeners.len()
    }
}

/// Keeps a listener registered on an [`EventBus`]. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<RefCell<Registry>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // the bus may already be gone, in which case there is nothing to unregister
        if let Some(registry) = self.registry.upgrade() {
            let mut guard = registry.borrow_mut();
            let index = guard.listeners.iter().position(|(id, _)| *id == self.id);
            let removed = index.map(|index| guard.listeners.remove(index));
            drop(guard);
            // the listener may own subscriptions of its own, which unregister as it drops
            drop(removed);
        }
    }
}
