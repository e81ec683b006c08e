//! Listener registry and synchronous dispatch

use super::{Event, EventId, EventType};

/// Dispatch order; listeners with equal order run in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Order {
    First,
    Early,
    Default,
    Late,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback = Box<dyn FnMut(&mut Event)>;

struct Listener {
    id: ListenerId,
    filter: Option<EventType>,
    order: Order,
    callback: Callback,
}

/// Registered listeners, sorted by [`Order`]
///
/// Listeners are registered by the integration layer before any phase is
/// entered. Dispatch runs every matching listener to completion before
/// returning; there is no async delivery.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Listener>,
    next_listener_id: u64,
    next_event_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one event type, or every type when `filter` is `None`
    pub fn register<F>(&mut self, filter: Option<EventType>, order: Order, callback: F) -> ListenerId
    where
        F: FnMut(&mut Event) + 'static,
    {
        self.next_listener_id += 1;
        let id = ListenerId(self.next_listener_id);
        let listener = Listener {
            id,
            filter,
            order,
            callback: Box::new(callback),
        };
        // Insert after every listener of the same or earlier order
        let position = self
            .listeners
            .iter()
            .position(|l| l.order > order)
            .unwrap_or(self.listeners.len());
        self.listeners.insert(position, listener);
        id
    }

    /// Remove a listener; returns false if it was not registered
    pub fn unregister(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Whether any listener would see an event of this type
    pub fn has_listeners(&self, event_type: EventType) -> bool {
        self.listeners
            .iter()
            .any(|l| l.filter.map_or(true, |f| f == event_type))
    }

    /// Assign the event an id and run every matching listener
    ///
    /// Returns whether the event ended up cancelled.
    pub fn post(&mut self, event: &mut Event) -> bool {
        self.next_event_id += 1;
        event.assign_id(EventId(self.next_event_id));

        let event_type = event.event_type();
        for listener in self
            .listeners
            .iter_mut()
            .filter(|l| l.filter.map_or(true, |f| f == event_type))
        {
            (listener.callback)(event);
        }
        event.is_cancelled()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .field("next_event_id", &self.next_event_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cause::Cause;
    use crate::core::types::{BlockPos, BlockState};
    use crate::event::{EventEntry, Mutation};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn block_event() -> Event {
        Event::new(
            EventType::ChangeBlock,
            Cause::host(),
            EventEntry {
                primary: Mutation::Block {
                    pos: BlockPos::new(0, 0, 0),
                    original: BlockState::Air,
                    replacement: BlockState::Stone,
                },
                absorbed: Vec::new(),
            },
        )
    }

    #[test]
    fn test_order_then_registration() {
        let mut bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for (label, order) in [
            ("late", Order::Late),
            ("first", Order::First),
            ("default_a", Order::Default),
            ("default_b", Order::Default),
            ("last", Order::Last),
        ] {
            let seen = Rc::clone(&seen);
            bus.register(None, order, move |_| seen.borrow_mut().push(label));
        }

        bus.post(&mut block_event());
        assert_eq!(
            *seen.borrow(),
            vec!["first", "default_a", "default_b", "late", "last"]
        );
    }

    #[test]
    fn test_filter_by_type() {
        let mut bus = EventBus::new();
        let hits = Rc::new(RefCell::new(0));

        let h = Rc::clone(&hits);
        bus.register(Some(EventType::SpawnEntity), Order::Default, move |_| {
            *h.borrow_mut() += 1
        });

        bus.post(&mut block_event());
        assert_eq!(*hits.borrow(), 0);
        assert!(!bus.has_listeners(EventType::ChangeBlock));
        assert!(bus.has_listeners(EventType::SpawnEntity));
    }

    #[test]
    fn test_cancel_and_uncancel() {
        let mut bus = EventBus::new();
        bus.register(None, Order::Early, |e| e.set_cancelled(true));
        let late = bus.register(None, Order::Late, |e| e.set_cancelled(false));

        assert!(!bus.post(&mut block_event()));

        assert!(bus.unregister(late));
        assert!(!bus.unregister(late));
        assert!(bus.post(&mut block_event()));
    }

    #[test]
    fn test_event_ids_increase() {
        let mut bus = EventBus::new();
        let mut first = block_event();
        let mut second = block_event();
        bus.post(&mut first);
        bus.post(&mut second);
        assert!(second.id() > first.id());
    }
}
