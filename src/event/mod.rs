//! Events synthesized from resolved transactions
//!
//! One event is fired per root transaction (or per batch of adjacent roots
//! when the phase batches). Listeners may only flip the cancelled flag.

pub mod bus;

pub use bus::{EventBus, ListenerId, Order};

use serde::Serialize;

use crate::cause::{Cause, SpawnType};
use crate::core::types::{BlockPos, BlockState, EntityId, EntitySnapshot, ItemStack};
use crate::transaction::TransactionKind;

/// Unique event identifier within one tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EventId(pub u64);

/// Listener-facing event categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventType {
    ChangeBlock,
    SpawnEntity,
    DestructEntity,
    DropItem,
    Explosion,
}

impl From<TransactionKind> for EventType {
    fn from(kind: TransactionKind) -> Self {
        match kind {
            TransactionKind::ChangeBlock => EventType::ChangeBlock,
            TransactionKind::SpawnEntity => EventType::SpawnEntity,
            TransactionKind::RemoveEntity => EventType::DestructEntity,
            TransactionKind::DropItem => EventType::DropItem,
            TransactionKind::Explosion => EventType::Explosion,
        }
    }
}

/// Original/final description of one mutation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Mutation {
    Block {
        pos: BlockPos,
        original: BlockState,
        replacement: BlockState,
    },
    EntitySpawn {
        entity: EntitySnapshot,
        spawn_type: SpawnType,
    },
    EntityRemoval {
        entity: EntitySnapshot,
    },
    ItemDrop {
        item: ItemStack,
        entity: EntityId,
        origin: BlockPos,
    },
    Explosion {
        origin: BlockPos,
        radius: f32,
        source: Option<EntityId>,
    },
}

/// One root transaction's contribution to an event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventEntry {
    pub primary: Mutation,
    /// Mutations of absorbed descendants, depth-first in capture order
    pub absorbed: Vec<Mutation>,
}

/// A cancellable event dispatched to listeners
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    id: EventId,
    event_type: EventType,
    cause: Cause,
    cancelled: bool,
    entries: Vec<EventEntry>,
}

impl Event {
    pub fn new(event_type: EventType, cause: Cause, entry: EventEntry) -> Self {
        Self {
            id: EventId(0),
            event_type,
            cause,
            cancelled: false,
            entries: vec![entry],
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub(crate) fn assign_id(&mut self, id: EventId) {
        self.id = id;
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn cause(&self) -> &Cause {
        &self.cause
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }

    pub fn entries(&self) -> &[EventEntry] {
        &self.entries
    }

    /// Whether this event groups more than one root transaction
    pub fn is_batched(&self) -> bool {
        self.entries.len() > 1
    }

    /// Every mutation carried by this event, absorbed ones included
    pub fn mutations(&self) -> impl Iterator<Item = &Mutation> {
        self.entries
            .iter()
            .flat_map(|e| std::iter::once(&e.primary).chain(e.absorbed.iter()))
    }

    /// Fold another root's event into this one
    pub(crate) fn batch_with(&mut self, other: Event) {
        self.entries.extend(other.entries);
    }
}
