//! Item drops from broken blocks

use crate::cause::{ContextKey, ContextValue, Contributor, SpawnType, StackFrame};
use crate::core::error::RestoreError;
use crate::core::types::{BlockPos, EntitySnapshot, ItemStack};
use crate::event::Mutation;
use crate::host::SimulationHost;
use crate::transaction::{Subject, Transaction, TransactionKind};

use super::is_block_break_at;

/// An item entity dropped where a block was broken
#[derive(Debug, Clone)]
pub struct DropItem {
    item: ItemStack,
    entity: EntitySnapshot,
    origin: BlockPos,
}

impl DropItem {
    /// Decide on a drop at `origin`; the item entity is spawned by the caller
    pub fn capture_state(item: ItemStack, origin: BlockPos) -> Self {
        Self {
            item,
            entity: EntitySnapshot::item_at(item, origin),
            origin,
        }
    }

    pub fn item(&self) -> ItemStack {
        self.item
    }

    /// Item entity to hand to the host
    pub fn entity(&self) -> &EntitySnapshot {
        &self.entity
    }

    pub fn origin(&self) -> BlockPos {
        self.origin
    }
}

impl Transaction for DropItem {
    fn kind(&self) -> TransactionKind {
        TransactionKind::DropItem
    }

    fn subject(&self) -> Subject {
        Subject::Entity(self.entity.id)
    }

    fn accepts_parent(&self, parent: &dyn Transaction) -> bool {
        is_block_break_at(parent, self.origin)
    }

    fn populate_frame(&self, frame: &mut StackFrame<'_>) {
        frame.push_cause(Contributor::Item(self.item));
        frame.add_context(ContextKey::SpawnType, ContextValue::SpawnType(SpawnType::DropItem));
    }

    fn mutation(&self) -> Option<Mutation> {
        Some(Mutation::ItemDrop {
            item: self.item,
            entity: self.entity.id,
            origin: self.origin,
        })
    }

    fn batch_key(&self) -> Option<TransactionKind> {
        Some(TransactionKind::DropItem)
    }

    /// Remove the item entity; fails if it was already picked up
    fn restore(&mut self, host: &mut dyn SimulationHost) -> Result<(), RestoreError> {
        host.remove_entity(self.entity.id)
            .map(|_| ())
            .ok_or_else(|| RestoreError::Missing(format!("item entity {}", self.entity.id)))
    }
}
