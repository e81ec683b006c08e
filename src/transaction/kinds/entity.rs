//! Entity spawns and removals

use crate::cause::{ContextKey, ContextValue, Contributor, DamageSource, SpawnType, StackFrame};
use crate::core::error::RestoreError;
use crate::core::types::{BlockPos, EntityId, EntitySnapshot};
use crate::event::Mutation;
use crate::host::SimulationHost;
use crate::transaction::{Subject, Transaction, TransactionKind};

use super::is_block_break_at;

/// An entity added to the world
#[derive(Debug, Clone)]
pub struct SpawnEntity {
    entity: EntitySnapshot,
    spawn_type: SpawnType,
    /// Block whose break released the entity
    origin: Option<BlockPos>,
}

impl SpawnEntity {
    pub fn capture_state(entity: EntitySnapshot, spawn_type: SpawnType) -> Self {
        Self {
            entity,
            spawn_type,
            origin: None,
        }
    }

    /// Entity released by breaking the block at `origin`
    pub fn from_block(entity: EntitySnapshot, origin: BlockPos) -> Self {
        Self {
            entity,
            spawn_type: SpawnType::BlockBreak,
            origin: Some(origin),
        }
    }

    pub fn entity(&self) -> &EntitySnapshot {
        &self.entity
    }

    pub fn spawn_type(&self) -> SpawnType {
        self.spawn_type
    }
}

impl Transaction for SpawnEntity {
    fn kind(&self) -> TransactionKind {
        TransactionKind::SpawnEntity
    }

    fn subject(&self) -> Subject {
        Subject::Entity(self.entity.id)
    }

    fn accepts_parent(&self, parent: &dyn Transaction) -> bool {
        match (self.spawn_type, self.origin) {
            (SpawnType::BlockBreak, Some(origin)) => is_block_break_at(parent, origin),
            (SpawnType::Explosion, _) => {
                parent.kind() == TransactionKind::Explosion
                    && parent.subject().covers_point(self.entity.position)
            }
            _ => false,
        }
    }

    fn populate_frame(&self, frame: &mut StackFrame<'_>) {
        frame.add_context(ContextKey::SpawnType, ContextValue::SpawnType(self.spawn_type));
    }

    fn mutation(&self) -> Option<Mutation> {
        Some(Mutation::EntitySpawn {
            entity: self.entity,
            spawn_type: self.spawn_type,
        })
    }

    fn batch_key(&self) -> Option<TransactionKind> {
        Some(TransactionKind::SpawnEntity)
    }

    fn restore(&mut self, host: &mut dyn SimulationHost) -> Result<(), RestoreError> {
        host.remove_entity(self.entity.id)
            .map(|_| ())
            .ok_or_else(|| RestoreError::Missing(format!("entity {}", self.entity.id)))
    }
}

/// An entity taken out of the world (death, despawn)
#[derive(Debug, Clone)]
pub struct RemoveEntity {
    entity: EntitySnapshot,
    damage: Option<DamageSource>,
}

impl RemoveEntity {
    /// Snapshot a live entity before the host removes it
    ///
    /// Returns `None` when the entity is not in the world.
    pub fn capture_state(host: &dyn SimulationHost, entity: EntityId) -> Option<Self> {
        host.entity(entity).map(|snapshot| Self {
            entity: *snapshot,
            damage: None,
        })
    }

    pub fn with_damage(mut self, damage: DamageSource) -> Self {
        self.damage = Some(damage);
        self
    }

    pub fn entity(&self) -> &EntitySnapshot {
        &self.entity
    }
}

impl Transaction for RemoveEntity {
    fn kind(&self) -> TransactionKind {
        TransactionKind::RemoveEntity
    }

    fn subject(&self) -> Subject {
        Subject::Entity(self.entity.id)
    }

    fn accepts_parent(&self, parent: &dyn Transaction) -> bool {
        parent.kind() == TransactionKind::Explosion
            && parent.subject().covers_point(self.entity.position)
    }

    fn populate_frame(&self, frame: &mut StackFrame<'_>) {
        if let Some(damage) = &self.damage {
            if let DamageSource::Entity(attacker) = damage {
                frame.push_cause(Contributor::Entity(*attacker));
            }
            frame.add_context(
                ContextKey::LastDamageSource,
                ContextValue::DamageSource(damage.clone()),
            );
        }
    }

    fn mutation(&self) -> Option<Mutation> {
        Some(Mutation::EntityRemoval {
            entity: self.entity,
        })
    }

    fn batch_key(&self) -> Option<TransactionKind> {
        Some(TransactionKind::RemoveEntity)
    }

    /// Respawn from the snapshot; state the snapshot does not carry is lost
    fn restore(&mut self, host: &mut dyn SimulationHost) -> Result<(), RestoreError> {
        host.spawn_entity(self.entity)
    }
}
