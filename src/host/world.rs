//! In-memory simulation world storage and queries

use ahash::AHashMap;
use glam::Vec3;

use super::SimulationHost;
use crate::core::error::RestoreError;
use crate::core::types::{BlockPos, BlockState, EntityId, EntitySnapshot, Tick};

/// Sparse block and entity storage implementing [`SimulationHost`]
#[derive(Debug, Clone, Default)]
pub struct SimWorld {
    pub current_tick: Tick,
    blocks: AHashMap<BlockPos, BlockState>,
    entities: AHashMap<EntityId, EntitySnapshot>,
}

impl SimWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill an axis-aligned box (inclusive) with one block state
    pub fn fill(&mut self, from: BlockPos, to: BlockPos, state: BlockState) {
        for x in from.x.min(to.x)..=from.x.max(to.x) {
            for y in from.y.min(to.y)..=from.y.max(to.y) {
                for z in from.z.min(to.z)..=from.z.max(to.z) {
                    self.set_block(BlockPos::new(x, y, z), state);
                }
            }
        }
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Number of stored non-air blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn advance_tick(&mut self) {
        self.current_tick += 1;
    }
}

impl SimulationHost for SimWorld {
    fn tick(&self) -> Tick {
        self.current_tick
    }

    fn block(&self, pos: BlockPos) -> BlockState {
        self.blocks.get(&pos).copied().unwrap_or_default()
    }

    fn set_block(&mut self, pos: BlockPos, state: BlockState) -> BlockState {
        let previous = if state.is_air() {
            self.blocks.remove(&pos)
        } else {
            self.blocks.insert(pos, state)
        };
        previous.unwrap_or_default()
    }

    fn entity(&self, id: EntityId) -> Option<&EntitySnapshot> {
        self.entities.get(&id)
    }

    fn spawn_entity(&mut self, snapshot: EntitySnapshot) -> Result<(), RestoreError> {
        if self.entities.contains_key(&snapshot.id) {
            return Err(RestoreError::Rejected(format!(
                "entity {} already exists",
                snapshot.id
            )));
        }
        self.entities.insert(snapshot.id, snapshot);
        Ok(())
    }

    fn remove_entity(&mut self, id: EntityId) -> Option<EntitySnapshot> {
        self.entities.remove(&id)
    }

    fn blocks_in_radius(&self, center: BlockPos, radius: f32) -> Vec<(BlockPos, BlockState)> {
        let radius_sq = (radius * radius) as i64;
        let mut found: Vec<_> = self
            .blocks
            .iter()
            .filter(|(pos, _)| pos.distance_squared(&center) <= radius_sq)
            .map(|(pos, state)| (*pos, *state))
            .collect();
        // AHashMap iteration order is random; callers capture in a stable order
        found.sort_by_key(|(pos, _)| (pos.y, pos.z, pos.x));
        found
    }

    fn entities_in_radius(&self, center: Vec3, radius: f32) -> Vec<EntitySnapshot> {
        let radius_sq = radius * radius;
        let mut found: Vec<_> = self
            .entities
            .values()
            .filter(|e| e.position.distance_squared(center) <= radius_sq)
            .copied()
            .collect();
        found.sort_by_key(|e| e.id.0);
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::EntityKind;

    #[test]
    fn test_set_block_returns_previous() {
        let mut world = SimWorld::new();
        let pos = BlockPos::new(1, 2, 3);

        assert_eq!(world.set_block(pos, BlockState::Stone), BlockState::Air);
        assert_eq!(world.set_block(pos, BlockState::Dirt), BlockState::Stone);
        assert_eq!(world.block(pos), BlockState::Dirt);
    }

    #[test]
    fn test_air_is_not_stored() {
        let mut world = SimWorld::new();
        let pos = BlockPos::new(0, 0, 0);
        world.set_block(pos, BlockState::Stone);
        world.set_block(pos, BlockState::Air);
        assert_eq!(world.block_count(), 0);
    }

    #[test]
    fn test_fill_and_radius_query() {
        let mut world = SimWorld::new();
        world.fill(BlockPos::new(-2, 0, -2), BlockPos::new(2, 0, 2), BlockState::Stone);
        assert_eq!(world.block_count(), 25);

        let near = world.blocks_in_radius(BlockPos::new(0, 0, 0), 1.0);
        assert_eq!(near.len(), 5);
    }

    #[test]
    fn test_duplicate_spawn_rejected() {
        let mut world = SimWorld::new();
        let zombie = EntitySnapshot::new(EntityKind::Zombie, Vec3::ZERO);

        assert!(world.spawn_entity(zombie).is_ok());
        assert!(world.spawn_entity(zombie).is_err());
        assert_eq!(world.entity_count(), 1);

        assert!(world.remove_entity(zombie.id).is_some());
        assert!(world.entity(zombie.id).is_none());
    }
}
