//! Host boundary - the live simulation the tracker observes
//!
//! The tracker never owns simulation state. It reads snapshots at capture
//! time and writes back only when compensating a cancelled mutation.

pub mod world;

pub use world::SimWorld;

use glam::Vec3;

use crate::core::error::RestoreError;
use crate::core::types::{BlockPos, BlockState, EntityId, EntitySnapshot, Tick};

/// Mutable view of the simulation host
pub trait SimulationHost {
    /// Current simulation tick
    fn tick(&self) -> Tick;

    /// Block state at a position (air when nothing is stored)
    fn block(&self, pos: BlockPos) -> BlockState;

    /// Replace the block at a position, returning the previous state
    fn set_block(&mut self, pos: BlockPos, state: BlockState) -> BlockState;

    /// Look up a live entity
    fn entity(&self, id: EntityId) -> Option<&EntitySnapshot>;

    /// Add an entity to the world
    ///
    /// Fails when an entity with the same id is already alive.
    fn spawn_entity(&mut self, snapshot: EntitySnapshot) -> Result<(), RestoreError>;

    /// Remove an entity, returning its last known state
    fn remove_entity(&mut self, id: EntityId) -> Option<EntitySnapshot>;

    /// Non-air blocks within `radius` of `center`, in a stable order
    fn blocks_in_radius(&self, center: BlockPos, radius: f32) -> Vec<(BlockPos, BlockState)>;

    /// Live entities within `radius` of a world-space point, in a stable order
    fn entities_in_radius(&self, center: Vec3, radius: f32) -> Vec<EntitySnapshot>;
}
