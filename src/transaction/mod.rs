//! Buffered, cancellable records of mutations the host already performed
//!
//! A transaction is captured when the host decides on an action. It holds the
//! pre-mutation snapshot needed to compensate, and knows how to describe
//! itself as an event and which earlier transaction (if any) should absorb it.

pub mod buffer;
pub mod effect;
pub mod graph;
pub mod kinds;

pub use buffer::{ResolutionReport, ResolveEnv, TransactionBuffer, TxOutcome};
pub use effect::{EffectScopeId, EffectScopes, ScopeToken};
pub use graph::{TransactionGraph, TxIndex, TxState};
pub use kinds::{ChangeBlock, DropItem, Explosion, RemoveEntity, SpawnEntity};

use glam::Vec3;
use serde::Serialize;

use crate::cause::{Cause, StackFrame};
use crate::core::error::RestoreError;
use crate::core::types::{BlockPos, EntityId};
use crate::event::{Event, EventEntry, Mutation};
use crate::host::SimulationHost;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransactionKind {
    ChangeBlock,
    SpawnEntity,
    RemoveEntity,
    DropItem,
    Explosion,
}

/// What a transaction mutated, used by absorbers to match parents
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Subject {
    Block(BlockPos),
    Entity(EntityId),
    Area { origin: BlockPos, radius: f32 },
}

impl Subject {
    /// Whether a block lies inside this subject
    pub fn covers_block(&self, pos: BlockPos) -> bool {
        match self {
            Subject::Block(p) => *p == pos,
            Subject::Entity(_) => false,
            Subject::Area { origin, radius } => {
                let r = *radius as f64;
                (origin.distance_squared(&pos) as f64) <= r * r
            }
        }
    }

    /// Whether a world-space point lies inside this subject
    pub fn covers_point(&self, point: Vec3) -> bool {
        match self {
            Subject::Block(p) => BlockPos::new(
                point.x.floor() as i32,
                point.y.floor() as i32,
                point.z.floor() as i32,
            ) == *p,
            Subject::Entity(_) => false,
            Subject::Area { origin, radius } => {
                origin.center().distance_squared(point) <= radius * radius
            }
        }
    }
}

/// One intended mutation, owned by the buffer that captured it
pub trait Transaction: std::fmt::Debug {
    fn kind(&self) -> TransactionKind;

    fn subject(&self) -> Subject;

    /// Whether this transaction should fold into `parent` as a child
    ///
    /// Candidates are offered to earlier transactions newest-first; the
    /// first acceptance wins.
    fn accepts_parent(&self, _parent: &dyn Transaction) -> bool {
        false
    }

    /// Push contributors and context for this transaction's cause
    fn populate_frame(&self, _frame: &mut StackFrame<'_>) {}

    /// Original/final description, `None` when the action turned out a no-op
    fn mutation(&self) -> Option<Mutation>;

    /// Build the event for this transaction and its absorbed subtree
    ///
    /// `absorbed` lists descendants depth-first in capture order.
    fn generate_event(&self, cause: Cause, absorbed: &[&dyn Transaction]) -> Option<Event> {
        let primary = self.mutation()?;
        let absorbed = absorbed.iter().filter_map(|t| t.mutation()).collect();
        Some(Event::new(
            self.kind().into(),
            cause,
            EventEntry { primary, absorbed },
        ))
    }

    /// Force this transaction to stand alone: never absorbed, never batched
    fn is_unbatchable(&self) -> bool {
        false
    }

    /// Adjacent roots with equal keys share one event when the phase batches
    fn batch_key(&self) -> Option<TransactionKind> {
        None
    }

    /// Best-effort compensation after cancellation
    fn restore(&mut self, host: &mut dyn SimulationHost) -> Result<(), RestoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_covers_block() {
        let area = Subject::Area {
            origin: BlockPos::new(0, 64, 0),
            radius: 2.0,
        };
        assert!(area.covers_block(BlockPos::new(0, 64, 0)));
        assert!(area.covers_block(BlockPos::new(2, 64, 0)));
        assert!(area.covers_block(BlockPos::new(1, 65, 1)));
        assert!(!area.covers_block(BlockPos::new(2, 65, 1)));
    }

    #[test]
    fn test_block_covers_point() {
        let subject = Subject::Block(BlockPos::new(3, 4, 5));
        assert!(subject.covers_point(Vec3::new(3.5, 4.5, 5.5)));
        assert!(!subject.covers_point(Vec3::new(2.5, 4.5, 5.5)));
        assert!(!Subject::Entity(EntityId::new()).covers_point(Vec3::ZERO));
    }
}
