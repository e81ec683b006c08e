//! Explosions - a marker transaction that absorbs what it destroyed

use crate::cause::{ContextKey, ContextValue, Contributor, StackFrame};
use crate::core::error::RestoreError;
use crate::core::types::{BlockPos, EntityId};
use crate::event::Mutation;
use crate::host::SimulationHost;
use crate::transaction::{Subject, Transaction, TransactionKind};

#[derive(Debug, Clone)]
pub struct Explosion {
    origin: BlockPos,
    radius: f32,
    source: Option<EntityId>,
}

impl Explosion {
    pub fn capture_state(origin: BlockPos, radius: f32, source: Option<EntityId>) -> Self {
        Self {
            origin,
            radius,
            source,
        }
    }

    pub fn origin(&self) -> BlockPos {
        self.origin
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }
}

impl Transaction for Explosion {
    fn kind(&self) -> TransactionKind {
        TransactionKind::Explosion
    }

    fn subject(&self) -> Subject {
        Subject::Area {
            origin: self.origin,
            radius: self.radius,
        }
    }

    fn populate_frame(&self, frame: &mut StackFrame<'_>) {
        if let Some(source) = self.source {
            frame.push_cause(Contributor::Entity(source));
            frame.add_context(ContextKey::Creator, ContextValue::Entity(source));
        }
    }

    fn mutation(&self) -> Option<Mutation> {
        Some(Mutation::Explosion {
            origin: self.origin,
            radius: self.radius,
            source: self.source,
        })
    }

    /// Every explosion is its own event
    fn is_unbatchable(&self) -> bool {
        true
    }

    /// Nothing to undo here; absorbed block changes and removals restore themselves
    fn restore(&mut self, _host: &mut dyn SimulationHost) -> Result<(), RestoreError> {
        Ok(())
    }
}
