//! Block changes

use serde::{Deserialize, Serialize};

use crate::cause::{ContextKey, ContextValue, Contributor, StackFrame};
use crate::core::error::RestoreError;
use crate::core::types::{BlockPos, BlockState};
use crate::event::Mutation;
use crate::host::SimulationHost;
use crate::transaction::{Subject, Transaction, TransactionKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockOperation {
    Place,
    Break,
    Modify,
    Decay,
}

impl BlockOperation {
    /// Infer the operation from the two states
    pub fn between(original: BlockState, replacement: BlockState) -> Self {
        match (original.is_air(), replacement.is_air()) {
            (true, false) => BlockOperation::Place,
            (false, true) => BlockOperation::Break,
            _ => BlockOperation::Modify,
        }
    }
}

/// One block replaced by another
#[derive(Debug, Clone)]
pub struct ChangeBlock {
    pos: BlockPos,
    original: BlockState,
    replacement: BlockState,
    operation: BlockOperation,
    actor: Option<Contributor>,
}

impl ChangeBlock {
    /// Snapshot the block at `pos` before the host replaces it
    pub fn capture_state(host: &dyn SimulationHost, pos: BlockPos, replacement: BlockState) -> Self {
        Self::new(pos, host.block(pos), replacement)
    }

    pub fn new(pos: BlockPos, original: BlockState, replacement: BlockState) -> Self {
        Self {
            pos,
            original,
            replacement,
            operation: BlockOperation::between(original, replacement),
            actor: None,
        }
    }

    /// Whoever performed the change; pushed onto the cause when resolved
    pub fn with_actor(mut self, actor: Contributor) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_operation(mut self, operation: BlockOperation) -> Self {
        self.operation = operation;
        self
    }

    pub fn pos(&self) -> BlockPos {
        self.pos
    }

    pub fn original(&self) -> BlockState {
        self.original
    }

    pub fn replacement(&self) -> BlockState {
        self.replacement
    }

    pub fn operation(&self) -> BlockOperation {
        self.operation
    }
}

impl Transaction for ChangeBlock {
    fn kind(&self) -> TransactionKind {
        TransactionKind::ChangeBlock
    }

    fn subject(&self) -> Subject {
        Subject::Block(self.pos)
    }

    /// Blocks destroyed by an explosion fold into it
    fn accepts_parent(&self, parent: &dyn Transaction) -> bool {
        self.operation == BlockOperation::Break
            && parent.kind() == TransactionKind::Explosion
            && parent.subject().covers_block(self.pos)
    }

    fn populate_frame(&self, frame: &mut StackFrame<'_>) {
        if let Some(actor) = &self.actor {
            frame.push_cause(actor.clone());
        }
        frame.add_context(ContextKey::BlockHit, ContextValue::Block(self.pos));
    }

    fn mutation(&self) -> Option<Mutation> {
        if self.original == self.replacement {
            return None;
        }
        Some(Mutation::Block {
            pos: self.pos,
            original: self.original,
            replacement: self.replacement,
        })
    }

    fn batch_key(&self) -> Option<TransactionKind> {
        Some(TransactionKind::ChangeBlock)
    }

    /// Put the original block back, unless something else replaced ours since
    fn restore(&mut self, host: &mut dyn SimulationHost) -> Result<(), RestoreError> {
        let current = host.block(self.pos);
        if current != self.replacement {
            return Err(RestoreError::Diverged {
                subject: self.pos.to_string(),
                expected: format!("{:?}", self.replacement),
                found: format!("{:?}", current),
            });
        }
        host.set_block(self.pos, self.original);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SimWorld;
    use crate::transaction::Explosion;

    #[test]
    fn test_capture_reads_original() {
        let mut world = SimWorld::new();
        let pos = BlockPos::new(0, 64, 0);
        world.set_block(pos, BlockState::Dirt);

        let tx = ChangeBlock::capture_state(&world, pos, BlockState::Air);
        assert_eq!(tx.original(), BlockState::Dirt);
        assert_eq!(tx.operation(), BlockOperation::Break);
    }

    #[test]
    fn test_noop_change_has_no_mutation() {
        let tx = ChangeBlock::new(BlockPos::default(), BlockState::Stone, BlockState::Stone);
        assert!(tx.mutation().is_none());
        assert_eq!(tx.operation(), BlockOperation::Modify);
    }

    #[test]
    fn test_restore_puts_original_back() {
        let mut world = SimWorld::new();
        let pos = BlockPos::new(1, 1, 1);
        let mut tx = ChangeBlock::capture_state(&world, pos, BlockState::Stone);
        world.set_block(pos, BlockState::Stone);

        tx.restore(&mut world).unwrap();
        assert_eq!(world.block(pos), BlockState::Air);
    }

    #[test]
    fn test_restore_refuses_diverged_world() {
        let mut world = SimWorld::new();
        let pos = BlockPos::new(1, 1, 1);
        let mut tx = ChangeBlock::capture_state(&world, pos, BlockState::Stone);
        world.set_block(pos, BlockState::Planks);

        assert!(matches!(tx.restore(&mut world), Err(RestoreError::Diverged { .. })));
        assert_eq!(world.block(pos), BlockState::Planks);
    }

    #[test]
    fn test_absorbed_by_covering_explosion_only_when_breaking() {
        let explosion = Explosion::capture_state(BlockPos::new(0, 0, 0), 3.0, None);
        let broken = ChangeBlock::new(BlockPos::new(1, 0, 0), BlockState::Stone, BlockState::Air);
        let placed = ChangeBlock::new(BlockPos::new(1, 0, 0), BlockState::Air, BlockState::Stone);
        let far = ChangeBlock::new(BlockPos::new(9, 0, 0), BlockState::Stone, BlockState::Air);

        assert!(broken.accepts_parent(&explosion));
        assert!(!placed.accepts_parent(&explosion));
        assert!(!far.accepts_parent(&explosion));
    }
}
