//! Concrete transaction kinds captured by the interception sites

pub mod block;
pub mod entity;
pub mod explosion;
pub mod item;

pub use block::{BlockOperation, ChangeBlock};
pub use entity::{RemoveEntity, SpawnEntity};
pub use explosion::Explosion;
pub use item::DropItem;

use super::{Subject, Transaction, TransactionKind};
use crate::core::types::BlockPos;
use crate::event::Mutation;

/// Whether `parent` broke the block at `pos`
pub(crate) fn is_block_break_at(parent: &dyn Transaction, pos: BlockPos) -> bool {
    parent.kind() == TransactionKind::ChangeBlock
        && parent.subject() == Subject::Block(pos)
        && matches!(
            parent.mutation(),
            Some(Mutation::Block { replacement, .. }) if replacement.is_air()
        )
}
