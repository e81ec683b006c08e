//! Interception sites - where the host hands a mutation to the tracker
//!
//! A site enters its phase, pushes whoever is responsible, performs the
//! mutation on the host while capturing a transaction for every change, and
//! exits the phase, which fires the events and commits or rolls back.

pub mod block;
pub mod entity;
pub mod explosion;

pub use block::{BreakBlockSite, PlaceBlockSite};
pub use entity::KillEntitySite;
pub use explosion::ExplodeSite;

use crate::core::error::Result;
use crate::core::types::{BlockPos, ItemStack};
use crate::host::SimulationHost;
use crate::tracker::CauseTracker;
use crate::transaction::{DropItem, ResolutionReport};

/// One interception point in the host
pub trait MutationSite<H: SimulationHost> {
    fn name(&self) -> &'static str;

    /// Perform the mutation inside its phase and resolve it
    fn intercept(&mut self, tracker: &mut CauseTracker<H>) -> Result<ResolutionReport>;
}

/// Spawn the item a broken block leaves behind, inside an effect scope
pub(crate) fn drop_block_item<H: SimulationHost>(
    tracker: &mut CauseTracker<H>,
    item: ItemStack,
    pos: BlockPos,
) -> Result<()> {
    let mut scope = tracker.open_effect_scope()?;
    let drop = DropItem::capture_state(item, pos);
    match scope.host_mut().spawn_entity(*drop.entity()) {
        Ok(()) => {
            scope.capture_transaction(drop)?;
        }
        Err(err) => tracing::warn!("Item drop at {} not spawned: {}", pos, err),
    }
    scope.close()?;
    Ok(())
}
