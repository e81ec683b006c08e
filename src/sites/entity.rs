//! Entity death site

use super::MutationSite;
use crate::cause::{Contributor, DamageSource};
use crate::core::error::Result;
use crate::core::types::EntityId;
use crate::host::SimulationHost;
use crate::phase::phases::ENTITY_DEATH;
use crate::phase::PhaseContext;
use crate::tracker::CauseTracker;
use crate::transaction::{RemoveEntity, ResolutionReport};

/// An entity killed by damage
#[derive(Debug, Clone)]
pub struct KillEntitySite {
    pub entity: EntityId,
    pub damage: DamageSource,
}

impl KillEntitySite {
    pub fn new(entity: EntityId, damage: DamageSource) -> Self {
        Self { entity, damage }
    }
}

impl<H: SimulationHost> MutationSite<H> for KillEntitySite {
    fn name(&self) -> &'static str {
        "kill_entity"
    }

    fn intercept(&mut self, tracker: &mut CauseTracker<H>) -> Result<ResolutionReport> {
        let victim = self.entity;
        let damage = self.damage.clone();
        let init = |ctx: &mut PhaseContext| ctx.set_source(Contributor::Entity(victim));
        let ((), report) = tracker.run_phase_with_report(ENTITY_DEATH, init, |phase| {
            if let Some(removal) = RemoveEntity::capture_state(phase.host(), victim) {
                phase.host_mut().remove_entity(victim);
                phase.capture_transaction(removal.with_damage(damage))?;
            }
            Ok(())
        })?;
        Ok(report)
    }
}
