//! Explosion site

use super::{drop_block_item, MutationSite};
use crate::cause::DamageSource;
use crate::core::error::Result;
use crate::core::types::{BlockPos, BlockState, EntityId, ItemStack};
use crate::host::SimulationHost;
use crate::phase::phases::EXPLOSION;
use crate::phase::{ExplosionInfo, PhaseContext};
use crate::tracker::CauseTracker;
use crate::transaction::{ChangeBlock, Explosion, RemoveEntity, ResolutionReport};

/// A blast that breaks blocks and kills entities within its radius
#[derive(Debug, Clone)]
pub struct ExplodeSite {
    pub origin: BlockPos,
    pub radius: f32,
    /// Entity that exploded (primed TNT, a creeper)
    pub source: Option<EntityId>,
}

impl ExplodeSite {
    pub fn new(origin: BlockPos, radius: f32) -> Self {
        Self {
            origin,
            radius,
            source: None,
        }
    }

    pub fn from_entity(mut self, source: EntityId) -> Self {
        self.source = Some(source);
        self
    }
}

impl<H: SimulationHost> MutationSite<H> for ExplodeSite {
    fn name(&self) -> &'static str {
        "explode"
    }

    fn intercept(&mut self, tracker: &mut CauseTracker<H>) -> Result<ResolutionReport> {
        let info = ExplosionInfo {
            origin: self.origin,
            radius: self.radius,
            source: self.source,
        };
        let init = |ctx: &mut PhaseContext| {
            ctx.set_position(info.origin);
            ctx.set_explosion(info);
        };
        let ((), report) = tracker.run_phase_with_report(EXPLOSION, init, |phase| self.detonate(phase))?;
        Ok(report)
    }
}

impl ExplodeSite {
    fn detonate<H: SimulationHost>(&self, phase: &mut CauseTracker<H>) -> Result<()> {
        // Victims are picked before any block breaks, so item drops from this
        // blast are not caught in it
        let victims: Vec<EntityId> = phase
            .host()
            .entities_in_radius(self.origin.center(), self.radius)
            .into_iter()
            .map(|e| e.id)
            .filter(|id| Some(*id) != self.source)
            .collect();
        let blocks = phase.host().blocks_in_radius(self.origin, self.radius);

        phase.capture_transaction(Explosion::capture_state(self.origin, self.radius, self.source))?;

        for (pos, state) in blocks {
            if state.is_blast_resistant() {
                continue;
            }
            phase.host_mut().set_block(pos, BlockState::Air);
            phase.capture_transaction(ChangeBlock::new(pos, state, BlockState::Air))?;
            if let Some(item) = state.drop_item() {
                drop_block_item(phase, ItemStack::single(item), pos)?;
            }
        }

        for id in victims {
            let Some(removal) = RemoveEntity::capture_state(phase.host(), id) else {
                continue;
            };
            let removal = removal.with_damage(DamageSource::Explosion { origin: self.origin });
            phase.host_mut().remove_entity(id);
            phase.capture_transaction(removal)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cause::{ContextKey, ContextValue, Contributor};
    use crate::core::types::{EntityKind, EntitySnapshot};
    use crate::event::{EventType, Order};
    use crate::host::SimWorld;
    use crate::transaction::TxState;
    use glam::Vec3;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn world_with_crater() -> SimWorld {
        let mut world = SimWorld::new();
        world.fill(BlockPos::new(-1, 0, -1), BlockPos::new(1, 0, 1), BlockState::Dirt);
        world.set_block(BlockPos::new(0, -1, 0), BlockState::Bedrock);
        world
    }

    #[test]
    fn test_explosion_is_one_event() {
        let mut world = world_with_crater();
        let tnt = EntitySnapshot::new(EntityKind::PrimedTnt, Vec3::new(0.5, 1.0, 0.5));
        let zombie = EntitySnapshot::new(EntityKind::Zombie, Vec3::new(1.5, 1.0, 0.5));
        world.spawn_entity(tnt).unwrap();
        world.spawn_entity(zombie).unwrap();
        let mut tracker = CauseTracker::new(world);

        let events = Rc::new(RefCell::new(Vec::new()));
        let e2 = Rc::clone(&events);
        tracker.bus_mut().register(None, Order::Default, move |e| {
            e2.borrow_mut().push((e.event_type(), e.cause().clone(), e.mutations().count()));
        });

        let report = ExplodeSite::new(BlockPos::new(0, 0, 0), 2.0)
            .from_entity(tnt.id)
            .intercept(&mut tracker)
            .unwrap();

        let events = events.borrow();
        assert_eq!(events.len(), 1);
        let (event_type, cause, mutations) = &events[0];
        assert_eq!(*event_type, EventType::Explosion);
        // explosion + 9 dirt + 9 drops + zombie
        assert_eq!(*mutations, 20);
        assert!(cause.contains(&Contributor::Entity(tnt.id)));
        assert_eq!(cause.context(ContextKey::Creator), Some(&ContextValue::Entity(tnt.id)));

        assert_eq!(report.committed, 20);
        assert_eq!(tracker.host().block(BlockPos::new(0, -1, 0)), BlockState::Bedrock);
        assert!(tracker.host().entity(zombie.id).is_none());
        assert!(tracker.host().entity(tnt.id).is_some());
    }

    #[test]
    fn test_cancelled_explosion_rolls_everything_back() {
        let mut world = world_with_crater();
        let zombie = EntitySnapshot::new(EntityKind::Zombie, Vec3::new(0.5, 1.0, 0.5));
        world.spawn_entity(zombie).unwrap();
        let mut tracker = CauseTracker::new(world);
        tracker
            .bus_mut()
            .register(Some(EventType::Explosion), Order::Early, |e| e.set_cancelled(true));

        let report = ExplodeSite::new(BlockPos::new(0, 0, 0), 2.0)
            .intercept(&mut tracker)
            .unwrap();

        assert!(report.outcomes.iter().all(|o| o.state == TxState::Cancelled));
        assert_eq!(report.restore_failures, 0);
        assert_eq!(tracker.host().block_count(), 10);
        assert_eq!(tracker.host().entity(zombie.id), Some(&zombie));
        assert_eq!(tracker.host().entity_count(), 1);
    }
}
