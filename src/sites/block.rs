//! Block break and place sites

use super::{drop_block_item, MutationSite};
use crate::cause::Contributor;
use crate::core::error::Result;
use crate::core::types::{BlockPos, BlockState, ItemStack};
use crate::host::SimulationHost;
use crate::phase::phases::{BLOCK_BREAK, BLOCK_PLACE};
use crate::phase::PhaseContext;
use crate::tracker::CauseTracker;
use crate::transaction::{ChangeBlock, ResolutionReport};

/// A block broken by a player, entity or plugin
#[derive(Debug, Clone)]
pub struct BreakBlockSite {
    pub pos: BlockPos,
    pub breaker: Option<Contributor>,
}

impl BreakBlockSite {
    pub fn new(pos: BlockPos) -> Self {
        Self { pos, breaker: None }
    }

    pub fn by(mut self, breaker: Contributor) -> Self {
        self.breaker = Some(breaker);
        self
    }
}

impl<H: SimulationHost> MutationSite<H> for BreakBlockSite {
    fn name(&self) -> &'static str {
        "break_block"
    }

    fn intercept(&mut self, tracker: &mut CauseTracker<H>) -> Result<ResolutionReport> {
        let pos = self.pos;
        let breaker = self.breaker.clone();
        let body = |phase: &mut CauseTracker<H>| -> Result<()> {
            let original = phase.host().block(pos);
            if original.is_air() {
                return Ok(());
            }

            let change = ChangeBlock::capture_state(phase.host(), pos, BlockState::Air);
            phase.host_mut().set_block(pos, BlockState::Air);
            phase.capture_transaction(change)?;

            if let Some(item) = original.drop_item() {
                drop_block_item(phase, ItemStack::single(item), pos)?;
            }
            Ok(())
        };
        let init = |ctx: &mut PhaseContext| {
            ctx.set_position(pos);
            if let Some(breaker) = breaker {
                ctx.set_source(breaker);
            }
        };
        let ((), report) = tracker.run_phase_with_report(BLOCK_BREAK, init, body)?;
        Ok(report)
    }
}

/// A block placed by a player, entity or plugin
#[derive(Debug, Clone)]
pub struct PlaceBlockSite {
    pub pos: BlockPos,
    pub state: BlockState,
    pub placer: Option<Contributor>,
}

impl PlaceBlockSite {
    pub fn new(pos: BlockPos, state: BlockState) -> Self {
        Self {
            pos,
            state,
            placer: None,
        }
    }

    pub fn by(mut self, placer: Contributor) -> Self {
        self.placer = Some(placer);
        self
    }
}

impl<H: SimulationHost> MutationSite<H> for PlaceBlockSite {
    fn name(&self) -> &'static str {
        "place_block"
    }

    fn intercept(&mut self, tracker: &mut CauseTracker<H>) -> Result<ResolutionReport> {
        let pos = self.pos;
        let state = self.state;
        let placer = self.placer.clone();
        let body = |phase: &mut CauseTracker<H>| -> Result<()> {
            let mut change = ChangeBlock::capture_state(phase.host(), pos, state);
            if let Some(placer) = placer {
                change = change.with_actor(placer);
            }
            phase.host_mut().set_block(pos, state);
            phase.capture_transaction(change)?;
            Ok(())
        };
        let ((), report) =
            tracker.run_phase_with_report(BLOCK_PLACE, |ctx| ctx.set_position(pos), body)?;
        Ok(report)
    }
}
