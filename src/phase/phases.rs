//! Built-in phase descriptors for the interception sites

use super::{Phase, PhaseScratch, UnwindPolicy};

/// Base phase; installed once and never popped
pub const IDLE: Phase = Phase::new("idle");

pub const BLOCK_BREAK: Phase = Phase::new("block_break");

pub const BLOCK_PLACE: Phase = Phase::new("block_place");

/// Explosions batch whatever their blast did not absorb
pub const EXPLOSION: Phase = Phase::new("explosion").batching();

pub const ENTITY_DEATH: Phase = Phase::new("entity_death");

/// Scheduled block and entity updates within a tick
pub const WORLD_TICK: Phase = Phase::new("world_tick").batching();

pub const PACKET: Phase = Phase::new("packet").with_factory(packet_scratch);

/// Terrain generation; a fault here leaves chunks half-built, so nothing is fired
pub const WORLD_GEN: Phase = Phase::new("world_gen")
    .batching()
    .with_unwind(UnwindPolicy::Discard);

fn packet_scratch() -> PhaseScratch {
    PhaseScratch {
        packet: Some("unknown"),
        ..PhaseScratch::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_policies() {
        assert_eq!(IDLE.unwind_policy(), UnwindPolicy::Resolve);
        assert!(EXPLOSION.batches_events());
        assert!(!BLOCK_BREAK.batches_events());
        assert_eq!(WORLD_GEN.unwind_policy(), UnwindPolicy::Discard);
    }

    #[test]
    fn test_packet_factory_marks_scratch() {
        let ctx = PACKET.create_context(crate::phase::PhaseId(7));
        assert_eq!(ctx.scratch().packet, Some("unknown"));
        assert_eq!(ctx.name(), "packet");
    }
}
