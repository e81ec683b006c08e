//! Phases - named kinds of simulation work that scope mutation capture
//!
//! A [`Phase`] is an immutable descriptor. Entering it creates a
//! [`PhaseContext`] that owns the transaction buffer for that unit of work;
//! the [`PhaseStack`] keeps the active contexts strictly nested.

pub mod context;
pub mod phases;
pub mod stack;

pub use context::{ExplosionInfo, PhaseContext, PhaseScratch};
pub use stack::PhaseStack;

use serde::{Deserialize, Serialize};

/// Identity of one entered phase context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PhaseId(pub(crate) u64);

impl PhaseId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// What to do with captured transactions when a phase exits abnormally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnwindPolicy {
    /// Resolve as usual: fire events, commit or compensate
    Resolve,
    /// Drop the buffer without firing anything
    ///
    /// For host-side faults where half-captured work would corrupt state
    /// worse than losing it.
    Discard,
}

/// Immutable descriptor of a kind of simulation work
#[derive(Clone, Copy)]
pub struct Phase {
    name: &'static str,
    unwind: UnwindPolicy,
    batch_events: bool,
    factory: fn() -> PhaseScratch,
}

impl Phase {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            unwind: UnwindPolicy::Resolve,
            batch_events: false,
            factory: PhaseScratch::empty,
        }
    }

    pub const fn with_unwind(mut self, unwind: UnwindPolicy) -> Self {
        self.unwind = unwind;
        self
    }

    /// Group adjacent same-kind roots into one event
    pub const fn batching(mut self) -> Self {
        self.batch_events = true;
        self
    }

    pub const fn with_factory(mut self, factory: fn() -> PhaseScratch) -> Self {
        self.factory = factory;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn unwind_policy(&self) -> UnwindPolicy {
        self.unwind
    }

    pub fn batches_events(&self) -> bool {
        self.batch_events
    }

    /// Fresh, empty context for this phase
    pub fn create_context(&self, id: PhaseId) -> PhaseContext {
        PhaseContext::new(id, *self, (self.factory)())
    }
}

impl PartialEq for Phase {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Phase {}

impl std::fmt::Debug for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Phase")
            .field("name", &self.name)
            .field("unwind", &self.unwind)
            .field("batch_events", &self.batch_events)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let phase = Phase::new("custom");
        assert_eq!(phase.name(), "custom");
        assert_eq!(phase.unwind_policy(), UnwindPolicy::Resolve);
        assert!(!phase.batches_events());

        let phase = phase.with_unwind(UnwindPolicy::Discard).batching();
        assert_eq!(phase.unwind_policy(), UnwindPolicy::Discard);
        assert!(phase.batches_events());
    }

    #[test]
    fn test_factory_runs_per_context() {
        fn scratch() -> PhaseScratch {
            PhaseScratch {
                source: Some(crate::cause::Contributor::Plugin("factory".into())),
                ..PhaseScratch::empty()
            }
        }
        let phase = Phase::new("factory").with_factory(scratch);
        let a = phase.create_context(PhaseId(1));
        let b = phase.create_context(PhaseId(2));
        assert_eq!(a.scratch().source, b.scratch().source);
        assert!(a.buffer().is_empty());
        assert_ne!(a.id(), b.id());
    }
}
