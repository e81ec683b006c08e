//! Phase-local state owned by one entered phase

use crate::cause::{CauseFrame, ContextKey, ContextValue, Contributor, DamageSource, StackFrame};
use crate::core::types::{BlockPos, EntityId, Tick};
use crate::transaction::{ResolutionReport, TransactionBuffer};

use super::{Phase, PhaseId};

/// The explosion a phase is processing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExplosionInfo {
    pub origin: BlockPos,
    pub radius: f32,
    pub source: Option<EntityId>,
}

/// Phase-specific scratch fields set by the initializer at entry
///
/// Whatever is set here is applied to the cause of every event the phase
/// fires, before the transactions add their own contributors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseScratch {
    /// Primary contributor for everything the phase captures
    pub source: Option<Contributor>,
    pub notifier: Option<EntityId>,
    pub position: Option<BlockPos>,
    pub explosion: Option<ExplosionInfo>,
    /// Name of the packet being processed, for packet phases
    pub packet: Option<&'static str>,
}

impl PhaseScratch {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn populate_frame(&self, frame: &mut StackFrame<'_>) {
        if let Some(source) = &self.source {
            frame.push_cause(source.clone());
        }
        if let Some(notifier) = self.notifier {
            frame.add_context(ContextKey::Notifier, ContextValue::Entity(notifier));
        }
        if let Some(explosion) = self.explosion {
            frame.add_context(
                ContextKey::LastDamageSource,
                ContextValue::DamageSource(DamageSource::Explosion {
                    origin: explosion.origin,
                }),
            );
        }
        if let Some(packet) = self.packet {
            frame.add_context(ContextKey::Custom("packet"), ContextValue::Text(packet.to_string()));
        }
    }
}

/// Mutable state of one active phase
#[derive(Debug)]
pub struct PhaseContext {
    id: PhaseId,
    phase: Phase,
    buffer: TransactionBuffer,
    scratch: PhaseScratch,
    /// Cause frame opened when the phase was entered
    frame: Option<CauseFrame>,
    entered_at: Tick,
    /// Results of explicit flushes before exit
    flushed: Option<ResolutionReport>,
}

impl PhaseContext {
    pub fn new(id: PhaseId, phase: Phase, scratch: PhaseScratch) -> Self {
        Self {
            id,
            phase,
            buffer: TransactionBuffer::new(),
            scratch,
            frame: None,
            entered_at: 0,
            flushed: None,
        }
    }

    pub fn id(&self) -> PhaseId {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn name(&self) -> &'static str {
        self.phase.name()
    }

    pub fn buffer(&self) -> &TransactionBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut TransactionBuffer {
        &mut self.buffer
    }

    pub fn scratch(&self) -> &PhaseScratch {
        &self.scratch
    }

    pub fn scratch_mut(&mut self) -> &mut PhaseScratch {
        &mut self.scratch
    }

    pub fn entered_at(&self) -> Tick {
        self.entered_at
    }

    pub fn set_source(&mut self, source: Contributor) {
        self.scratch.source = Some(source);
    }

    pub fn set_notifier(&mut self, notifier: EntityId) {
        self.scratch.notifier = Some(notifier);
    }

    pub fn set_position(&mut self, pos: BlockPos) {
        self.scratch.position = Some(pos);
    }

    pub fn set_explosion(&mut self, explosion: ExplosionInfo) {
        self.scratch.explosion = Some(explosion);
    }

    pub(crate) fn set_entered_at(&mut self, tick: Tick) {
        self.entered_at = tick;
    }

    pub(crate) fn attach_frame(&mut self, frame: CauseFrame) {
        self.frame = Some(frame);
    }

    pub(crate) fn take_frame(&mut self) -> Option<CauseFrame> {
        self.frame.take()
    }

    /// Swap the buffer out for an empty one
    /// Hand the buffer to resolution, leaving an empty one that keeps numbering
    pub(crate) fn take_buffer(&mut self) -> TransactionBuffer {
        let next = TransactionBuffer::continuing(&self.buffer);
        std::mem::replace(&mut self.buffer, next)
    }

    pub(crate) fn record_flush(&mut self, report: ResolutionReport) {
        match self.flushed.as_mut() {
            Some(existing) => existing.absorb(report),
            None => self.flushed = Some(report),
        }
    }

    pub(crate) fn take_flushed(&mut self) -> Option<ResolutionReport> {
        self.flushed.take()
    }
}
