//! Scoped guards over the tracker
//!
//! Each guard borrows the tracker mutably and derefs to it, so work inside
//! the scope goes through the guard and nesting is LIFO by construction.
//! Dropping a guard closes its scope on every exit path, panics included.

use std::ops::{Deref, DerefMut};

use super::CauseTracker;
use crate::cause::{CauseFrame, ContextKey, ContextValue, Contributor};
use crate::core::error::Result;
use crate::host::SimulationHost;
use crate::phase::PhaseId;
use crate::transaction::{ResolutionReport, ScopeToken};

/// An entered phase; exits (and resolves) when dropped
pub struct PhaseGuard<'a, H: SimulationHost> {
    tracker: &'a mut CauseTracker<H>,
    id: PhaseId,
    abnormal: bool,
    released: bool,
}

impl<'a, H: SimulationHost> PhaseGuard<'a, H> {
    pub(crate) fn new(tracker: &'a mut CauseTracker<H>, id: PhaseId) -> Self {
        Self {
            tracker,
            id,
            abnormal: false,
            released: false,
        }
    }

    pub fn id(&self) -> PhaseId {
        self.id
    }

    /// Treat the coming exit as a fault
    pub fn abort(&mut self) {
        self.abnormal = true;
    }

    pub fn is_aborted(&self) -> bool {
        self.abnormal
    }

    /// Exit now and hand back the resolution report
    pub fn finish(mut self) -> Result<ResolutionReport> {
        self.released = true;
        let abnormal = self.abnormal;
        self.tracker.exit_phase(self.id, abnormal)
    }
}

impl<H: SimulationHost> Deref for PhaseGuard<'_, H> {
    type Target = CauseTracker<H>;

    fn deref(&self) -> &Self::Target {
        self.tracker
    }
}

impl<H: SimulationHost> DerefMut for PhaseGuard<'_, H> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.tracker
    }
}

impl<H: SimulationHost> Drop for PhaseGuard<'_, H> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let abnormal = self.abnormal || std::thread::panicking();
        if let Err(err) = self.tracker.exit_phase(self.id, abnormal) {
            tracing::debug!("Phase {:?} exit on drop failed: {}", self.id, err);
        }
    }
}

/// An open cause frame; contributors pushed through it are popped on drop
pub struct CauseFrameGuard<'a, H: SimulationHost> {
    tracker: &'a mut CauseTracker<H>,
    frame: Option<CauseFrame>,
}

impl<'a, H: SimulationHost> CauseFrameGuard<'a, H> {
    pub(crate) fn new(tracker: &'a mut CauseTracker<H>, frame: CauseFrame) -> Self {
        Self {
            tracker,
            frame: Some(frame),
        }
    }

    /// Attach context to this frame; fails if a token frame was opened inside it
    pub fn add_context(&mut self, key: ContextKey, value: ContextValue) -> Result<Option<ContextValue>> {
        match self.frame.as_ref() {
            Some(frame) => self.tracker.add_context(frame, key, value),
            None => Ok(None),
        }
    }

    /// Push a contributor, chaining
    pub fn with_cause(mut self, contributor: Contributor) -> Result<Self> {
        self.tracker.push_cause(contributor)?;
        Ok(self)
    }

    /// Close the frame, reporting token frames leaked inside it
    pub fn close(mut self) -> Result<()> {
        match self.frame.take() {
            Some(frame) => self.tracker.close_frame(frame),
            None => Ok(()),
        }
    }
}

impl<H: SimulationHost> Deref for CauseFrameGuard<'_, H> {
    type Target = CauseTracker<H>;

    fn deref(&self) -> &Self::Target {
        self.tracker
    }
}

impl<H: SimulationHost> DerefMut for CauseFrameGuard<'_, H> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.tracker
    }
}

impl<H: SimulationHost> Drop for CauseFrameGuard<'_, H> {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.take() {
            let leaked = self.tracker.causes.unwind_to(frame);
            if leaked > 0 {
                tracing::warn!("Closed {} leaked cause frame(s) on guard drop", leaked);
            }
        }
    }
}

/// An open effect scope; merges into the enclosing region on drop
pub struct EffectScopeGuard<'a, H: SimulationHost> {
    tracker: &'a mut CauseTracker<H>,
    token: Option<ScopeToken>,
}

impl<'a, H: SimulationHost> EffectScopeGuard<'a, H> {
    pub(crate) fn new(tracker: &'a mut CauseTracker<H>, token: ScopeToken) -> Self {
        Self {
            tracker,
            token: Some(token),
        }
    }

    /// Merge now; returns how many transactions moved into the enclosing region
    pub fn close(mut self) -> Result<usize> {
        match self.token.take() {
            Some(token) => self.tracker.close_effect_scope(token),
            None => Ok(0),
        }
    }
}

impl<H: SimulationHost> Deref for EffectScopeGuard<'_, H> {
    type Target = CauseTracker<H>;

    fn deref(&self) -> &Self::Target {
        self.tracker
    }
}

impl<H: SimulationHost> DerefMut for EffectScopeGuard<'_, H> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.tracker
    }
}

impl<H: SimulationHost> Drop for EffectScopeGuard<'_, H> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            if let Err(err) = self.tracker.close_effect_scope(token) {
                tracing::debug!("Effect scope close on drop failed: {}", err);
            }
        }
    }
}
