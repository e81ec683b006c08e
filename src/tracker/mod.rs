//! Cause tracker - the context object interception sites work through
//!
//! Owns the phase stack, the cause stack, the event bus and the host. Every
//! operation that must stay balanced has two forms: a scoped guard that
//! closes itself on every exit path, and a token pair for call sites that
//! cannot hold a borrow across the whole unit of work.

pub mod guards;
pub mod report;

pub use guards::{CauseFrameGuard, EffectScopeGuard, PhaseGuard};
pub use report::{CrashReport, TrackerStats};

use crate::cause::{Cause, CauseFrame, CauseStack, ContextKey, ContextValue, Contributor};
use crate::core::config::TrackerConfig;
use crate::core::error::{Result, TrackerError};
use crate::event::EventBus;
use crate::host::SimulationHost;
use crate::phase::phases::IDLE;
use crate::phase::{Phase, PhaseContext, PhaseId, PhaseStack, UnwindPolicy};
use crate::transaction::{ResolutionReport, ResolveEnv, ScopeToken, Transaction, TxIndex};

/// Handle for a phase entered with [`CauseTracker::push_phase`]
#[must_use = "an entered phase must be popped"]
#[derive(Debug, PartialEq, Eq)]
pub struct PhaseToken {
    id: PhaseId,
    name: &'static str,
}

impl PhaseToken {
    pub fn id(&self) -> PhaseId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Phase, cause and transaction bookkeeping for one simulation host
pub struct CauseTracker<H: SimulationHost> {
    config: TrackerConfig,
    phases: PhaseStack,
    causes: CauseStack,
    bus: EventBus,
    host: H,
    stats: TrackerStats,
    last_report: Option<ResolutionReport>,
}

impl<H: SimulationHost> CauseTracker<H> {
    /// Tracker with the default config and the idle phase installed
    pub fn new(host: H) -> Self {
        Self::build(TrackerConfig::default(), host)
    }

    pub fn with_config(config: TrackerConfig, host: H) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, host))
    }

    fn build(config: TrackerConfig, host: H) -> Self {
        Self {
            phases: PhaseStack::with_base(IDLE, config.max_phase_depth),
            causes: CauseStack::new(config.max_cause_depth),
            bus: EventBus::new(),
            host,
            stats: TrackerStats::default(),
            last_report: None,
            config,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    pub fn causes(&self) -> &CauseStack {
        &self.causes
    }

    pub fn stats(&self) -> &TrackerStats {
        &self.stats
    }

    /// Report of the most recent phase exit or flush
    pub fn last_report(&self) -> Option<&ResolutionReport> {
        self.last_report.as_ref()
    }

    // === PHASES ===

    pub fn phase_depth(&self) -> usize {
        self.phases.depth()
    }

    pub fn current_phase(&self) -> Result<&PhaseContext> {
        self.phases.current()
    }

    pub fn current_phase_mut(&mut self) -> Result<&mut PhaseContext> {
        self.phases.current_mut()
    }

    pub fn is_in_phase(&self, name: &str) -> bool {
        self.phases.contains(name)
    }

    /// Active phase names, base first
    pub fn phase_names(&self) -> Vec<&'static str> {
        self.phases.names()
    }

    /// Enter `phase`; the returned guard exits it on drop
    pub fn enter_phase<F>(&mut self, phase: Phase, init: F) -> Result<PhaseGuard<'_, H>>
    where
        F: FnOnce(&mut PhaseContext),
    {
        let token = self.push_phase(phase, init)?;
        Ok(PhaseGuard::new(self, token.id))
    }

    /// Enter `phase`, run `body` inside it and exit
    ///
    /// An `Err` from `body` counts as an abnormal exit, so the phase's unwind
    /// policy decides whether its captures are resolved or discarded.
    pub fn run_phase<T, I, F>(&mut self, phase: Phase, init: I, body: F) -> Result<T>
    where
        I: FnOnce(&mut PhaseContext),
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.run_phase_with_report(phase, init, body)
            .map(|(value, _)| value)
    }

    /// [`CauseTracker::run_phase`], also handing back the phase's resolution report
    pub fn run_phase_with_report<T, I, F>(
        &mut self,
        phase: Phase,
        init: I,
        body: F,
    ) -> Result<(T, ResolutionReport)>
    where
        I: FnOnce(&mut PhaseContext),
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let mut guard = self.enter_phase(phase, init)?;
        match body(&mut *guard) {
            Ok(value) => {
                let report = guard.finish()?;
                Ok((value, report))
            }
            Err(err) => {
                guard.abort();
                guard.finish()?;
                Err(err)
            }
        }
    }

    /// Token form of [`CauseTracker::enter_phase`]
    pub fn push_phase<F>(&mut self, phase: Phase, init: F) -> Result<PhaseToken>
    where
        F: FnOnce(&mut PhaseContext),
    {
        let tick = self.host.tick();
        // The phase frame carries the phase itself as its first contributor
        let frame = self.causes.push_frame();
        if let Err(err) = self.causes.push_cause(Contributor::Phase(phase.name())) {
            self.causes.unwind_to(frame);
            return Err(err);
        }
        let ctx = match self.phases.push(phase) {
            Ok(ctx) => ctx,
            Err(err) => {
                self.causes.unwind_to(frame);
                return Err(err);
            }
        };
        ctx.set_entered_at(tick);
        ctx.attach_frame(frame);
        init(ctx);
        let id = ctx.id();

        self.stats.phases_entered += 1;
        tracing::debug!(
            "Entered phase {} ({:?}) at depth {}",
            phase.name(),
            id,
            self.phases.depth()
        );
        Ok(PhaseToken {
            id,
            name: phase.name(),
        })
    }

    /// Exit the innermost phase, resolving its buffer
    pub fn pop_phase(&mut self, token: PhaseToken) -> Result<ResolutionReport> {
        self.exit_phase(token.id, false)
    }

    /// Exit the innermost phase as a fault
    pub fn abort_phase(&mut self, token: PhaseToken) -> Result<ResolutionReport> {
        self.exit_phase(token.id, true)
    }

    fn exit_phase(&mut self, id: PhaseId, abnormal: bool) -> Result<ResolutionReport> {
        let mut ctx = match self.phases.pop(id) {
            Ok(ctx) => ctx,
            Err(err) => return Err(self.violation(err)),
        };
        let phase = ctx.phase();
        let buffer = ctx.take_buffer();

        // The phase frame stays open through resolution so the phase's own
        // contributors sit under every event cause
        let mut frame = match ctx.take_frame() {
            Some(frame) => self.causes.adopt(frame),
            None => self.causes.scoped(),
        };

        let resolved = if abnormal && phase.unwind_policy() == UnwindPolicy::Discard {
            tracing::warn!(
                "Discarding {} transaction(s) from phase {} after abnormal exit",
                buffer.len(),
                phase.name()
            );
            self.stats.phases_discarded += 1;
            Ok(buffer.discard())
        } else {
            let mut env = ResolveEnv {
                causes: frame.stack_mut(),
                bus: &mut self.bus,
                host: &mut self.host,
                scratch: Some(ctx.scratch()),
                batch_events: self
                    .config
                    .batch_block_changes
                    .unwrap_or(phase.batches_events()),
            };
            buffer.resolve(&mut env)
        };
        let closed = frame.close();

        let mut report = match resolved {
            Ok(report) => report,
            Err(err) => return Err(self.violation(err)),
        };
        report.phase = phase.name();
        self.record(&report);
        if let Some(mut flushed) = ctx.take_flushed() {
            flushed.absorb(report);
            report = flushed;
        }
        tracing::debug!(
            "Exited phase {} ({:?}){}",
            phase.name(),
            id,
            if abnormal { " abnormally" } else { "" }
        );
        self.last_report = Some(report.clone());

        if let Err(err) = closed {
            if abnormal {
                tracing::warn!("Closed leaked cause frames unwinding phase {}: {}", phase.name(), err);
            } else {
                return Err(self.violation(err));
            }
        }
        Ok(report)
    }

    /// Resolve the current phase's captures now, without exiting it
    pub fn flush(&mut self) -> Result<ResolutionReport> {
        let open_scopes = match self.phases.current() {
            Ok(ctx) => ctx.buffer().scope_depth(),
            Err(err) => return Err(self.violation(err)),
        };
        if open_scopes > 0 {
            return Err(self.violation(TrackerError::EffectScopeOrdering(format!(
                "flush with {} effect scope(s) open",
                open_scopes
            ))));
        }

        let batch_override = self.config.batch_block_changes;
        let ctx = self.phases.current_mut()?;
        let buffer = ctx.take_buffer();
        let mut env = ResolveEnv {
            causes: &mut self.causes,
            bus: &mut self.bus,
            host: &mut self.host,
            scratch: Some(ctx.scratch()),
            batch_events: batch_override.unwrap_or(ctx.phase().batches_events()),
        };
        let mut report = match buffer.resolve(&mut env) {
            Ok(report) => report,
            Err(err) => return Err(self.violation(err)),
        };
        report.phase = ctx.name();
        ctx.record_flush(report.clone());

        self.record(&report);
        self.last_report = Some(report.clone());
        Ok(report)
    }

    fn record(&mut self, report: &ResolutionReport) {
        self.stats.events_fired += report.events_fired as u64;
        self.stats.events_cancelled += report.events_cancelled as u64;
        self.stats.restore_failures += report.restore_failures as u64;
        if self.config.log_resolutions {
            tracing::debug!(
                "Resolved {}: {} event(s), {} cancelled, {} committed, {} dropped, {} discarded, {} restore failure(s)",
                report.phase,
                report.events_fired,
                report.events_cancelled,
                report.committed,
                report.dropped,
                report.discarded,
                report.restore_failures
            );
        }
    }

    // === TRANSACTIONS ===

    /// Capture into the current phase (innermost effect scope if one is open)
    pub fn capture_transaction<T>(&mut self, tx: T) -> Result<TxIndex>
    where
        T: Transaction + 'static,
    {
        let ctx = match self.phases.current_mut() {
            Ok(ctx) => ctx,
            Err(err) => return Err(self.violation(err)),
        };
        let idx = ctx.buffer_mut().capture(Box::new(tx));
        self.stats.transactions_captured += 1;
        Ok(idx)
    }

    /// Capture into the current phase's root region, bypassing open scopes
    pub fn capture_at_root<T>(&mut self, tx: T) -> Result<TxIndex>
    where
        T: Transaction + 'static,
    {
        let ctx = match self.phases.current_mut() {
            Ok(ctx) => ctx,
            Err(err) => return Err(self.violation(err)),
        };
        let idx = ctx.buffer_mut().capture_at_root(Box::new(tx));
        self.stats.transactions_captured += 1;
        Ok(idx)
    }

    /// Open an effect scope that merges back on drop
    pub fn open_effect_scope(&mut self) -> Result<EffectScopeGuard<'_, H>> {
        let token = self.begin_effect_scope()?;
        Ok(EffectScopeGuard::new(self, token))
    }

    /// Token form of [`CauseTracker::open_effect_scope`]
    pub fn begin_effect_scope(&mut self) -> Result<ScopeToken> {
        match self.phases.current_mut() {
            Ok(ctx) => {
                let scope = ctx.buffer_mut().open_scope();
                Ok(ScopeToken {
                    phase: ctx.id(),
                    scope,
                })
            }
            Err(err) => Err(self.violation(err)),
        }
    }

    /// Close the innermost effect scope of the current phase
    ///
    /// Returns how many transactions were merged into the enclosing region.
    pub fn close_effect_scope(&mut self, token: ScopeToken) -> Result<usize> {
        let result = match self.phases.current_mut() {
            Ok(ctx) if ctx.id() == token.phase => ctx.buffer_mut().close_scope(token.scope),
            Ok(ctx) => Err(TrackerError::EffectScopeOrdering(format!(
                "scope {:?} belongs to phase {:?} but {} ({:?}) is current",
                token.scope,
                token.phase,
                ctx.name(),
                ctx.id()
            ))),
            Err(err) => Err(err),
        };
        result.map_err(|err| self.violation(err))
    }

    // === CAUSES ===

    pub fn push_cause(&mut self, contributor: Contributor) -> Result<()> {
        self.causes.push_cause(contributor)
    }

    pub fn pop_cause(&mut self) -> Option<Contributor> {
        self.causes.pop_cause()
    }

    pub fn peek_cause(&self) -> &Contributor {
        self.causes.peek_cause()
    }

    /// Open a cause frame that closes on drop
    pub fn frame(&mut self) -> CauseFrameGuard<'_, H> {
        let frame = self.causes.push_frame();
        CauseFrameGuard::new(self, frame)
    }

    pub fn push_frame(&mut self) -> CauseFrame {
        self.causes.push_frame()
    }

    pub fn pop_frame(&mut self, frame: CauseFrame) -> Result<()> {
        self.causes.pop_frame(frame).map_err(|err| self.violation(err))
    }

    /// Close `frame` and anything leaked inside it; leaks are a violation
    pub(crate) fn close_frame(&mut self, frame: CauseFrame) -> Result<()> {
        self.causes.adopt(frame).close().map_err(|err| self.violation(err))
    }

    pub fn add_context(
        &mut self,
        frame: &CauseFrame,
        key: ContextKey,
        value: ContextValue,
    ) -> Result<Option<ContextValue>> {
        self.causes
            .add_context(frame, key, value)
            .map_err(|err| self.violation(err))
    }

    pub fn context(&self, key: ContextKey) -> Option<&ContextValue> {
        self.causes.context(key)
    }

    pub fn current_cause(&self) -> Cause {
        self.causes.current_cause()
    }

    // === INVARIANT VIOLATIONS ===

    /// Snapshot of the tracker state for diagnostics
    pub fn crash_report(&self, error: &TrackerError) -> CrashReport {
        CrashReport {
            error: error.to_string(),
            tick: self.host.tick(),
            phase_stack: self.phases.names(),
            cause_stack: self.causes.current_cause().contributors().to_vec(),
            open_frames: self.causes.frame_depth(),
            stats: self.stats.clone(),
        }
    }

    /// Log a broken invariant with a crash report, then panic or hand it back
    fn violation(&mut self, err: TrackerError) -> TrackerError {
        self.stats.invariant_violations += 1;
        match serde_json::to_string_pretty(&self.crash_report(&err)) {
            Ok(json) => tracing::error!("Invariant violation: {}\n{}", err, json),
            Err(e) => tracing::error!("Invariant violation: {} (crash report failed: {})", err, e),
        }
        // Never panic while already unwinding; that would abort the process
        if self.config.fail_fast && !std::thread::panicking() {
            panic!("phase tracker invariant violated: {}", err);
        }
        err
    }
}

impl<H: SimulationHost + std::fmt::Debug> std::fmt::Debug for CauseTracker<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CauseTracker")
            .field("phases", &self.phases.names())
            .field("cause_depth", &self.causes.depth())
            .field("bus", &self.bus)
            .field("host", &self.host)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{BlockPos, BlockState};
    use crate::event::Order;
    use crate::host::SimWorld;
    use crate::phase::phases::{BLOCK_BREAK, WORLD_GEN};
    use crate::transaction::{ChangeBlock, TxState};

    fn lenient() -> CauseTracker<SimWorld> {
        CauseTracker::with_config(TrackerConfig::lenient(), SimWorld::new()).unwrap()
    }

    fn place(tracker: &mut CauseTracker<SimWorld>, x: i32) -> TxIndex {
        let pos = BlockPos::new(x, 0, 0);
        let tx = ChangeBlock::capture_state(tracker.host(), pos, BlockState::Stone);
        tracker.host_mut().set_block(pos, BlockState::Stone);
        tracker.capture_transaction(tx).unwrap()
    }

    #[test]
    fn test_base_phase_installed() {
        let tracker = CauseTracker::new(SimWorld::new());
        assert_eq!(tracker.phase_names(), vec!["idle"]);
        assert_eq!(tracker.peek_cause(), &Contributor::Host);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = TrackerConfig {
            max_phase_depth: 1,
            ..TrackerConfig::default()
        };
        assert!(CauseTracker::with_config(config, SimWorld::new()).is_err());
    }

    #[test]
    fn test_guard_commits_on_drop() {
        let mut tracker = lenient();
        {
            let mut phase = tracker.enter_phase(BLOCK_BREAK, |_| {}).unwrap();
            assert!(phase.is_in_phase("block_break"));
            place(&mut phase, 0);
        }
        let report = tracker.last_report().unwrap();
        assert_eq!(report.phase, "block_break");
        assert_eq!(report.committed, 1);
        assert_eq!(tracker.phase_depth(), 1);
        assert_eq!(tracker.stats().events_fired, 1);
    }

    #[test]
    fn test_token_pop_out_of_order() {
        let mut tracker = lenient();
        let outer = tracker.push_phase(BLOCK_BREAK, |_| {}).unwrap();
        let inner = tracker.push_phase(BLOCK_BREAK, |_| {}).unwrap();

        let err = tracker.pop_phase(outer).unwrap_err();
        assert!(matches!(err, TrackerError::PhaseOrdering { .. }));
        assert_eq!(tracker.phase_depth(), 3);
        assert_eq!(tracker.stats().invariant_violations, 1);

        tracker.pop_phase(inner).unwrap();
    }

    #[test]
    #[should_panic(expected = "invariant violated")]
    fn test_fail_fast_panics() {
        let mut tracker = CauseTracker::new(SimWorld::new());
        let outer = tracker.push_phase(BLOCK_BREAK, |_| {}).unwrap();
        let _inner = tracker.push_phase(BLOCK_BREAK, |_| {}).unwrap();
        let _ = tracker.pop_phase(outer);
    }

    #[test]
    fn test_run_phase_err_discards_under_discard_policy() {
        let mut tracker = lenient();
        let result: Result<()> = tracker.run_phase(WORLD_GEN, |_| {}, |t| {
            place(t, 0);
            place(t, 1);
            Err(TrackerError::Config("generator failed".into()))
        });
        assert!(result.is_err());

        let report = tracker.last_report().unwrap();
        assert_eq!(report.discarded, 2);
        assert_eq!(report.events_fired, 0);
        assert_eq!(tracker.stats().phases_discarded, 1);
    }

    #[test]
    fn test_run_phase_with_report_returns_value_and_report() {
        let mut tracker = lenient();
        let (idx, report) = tracker
            .run_phase_with_report(BLOCK_BREAK, |_| {}, |t| Ok(place(t, 4)))
            .unwrap();
        assert_eq!(report.phase, "block_break");
        assert_eq!(report.outcome(idx).map(|o| o.state), Some(TxState::Committed));

        let failed = tracker.run_phase_with_report(WORLD_GEN, |_| {}, |t| {
            place(t, 5);
            Err::<(), _>(TrackerError::Config("generator failed".into()))
        });
        assert!(failed.is_err());
        assert_eq!(tracker.last_report().map(|r| r.discarded), Some(1));
        assert_eq!(tracker.host().block(BlockPos::new(5, 0, 0)), BlockState::Stone);
    }

    #[test]
    fn test_phase_contributes_itself_while_active() {
        let mut tracker = lenient();
        {
            let phase = tracker.enter_phase(BLOCK_BREAK, |_| {}).unwrap();
            assert_eq!(phase.peek_cause(), &Contributor::Phase("block_break"));
            assert_eq!(phase.causes().depth(), 2);
        }
        assert_eq!(tracker.peek_cause(), &Contributor::Host);
        assert_eq!(tracker.causes().depth(), 1);
    }

    #[test]
    fn test_cause_limit_blocks_phase_entry_cleanly() {
        let config = TrackerConfig {
            max_cause_depth: 2,
            ..TrackerConfig::lenient()
        };
        let mut tracker = CauseTracker::with_config(config, SimWorld::new()).unwrap();
        let outer = tracker.push_phase(BLOCK_BREAK, |_| {}).unwrap();

        let err = tracker.push_phase(BLOCK_BREAK, |_| {}).unwrap_err();
        assert!(matches!(err, TrackerError::CauseDepthExceeded(2)));
        assert_eq!(tracker.phase_depth(), 2);
        assert_eq!(tracker.causes().frame_depth(), 1);

        tracker.pop_phase(outer).unwrap();
        assert_eq!(tracker.causes().depth(), 1);
    }

    #[test]
    fn test_flush_resolves_in_place() {
        let mut tracker = lenient();
        tracker.bus_mut().register(None, Order::Default, |e| e.set_cancelled(true));

        let mut phase = tracker.enter_phase(BLOCK_BREAK, |_| {}).unwrap();
        let first = place(&mut phase, 0);
        let flushed = phase.flush().unwrap();
        assert_eq!(flushed.cancelled, 1);
        assert_eq!(phase.host().block(BlockPos::new(0, 0, 0)), BlockState::Air);

        let second = place(&mut phase, 1);
        assert_ne!(first, second);
        let report = phase.finish().unwrap();
        assert_eq!(report.events_fired, 2);
        assert_eq!(report.outcomes.len(), 2);
        assert!(report.outcomes.iter().all(|o| o.state == TxState::Cancelled));
        assert_eq!(report.outcome(first).map(|o| o.index), Some(first));
        assert_eq!(report.outcome(second).map(|o| o.index), Some(second));
    }

    #[test]
    fn test_flush_with_open_scope_is_violation() {
        let mut tracker = lenient();
        let _token = tracker.begin_effect_scope().unwrap();
        assert!(matches!(tracker.flush(), Err(TrackerError::EffectScopeOrdering(_))));
    }

    #[test]
    fn test_scope_closed_against_other_phase() {
        let mut tracker = lenient();
        let scope = tracker.begin_effect_scope().unwrap();
        let phase = tracker.push_phase(BLOCK_BREAK, |_| {}).unwrap();

        let err = tracker.close_effect_scope(scope).unwrap_err();
        assert!(matches!(err, TrackerError::EffectScopeOrdering(_)));
        tracker.pop_phase(phase).unwrap();
    }

    #[test]
    fn test_leaked_token_frame_reported_on_exit() {
        let mut tracker = lenient();
        let phase = tracker.push_phase(BLOCK_BREAK, |_| {}).unwrap();
        let _leaked = tracker.push_frame();
        tracker.push_cause(Contributor::Plugin("leaky".into())).unwrap();

        let err = tracker.pop_phase(phase).unwrap_err();
        assert!(matches!(err, TrackerError::UnbalancedFrame { .. }));
        // Repaired regardless
        assert_eq!(tracker.causes().frame_depth(), 0);
        assert_eq!(tracker.causes().depth(), 1);
    }

    #[test]
    fn test_crash_report_serializes() {
        let mut tracker = lenient();
        tracker.push_cause(Contributor::Plugin("audit".into())).unwrap();
        let report = tracker.crash_report(&TrackerError::EmptyStack);
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("audit"));
        assert!(json.contains("idle"));
    }
}
