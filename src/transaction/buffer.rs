//! Transaction buffer - capture, absorption, dispatch, commit/compensate
//!
//! Resolution runs once per buffer, at phase exit or an explicit flush:
//! 1. Merge any effect scope still open
//! 2. Partition captures into a forest (unbatchable ones stay roots)
//! 3. Per root (or per batch of adjacent roots) open a cause frame, let the
//!    phase and every transaction in the subtree populate it, build the event
//! 4. Dispatch synchronously; on cancel mark the whole subtree cancelled,
//!    otherwise mark it committed
//! 5. Close the cause frame
//! 6. Once every event has fired, restore cancelled subtrees latest root
//!    first and deepest-first within each

use serde::Serialize;

use super::effect::{EffectScopeId, EffectScopes};
use super::graph::{TransactionGraph, TxIndex, TxState};
use super::{Transaction, TransactionKind};
use crate::cause::CauseStack;
use crate::core::error::Result;
use crate::event::{Event, EventBus, EventId};
use crate::host::SimulationHost;
use crate::phase::PhaseScratch;

/// Collaborators needed while resolving a buffer
pub struct ResolveEnv<'a> {
    pub causes: &'a mut CauseStack,
    pub bus: &'a mut EventBus,
    pub host: &'a mut dyn SimulationHost,
    /// Phase-level contributions applied to every root's cause
    pub scratch: Option<&'a PhaseScratch>,
    /// Group adjacent roots with equal batch keys into one event
    pub batch_events: bool,
}

/// Final state of one captured transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TxOutcome {
    pub index: TxIndex,
    pub kind: TransactionKind,
    pub state: TxState,
    pub parent: Option<TxIndex>,
    pub event: Option<EventId>,
}

/// Summary of one buffer resolution
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolutionReport {
    pub phase: &'static str,
    pub events_fired: usize,
    pub events_cancelled: usize,
    pub committed: usize,
    pub cancelled: usize,
    pub dropped: usize,
    pub discarded: usize,
    pub restore_failures: usize,
    /// Effect scopes still open when resolution started
    pub merged_open_scopes: usize,
    /// Every captured transaction, in capture order
    pub outcomes: Vec<TxOutcome>,
}

impl ResolutionReport {
    pub fn transaction_count(&self) -> usize {
        self.outcomes.len()
    }

    /// Outcome for a capture index
    pub fn outcome(&self, index: TxIndex) -> Option<&TxOutcome> {
        self.outcomes.iter().find(|o| o.index == index)
    }

    /// Fold a later resolution of the same phase (e.g. after a flush) into this one
    pub fn absorb(&mut self, other: ResolutionReport) {
        self.events_fired += other.events_fired;
        self.events_cancelled += other.events_cancelled;
        self.committed += other.committed;
        self.cancelled += other.cancelled;
        self.dropped += other.dropped;
        self.discarded += other.discarded;
        self.restore_failures += other.restore_failures;
        self.merged_open_scopes += other.merged_open_scopes;
        self.outcomes.extend(other.outcomes);
    }
}

/// Ordered captures of one phase context
#[derive(Debug, Default)]
pub struct TransactionBuffer {
    graph: TransactionGraph,
    /// Root region in capture order; scope captures are spliced in on close
    order: Vec<TxIndex>,
    scopes: EffectScopes,
}

impl TransactionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty buffer that keeps numbering captures after `previous`
    ///
    /// Used when a phase flushes, so indices stay unique across its reports.
    pub fn continuing(previous: &TransactionBuffer) -> Self {
        Self {
            graph: TransactionGraph::starting_at(previous.graph.next_index().index()),
            ..Self::default()
        }
    }

    /// Number of captured transactions
    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    pub fn get(&self, idx: TxIndex) -> &dyn Transaction {
        self.graph.get(idx)
    }

    /// Capture into the innermost open effect scope, or the root region
    pub fn capture(&mut self, tx: Box<dyn Transaction>) -> TxIndex {
        let kind = tx.kind();
        let idx = self.graph.insert(tx);
        if !self.scopes.record(idx) {
            self.order.push(idx);
        }
        tracing::trace!("Captured {:?} transaction {:?}", kind, idx);
        idx
    }

    /// Capture straight into the root region, bypassing open scopes
    pub fn capture_at_root(&mut self, tx: Box<dyn Transaction>) -> TxIndex {
        let idx = self.graph.insert(tx);
        self.order.push(idx);
        idx
    }

    /// Root region as it stands (open scope captures not yet merged)
    pub fn root_order(&self) -> &[TxIndex] {
        &self.order
    }

    pub fn open_scope(&mut self) -> EffectScopeId {
        self.scopes.open(&self.order)
    }

    pub fn close_scope(&mut self, id: EffectScopeId) -> Result<usize> {
        self.scopes.close(id, &mut self.order)
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.depth()
    }

    /// Throw every capture away without firing events
    pub fn discard(self) -> ResolutionReport {
        let mut report = ResolutionReport {
            discarded: self.graph.len(),
            ..Default::default()
        };
        report.outcomes = self
            .graph
            .indices()
            .map(|idx| {
                TxOutcome {
                    index: idx,
                    kind: self.graph.get(idx).kind(),
                    state: TxState::Discarded,
                    parent: None,
                    event: None,
                }
            })
            .collect();
        report
    }

    /// Absorb, dispatch and commit or compensate every capture
    pub fn resolve(mut self, env: &mut ResolveEnv<'_>) -> Result<ResolutionReport> {
        let mut report = ResolutionReport {
            merged_open_scopes: self.scopes.close_all(&mut self.order),
            ..Default::default()
        };
        if report.merged_open_scopes > 0 {
            tracing::warn!(
                "Merged {} effect scope(s) left open at resolution",
                report.merged_open_scopes
            );
        }

        let roots = self.graph.absorb(&self.order)?;
        let mut events: Vec<Option<EventId>> = vec![None; self.graph.len()];

        let mut to_restore: Vec<TxIndex> = Vec::new();
        for group in self.batches(&roots, env.batch_events) {
            self.resolve_group(&group, env, &mut report, &mut events, &mut to_restore);
        }

        // Later roots undo first, children before parents, so each restore
        // sees the world exactly as its transaction left it
        for &root in to_restore.iter().rev() {
            for idx in self.graph.compensation_order(root) {
                if let Err(err) = self.graph.restore(idx, &mut *env.host) {
                    tracing::warn!(
                        "Compensation failed for {:?} transaction {:?}: {}",
                        self.graph.get(idx).kind(),
                        idx,
                        err
                    );
                    report.restore_failures += 1;
                }
            }
        }

        report.outcomes = self
            .order
            .iter()
            .map(|&idx| TxOutcome {
                index: idx,
                kind: self.graph.get(idx).kind(),
                state: self.graph.state(idx),
                parent: self.graph.parent(idx),
                event: events[self.graph.slot(idx)],
            })
            .collect();
        Ok(report)
    }

    /// Split roots into runs that share one event
    fn batches(&self, roots: &[TxIndex], batch_events: bool) -> Vec<Vec<TxIndex>> {
        let mut groups: Vec<Vec<TxIndex>> = Vec::new();
        let mut group_key: Option<TransactionKind> = None;

        for &root in roots {
            let tx = self.graph.get(root);
            let key = if batch_events && !tx.is_unbatchable() {
                tx.batch_key()
            } else {
                None
            };
            match (groups.last_mut(), key) {
                (Some(group), Some(k)) if group_key == Some(k) => group.push(root),
                _ => groups.push(vec![root]),
            }
            group_key = key;
        }
        groups
    }

    fn resolve_group(
        &mut self,
        group: &[TxIndex],
        env: &mut ResolveEnv<'_>,
        report: &mut ResolutionReport,
        events: &mut [Option<EventId>],
        to_restore: &mut Vec<TxIndex>,
    ) {
        let mut frame = env.causes.scoped();
        if let Some(scratch) = env.scratch {
            scratch.populate_frame(&mut frame);
        }
        for &root in group {
            self.graph.get(root).populate_frame(&mut frame);
            for child in self.graph.descendants(root) {
                self.graph.get(child).populate_frame(&mut frame);
            }
        }
        let cause = frame.cause();

        let mut event: Option<Event> = None;
        let mut fired: Vec<TxIndex> = Vec::new();
        for &root in group {
            let absorbed = self.graph.descendants(root);
            let generated = self
                .graph
                .get(root)
                .generate_event(cause.clone(), &self.graph.view(&absorbed));
            match generated {
                Some(generated) => {
                    fired.push(root);
                    match event.as_mut() {
                        Some(batch) => batch.batch_with(generated),
                        None => event = Some(generated),
                    }
                }
                None => {
                    for idx in std::iter::once(root).chain(absorbed) {
                        self.graph.set_state(idx, TxState::Dropped);
                        report.dropped += 1;
                    }
                }
            }
        }

        let Some(mut event) = event else {
            return;
        };
        let cancelled = env.bus.post(&mut event);
        report.events_fired += 1;
        tracing::trace!(
            "Dispatched {:?} event {:?} for {} root(s), cancelled: {}",
            event.event_type(),
            event.id(),
            fired.len(),
            cancelled
        );

        for &root in &fired {
            for idx in self.graph.compensation_order(root) {
                events[self.graph.slot(idx)] = Some(event.id());
                let state = if cancelled {
                    TxState::Cancelled
                } else {
                    TxState::Committed
                };
                self.graph.set_state(idx, state);
                if cancelled {
                    report.cancelled += 1;
                } else {
                    report.committed += 1;
                }
            }
        }

        if cancelled {
            report.events_cancelled += 1;
            to_restore.extend(fired);
        }
        drop(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::RestoreError;
    use crate::core::types::{BlockPos, BlockState};
    use crate::event::{Mutation, Order};
    use crate::host::SimWorld;
    use crate::transaction::Subject;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    #[derive(Debug)]
    struct Recorded {
        name: &'static str,
        x: i32,
        parent_x: Option<i32>,
        log: Log,
        fail_restore: bool,
    }

    impl Transaction for Recorded {
        fn kind(&self) -> TransactionKind {
            TransactionKind::ChangeBlock
        }

        fn subject(&self) -> Subject {
            Subject::Block(BlockPos::new(self.x, 0, 0))
        }

        fn accepts_parent(&self, parent: &dyn Transaction) -> bool {
            self.parent_x.is_some_and(|px| parent.subject() == Subject::Block(BlockPos::new(px, 0, 0)))
        }

        fn mutation(&self) -> Option<Mutation> {
            Some(Mutation::Block {
                pos: BlockPos::new(self.x, 0, 0),
                original: BlockState::Air,
                replacement: BlockState::Stone,
            })
        }

        fn batch_key(&self) -> Option<TransactionKind> {
            Some(TransactionKind::ChangeBlock)
        }

        fn restore(&mut self, _host: &mut dyn SimulationHost) -> std::result::Result<(), RestoreError> {
            self.log.borrow_mut().push(format!("restore {}", self.name));
            if self.fail_restore {
                Err(RestoreError::Missing(self.name.to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn recorded(name: &'static str, x: i32, parent_x: Option<i32>, log: &Log) -> Box<dyn Transaction> {
        Box::new(Recorded {
            name,
            x,
            parent_x,
            log: Rc::clone(log),
            fail_restore: false,
        })
    }

    fn resolve_with(buffer: TransactionBuffer, bus: &mut EventBus, batch_events: bool) -> ResolutionReport {
        let mut causes = CauseStack::new(16);
        let mut world = SimWorld::new();
        let mut env = ResolveEnv {
            causes: &mut causes,
            bus,
            host: &mut world,
            scratch: None,
            batch_events,
        };
        let report = buffer.resolve(&mut env).unwrap();
        assert_eq!(causes.depth(), 1);
        assert_eq!(causes.frame_depth(), 0);
        report
    }

    #[test]
    fn test_cancel_restores_children_first() {
        let log: Log = Rc::default();
        let mut buffer = TransactionBuffer::new();
        buffer.capture(recorded("B", 0, None, &log));
        buffer.capture(recorded("D1", 1, Some(0), &log));
        buffer.capture(recorded("D2", 2, Some(0), &log));

        let mut bus = EventBus::new();
        bus.register(None, Order::Default, |e| e.set_cancelled(true));
        let report = resolve_with(buffer, &mut bus, false);

        assert_eq!(report.events_fired, 1);
        assert_eq!(report.cancelled, 3);
        assert_eq!(*log.borrow(), vec!["restore D2", "restore D1", "restore B"]);
        assert!(report.outcomes.iter().all(|o| o.state == TxState::Cancelled));
    }

    #[test]
    fn test_restore_failure_is_counted_not_fatal() {
        let log: Log = Rc::default();
        let mut buffer = TransactionBuffer::new();
        buffer.capture(Box::new(Recorded {
            name: "broken",
            x: 0,
            parent_x: None,
            log: Rc::clone(&log),
            fail_restore: true,
        }));
        buffer.capture(recorded("fine", 5, None, &log));

        let mut bus = EventBus::new();
        bus.register(None, Order::Default, |e| e.set_cancelled(true));
        let report = resolve_with(buffer, &mut bus, false);

        assert_eq!(report.events_fired, 2);
        assert_eq!(report.restore_failures, 1);
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn test_batching_groups_adjacent_roots() {
        let log: Log = Rc::default();
        let mut buffer = TransactionBuffer::new();
        for (name, x) in [("a", 0), ("b", 10), ("c", 20)] {
            buffer.capture(recorded(name, x, None, &log));
        }

        let sizes = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        let s = Rc::clone(&sizes);
        bus.register(None, Order::Default, move |e| s.borrow_mut().push(e.entries().len()));

        let report = resolve_with(buffer, &mut bus, true);
        assert_eq!(report.events_fired, 1);
        assert_eq!(*sizes.borrow(), vec![3]);
        assert_eq!(report.committed, 3);
    }

    #[test]
    fn test_open_scope_is_merged_before_resolution() {
        let log: Log = Rc::default();
        let mut buffer = TransactionBuffer::new();
        buffer.capture(recorded("a", 0, None, &log));
        buffer.open_scope();
        let scoped = buffer.capture(recorded("b", 1, None, &log));

        let mut bus = EventBus::new();
        let report = resolve_with(buffer, &mut bus, false);
        assert_eq!(report.merged_open_scopes, 1);
        assert_eq!(report.outcome(scoped).map(|o| o.state), Some(TxState::Committed));
    }

    #[test]
    fn test_discard_fires_nothing() {
        let log: Log = Rc::default();
        let mut buffer = TransactionBuffer::new();
        buffer.capture(recorded("a", 0, None, &log));
        buffer.capture(recorded("b", 1, None, &log));

        let report = buffer.discard();
        assert_eq!(report.discarded, 2);
        assert_eq!(report.events_fired, 0);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_unbatched_cancels_restore_latest_root_first() {
        let log: Log = Rc::default();
        let mut buffer = TransactionBuffer::new();
        buffer.capture(recorded("first", 0, None, &log));
        buffer.capture(recorded("second", 5, None, &log));
        buffer.capture(recorded("third", 9, None, &log));

        let mut bus = EventBus::new();
        bus.register(None, Order::Default, |e| e.set_cancelled(true));
        let report = resolve_with(buffer, &mut bus, false);

        assert_eq!(report.events_cancelled, 3);
        assert_eq!(
            *log.borrow(),
            vec!["restore third", "restore second", "restore first"]
        );
    }

    #[test]
    fn test_continuing_buffer_keeps_numbering() {
        let log: Log = Rc::default();
        let mut first = TransactionBuffer::new();
        first.capture(recorded("a", 0, None, &log));
        first.capture(recorded("b", 1, None, &log));

        let mut second = TransactionBuffer::continuing(&first);
        let next = second.capture(recorded("c", 2, None, &log));
        assert_eq!(next.index(), 2);

        let mut bus = EventBus::new();
        let report = resolve_with(second, &mut bus, false);
        assert_eq!(report.outcomes[0].index, next);
        assert_eq!(report.outcome(next).map(|o| o.state), Some(TxState::Committed));
    }
}
