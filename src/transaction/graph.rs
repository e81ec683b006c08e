//! Buffer-owned transaction arena
//!
//! Parent/child links are indices into the arena, so absorption is an index
//! rewrite. A transaction only ever attaches to one captured before it, which
//! keeps the relation a forest.

use serde::Serialize;

use super::Transaction;
use crate::core::error::{RestoreError, Result, TrackerError};
use crate::host::SimulationHost;

/// Index of a transaction inside its buffer's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TxIndex(pub(crate) usize);

impl TxIndex {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Resolution state of a captured transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TxState {
    Pending,
    /// Event fired and was not cancelled
    Committed,
    /// Event (its own or an ancestor's) was cancelled; restore was attempted
    Cancelled,
    /// No event was generated; the action was a no-op
    Dropped,
    /// Buffer thrown away on abnormal phase exit
    Discarded,
}

#[derive(Debug)]
struct TxNode {
    tx: Box<dyn Transaction>,
    parent: Option<TxIndex>,
    children: Vec<TxIndex>,
    state: TxState,
}

#[derive(Debug, Default)]
pub struct TransactionGraph {
    nodes: Vec<TxNode>,
    /// Index of the first node; non-zero once the owning phase has flushed
    base: usize,
}

impl TransactionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty arena whose first capture gets index `base`
    pub fn starting_at(base: usize) -> Self {
        Self {
            nodes: Vec::new(),
            base,
        }
    }

    /// Index the next capture will get
    pub fn next_index(&self) -> TxIndex {
        TxIndex(self.base + self.nodes.len())
    }

    /// Every index in the arena, in capture order
    pub fn indices(&self) -> impl Iterator<Item = TxIndex> {
        (self.base..self.base + self.nodes.len()).map(TxIndex)
    }

    /// Position of `idx` in the arena
    pub(crate) fn slot(&self, idx: TxIndex) -> usize {
        idx.0 - self.base
    }

    pub fn insert(&mut self, tx: Box<dyn Transaction>) -> TxIndex {
        self.nodes.push(TxNode {
            tx,
            parent: None,
            children: Vec::new(),
            state: TxState::Pending,
        });
        TxIndex(self.base + self.nodes.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, idx: TxIndex) -> &dyn Transaction {
        self.nodes[idx.0 - self.base].tx.as_ref()
    }

    pub fn parent(&self, idx: TxIndex) -> Option<TxIndex> {
        self.nodes[idx.0 - self.base].parent
    }

    pub fn children(&self, idx: TxIndex) -> &[TxIndex] {
        &self.nodes[idx.0 - self.base].children
    }

    pub fn state(&self, idx: TxIndex) -> TxState {
        self.nodes[idx.0 - self.base].state
    }

    pub fn set_state(&mut self, idx: TxIndex, state: TxState) {
        self.nodes[idx.0 - self.base].state = state;
    }

    /// Whether `ancestor` lies on the parent chain of `idx` (or is `idx`)
    pub fn is_ancestor(&self, ancestor: TxIndex, idx: TxIndex) -> bool {
        let mut current = Some(idx);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.nodes[node.0 - self.base].parent;
        }
        false
    }

    /// Fold `child` into `parent`
    pub fn attach(&mut self, parent: TxIndex, child: TxIndex) -> Result<()> {
        if self.nodes[child.0 - self.base].parent.is_some() || self.is_ancestor(child, parent) {
            return Err(TrackerError::CyclicAbsorption { parent, child });
        }
        self.nodes[child.0 - self.base].parent = Some(parent);
        self.nodes[parent.0 - self.base].children.push(child);
        Ok(())
    }

    /// Partition `order` into a forest and return the roots in capture order
    ///
    /// Each candidate is offered to the transactions before it, nearest
    /// first. Unbatchable transactions always become roots.
    pub fn absorb(&mut self, order: &[TxIndex]) -> Result<Vec<TxIndex>> {
        let mut roots = Vec::new();
        for (position, &candidate) in order.iter().enumerate() {
            let tx = self.nodes[candidate.0 - self.base].tx.as_ref();
            if tx.is_unbatchable() {
                roots.push(candidate);
                continue;
            }
            let parent = order[..position]
                .iter()
                .rev()
                .copied()
                .find(|p| tx.accepts_parent(self.nodes[p.0 - self.base].tx.as_ref()));
            match parent {
                Some(parent) => self.attach(parent, candidate)?,
                None => roots.push(candidate),
            }
        }
        Ok(roots)
    }

    /// Descendants of `root`, depth-first in capture order, `root` excluded
    pub fn descendants(&self, root: TxIndex) -> Vec<TxIndex> {
        let mut out = Vec::new();
        let mut stack: Vec<TxIndex> = self.children(root).iter().rev().copied().collect();
        while let Some(idx) = stack.pop() {
            out.push(idx);
            stack.extend(self.children(idx).iter().rev().copied());
        }
        out
    }

    /// `root`'s subtree with children before parents, later siblings first
    pub fn compensation_order(&self, root: TxIndex) -> Vec<TxIndex> {
        let mut out = Vec::new();
        self.push_post_order(root, &mut out);
        out
    }

    fn push_post_order(&self, idx: TxIndex, out: &mut Vec<TxIndex>) {
        for &child in self.children(idx).iter().rev() {
            self.push_post_order(child, out);
        }
        out.push(idx);
    }

    pub fn restore(&mut self, idx: TxIndex, host: &mut dyn SimulationHost) -> std::result::Result<(), RestoreError> {
        self.nodes[idx.0 - self.base].tx.restore(host)
    }

    /// Borrow several transactions at once
    pub fn view(&self, indices: &[TxIndex]) -> Vec<&dyn Transaction> {
        indices.iter().map(|&i| self.get(i)).collect()
    }
}
