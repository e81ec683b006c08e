//! LIFO stack of active phase contexts

use super::{Phase, PhaseContext, PhaseId};
use crate::core::error::{Result, TrackerError};

/// Active phase contexts, innermost last
#[derive(Debug)]
pub struct PhaseStack {
    contexts: Vec<PhaseContext>,
    next_id: u64,
    max_depth: usize,
}

impl PhaseStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            contexts: Vec::new(),
            next_id: 1,
            max_depth,
        }
    }

    /// Stack with `base` installed regardless of the depth limit
    pub fn with_base(base: Phase, max_depth: usize) -> Self {
        let mut stack = Self::new(max_depth);
        let id = PhaseId(stack.next_id);
        stack.next_id += 1;
        stack.contexts.push(base.create_context(id));
        stack
    }

    pub fn depth(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Create a context for `phase` and make it the innermost
    pub fn push(&mut self, phase: Phase) -> Result<&mut PhaseContext> {
        if self.contexts.len() >= self.max_depth {
            return Err(TrackerError::PhaseDepthExceeded {
                phase: phase.name(),
                limit: self.max_depth,
            });
        }
        let id = PhaseId(self.next_id);
        self.next_id += 1;
        self.contexts.push(phase.create_context(id));
        let last = self.contexts.len() - 1;
        Ok(&mut self.contexts[last])
    }

    /// Pop the innermost context, which must be `expected`
    ///
    /// Leaves the stack untouched on mismatch.
    pub fn pop(&mut self, expected: PhaseId) -> Result<PhaseContext> {
        let found = self.contexts.last().map(|c| c.id());
        if found != Some(expected) {
            return Err(TrackerError::PhaseOrdering { expected, found });
        }
        self.contexts.pop().ok_or(TrackerError::EmptyStack)
    }

    pub fn current(&self) -> Result<&PhaseContext> {
        self.contexts.last().ok_or(TrackerError::EmptyStack)
    }

    pub fn current_mut(&mut self) -> Result<&mut PhaseContext> {
        self.contexts.last_mut().ok_or(TrackerError::EmptyStack)
    }

    /// Whether a phase with this name is active anywhere on the stack
    pub fn contains(&self, name: &str) -> bool {
        self.contexts.iter().any(|c| c.name() == name)
    }

    /// Names from the base phase up
    pub fn names(&self) -> Vec<&'static str> {
        self.contexts.iter().map(|c| c.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PhaseContext> {
        self.contexts.iter()
    }
}
