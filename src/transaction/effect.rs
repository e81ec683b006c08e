//! Effect scopes - nested capture regions inside a buffer
//!
//! Transactions captured while a scope is open are held aside. Closing the
//! scope splices them into the enclosing region at the position the scope
//! was opened, so nested effects keep their causal position even when the
//! enclosing region captured more transactions in the meantime.

use crate::core::error::{Result, TrackerError};
use crate::phase::PhaseId;

use super::graph::TxIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectScopeId(pub(crate) u64);

/// Handle for a scope opened with the token API
#[must_use = "an open effect scope must be closed"]
#[derive(Debug, PartialEq, Eq)]
pub struct ScopeToken {
    pub(crate) phase: PhaseId,
    pub(crate) scope: EffectScopeId,
}

impl ScopeToken {
    pub fn phase(&self) -> PhaseId {
        self.phase
    }

    pub fn scope(&self) -> EffectScopeId {
        self.scope
    }
}

#[derive(Debug)]
struct OpenScope {
    id: EffectScopeId,
    /// Length of the enclosing region when this scope opened
    insert_at: usize,
    captured: Vec<TxIndex>,
}

/// Stack of open scopes over one buffer's root order
#[derive(Debug, Default)]
pub struct EffectScopes {
    open: Vec<OpenScope>,
    next_id: u64,
}

impl EffectScopes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.open.len()
    }

    pub fn innermost(&self) -> Option<EffectScopeId> {
        self.open.last().map(|s| s.id)
    }

    pub fn open(&mut self, root: &[TxIndex]) -> EffectScopeId {
        self.next_id += 1;
        let id = EffectScopeId(self.next_id);
        let insert_at = self.open.last().map_or(root.len(), |s| s.captured.len());
        self.open.push(OpenScope {
            id,
            insert_at,
            captured: Vec::new(),
        });
        id
    }

    /// Route a capture into the innermost scope
    ///
    /// Returns false when no scope is open and the caller owns the capture.
    pub fn record(&mut self, idx: TxIndex) -> bool {
        match self.open.last_mut() {
            Some(scope) => {
                scope.captured.push(idx);
                true
            }
            None => false,
        }
    }

    /// Close the innermost scope, merging into the enclosing region
    ///
    /// Returns how many transactions were merged.
    pub fn close(&mut self, id: EffectScopeId, root: &mut Vec<TxIndex>) -> Result<usize> {
        match self.open.last() {
            Some(scope) if scope.id == id => {}
            Some(scope) => {
                return Err(TrackerError::EffectScopeOrdering(format!(
                    "closing scope {:?} while {:?} is innermost",
                    id, scope.id
                )))
            }
            None => {
                return Err(TrackerError::EffectScopeOrdering(format!(
                    "closing scope {:?} with no scope open",
                    id
                )))
            }
        }

        let Some(scope) = self.open.pop() else {
            return Ok(0);
        };
        let target = match self.open.last_mut() {
            Some(parent) => &mut parent.captured,
            None => root,
        };
        let at = scope.insert_at.min(target.len());
        let merged = scope.captured.len();
        target.splice(at..at, scope.captured);
        Ok(merged)
    }

    /// Close every open scope innermost-first; returns how many were open
    pub fn close_all(&mut self, root: &mut Vec<TxIndex>) -> usize {
        let mut closed = 0;
        while let Some(id) = self.innermost() {
            match self.close(id, root) {
                Ok(_) => closed += 1,
                Err(_) => break,
            }
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(i: usize) -> TxIndex {
        TxIndex(i)
    }

    #[test]
    fn test_capture_without_scope_is_not_taken() {
        let mut scopes = EffectScopes::new();
        assert!(!scopes.record(tx(0)));
    }

    #[test]
    fn test_merge_at_open_position() {
        let mut scopes = EffectScopes::new();
        let mut root = vec![tx(0)];

        let id = scopes.open(&root);
        assert!(scopes.record(tx(1)));
        assert!(scopes.record(tx(2)));
        // Captured straight into the root while the scope is open
        root.push(tx(3));

        assert_eq!(scopes.close(id, &mut root).unwrap(), 2);
        assert_eq!(root, vec![tx(0), tx(1), tx(2), tx(3)]);
    }

    #[test]
    fn test_nested_scopes_merge_into_parent_scope() {
        let mut scopes = EffectScopes::new();
        let mut root = Vec::new();

        let outer = scopes.open(&root);
        scopes.record(tx(0));
        let inner = scopes.open(&root);
        scopes.record(tx(1));
        scopes.close(inner, &mut root).unwrap();
        assert!(root.is_empty());
        scopes.record(tx(2));
        scopes.close(outer, &mut root).unwrap();

        assert_eq!(root, vec![tx(0), tx(1), tx(2)]);
    }

    #[test]
    fn test_out_of_order_close_rejected() {
        let mut scopes = EffectScopes::new();
        let mut root = Vec::new();
        let outer = scopes.open(&root);
        let _inner = scopes.open(&root);

        assert!(matches!(
            scopes.close(outer, &mut root),
            Err(TrackerError::EffectScopeOrdering(_))
        ));
        assert_eq!(scopes.depth(), 2);
    }

    #[test]
    fn test_close_all() {
        let mut scopes = EffectScopes::new();
        let mut root = vec![tx(0)];
        scopes.open(&root);
        scopes.record(tx(1));
        scopes.open(&root);
        scopes.record(tx(2));

        assert_eq!(scopes.close_all(&mut root), 2);
        assert_eq!(root, vec![tx(0), tx(1), tx(2)]);
        assert_eq!(scopes.depth(), 0);
    }
}
