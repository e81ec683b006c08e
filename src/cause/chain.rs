//! Immutable cause materialized from the cause stack

use serde::Serialize;

use super::contributor::{ContextKey, ContextValue, Contributor, ContributorKind};

/// Ordered contributors (most recent first) plus named context
///
/// Built from the cause stack at the moment a transaction is finalized.
/// Never empty: the host contributor is always present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cause {
    contributors: Vec<Contributor>,
    context: Vec<(ContextKey, ContextValue)>,
}

impl Cause {
    pub(crate) fn new(contributors: Vec<Contributor>, context: Vec<(ContextKey, ContextValue)>) -> Self {
        debug_assert!(!contributors.is_empty(), "cause built from an empty stack");
        Self { contributors, context }
    }

    /// Cause with only the host contributor
    pub fn host() -> Self {
        Self::new(vec![Contributor::Host], Vec::new())
    }

    /// The most direct contributor
    pub fn root(&self) -> &Contributor {
        &self.contributors[0]
    }

    /// Contributors from most recent to the host
    pub fn contributors(&self) -> &[Contributor] {
        &self.contributors
    }

    pub fn len(&self) -> usize {
        self.contributors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contributors.is_empty()
    }

    pub fn contains(&self, contributor: &Contributor) -> bool {
        self.contributors.contains(contributor)
    }

    /// Most recent contributor of a kind
    pub fn first_of(&self, kind: ContributorKind) -> Option<&Contributor> {
        self.contributors.iter().find(|c| c.kind() == kind)
    }

    /// Every contributor of a kind, most recent first
    pub fn all_of(&self, kind: ContributorKind) -> impl Iterator<Item = &Contributor> {
        self.contributors.iter().filter(move |c| c.kind() == kind)
    }

    pub fn context(&self, key: ContextKey) -> Option<&ContextValue> {
        self.context.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn context_entries(&self) -> &[(ContextKey, ContextValue)] {
        &self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::EntityId;

    #[test]
    fn test_root_is_most_recent() {
        let player = EntityId::new();
        let cause = Cause::new(
            vec![Contributor::Player(player), Contributor::Host],
            vec![(ContextKey::Creator, ContextValue::Entity(player))],
        );

        assert_eq!(cause.root(), &Contributor::Player(player));
        assert_eq!(cause.len(), 2);
        assert_eq!(cause.context(ContextKey::Creator), Some(&ContextValue::Entity(player)));
        assert_eq!(cause.context(ContextKey::Notifier), None);
    }

    #[test]
    fn test_first_of_kind() {
        let a = EntityId::new();
        let b = EntityId::new();
        let cause = Cause::new(
            vec![Contributor::Entity(a), Contributor::Entity(b), Contributor::Host],
            Vec::new(),
        );

        assert_eq!(cause.first_of(ContributorKind::Entity), Some(&Contributor::Entity(a)));
        assert_eq!(cause.all_of(ContributorKind::Entity).count(), 2);
        assert!(cause.first_of(ContributorKind::Player).is_none());
    }
}
