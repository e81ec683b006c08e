//! Cause attribution - who or what is behind a mutation

pub mod chain;
pub mod contributor;
pub mod stack;

pub use chain::Cause;
pub use contributor::{
    ContextKey, ContextValue, Contributor, ContributorKind, DamageSource, SpawnType,
};
pub use stack::{CauseFrame, CauseStack, StackFrame};
