use thiserror::Error;

use crate::phase::PhaseId;
use crate::transaction::TxIndex;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Phase stack is empty: base phase not installed")]
    EmptyStack,

    #[error("Phase ordering violated: tried to pop {expected:?} but {found:?} is on top")]
    PhaseOrdering {
        expected: PhaseId,
        found: Option<PhaseId>,
    },

    #[error("Unbalanced cause frame pop: frame {popped} is not the innermost (innermost is {innermost:?})")]
    UnbalancedFrame { popped: u64, innermost: Option<u64> },

    #[error("Context added to frame {frame}, which is not the innermost open frame")]
    FrameNotInnermost { frame: u64 },

    #[error("Cyclic absorption: {child:?} cannot be absorbed by {parent:?}")]
    CyclicAbsorption { parent: TxIndex, child: TxIndex },

    #[error("Effect scope ordering violated: {0}")]
    EffectScopeOrdering(String),

    #[error("Phase depth limit exceeded ({limit}) entering {phase}")]
    PhaseDepthExceeded { phase: &'static str, limit: usize },

    #[error("Cause depth limit exceeded ({0})")]
    CauseDepthExceeded(usize),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl TrackerError {
    /// Programming errors in call sites; everything else is a runtime condition
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            TrackerError::EmptyStack
                | TrackerError::PhaseOrdering { .. }
                | TrackerError::UnbalancedFrame { .. }
                | TrackerError::FrameNotInnermost { .. }
                | TrackerError::CyclicAbsorption { .. }
                | TrackerError::EffectScopeOrdering(_)
        )
    }
}

/// Failure to compensate a cancelled mutation. Logged, never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RestoreError {
    #[error("World diverged at {subject}: expected {expected}, found {found}")]
    Diverged {
        subject: String,
        expected: String,
        found: String,
    },

    #[error("Subject no longer exists: {0}")]
    Missing(String),

    #[error("Host rejected restore: {0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
