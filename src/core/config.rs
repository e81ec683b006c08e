//! Tracker configuration with documented limits
//!
//! Loaded once by the host integration layer before any phase is entered.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::error::{Result, TrackerError};

/// Configuration for the phase/cause tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Maximum number of nested phases, base phase included
    ///
    /// Interception points that re-enter themselves (a block update that
    /// triggers another block update) hit this before the stack grows without
    /// bound. 64 is far beyond any legitimate nesting seen in a tick.
    pub max_phase_depth: usize,

    /// Maximum number of contributors on the cause stack
    pub max_cause_depth: usize,

    /// Panic on invariant violations instead of returning them as errors
    ///
    /// Invariant violations mean an interception point is broken. Continuing
    /// would corrupt causal attribution for the rest of the tick, so this
    /// stays on outside of tests that exercise the error paths.
    pub fail_fast: bool,

    /// Force batching of adjacent block changes regardless of phase policy
    ///
    /// `None` leaves the decision to each phase descriptor.
    pub batch_block_changes: Option<bool>,

    /// Emit a debug summary for every resolved buffer
    pub log_resolutions: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_phase_depth: 64,
            max_cause_depth: 256,
            fail_fast: true,
            batch_block_changes: None,
            log_resolutions: true,
        }
    }
}

impl TrackerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Config that reports invariant violations as errors rather than panicking
    pub fn lenient() -> Self {
        Self {
            fail_fast: false,
            ..Self::default()
        }
    }

    /// Parse a config from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TrackerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        // The base phase always occupies one slot
        if self.max_phase_depth < 2 {
            return Err(TrackerError::Config(format!(
                "max_phase_depth ({}) must leave room above the base phase",
                self.max_phase_depth
            )));
        }

        // The host contributor always occupies one slot
        if self.max_cause_depth < 2 {
            return Err(TrackerError::Config(format!(
                "max_cause_depth ({}) must leave room above the host contributor",
                self.max_cause_depth
            )));
        }

        Ok(())
    }
}
