//! Phase Tracker - causal attribution and rollback for in-tick simulation mutations
//!
//! Interception sites enter a phase, push whoever is responsible onto the
//! cause stack and capture every mutation they perform as a transaction. When
//! the phase exits, the captured transactions are folded into one event per
//! logical action and handed to listeners, which may cancel them; cancelled
//! mutations are compensated in reverse.

pub mod cause;
pub mod core;
pub mod event;
pub mod host;
pub mod phase;
pub mod sites;
pub mod tracker;
pub mod transaction;

pub use crate::cause::{Cause, Contributor};
pub use crate::core::{Result, TrackerConfig, TrackerError};
pub use crate::event::{Event, EventBus, EventType, Order};
pub use crate::host::{SimWorld, SimulationHost};
pub use crate::phase::{Phase, UnwindPolicy};
pub use crate::sites::MutationSite;
pub use crate::tracker::CauseTracker;
