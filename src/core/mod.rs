pub mod config;
pub mod error;
pub mod types;

pub use config::TrackerConfig;
pub use error::{RestoreError, Result, TrackerError};
pub use types::{
    BlockPos, BlockState, EntityId, EntityKind, EntitySnapshot, ItemKind, ItemStack, Tick,
};
