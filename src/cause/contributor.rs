//! Cause participants and named context values

use serde::{Deserialize, Serialize};

use crate::core::types::{BlockPos, BlockState, EntityId, ItemStack};

/// Anything that can take part in a cause
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Contributor {
    /// The simulation itself; always at the bottom of the cause stack
    Host,
    Plugin(String),
    Entity(EntityId),
    Player(EntityId),
    Block(BlockPos, BlockState),
    Item(ItemStack),
    /// The phase that scoped the work
    Phase(&'static str),
    Custom(String),
}

impl Contributor {
    pub fn kind(&self) -> ContributorKind {
        match self {
            Contributor::Host => ContributorKind::Host,
            Contributor::Plugin(_) => ContributorKind::Plugin,
            Contributor::Entity(_) => ContributorKind::Entity,
            Contributor::Player(_) => ContributorKind::Player,
            Contributor::Block(..) => ContributorKind::Block,
            Contributor::Item(_) => ContributorKind::Item,
            Contributor::Phase(_) => ContributorKind::Phase,
            Contributor::Custom(_) => ContributorKind::Custom,
        }
    }

    /// Entity behind this contributor, players included
    pub fn entity_id(&self) -> Option<EntityId> {
        match self {
            Contributor::Entity(id) | Contributor::Player(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContributorKind {
    Host,
    Plugin,
    Entity,
    Player,
    Block,
    Item,
    Phase,
    Custom,
}

/// Keys for named context values attached to a cause frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ContextKey {
    /// Entity that created the subject (e.g. whoever placed the TNT)
    Creator,
    /// Entity that triggered a neighbour notification
    Notifier,
    LastDamageSource,
    SpawnType,
    BlockHit,
    PluginName,
    Custom(&'static str),
}

/// How an entity came into the world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpawnType {
    BlockBreak,
    Explosion,
    DropItem,
    Natural,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DamageSource {
    Explosion { origin: BlockPos },
    Entity(EntityId),
    Fall,
    Generic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContextValue {
    Entity(EntityId),
    Block(BlockPos),
    Item(ItemStack),
    SpawnType(SpawnType),
    DamageSource(DamageSource),
    Text(String),
}
