//! Core type definitions used throughout the codebase

use glam::Vec3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Game tick counter (simulation time unit)
pub type Tick = u64;

/// Integer block coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Center of the block in world space
    pub fn center(&self) -> Vec3 {
        Vec3::new(self.x as f32 + 0.5, self.y as f32 + 0.5, self.z as f32 + 0.5)
    }

    pub fn distance_squared(&self, other: &BlockPos) -> i64 {
        let dx = (self.x - other.x) as i64;
        let dy = (self.y - other.y) as i64;
        let dz = (self.z - other.z) as i64;
        dx * dx + dy * dy + dz * dz
    }

    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Block state stored at a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlockState {
    #[default]
    Air,
    Stone,
    Cobblestone,
    Dirt,
    Grass,
    Log,
    Planks,
    Tnt,
    Water,
    Bedrock,
}

impl BlockState {
    pub fn is_air(&self) -> bool {
        matches!(self, BlockState::Air)
    }

    /// Item dropped when this block is broken, if any
    pub fn drop_item(&self) -> Option<ItemKind> {
        match self {
            BlockState::Stone | BlockState::Cobblestone => Some(ItemKind::Cobblestone),
            BlockState::Dirt | BlockState::Grass => Some(ItemKind::Dirt),
            BlockState::Log => Some(ItemKind::Log),
            BlockState::Planks => Some(ItemKind::Planks),
            BlockState::Tnt => Some(ItemKind::Tnt),
            BlockState::Air | BlockState::Water | BlockState::Bedrock => None,
        }
    }

    /// Whether an explosion can destroy this block
    pub fn is_blast_resistant(&self) -> bool {
        matches!(self, BlockState::Bedrock | BlockState::Water | BlockState::Air)
    }
}

/// Item types that can exist as stacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    Cobblestone,
    Dirt,
    Log,
    Planks,
    Tnt,
    Sword,
}

/// A stack of items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: ItemKind,
    pub count: u32,
}

impl ItemStack {
    pub fn new(item: ItemKind, count: u32) -> Self {
        Self { item, count }
    }

    pub fn single(item: ItemKind) -> Self {
        Self::new(item, 1)
    }
}

/// Entity archetypes known to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Player,
    Villager,
    Zombie,
    PrimedTnt,
    /// A dropped item lying in the world
    Item(ItemStack),
}

/// Snapshot of an entity at capture time
///
/// Respawning from a snapshot is a heuristic: anything the host keeps outside
/// these fields (AI state, active effects) is lost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub kind: EntityKind,
    pub position: Vec3,
    pub health: f32,
}

impl EntitySnapshot {
    pub fn new(kind: EntityKind, position: Vec3) -> Self {
        Self {
            id: EntityId::new(),
            kind,
            position,
            health: 20.0,
        }
    }

    /// Item entity dropped at the center of a block
    pub fn item_at(item: ItemStack, pos: BlockPos) -> Self {
        Self::new(EntityKind::Item(item), pos.center())
    }

    /// Block the entity is standing in
    pub fn block_pos(&self) -> BlockPos {
        BlockPos::new(
            self.position.x.floor() as i32,
            self.position.y.floor() as i32,
            self.position.z.floor() as i32,
        )
    }
}
