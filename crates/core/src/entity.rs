//! Runtime entities and the arena that owns them.
//!
//! This module exists to keep every placed object in one `SlotMap` with deferred removal and a
//! solid-object index rebuilt wholesale after structural changes. It does not own placement or
//! per-tick behaviour; `populate`, `laser`, `power`, and `level` drive those.

use std::collections::BTreeMap;

use slotmap::SlotMap;

use crate::types::{Direction, EntityId, Rect, RoomId, TILE_SIZE, Vec2};

/// Edge length of the player's square hitbox.
pub const PLAYER_SIZE: f32 = 24.0;

/// Connectivity shape of a wall tile, derived from its four neighbours. Presentation only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WallShape {
    Pillar,
    Endcap,
    Straight,
    Corner,
    JunctionT,
    JunctionCross,
}

impl WallShape {
    /// `mask` uses `Direction::bit` for every neighbouring wall.
    pub fn from_neighbour_mask(mask: u8) -> Self {
        let north_south = Direction::N.bit() | Direction::S.bit();
        let east_west = Direction::E.bit() | Direction::W.bit();
        match mask.count_ones() {
            0 => WallShape::Pillar,
            1 => WallShape::Endcap,
            2 if mask == north_south || mask == east_west => WallShape::Straight,
            2 => WallShape::Corner,
            3 => WallShape::JunctionT,
            _ => WallShape::JunctionCross,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum EntityKind {
    Wall { shape: WallShape, edge: bool },
    Door { open: bool, auto: bool, exit: bool },
    LaserEmitter { direction: Direction },
    Button { targets: Vec<String>, pressed: bool },
    PowerCell { is_powered: bool, powering: Vec<EntityId> },
    Player,
}

impl EntityKind {
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Wall { .. } => "wall",
            EntityKind::Door { .. } => "door",
            EntityKind::LaserEmitter { .. } => "laser_emitter",
            EntityKind::Button { .. } => "button",
            EntityKind::PowerCell { .. } => "power_cell",
            EntityKind::Player => "player",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    pub kind: EntityKind,
    /// Top-left corner in world pixels.
    pub pos: Vec2,
    pub size: Vec2,
    pub solid: bool,
    pub active: bool,
    pub visible: bool,
    pub destroyed: bool,
    pub should_remove: bool,
    /// Walls and doors are only removed when this is set.
    pub removable: bool,
    pub room: RoomId,
    pub tag: Option<String>,
}

impl Entity {
    fn base(kind: EntityKind, pos: Vec2, size: Vec2, solid: bool, room: RoomId) -> Self {
        Self {
            kind,
            pos,
            size,
            solid,
            active: true,
            visible: true,
            destroyed: false,
            should_remove: false,
            removable: false,
            room,
            tag: None,
        }
    }

    fn tile(kind: EntityKind, pos: Vec2, solid: bool, room: RoomId) -> Self {
        Self::base(kind, pos, Vec2::new(TILE_SIZE, TILE_SIZE), solid, room)
    }

    pub fn wall(pos: Vec2, room: RoomId, shape: WallShape, edge: bool) -> Self {
        Self::tile(EntityKind::Wall { shape, edge }, pos, true, room)
    }

    pub fn door(pos: Vec2, room: RoomId, auto: bool, exit: bool) -> Self {
        Self::tile(EntityKind::Door { open: false, auto, exit }, pos, true, room)
    }

    pub fn laser_emitter(pos: Vec2, room: RoomId, direction: Direction, active: bool) -> Self {
        let mut entity = Self::tile(EntityKind::LaserEmitter { direction }, pos, true, room);
        entity.active = active;
        entity
    }

    pub fn button(pos: Vec2, room: RoomId, targets: Vec<String>) -> Self {
        Self::tile(EntityKind::Button { targets, pressed: false }, pos, false, room)
    }

    pub fn power_cell(pos: Vec2, room: RoomId) -> Self {
        Self::tile(EntityKind::PowerCell { is_powered: false, powering: Vec::new() }, pos, true, room)
    }

    /// `tile_origin` is the top-left of the spawn tile; the hitbox is centred inside it.
    pub fn player(tile_origin: Vec2, room: RoomId) -> Self {
        let inset = (TILE_SIZE - PLAYER_SIZE) / 2.0;
        let pos = tile_origin + Vec2::new(inset, inset);
        Self::base(EntityKind::Player, pos, Vec2::new(PLAYER_SIZE, PLAYER_SIZE), false, room)
    }

    pub fn with_tag(mut self, tag: Option<String>) -> Self {
        self.tag = tag;
        self
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.pos, self.size)
    }

    pub fn center(&self) -> Vec2 {
        self.bounds().center()
    }

    /// Half the diagonal of the bounding box.
    pub fn bounding_radius(&self) -> f32 {
        self.size.length() / 2.0
    }

    pub fn is_open_door(&self) -> bool {
        matches!(self.kind, EntityKind::Door { open: true, .. })
    }

    pub fn is_laser_emitter(&self) -> bool {
        matches!(self.kind, EntityKind::LaserEmitter { .. })
    }

    pub fn is_power_cell(&self) -> bool {
        matches!(self.kind, EntityKind::PowerCell { .. })
    }

    pub fn is_player(&self) -> bool {
        matches!(self.kind, EntityKind::Player)
    }

    pub fn laser_direction(&self) -> Option<Direction> {
        match self.kind {
            EntityKind::LaserEmitter { direction } => Some(direction),
            _ => None,
        }
    }

    pub fn is_powered(&self) -> bool {
        matches!(self.kind, EntityKind::PowerCell { is_powered: true, .. })
    }

    /// Whether lasers and movement treat this entity as an obstacle right now.
    pub fn blocks(&self) -> bool {
        self.solid && self.active && !self.is_open_door()
    }

    fn is_swept(&self) -> bool {
        self.destroyed && !self.active && self.should_remove
    }
}

/// Lets buttons resolve their targets without holding references to other entities.
pub trait RoomLookup {
    fn entities_in_room(&self, room: RoomId) -> &[EntityId];
    fn find_tagged(&self, tag: &str) -> Option<EntityId>;
}

#[derive(Clone, Debug, Default)]
pub struct EntityStore {
    entities: SlotMap<EntityId, Entity>,
    solid: Vec<EntityId>,
    by_room: BTreeMap<RoomId, Vec<EntityId>>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts without rebuilding indices; call [`EntityStore::rebuild_indices`] once a batch
    /// of structural changes is done.
    pub fn insert(&mut self, mut entity: Entity) -> EntityId {
        entity.pos = clamp_position(entity.pos, entity.kind.name());
        self.entities.insert(entity)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities.iter()
    }

    pub fn ids_where<P>(&self, predicate: P) -> Vec<EntityId>
    where
        P: Fn(&Entity) -> bool,
    {
        self.entities.iter().filter(|&(_, entity)| predicate(entity)).map(|(id, _)| id).collect()
    }

    pub fn player(&self) -> Option<EntityId> {
        self.entities.iter().find(|(_, entity)| entity.is_player()).map(|(id, _)| id)
    }

    pub fn laser_emitters(&self) -> Vec<EntityId> {
        self.ids_where(Entity::is_laser_emitter)
    }

    pub fn power_cells(&self) -> Vec<EntityId> {
        self.ids_where(Entity::is_power_cell)
    }

    pub fn solid_ids(&self) -> &[EntityId] {
        &self.solid
    }

    pub fn set_position(&mut self, id: EntityId, pos: Vec2) {
        if let Some(entity) = self.entities.get_mut(id) {
            entity.pos = clamp_position(pos, entity.kind.name());
        }
    }

    /// Flags an entity for the next [`EntityStore::cleanup`]. Players are never removed and
    /// walls or doors only when marked `removable`.
    pub fn request_removal(&mut self, id: EntityId) -> bool {
        let Some(entity) = self.entities.get_mut(id) else {
            return false;
        };
        let protected = match entity.kind {
            EntityKind::Player => true,
            EntityKind::Wall { .. } | EntityKind::Door { .. } => !entity.removable,
            _ => false,
        };
        if protected {
            log::debug!("refusing to remove protected {}", entity.kind.name());
            return false;
        }
        entity.destroyed = true;
        entity.active = false;
        entity.should_remove = true;
        true
    }

    /// Sweeps flagged entities and rebuilds every index. Returns how many were removed.
    pub fn cleanup(&mut self) -> usize {
        let before = self.entities.len();
        self.entities.retain(|_, entity| !entity.is_swept());
        self.rebuild_indices();
        before - self.entities.len()
    }

    pub fn rebuild_indices(&mut self) {
        self.solid.clear();
        self.by_room.clear();
        for (id, entity) in &self.entities {
            if entity.blocks() {
                self.solid.push(id);
            }
            self.by_room.entry(entity.room).or_default().push(id);
        }
    }

    /// Drops every entity. Keys restart from scratch so a regenerated level hands out the same ids.
    pub fn clear(&mut self) {
        self.entities = SlotMap::with_key();
        self.solid.clear();
        self.by_room.clear();
    }

    /// Ids a button acts on: its authored targets, or every emitter in its room.
    pub fn button_targets(&self, button: EntityId) -> Vec<EntityId> {
        let Some(entity) = self.entities.get(button) else {
            return Vec::new();
        };
        let EntityKind::Button { targets, .. } = &entity.kind else {
            return Vec::new();
        };
        if targets.is_empty() {
            return self
                .entities_in_room(entity.room)
                .iter()
                .copied()
                .filter(|&id| self.entities.get(id).is_some_and(Entity::is_laser_emitter))
                .collect();
        }
        targets
            .iter()
            .filter_map(|tag| {
                let found = self.find_tagged(tag);
                if found.is_none() {
                    log::warn!("button target `{tag}` does not exist");
                }
                found
            })
            .collect()
    }
}

impl RoomLookup for EntityStore {
    fn entities_in_room(&self, room: RoomId) -> &[EntityId] {
        self.by_room.get(&room).map(Vec::as_slice).unwrap_or(&[])
    }

    fn find_tagged(&self, tag: &str) -> Option<EntityId> {
        self.entities.iter().find(|(_, entity)| entity.tag.as_deref() == Some(tag)).map(|(id, _)| id)
    }
}

fn clamp_position(pos: Vec2, what: &str) -> Vec2 {
    if pos.x >= 0.0 && pos.y >= 0.0 {
        return pos;
    }
    log::warn!("{what} at ({}, {}) has a negative coordinate, clamping to zero", pos.x, pos.y);
    Vec2::new(pos.x.max(0.0), pos.y.max(0.0))
}
