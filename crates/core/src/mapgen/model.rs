//! Public data models for generated room graphs.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::catalog::{CollisionMask, RoomTemplate};
use crate::types::{Direction, EntityId, GridPos, Rect, RoomId, TILE_SIZE, TilePos, Vec2};

use super::progression::{GridBounds, LevelConstraints};

#[derive(Clone, Debug, PartialEq)]
pub struct RoomInstance {
    pub id: RoomId,
    pub template: RoomTemplate,
    /// Per-instance copy of the template mask; doorways and decoration edit this one.
    pub collision: CollisionMask,
    pub grid: GridPos,
    pub world: Vec2,
    pub entities: Vec<EntityId>,
    pub is_start: bool,
    pub is_exit: bool,
}

impl RoomInstance {
    pub(crate) fn new(id: RoomId, template: &RoomTemplate, grid: GridPos, world: Vec2) -> Self {
        Self {
            id,
            collision: template.collision.clone(),
            template: template.clone(),
            grid,
            world,
            entities: Vec::new(),
            is_start: false,
            is_exit: false,
        }
    }

    pub fn width_px(&self) -> f32 {
        self.template.width as f32 * TILE_SIZE
    }

    pub fn height_px(&self) -> f32 {
        self.template.height as f32 * TILE_SIZE
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.world, Vec2::new(self.width_px(), self.height_px()))
    }

    pub fn contains_point(&self, point: Vec2) -> bool {
        self.bounds().contains(point)
    }

    /// World position of the top-left corner of local tile `pos`.
    pub fn tile_to_world(&self, pos: TilePos) -> Vec2 {
        Vec2::new(self.world.x + pos.x as f32 * TILE_SIZE, self.world.y + pos.y as f32 * TILE_SIZE)
    }

    pub fn world_to_tile(&self, point: Vec2) -> Option<TilePos> {
        if !self.contains_point(point) {
            return None;
        }
        let local = point - self.world;
        Some(TilePos::new((local.x / TILE_SIZE).floor() as i32, (local.y / TILE_SIZE).floor() as i32))
    }

    /// `None` when the point lies outside this room.
    pub fn is_wall_at(&self, point: Vec2) -> Option<bool> {
        self.world_to_tile(point).map(|tile| self.collision.is_wall(tile))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct WorldGraph {
    pub(crate) rooms: Vec<RoomInstance>,
    pub(crate) index: BTreeMap<GridPos, RoomId>,
    pub(crate) start: RoomId,
    pub(crate) exit: Option<RoomId>,
    pub(crate) bounds: GridBounds,
    pub(crate) constraints: LevelConstraints,
    pub(crate) level: u32,
    pub(crate) seed: u64,
}

impl WorldGraph {
    pub fn rooms(&self) -> &[RoomInstance] {
        &self.rooms
    }

    pub(crate) fn rooms_mut(&mut self) -> &mut [RoomInstance] {
        &mut self.rooms
    }

    /// `None` for ids from another graph.
    pub fn room(&self, id: RoomId) -> Option<&RoomInstance> {
        self.rooms.get(id.0)
    }

    pub fn room_mut(&mut self, id: RoomId) -> Option<&mut RoomInstance> {
        self.rooms.get_mut(id.0)
    }

    pub fn room_at(&self, grid: GridPos) -> Option<&RoomInstance> {
        self.index.get(&grid).and_then(|&id| self.room(id))
    }

    /// Generation always places the start room first, so every built graph has one.
    pub fn start_room(&self) -> &RoomInstance {
        &self.rooms[self.start.0]
    }

    pub fn exit_room(&self) -> Option<&RoomInstance> {
        self.exit.and_then(|id| self.room(id))
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn bounds(&self) -> GridBounds {
        self.bounds
    }

    pub fn constraints(&self) -> LevelConstraints {
        self.constraints
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Placed grid neighbours of `id` in N, E, S, W order.
    pub fn neighbours(&self, id: RoomId) -> Vec<(Direction, RoomId)> {
        let Some(grid) = self.room(id).map(|room| room.grid) else {
            return Vec::new();
        };
        Direction::ALL
            .into_iter()
            .filter_map(|direction| {
                self.index.get(&grid.step(direction)).map(|&neighbour| (direction, neighbour))
            })
            .collect()
    }

    /// First room in placement order whose bounds contain `point`.
    pub fn room_containing(&self, point: Vec2) -> Option<&RoomInstance> {
        self.rooms.iter().find(|room| room.contains_point(point))
    }

    /// Wall lookup across every room. Points outside all rooms are solid.
    pub fn is_wall_at(&self, point: Vec2) -> bool {
        let mut inside_any = false;
        for room in &self.rooms {
            match room.is_wall_at(point) {
                Some(true) => return true,
                Some(false) => inside_any = true,
                None => {}
            }
        }
        !inside_any
    }

    pub fn is_connected(&self) -> bool {
        let Some(start) = self.rooms.get(self.start.0) else {
            return self.rooms.is_empty();
        };
        let mut open = VecDeque::from([start.grid]);
        let mut seen = BTreeSet::from([start.grid]);
        while let Some(grid) = open.pop_front() {
            for direction in Direction::ALL {
                let next = grid.step(direction);
                if self.index.contains_key(&next) && seen.insert(next) {
                    open.push_back(next);
                }
            }
        }
        seen.len() == self.rooms.len()
    }

    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend(self.level.to_le_bytes());
        bytes.extend(self.seed.to_le_bytes());
        bytes.extend((self.rooms.len() as u32).to_le_bytes());
        for room in &self.rooms {
            bytes.extend(room.grid.x.to_le_bytes());
            bytes.extend(room.grid.y.to_le_bytes());
            bytes.extend(room.world.x.to_bits().to_le_bytes());
            bytes.extend(room.world.y.to_bits().to_le_bytes());
            bytes.extend((room.template.id.len() as u32).to_le_bytes());
            bytes.extend(room.template.id.as_bytes());
            bytes.push(u8::from(room.is_start));
            bytes.push(u8::from(room.is_exit));
        }
        bytes
    }

    pub(crate) fn shift_world(&mut self, offset: Vec2) {
        for room in &mut self.rooms {
            room.world = room.world + offset;
        }
    }
}
