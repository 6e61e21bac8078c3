//! Straight-line laser propagation through room geometry and entities.
//!
//! This module exists to answer "where does this beam stop and what does it touch" once per tick
//! for every active emitter. It does not decide what a touched cell means; `power` does.

use crate::entity::{Entity, EntityStore};
use crate::types::{Direction, EntityId, Rect, TILE_SIZE, Vec2};

pub const MAX_LASER_DISTANCE: f32 = 2048.0;
/// Sampling stride of the wall march.
pub const LASER_STEP: f32 = 8.0;
pub const MAX_BEAMS_PER_FRAME: usize = 32;

/// Hits closer to the end of the segment than this are treated as touching it, not crossing it.
const END_EPSILON: f32 = 1e-3;

#[derive(Clone, Debug, PartialEq)]
pub struct LaserTrace {
    pub end: Vec2,
    /// Every recorded entity in distance order; a blocker is the last entry.
    pub hits: Vec<EntityId>,
    pub hit_wall: bool,
    pub blocked_by: Option<EntityId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LaserBeam {
    pub source: EntityId,
    pub start: Vec2,
    pub end: Vec2,
    /// No surface reflects, so this stays zero.
    pub bounces: u32,
    pub intensity: f32,
    pub hit_wall: bool,
    pub hits: Vec<EntityId>,
}

impl LaserBeam {
    pub fn length(&self) -> f32 {
        self.start.distance(self.end)
    }
}

/// Point an emitter fires from: its centre pushed out to the face it looks through.
pub fn beam_origin(emitter: &Entity) -> Option<Vec2> {
    let direction = emitter.laser_direction()?;
    let half = if direction.is_horizontal() { emitter.size.x } else { emitter.size.y } / 2.0;
    Some(emitter.center() + direction.vector() * half)
}

/// Casts a ray from `start` and resolves the first wall or blocking entity.
///
/// `is_wall` is sampled every [`LASER_STEP`] pixels. On the first wall sample the march backs
/// off one step and snaps the travel axis onto the tile boundary, never past the wall sample
/// itself. Entities are then tested against the shortened segment: emitters and open doors let
/// the beam through, the first other solid entity truncates it, and non-solid entities are
/// recorded as touched.
pub fn trace_laser<W>(
    start: Vec2,
    direction: Direction,
    entities: &EntityStore,
    is_wall: W,
    ignore: Option<EntityId>,
) -> LaserTrace
where
    W: Fn(Vec2) -> bool,
{
    let heading = direction.vector();
    let mut end = start + heading * MAX_LASER_DISTANCE;
    let mut hit_wall = false;

    let steps = (MAX_LASER_DISTANCE / LASER_STEP) as usize;
    for step in 1..=steps {
        let sample = start + heading * (step as f32 * LASER_STEP);
        if is_wall(sample) {
            let travelled = step as f32 * LASER_STEP;
            let back = start + heading * (travelled - LASER_STEP);
            let snapped = snap_to_tile_boundary(back, direction);
            // Walls off the tile grid must not pull the end past the sample that hit them.
            let reach = start.distance(snapped).min(travelled).min(MAX_LASER_DISTANCE);
            end = start + heading * reach;
            hit_wall = true;
            break;
        }
    }

    let length = start.distance(end);
    let mut candidates: Vec<(f32, EntityId)> = entities
        .iter()
        .filter(|&(id, entity)| Some(id) != ignore && entity.visible && entity.active)
        .filter_map(|(id, entity)| {
            let t = segment_entry(start, end - start, entity.bounds())?;
            let distance = t * length;
            (distance < length - END_EPSILON).then_some((distance, id))
        })
        .collect();
    candidates.sort_by(|left, right| left.0.total_cmp(&right.0));

    let mut hits = Vec::new();
    let mut blocked_by = None;
    for (distance, id) in candidates {
        let Some(entity) = entities.get(id) else {
            continue;
        };
        if entity.is_laser_emitter() || entity.is_open_door() {
            continue;
        }
        hits.push(id);
        if entity.solid {
            end = start + heading * distance;
            hit_wall = false;
            blocked_by = Some(id);
            break;
        }
    }

    LaserTrace { end, hits, hit_wall, blocked_by }
}

fn snap_to_tile_boundary(point: Vec2, direction: Direction) -> Vec2 {
    let snap = |value: f32, forward: bool| {
        let tiles = value / TILE_SIZE;
        (if forward { tiles.ceil() } else { tiles.floor() }) * TILE_SIZE
    };
    match direction {
        Direction::E => Vec2::new(snap(point.x, true), point.y),
        Direction::W => Vec2::new(snap(point.x, false), point.y),
        Direction::S => Vec2::new(point.x, snap(point.y, true)),
        Direction::N => Vec2::new(point.x, snap(point.y, false)),
    }
}

/// Slab test of the segment `start + t * delta, t in [0, 1]` against `rect`. Returns the entry
/// parameter, clamped to zero when the segment starts inside.
fn segment_entry(start: Vec2, delta: Vec2, rect: Rect) -> Option<f32> {
    let mut t_min = 0.0_f32;
    let mut t_max = 1.0_f32;
    let axes = [
        (start.x, delta.x, rect.pos.x, rect.right()),
        (start.y, delta.y, rect.pos.y, rect.bottom()),
    ];
    for (origin, span, low, high) in axes {
        if span.abs() <= f32::EPSILON {
            if origin < low || origin > high {
                return None;
            }
            continue;
        }
        let first = (low - origin) / span;
        let second = (high - origin) / span;
        t_min = t_min.max(first.min(second));
        t_max = t_max.min(first.max(second));
        if t_min > t_max {
            return None;
        }
    }
    Some(t_min)
}

/// Per-tick beam driver with a reused pool.
#[derive(Clone, Debug, Default)]
pub struct LaserSystem {
    pool: Vec<LaserBeam>,
    active: usize,
    over_cap: usize,
}

impl LaserSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Traces every active emitter in store order, at most [`MAX_BEAMS_PER_FRAME`].
    pub fn update<W>(&mut self, entities: &EntityStore, is_wall: W)
    where
        W: Fn(Vec2) -> bool,
    {
        self.active = 0;
        self.over_cap = 0;
        for (id, emitter) in entities.iter() {
            if !emitter.active {
                continue;
            }
            let (Some(direction), Some(start)) = (emitter.laser_direction(), beam_origin(emitter))
            else {
                continue;
            };
            if self.active == MAX_BEAMS_PER_FRAME {
                self.over_cap += 1;
                continue;
            }

            let trace = trace_laser(start, direction, entities, &is_wall, Some(id));
            let beam = LaserBeam {
                source: id,
                start,
                end: trace.end,
                bounces: 0,
                intensity: 1.0,
                hit_wall: trace.hit_wall,
                hits: trace.hits,
            };
            match self.pool.get_mut(self.active) {
                Some(slot) => *slot = beam,
                None => self.pool.push(beam),
            }
            self.active += 1;
        }
        if self.over_cap > 0 {
            log::debug!("beam cap reached, {} emitters skipped this tick", self.over_cap);
        }
    }

    pub fn active_beams(&self) -> &[LaserBeam] {
        &self.pool[..self.active]
    }

    /// Emitters that were active but skipped because of the per-tick cap.
    pub fn skipped_last_update(&self) -> usize {
        self.over_cap
    }

    pub fn clear(&mut self) {
        self.active = 0;
        self.over_cap = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;
    use crate::types::RoomId;

    /// A 12x12-tile box with solid borders.
    fn boxed(point: Vec2) -> bool {
        let limit = 11.0 * TILE_SIZE;
        point.x < TILE_SIZE || point.y < TILE_SIZE || point.x >= limit || point.y >= limit
    }

    fn tile(x: i32, y: i32) -> Vec2 {
        Vec2::new(x as f32 * TILE_SIZE, y as f32 * TILE_SIZE)
    }

    #[test]
    fn eastward_beam_snaps_to_the_wall_face() {
        let store = EntityStore::new();
        let trace = trace_laser(Vec2::new(100.0, 80.0), Direction::E, &store, boxed, None);
        assert!(trace.hit_wall);
        assert_eq!(trace.end, Vec2::new(352.0, 80.0));
        assert!(trace.hits.is_empty());
    }

    #[test]
    fn westward_and_northward_beams_snap_backwards() {
        let store = EntityStore::new();
        let west = trace_laser(Vec2::new(100.0, 80.0), Direction::W, &store, boxed, None);
        assert_eq!(west.end, Vec2::new(32.0, 80.0));
        let north = trace_laser(Vec2::new(100.0, 203.0), Direction::N, &store, boxed, None);
        assert_eq!(north.end, Vec2::new(100.0, 32.0));
    }

    #[test]
    fn beam_without_walls_runs_the_full_distance() {
        let store = EntityStore::new();
        let trace = trace_laser(Vec2::ZERO, Direction::S, &store, |_| false, None);
        assert!(!trace.hit_wall);
        assert_eq!(trace.end, Vec2::new(0.0, MAX_LASER_DISTANCE));
    }

    #[test]
    fn first_solid_entity_truncates_and_later_ones_are_ignored() {
        let mut store = EntityStore::new();
        let far = store.insert(Entity::power_cell(tile(8, 2), RoomId(0)));
        let near = store.insert(Entity::power_cell(tile(5, 2), RoomId(0)));
        let trace = trace_laser(Vec2::new(96.0, 80.0), Direction::E, &store, boxed, None);
        assert_eq!(trace.blocked_by, Some(near));
        assert_eq!(trace.end, Vec2::new(160.0, 80.0));
        assert!(!trace.hit_wall);
        assert!(!trace.hits.contains(&far));
    }

    #[test]
    fn open_doors_and_emitters_let_the_beam_through() {
        let mut store = EntityStore::new();
        let door = store.insert(Entity::door(tile(4, 2), RoomId(0), false, false));
        store.insert(Entity::laser_emitter(tile(6, 2), RoomId(0), Direction::N, true));
        let cell = store.insert(Entity::power_cell(tile(9, 2), RoomId(0)));

        let closed = trace_laser(Vec2::new(96.0, 80.0), Direction::E, &store, boxed, None);
        assert_eq!(closed.blocked_by, Some(door));

        if let Some(entity) = store.get_mut(door) {
            entity.kind = EntityKind::Door { open: true, auto: false, exit: false };
        }
        let open = trace_laser(Vec2::new(96.0, 80.0), Direction::E, &store, boxed, None);
        assert_eq!(open.blocked_by, Some(cell));
        assert_eq!(open.hits, vec![cell]);
        assert!(open.end.x > closed.end.x);
    }

    #[test]
    fn non_solid_entities_are_recorded_without_stopping() {
        let mut store = EntityStore::new();
        let button = store.insert(Entity::button(tile(4, 2), RoomId(0), Vec::new()));
        let trace = trace_laser(Vec2::new(96.0, 80.0), Direction::E, &store, boxed, None);
        assert_eq!(trace.hits, vec![button]);
        assert!(trace.hit_wall);
        assert_eq!(trace.blocked_by, None);
    }

    #[test]
    fn inactive_and_hidden_entities_are_skipped() {
        let mut store = EntityStore::new();
        let cell = store.insert(Entity::power_cell(tile(5, 2), RoomId(0)));
        if let Some(entity) = store.get_mut(cell) {
            entity.visible = false;
        }
        let trace = trace_laser(Vec2::new(96.0, 80.0), Direction::E, &store, boxed, None);
        assert!(trace.hit_wall);
    }

    #[test]
    fn beam_origin_sits_on_the_emitter_face() {
        let emitter = Entity::laser_emitter(tile(2, 2), RoomId(0), Direction::S, true);
        assert_eq!(beam_origin(&emitter), Some(Vec2::new(80.0, 96.0)));
        assert_eq!(beam_origin(&Entity::power_cell(tile(2, 2), RoomId(0))), None);
    }

    #[test]
    fn system_traces_active_emitters_and_respects_the_cap() {
        let mut store = EntityStore::new();
        let dormant = store.insert(Entity::laser_emitter(tile(1, 1), RoomId(0), Direction::E, false));
        for index in 0..(MAX_BEAMS_PER_FRAME + 4) {
            store.insert(Entity::laser_emitter(tile(1, index as i32), RoomId(0), Direction::E, true));
        }
        let mut system = LaserSystem::new();
        system.update(&store, |_| false);
        assert_eq!(system.active_beams().len(), MAX_BEAMS_PER_FRAME);
        assert_eq!(system.skipped_last_update(), 4);
        assert!(system.active_beams().iter().all(|beam| beam.source != dormant));
        assert!(system.active_beams().iter().all(|beam| beam.bounces == 0 && beam.intensity == 1.0));

        system.clear();
        assert!(system.active_beams().is_empty());
    }
}
