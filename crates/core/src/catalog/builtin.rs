//! Hardcoded room templates shipped with the crate.

use std::collections::BTreeMap;

use super::mask::CollisionMask;
use super::template::{Prefab, PrefabKind, RoomTemplate};
use crate::types::{Direction, TilePos};

pub const ROOM_WIDTH: usize = 11;
pub const ROOM_HEIGHT: usize = 9;

pub mod keys {
    pub const START_HALL: &str = "start_hall";
    pub const FALLBACK_START: &str = "fallback_start";
    pub const FALLBACK_EXIT: &str = "fallback_exit";
}

pub(super) fn default_templates() -> Vec<RoomTemplate> {
    let mut templates = vec![start_hall()];
    for mask in 1_u8..16 {
        let exits = exits_from_mask(mask);
        let suffix = exit_suffix(&exits);
        templates.push(plain_room(&format!("hall_{suffix}"), "Hall", &exits));
        templates.push(switch_lab(&format!("lab_{suffix}"), &exits));
        templates.push(turret_room(&format!("turret_{suffix}"), &exits));
    }
    templates
}

/// Minimal start/exit pair used when nothing else loads.
pub(crate) fn fallback_pair() -> [RoomTemplate; 2] {
    let mut start = plain_room(keys::FALLBACK_START, "Fallback Start", &[Direction::E]);
    start.is_start = true;
    start.prefabs.push(Prefab::new(PrefabKind::Player, TilePos::new(2, 4)));

    let mut exit = plain_room(keys::FALLBACK_EXIT, "Fallback Exit", &[Direction::W]);
    exit.is_exit = true;

    [start, exit]
}

fn start_hall() -> RoomTemplate {
    let mut template = plain_room(keys::START_HALL, "Entrance Hall", &Direction::ALL);
    template.is_start = true;
    template.prefabs.push(Prefab::new(PrefabKind::Player, TilePos::new(5, 4)));
    template
}

/// A dormant emitter wired to a floor button; the cell sits across the room.
fn switch_lab(id: &str, exits: &[Direction]) -> RoomTemplate {
    let mut template = plain_room(id, "Switch Lab", exits);
    template.prefabs.extend([
        Prefab::new(PrefabKind::LaserEmitter, TilePos::new(2, 2))
            .with_dir(Direction::E)
            .with_id(format!("{id}_laser"))
            .with_active(false),
        Prefab::new(PrefabKind::PowerCell, TilePos::new(8, 2)).with_id(format!("{id}_cell")),
        Prefab::new(PrefabKind::Button, TilePos::new(2, 6)).with_id(format!("{id}_button")),
    ]);
    template
}

/// An active emitter facing the near wall; two clockwise turns line it up with the cell.
fn turret_room(id: &str, exits: &[Direction]) -> RoomTemplate {
    let mut template = plain_room(id, "Turret Room", exits);
    template.prefabs.extend([
        Prefab::new(PrefabKind::LaserEmitter, TilePos::new(2, 6))
            .with_dir(Direction::W)
            .with_id(format!("{id}_laser")),
        Prefab::new(PrefabKind::PowerCell, TilePos::new(8, 6)).with_id(format!("{id}_cell")),
    ]);
    template
}

fn plain_room(id: &str, name: &str, exits: &[Direction]) -> RoomTemplate {
    let mut collision = CollisionMask::new(ROOM_WIDTH, ROOM_HEIGHT);
    let perimeter: Vec<TilePos> = collision.perimeter_positions().collect();
    for pos in perimeter {
        collision.set_wall(pos, true);
    }

    let mut exit_tiles = BTreeMap::new();
    for &direction in exits {
        let pos = exit_tile(direction);
        collision.set_wall(pos, false);
        exit_tiles.insert(direction, pos);
    }

    RoomTemplate {
        id: id.to_string(),
        name: name.to_string(),
        width: ROOM_WIDTH,
        height: ROOM_HEIGHT,
        is_start: false,
        is_exit: false,
        collision,
        exits: exit_tiles,
        prefabs: Vec::new(),
    }
}

fn exit_tile(direction: Direction) -> TilePos {
    let mid_x = (ROOM_WIDTH / 2) as i32;
    let mid_y = (ROOM_HEIGHT / 2) as i32;
    match direction {
        Direction::N => TilePos::new(mid_x, 0),
        Direction::E => TilePos::new(ROOM_WIDTH as i32 - 1, mid_y),
        Direction::S => TilePos::new(mid_x, ROOM_HEIGHT as i32 - 1),
        Direction::W => TilePos::new(0, mid_y),
    }
}

fn exits_from_mask(mask: u8) -> Vec<Direction> {
    Direction::ALL.into_iter().filter(|direction| mask & direction.bit() != 0).collect()
}

fn exit_suffix(exits: &[Direction]) -> String {
    exits
        .iter()
        .map(|direction| match direction {
            Direction::N => 'n',
            Direction::E => 'e',
            Direction::S => 's',
            Direction::W => 'w',
        })
        .collect()
}
