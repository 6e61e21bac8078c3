//! Load-time repair of authoring defects in room templates.
//! This module exists so generation and simulation can assume every template is playable.
//! It does not own parsing or catalog selection.

use std::collections::BTreeSet;

use super::template::{Prefab, PrefabKind, RoomTemplate};
use crate::types::{Direction, TilePos};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub dropped_in_walls: usize,
    pub synthesized_cells: usize,
    pub synthesized_lasers: usize,
    pub realigned_cells: usize,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

pub(crate) fn repair_template(template: &mut RoomTemplate) -> RepairReport {
    let mut report = RepairReport::default();
    remove_wall_spawns(template, &mut report);
    orient_unaimed_lasers(template);
    balance_lasers_and_cells(template, &mut report);
    align_cells_to_lasers(template, &mut report);
    report
}

fn remove_wall_spawns(template: &mut RoomTemplate, report: &mut RepairReport) {
    let collision = &template.collision;
    let id = &template.id;
    template.prefabs.retain(|prefab| {
        if !collision.in_bounds(prefab.pos) {
            log::warn!(
                "template `{id}`: dropping {:?} at {:?}, position is outside the room",
                prefab.kind,
                prefab.pos
            );
            report.dropped_in_walls += 1;
            return false;
        }
        if collision.is_wall(prefab.pos) {
            log::warn!(
                "template `{id}`: dropping {:?} at {:?}, position is inside a wall",
                prefab.kind,
                prefab.pos
            );
            report.dropped_in_walls += 1;
            return false;
        }
        true
    });
}

fn orient_unaimed_lasers(template: &mut RoomTemplate) {
    let center = template.center();
    for prefab in &mut template.prefabs {
        if prefab.kind == PrefabKind::LaserEmitter && prefab.dir.is_none() {
            prefab.dir = Some(facing_toward(prefab.pos, center));
        }
    }
}

fn balance_lasers_and_cells(template: &mut RoomTemplate, report: &mut RepairReport) {
    let laser_count = template.count_prefabs(PrefabKind::LaserEmitter);
    let cell_count = template.count_prefabs(PrefabKind::PowerCell);
    if laser_count == cell_count {
        return;
    }
    log::warn!(
        "template `{}` has {laser_count} laser emitters but {cell_count} power cells, synthesizing",
        template.id
    );

    if laser_count > cell_count {
        let unmatched: Vec<Prefab> = prefabs_of(template, PrefabKind::LaserEmitter)
            .into_iter()
            .skip(cell_count)
            .cloned()
            .collect();
        for laser in unmatched {
            let Some(pos) = place_cell_for_laser(template, &laser) else {
                log::warn!("template `{}` has no safe cell left for a power cell", template.id);
                return;
            };
            let index = template.count_prefabs(PrefabKind::PowerCell);
            template.prefabs.push(
                Prefab::new(PrefabKind::PowerCell, pos)
                    .with_id(format!("{}_auto_cell_{index}", template.id)),
            );
            report.synthesized_cells += 1;
        }
    } else {
        let unmatched: Vec<Prefab> = prefabs_of(template, PrefabKind::PowerCell)
            .into_iter()
            .skip(laser_count)
            .cloned()
            .collect();
        for cell in unmatched {
            let Some((pos, dir)) = place_laser_for_cell(template, &cell) else {
                log::warn!("template `{}` has no safe cell left for a laser emitter", template.id);
                return;
            };
            let index = template.count_prefabs(PrefabKind::LaserEmitter);
            template.prefabs.push(
                Prefab::new(PrefabKind::LaserEmitter, pos)
                    .with_dir(dir)
                    .with_id(format!("{}_auto_laser_{index}", template.id)),
            );
            report.synthesized_lasers += 1;
        }
    }
}

fn place_cell_for_laser(template: &RoomTemplate, laser: &Prefab) -> Option<TilePos> {
    let occupied = occupied_cells(template);
    let direction = laser.dir.unwrap_or(Direction::E);
    let lane = beam_lane(template, laser.pos, direction, &occupied);
    lane.into_iter()
        .rev()
        .find(|&pos| is_safe(template, pos, &occupied))
        .or_else(|| safe_cells(template).into_iter().next())
}

fn place_laser_for_cell(template: &RoomTemplate, cell: &Prefab) -> Option<(TilePos, Direction)> {
    let occupied = occupied_cells(template);
    // Walk outward from the cell; the farthest safe tile with a clear line back wins.
    let mut best: Option<(u32, TilePos, Direction)> = None;
    for direction in Direction::ALL {
        for pos in beam_lane(template, cell.pos, direction, &occupied) {
            if !is_safe(template, pos, &occupied) {
                continue;
            }
            let distance = pos.manhattan_to(cell.pos);
            if best.is_none_or(|(best_distance, _, _)| distance > best_distance) {
                best = Some((distance, pos, direction.opposite()));
            }
        }
    }
    if let Some((_, pos, facing)) = best {
        return Some((pos, facing));
    }
    let center = template.center();
    safe_cells(template).into_iter().next().map(|pos| (pos, facing_toward(pos, center)))
}

fn align_cells_to_lasers(template: &mut RoomTemplate, report: &mut RepairReport) {
    let laser_indices = indices_of(template, PrefabKind::LaserEmitter);
    let cell_indices = indices_of(template, PrefabKind::PowerCell);

    for (&laser_index, &cell_index) in laser_indices.iter().zip(cell_indices.iter()) {
        let laser_pos = template.prefabs[laser_index].pos;
        let direction = template.prefabs[laser_index].dir.unwrap_or(Direction::E);
        let cell_pos = template.prefabs[cell_index].pos;
        if on_laser_line(laser_pos, direction, cell_pos) {
            continue;
        }

        let mut occupied = occupied_cells(template);
        occupied.remove(&cell_pos);
        let lane = beam_lane(template, laser_pos, direction, &occupied);
        // Tiles the beam actually reaches come first, then the rest of the row or column.
        let candidate = lane
            .iter()
            .copied()
            .filter(|&pos| is_safe(template, pos, &occupied))
            .min_by_key(|&pos| pos.manhattan_to(cell_pos))
            .or_else(|| {
                template
                    .collision
                    .positions()
                    .filter(|&pos| pos != laser_pos && on_laser_line(laser_pos, direction, pos))
                    .filter(|&pos| is_safe(template, pos, &occupied))
                    .min_by_key(|&pos| pos.manhattan_to(cell_pos))
            });
        if let Some(target) = candidate {
            log::debug!(
                "template `{}`: moving power cell {cell_pos:?} -> {target:?} onto laser line",
                template.id
            );
            template.prefabs[cell_index].pos = target;
            report.realigned_cells += 1;
        }
    }
}

/// Row for east/west emitters, column for north/south ones.
fn on_laser_line(laser: TilePos, direction: Direction, pos: TilePos) -> bool {
    if direction.is_horizontal() { pos.y == laser.y } else { pos.x == laser.x }
}

/// Floor tiles a beam starting at `from` would cross, stopping before a wall or an occupied tile.
fn beam_lane(
    template: &RoomTemplate,
    from: TilePos,
    direction: Direction,
    occupied: &BTreeSet<TilePos>,
) -> Vec<TilePos> {
    let mut lane = Vec::new();
    let mut pos = from.step(direction);
    while !template.collision.is_wall(pos) && !occupied.contains(&pos) {
        lane.push(pos);
        pos = pos.step(direction);
    }
    lane
}

fn safe_cells(template: &RoomTemplate) -> Vec<TilePos> {
    let occupied = occupied_cells(template);
    template.collision.positions().filter(|&pos| is_safe(template, pos, &occupied)).collect()
}

fn is_safe(template: &RoomTemplate, pos: TilePos, occupied: &BTreeSet<TilePos>) -> bool {
    template.collision.in_bounds(pos)
        && !template.collision.is_wall(pos)
        && !template.collision.is_perimeter(pos)
        && !template.is_exit_tile(pos)
        && !occupied.contains(&pos)
}

fn occupied_cells(template: &RoomTemplate) -> BTreeSet<TilePos> {
    template.prefabs.iter().map(|prefab| prefab.pos).collect()
}

fn prefabs_of(template: &RoomTemplate, kind: PrefabKind) -> Vec<&Prefab> {
    template.prefabs.iter().filter(|prefab| prefab.kind == kind).collect()
}

fn indices_of(template: &RoomTemplate, kind: PrefabKind) -> Vec<usize> {
    template
        .prefabs
        .iter()
        .enumerate()
        .filter(|(_, prefab)| prefab.kind == kind)
        .map(|(index, _)| index)
        .collect()
}

/// Dominant-axis direction from `from` toward `target`.
pub(crate) fn facing_toward(from: TilePos, target: TilePos) -> Direction {
    let dx = target.x - from.x;
    let dy = target.y - from.y;
    if dx.abs() >= dy.abs() {
        if dx >= 0 { Direction::E } else { Direction::W }
    } else if dy > 0 {
        Direction::S
    } else {
        Direction::N
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::catalog::mask::CollisionMask;

    fn open_template(width: usize, height: usize, prefabs: Vec<Prefab>) -> RoomTemplate {
        let mut collision = CollisionMask::new(width, height);
        for pos in collision.perimeter_positions().collect::<Vec<_>>() {
            collision.set_wall(pos, true);
        }
        RoomTemplate {
            id: "fixture".to_string(),
            name: "fixture".to_string(),
            width,
            height,
            is_start: false,
            is_exit: false,
            collision,
            exits: BTreeMap::from([(Direction::W, TilePos::new(0, 3))]),
            prefabs,
        }
    }

    #[test]
    fn two_lasers_without_cells_gain_two_safe_cells() {
        let mut template = open_template(
            9,
            7,
            vec![
                Prefab::new(PrefabKind::LaserEmitter, TilePos::new(1, 1)).with_dir(Direction::E),
                Prefab::new(PrefabKind::LaserEmitter, TilePos::new(1, 5)).with_dir(Direction::E),
            ],
        );

        let report = repair_template(&mut template);

        assert_eq!(report.synthesized_cells, 2);
        assert_eq!(template.count_prefabs(PrefabKind::PowerCell), 2);
        let positions: BTreeSet<TilePos> = template.prefabs.iter().map(|p| p.pos).collect();
        assert_eq!(positions.len(), template.prefabs.len(), "prefabs must not share tiles");
        for cell in template.prefabs.iter().filter(|p| p.kind == PrefabKind::PowerCell) {
            assert!(!template.collision.is_wall(cell.pos));
            assert!(!template.is_exit_tile(cell.pos));
        }
        let cells: Vec<TilePos> = template
            .prefabs
            .iter()
            .filter(|p| p.kind == PrefabKind::PowerCell)
            .map(|p| p.pos)
            .collect();
        assert_eq!(cells, vec![TilePos::new(7, 1), TilePos::new(7, 5)]);
    }

    #[test]
    fn orphan_cell_gains_laser_aimed_at_it() {
        let mut template =
            open_template(9, 7, vec![Prefab::new(PrefabKind::PowerCell, TilePos::new(4, 3))]);

        let report = repair_template(&mut template);

        assert_eq!(report.synthesized_lasers, 1);
        let laser = template
            .prefabs
            .iter()
            .find(|p| p.kind == PrefabKind::LaserEmitter)
            .expect("a laser should be synthesized");
        let direction = laser.dir.expect("synthesized lasers are aimed");
        let mut pos = laser.pos;
        while pos != TilePos::new(4, 3) {
            pos = pos.step(direction);
            assert!(!template.collision.is_wall(pos), "beam lane must reach the cell");
        }
    }

    #[test]
    fn prefabs_inside_walls_are_dropped() {
        let mut template = open_template(
            6,
            6,
            vec![
                Prefab::new(PrefabKind::Button, TilePos::new(0, 0)),
                Prefab::new(PrefabKind::Button, TilePos::new(9, 2)),
                Prefab::new(PrefabKind::Button, TilePos::new(2, 2)),
            ],
        );

        let report = repair_template(&mut template);

        assert_eq!(report.dropped_in_walls, 2);
        assert_eq!(template.prefabs.len(), 1);
        assert_eq!(template.prefabs[0].pos, TilePos::new(2, 2));
    }

    #[test]
    fn misaligned_cell_is_nudged_onto_laser_row() {
        let mut template = open_template(
            9,
            7,
            vec![
                Prefab::new(PrefabKind::LaserEmitter, TilePos::new(1, 2)).with_dir(Direction::E),
                Prefab::new(PrefabKind::PowerCell, TilePos::new(6, 4)),
            ],
        );

        let report = repair_template(&mut template);

        assert_eq!(report.realigned_cells, 1);
        let cell = template.prefabs.iter().find(|p| p.kind == PrefabKind::PowerCell).unwrap();
        assert_eq!(cell.pos, TilePos::new(6, 2));
    }

    #[test]
    fn cell_on_laser_row_is_left_alone_even_when_laser_faces_away() {
        let mut template = open_template(
            9,
            7,
            vec![
                Prefab::new(PrefabKind::LaserEmitter, TilePos::new(1, 2)).with_dir(Direction::W),
                Prefab::new(PrefabKind::PowerCell, TilePos::new(6, 2)),
            ],
        );

        let report = repair_template(&mut template);

        assert_eq!(report.realigned_cells, 0);
        let cell = template.prefabs.iter().find(|p| p.kind == PrefabKind::PowerCell).unwrap();
        assert_eq!(cell.pos, TilePos::new(6, 2));
    }

    #[test]
    fn vertical_laser_pulls_cell_onto_its_column() {
        let mut template = open_template(
            9,
            7,
            vec![
                Prefab::new(PrefabKind::LaserEmitter, TilePos::new(3, 5)).with_dir(Direction::N),
                Prefab::new(PrefabKind::PowerCell, TilePos::new(6, 2)),
            ],
        );

        let report = repair_template(&mut template);

        assert_eq!(report.realigned_cells, 1);
        let cell = template.prefabs.iter().find(|p| p.kind == PrefabKind::PowerCell).unwrap();
        assert_eq!(cell.pos, TilePos::new(3, 2));
    }

    #[test]
    fn balanced_aligned_template_is_untouched() {
        let mut template = open_template(
            9,
            7,
            vec![
                Prefab::new(PrefabKind::LaserEmitter, TilePos::new(1, 2)).with_dir(Direction::E),
                Prefab::new(PrefabKind::PowerCell, TilePos::new(6, 2)),
            ],
        );
        let before = template.clone();

        assert!(repair_template(&mut template).is_clean());
        assert_eq!(template, before);
    }
}
