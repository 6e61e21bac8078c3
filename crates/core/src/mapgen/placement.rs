//! World-pixel placement of new rooms and positional conflict repair.
//! Grid neighbours share exactly one tile along their common edge; that strip becomes the
//! doorway threshold.

use crate::catalog::RoomTemplate;
use crate::types::{Direction, GridPos, Rect, TILE_SIZE, Vec2};

use super::model::{RoomInstance, WorldGraph};

/// Candidate origin for `template` at `grid`, derived from the first placed neighbour
/// (W, N, E, S order), or estimated from the start room when none exists.
pub(super) fn candidate_origin(graph: &WorldGraph, template: &RoomTemplate, grid: GridPos) -> Vec2 {
    let (width, height) = template_size_px(template);
    for direction in [Direction::W, Direction::N, Direction::E, Direction::S] {
        let Some(neighbour) = graph.room_at(grid.step(direction)) else {
            continue;
        };
        let origin = neighbour.world;
        return match direction {
            Direction::W => Vec2::new(origin.x + neighbour.width_px() - TILE_SIZE, origin.y),
            Direction::E => Vec2::new(origin.x - width + TILE_SIZE, origin.y),
            Direction::N => Vec2::new(origin.x, origin.y + neighbour.height_px() - TILE_SIZE),
            Direction::S => Vec2::new(origin.x, origin.y - height + TILE_SIZE),
        };
    }

    let Some(start) = graph.rooms.get(graph.start.0) else {
        return Vec2::ZERO;
    };
    let step_x = width - TILE_SIZE;
    let step_y = height - TILE_SIZE;
    Vec2::new(
        start.world.x + (grid.x - start.grid.x) as f32 * step_x,
        start.world.y + (grid.y - start.grid.y) as f32 * step_y,
    )
}

/// Pushes the candidate clear of non-adjacent rooms, then snaps it to one-tile overlap with
/// every grid neighbour.
pub(super) fn resolve_conflicts(
    graph: &WorldGraph,
    template: &RoomTemplate,
    grid: GridPos,
    candidate: Vec2,
) -> Vec2 {
    let (width, height) = template_size_px(template);
    let mut origin = candidate;

    for room in &graph.rooms {
        if room.grid.is_adjacent(grid) {
            continue;
        }
        let placed = room.bounds();
        let proposed = Rect::new(origin, Vec2::new(width, height));
        let Some(overlap) = proposed.overlap(&placed) else {
            continue;
        };
        if is_corner_contact(overlap, room.grid, grid) {
            continue;
        }
        log::debug!(
            "room at {grid:?} overlaps non-adjacent room at {:?} by {overlap:?}, pushing clear",
            room.grid
        );
        origin = push_flush(proposed, &placed, overlap);
    }

    for room in &graph.rooms {
        if let Some(direction) = grid.direction_to(room.grid) {
            origin = abut(origin, width, height, room, direction);
        }
    }
    origin
}

/// Whether a room of `template` at `origin` shares exactly one tile strip with every placed
/// grid neighbour and touches any other room in a diagonal corner tile at most.
pub(super) fn fits(graph: &WorldGraph, template: &RoomTemplate, grid: GridPos, origin: Vec2) -> bool {
    let (width, height) = template_size_px(template);
    let proposed = Rect::new(origin, Vec2::new(width, height));
    graph.rooms.iter().all(|room| {
        let overlap = proposed.overlap(&room.bounds());
        match (grid.direction_to(room.grid), overlap) {
            (Some(direction), Some(overlap)) => {
                let thin = if direction.is_horizontal() { overlap.x } else { overlap.y };
                thin == TILE_SIZE
            }
            (Some(_), None) => false,
            (None, Some(overlap)) => is_corner_contact(overlap, room.grid, grid),
            (None, None) => true,
        }
    })
}

/// Diagonal neighbours that both share one tile with a common neighbour touch in a single
/// corner tile. That contact is wall in every room involved and is not a conflict.
pub(crate) fn is_corner_contact(overlap: Vec2, placed: GridPos, grid: GridPos) -> bool {
    let diagonal = placed.x.abs_diff(grid.x) == 1 && placed.y.abs_diff(grid.y) == 1;
    diagonal && overlap.x <= TILE_SIZE && overlap.y <= TILE_SIZE
}

fn push_flush(proposed: Rect, placed: &Rect, overlap: Vec2) -> Vec2 {
    let mut origin = proposed.pos;
    let proposed_center = proposed.center();
    let placed_center = placed.center();
    if overlap.x <= overlap.y {
        origin.x = if proposed_center.x < placed_center.x {
            placed.pos.x - proposed.size.x
        } else {
            placed.right()
        };
    } else {
        origin.y = if proposed_center.y < placed_center.y {
            placed.pos.y - proposed.size.y
        } else {
            placed.bottom()
        };
    }
    origin
}

/// `direction` points from the new room toward the placed neighbour.
fn abut(origin: Vec2, width: f32, height: f32, neighbour: &RoomInstance, direction: Direction) -> Vec2 {
    let placed = neighbour.world;
    match direction {
        Direction::E => Vec2::new(placed.x - width + TILE_SIZE, origin.y),
        Direction::W => Vec2::new(placed.x + neighbour.width_px() - TILE_SIZE, origin.y),
        Direction::S => Vec2::new(origin.x, placed.y - height + TILE_SIZE),
        Direction::N => Vec2::new(origin.x, placed.y + neighbour.height_px() - TILE_SIZE),
    }
}

/// Offset that moves `origin` back into non-negative world space.
pub(super) fn negative_shift(origin: Vec2) -> Option<Vec2> {
    let shift = Vec2::new((-origin.x).max(0.0), (-origin.y).max(0.0));
    if shift.x > 0.0 || shift.y > 0.0 { Some(shift) } else { None }
}

fn template_size_px(template: &RoomTemplate) -> (f32, f32) {
    (template.width as f32 * TILE_SIZE, template.height as f32 * TILE_SIZE)
}
