//! Breadth-first room-graph generation: start room, randomized fan-out, minimum-count
//! top-up, and exit designation.

use std::collections::{BTreeMap, VecDeque};

use thiserror::Error;

use crate::catalog::builtin::fallback_pair;
use crate::catalog::{RoomTemplate, TemplateCatalog};
use crate::types::{Direction, GridPos, RoomId, TILE_SIZE, Vec2};

use super::model::{RoomInstance, WorldGraph};
use super::placement::{candidate_origin, fits, negative_shift, resolve_conflicts};
use super::progression::LevelConstraints;
use super::seed::{GenRng, derive_level_seed};

/// Upper bound on template lookups during one generation, independent of grid size.
const MAX_PLACEMENT_ATTEMPTS: usize = 512;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("the template catalog is empty")]
    EmptyCatalog,
    #[error("no template is flagged as a start room")]
    NoStartTemplate,
}

pub struct WorldGraphBuilder<'a> {
    catalog: &'a TemplateCatalog,
    rng: GenRng,
    graph: WorldGraph,
    attempts: usize,
}

impl<'a> WorldGraphBuilder<'a> {
    /// Derives the level constraints and resets all graph state for a fresh generation.
    pub fn new(catalog: &'a TemplateCatalog, seed: u64, level: u32) -> Self {
        let constraints = LevelConstraints::for_level(level);
        let level_seed = derive_level_seed(seed, level);
        Self {
            catalog,
            rng: GenRng::new(level_seed),
            graph: WorldGraph {
                rooms: Vec::new(),
                index: BTreeMap::new(),
                start: RoomId(0),
                exit: None,
                bounds: constraints.bounds(),
                constraints,
                level,
                seed,
            },
            attempts: 0,
        }
    }

    pub fn generate(mut self) -> Result<WorldGraph, GenerationError> {
        if self.catalog.is_empty() {
            return Err(GenerationError::EmptyCatalog);
        }
        self.place_start()?;
        self.expand_breadth_first();
        self.top_up();
        self.designate_exit();

        log::info!(
            "level {} (seed {}): placed {} rooms (min {}, max {}), exit {:?}",
            self.graph.level,
            self.graph.seed,
            self.graph.rooms.len(),
            self.graph.constraints.min_rooms,
            self.graph.constraints.max_rooms,
            self.graph.exit_room().map(|room| room.grid)
        );
        Ok(self.graph)
    }

    fn place_start(&mut self) -> Result<(), GenerationError> {
        let starts = self.catalog.start_templates();
        let pick = self.rng.pick_index(starts.len()).ok_or(GenerationError::NoStartTemplate)?;
        let template = starts[pick];
        let mut room = RoomInstance::new(RoomId(0), template, GridPos::ORIGIN, Vec2::ZERO);
        room.is_start = true;
        self.graph.rooms.push(room);
        self.graph.index.insert(GridPos::ORIGIN, RoomId(0));
        self.graph.start = RoomId(0);
        Ok(())
    }

    fn expand_breadth_first(&mut self) {
        let max_rooms = self.graph.constraints.max_rooms;
        let mut queue = VecDeque::from([GridPos::ORIGIN]);

        while let Some(current) = queue.pop_front() {
            if self.graph.rooms.len() >= max_rooms || self.attempts >= MAX_PLACEMENT_ATTEMPTS {
                break;
            }
            let mut candidates: Vec<GridPos> = Direction::ALL
                .into_iter()
                .map(|direction| current.step(direction))
                .filter(|&grid| self.is_free(grid))
                .collect();
            if candidates.is_empty() {
                continue;
            }

            let remaining = max_rooms - self.graph.rooms.len();
            let fan_out = self.rng.range_inclusive(1, 2).min(remaining).min(candidates.len());
            self.rng.shuffle(&mut candidates);
            for grid in candidates.into_iter().take(fan_out) {
                if self.try_place(grid).is_some() {
                    queue.push_back(grid);
                }
            }
        }
    }

    fn top_up(&mut self) {
        let constraints = self.graph.constraints;
        while self.graph.rooms.len() < constraints.min_rooms
            && self.attempts < MAX_PLACEMENT_ATTEMPTS
        {
            let frontier: Vec<GridPos> = self
                .graph
                .bounds
                .cells()
                .filter(|&grid| self.is_free(grid) && self.has_placed_neighbour(grid))
                .collect();
            if frontier.is_empty() {
                break;
            }

            let mut placed_any = false;
            for grid in frontier {
                if self.graph.rooms.len() >= constraints.min_rooms
                    || self.graph.rooms.len() >= constraints.max_rooms
                {
                    break;
                }
                if self.try_place(grid).is_some() {
                    placed_any = true;
                }
            }
            if !placed_any {
                break;
            }
        }

        if self.graph.rooms.len() < constraints.min_rooms {
            log::debug!(
                "level {}: only {} of {} minimum rooms could be placed",
                self.graph.level,
                self.graph.rooms.len(),
                constraints.min_rooms
            );
        }
    }

    /// Farthest room from the origin by Manhattan distance; the first one found wins ties.
    fn designate_exit(&mut self) {
        if self.graph.constraints.max_exits == 0 {
            return;
        }
        let mut best: Option<(u32, RoomId)> = None;
        for room in &self.graph.rooms {
            if room.id == self.graph.start {
                continue;
            }
            let distance = room.grid.manhattan();
            if best.is_none_or(|(best_distance, _)| distance > best_distance) {
                best = Some((distance, room.id));
            }
        }
        if let Some((_, exit)) = best {
            self.graph.rooms[exit.0].is_exit = true;
            self.graph.exit = Some(exit);
        }
    }

    /// Tries the randomly picked template first, then the other matches in catalog order.
    /// The cell is skipped when no match fits without overlapping placed rooms.
    fn try_place(&mut self, grid: GridPos) -> Option<RoomId> {
        self.attempts += 1;
        let required = self.required_exits(grid);
        let matches = self.catalog.templates_with_exits(&required);
        let Some(pick) = self.rng.pick_index(matches.len()) else {
            log::debug!("no template offers exits {required:?} for {grid:?}, skipping");
            return None;
        };

        let placement = (0..matches.len()).find_map(|offset| {
            let template: &RoomTemplate = matches[(pick + offset) % matches.len()];
            let candidate = candidate_origin(&self.graph, template, grid);
            let origin = resolve_conflicts(&self.graph, template, grid, candidate);
            fits(&self.graph, template, grid, origin).then_some((template, origin))
        });
        let Some((template, mut origin)) = placement else {
            log::debug!(
                "none of {} templates with exits {required:?} fits at {grid:?}, skipping",
                matches.len()
            );
            return None;
        };
        if let Some(shift) = negative_shift(origin) {
            self.graph.shift_world(shift);
            origin = origin + shift;
        }

        let id = RoomId(self.graph.rooms.len());
        self.graph.rooms.push(RoomInstance::new(id, template, grid, origin));
        self.graph.index.insert(grid, id);
        Some(id)
    }

    fn required_exits(&self, grid: GridPos) -> Vec<Direction> {
        Direction::ALL
            .into_iter()
            .filter(|&direction| self.graph.index.contains_key(&grid.step(direction)))
            .collect()
    }

    fn is_free(&self, grid: GridPos) -> bool {
        self.graph.bounds.contains(grid) && !self.graph.index.contains_key(&grid)
    }

    fn has_placed_neighbour(&self, grid: GridPos) -> bool {
        !self.required_exits(grid).is_empty()
    }
}

/// Two-room level built straight from the fallback pair: start at the origin, exit to its east.
/// Used when generation from the loaded catalog fails.
pub(crate) fn emergency_world(seed: u64, level: u32) -> WorldGraph {
    let [start_template, exit_template] = fallback_pair();
    let constraints = LevelConstraints::for_level(level);

    let mut start = RoomInstance::new(RoomId(0), &start_template, GridPos::ORIGIN, Vec2::ZERO);
    start.is_start = true;
    let exit_grid = GridPos::ORIGIN.step(Direction::E);
    let exit_world = Vec2::new(start.width_px() - TILE_SIZE, 0.0);
    let mut exit = RoomInstance::new(RoomId(1), &exit_template, exit_grid, exit_world);
    exit.is_exit = true;

    WorldGraph {
        rooms: vec![start, exit],
        index: BTreeMap::from([(GridPos::ORIGIN, RoomId(0)), (exit_grid, RoomId(1))]),
        start: RoomId(0),
        exit: Some(RoomId(1)),
        bounds: constraints.bounds(),
        constraints,
        level,
        seed,
    }
}
