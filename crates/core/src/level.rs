//! Level ownership and the per-tick pipeline.
//!
//! This module exists to own one generated level end to end: the room graph, its entities, the
//! laser driver, and power routing. Each tick applies input, moves doors, traces beams, routes
//! power, and checks completion, in that order. It does not render or read devices; callers
//! pass a `TickInput` and read back positions, beams, and events.

use xxhash_rust::xxh3::xxh3_64;

use crate::catalog::TemplateCatalog;
use crate::entity::{Entity, EntityKind, EntityStore, RoomLookup};
use crate::laser::{LaserBeam, LaserSystem};
use crate::mapgen::{WorldGraph, default_level_seed, emergency_world, generate_world};
use crate::populate::populate;
use crate::power::{EventBus, PowerEvent, PowerManager, PowerStatistics};
use crate::types::{EntityId, RoomId, Vec2};

/// Furthest centre-to-centre distance at which the player can use something.
pub const INTERACT_RANGE: f32 = 48.0;
/// Auto doors stay open while the player's centre is within this distance.
pub const AUTO_DOOR_RANGE: f32 = 56.0;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TickInput {
    /// New top-left corner of the player's hitbox, if it moved.
    pub player_pos: Option<Vec2>,
    pub interact: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    pub interacted: Option<EntityId>,
    pub doors_changed: usize,
    pub beams: usize,
    /// Set on the single tick where the level is first completed.
    pub completed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LevelEvent {
    Generated { level: u32, seed: u64, rooms: usize, emergency: bool },
    Interacted { entity: EntityId, kind: &'static str },
    DoorOpened { door: EntityId },
    DoorClosed { door: EntityId },
    Completed { level: u32, at_ms: u64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelStatistics {
    pub level: u32,
    pub seed: u64,
    pub rooms: usize,
    pub entities: usize,
    pub elapsed_ms: u64,
    pub completed: bool,
    pub emergency: bool,
    pub power: PowerStatistics,
}

#[derive(Debug)]
pub struct Level {
    catalog: TemplateCatalog,
    graph: WorldGraph,
    entities: EntityStore,
    lasers: LaserSystem,
    power: PowerManager,
    events: EventBus<LevelEvent>,
    level: u32,
    seed: u64,
    clock_ms: u64,
    completed: bool,
    emergency: bool,
}

impl Level {
    /// Builds level `level` right away. Check [`Level::is_emergency`] to see whether the
    /// catalog could be used.
    pub fn new(catalog: TemplateCatalog, level: u32, seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(|| default_level_seed(level));
        let (graph, emergency) = build_world(&catalog, seed, level);
        let mut this = Self {
            catalog,
            graph,
            entities: EntityStore::new(),
            lasers: LaserSystem::new(),
            power: PowerManager::new(),
            events: EventBus::default(),
            level,
            seed,
            clock_ms: 0,
            completed: false,
            emergency,
        };
        this.install();
        this
    }

    /// Replaces the current level. Returns `false` when generation failed and the emergency
    /// level was installed instead.
    pub fn generate_level(&mut self, level: u32, seed: Option<u64>) -> bool {
        let seed = seed.unwrap_or_else(|| default_level_seed(level));
        let (graph, emergency) = build_world(&self.catalog, seed, level);
        self.graph = graph;
        self.level = level;
        self.seed = seed;
        self.emergency = emergency;
        self.install();
        !emergency
    }

    /// Regenerates the current level from its seed with fresh power state.
    pub fn restart(&mut self) -> bool {
        self.generate_level(self.level, Some(self.seed))
    }

    fn install(&mut self) {
        self.entities.clear();
        populate(&mut self.graph, &mut self.entities);
        self.lasers.clear();
        self.power.initialize(&self.entities);
        self.clock_ms = 0;
        self.completed = false;
        self.events.publish(LevelEvent::Generated {
            level: self.level,
            seed: self.seed,
            rooms: self.graph.len(),
            emergency: self.emergency,
        });
    }

    pub fn tick(&mut self, dt_ms: u64, input: TickInput) -> TickReport {
        self.clock_ms += dt_ms;
        let mut report = TickReport::default();

        self.sweep();
        if let Some(pos) = input.player_pos
            && let Some(player) = self.entities.player()
        {
            self.entities.set_position(player, pos);
        }
        if input.interact {
            report.interacted = self.interact();
        }
        report.doors_changed = self.update_doors();

        let graph = &self.graph;
        self.lasers.update(&self.entities, |point| graph.is_wall_at(point));
        report.beams = self.lasers.active_beams().len();
        self.power.update(&mut self.entities, self.lasers.active_beams(), self.clock_ms);

        if !self.completed && self.is_complete() {
            self.completed = true;
            report.completed = true;
            log::info!("level {} completed after {} ms", self.level, self.clock_ms);
            self.events.publish(LevelEvent::Completed { level: self.level, at_ms: self.clock_ms });
        }
        report
    }

    /// Uses the nearest button, emitter, or manual door within [`INTERACT_RANGE`].
    fn interact(&mut self) -> Option<EntityId> {
        let player = self.entities.player().and_then(|id| self.entities.get(id))?.center();
        let mut nearest: Option<(f32, EntityId)> = None;
        for (id, entity) in self.entities.iter() {
            let usable = match entity.kind {
                EntityKind::Button { .. } | EntityKind::LaserEmitter { .. } => true,
                EntityKind::Door { auto, exit, .. } => !auto && !exit,
                _ => false,
            };
            if !usable {
                continue;
            }
            let distance = entity.center().distance(player);
            if distance <= INTERACT_RANGE && nearest.is_none_or(|(best, _)| distance < best) {
                nearest = Some((distance, id));
            }
        }
        let (_, target) = nearest?;
        let entity = self.entities.get(target)?;
        let kind = entity.kind.name();
        let is_button = matches!(entity.kind, EntityKind::Button { .. });
        let is_emitter = entity.is_laser_emitter();

        if is_button {
            self.press_button(target);
        } else if is_emitter {
            self.rotate_emitter(target);
        } else {
            self.toggle_door(target);
        }
        self.events.publish(LevelEvent::Interacted { entity: target, kind });
        Some(target)
    }

    fn press_button(&mut self, button: EntityId) {
        if let Some(entity) = self.entities.get_mut(button)
            && let EntityKind::Button { pressed, .. } = &mut entity.kind
        {
            *pressed = !*pressed;
        }
        for target in self.entities.button_targets(button) {
            let Some(emitter) = self.entities.get_mut(target) else {
                continue;
            };
            if !emitter.is_laser_emitter() {
                log::warn!("button target {target:?} is a {}, not an emitter", emitter.kind.name());
                continue;
            }
            emitter.active = !emitter.active;
            if emitter.active {
                self.power.laser_activated(target, self.clock_ms);
            } else {
                self.power.laser_deactivated(&mut self.entities, target, self.clock_ms);
            }
        }
    }

    fn rotate_emitter(&mut self, emitter: EntityId) {
        let Some(entity) = self.entities.get_mut(emitter) else {
            return;
        };
        let EntityKind::LaserEmitter { direction } = &mut entity.kind else {
            return;
        };
        *direction = direction.clockwise();
        let turned_to = *direction;
        self.power.laser_rotated(&mut self.entities, emitter, turned_to, self.clock_ms);
    }

    fn toggle_door(&mut self, door: EntityId) {
        let open = self.door_open(door).is_some_and(|open| !open);
        self.set_door(door, open);
        self.entities.rebuild_indices();
    }

    /// Exit doors follow the overall power state; auto doors follow the player.
    fn update_doors(&mut self) -> usize {
        let all_powered = self.power.all_cells_powered(&self.entities);
        let player = self.entities.player().and_then(|id| self.entities.get(id)).map(Entity::center);
        let doors: Vec<(EntityId, bool)> = self
            .entities
            .iter()
            .filter_map(|(id, entity)| match entity.kind {
                EntityKind::Door { exit: true, .. } => Some((id, all_powered)),
                EntityKind::Door { auto: true, .. } => {
                    let near =
                        player.is_some_and(|center| center.distance(entity.center()) <= AUTO_DOOR_RANGE);
                    Some((id, near))
                }
                _ => None,
            })
            .collect();

        let mut changed = 0;
        for (door, open) in doors {
            if self.door_open(door) != Some(open) {
                self.set_door(door, open);
                changed += 1;
            }
        }
        if changed > 0 {
            self.entities.rebuild_indices();
        }
        changed
    }

    fn door_open(&self, door: EntityId) -> Option<bool> {
        match self.entities.get(door)?.kind {
            EntityKind::Door { open, .. } => Some(open),
            _ => None,
        }
    }

    fn set_door(&mut self, door: EntityId, value: bool) {
        if let Some(entity) = self.entities.get_mut(door)
            && let EntityKind::Door { open, .. } = &mut entity.kind
        {
            *open = value;
            let event = if value { LevelEvent::DoorOpened { door } } else { LevelEvent::DoorClosed { door } };
            self.events.publish(event);
        }
    }

    /// Sweeps removed entities and refreshes every room's entity list.
    fn sweep(&mut self) {
        if self.entities.cleanup() == 0 {
            return;
        }
        for room in self.graph.rooms_mut() {
            room.entities = self.entities.entities_in_room(room.id).to_vec();
        }
    }

    fn is_complete(&self) -> bool {
        let Some(exit) = self.graph.exit_room() else {
            return false;
        };
        self.player_room() == Some(exit.id) && self.power.all_cells_powered(&self.entities)
    }

    pub fn player_room(&self) -> Option<RoomId> {
        let player = self.entities.player().and_then(|id| self.entities.get(id))?;
        self.graph.room_containing(player.center()).map(|room| room.id)
    }

    /// Flags an entity for removal at the start of the next tick.
    pub fn remove_entity(&mut self, id: EntityId) -> bool {
        self.entities.request_removal(id)
    }

    pub fn is_wall_at(&self, point: Vec2) -> bool {
        self.graph.is_wall_at(point)
    }

    pub fn active_beams(&self) -> &[LaserBeam] {
        self.lasers.active_beams()
    }

    pub fn statistics(&self) -> LevelStatistics {
        LevelStatistics {
            level: self.level,
            seed: self.seed,
            rooms: self.graph.len(),
            entities: self.entities.len(),
            elapsed_ms: self.clock_ms,
            completed: self.completed,
            emergency: self.emergency,
            power: self.power.statistics(&self.entities, self.clock_ms),
        }
    }

    pub fn graph(&self) -> &WorldGraph {
        &self.graph
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    pub fn power(&self) -> &PowerManager {
        &self.power
    }

    pub fn player(&self) -> Option<&Entity> {
        self.entities.player().and_then(|id| self.entities.get(id))
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency
    }

    pub fn events(&mut self) -> &mut EventBus<LevelEvent> {
        &mut self.events
    }

    pub fn drain_events(&mut self) -> Vec<LevelEvent> {
        self.events.drain()
    }

    pub fn drain_power_events(&mut self) -> Vec<PowerEvent> {
        self.power.drain_events()
    }

    /// Stable hash of the room graph plus every entity's observable state.
    pub fn snapshot_hash(&self) -> u64 {
        let mut bytes = self.graph.canonical_bytes();
        for (_, entity) in self.entities.iter() {
            bytes.extend(entity.kind.name().as_bytes());
            bytes.extend(entity.pos.x.to_bits().to_le_bytes());
            bytes.extend(entity.pos.y.to_bits().to_le_bytes());
            bytes.extend((entity.room.0 as u32).to_le_bytes());
            bytes.push(u8::from(entity.active));
            bytes.push(u8::from(entity.solid));
            match &entity.kind {
                EntityKind::Door { open, .. } => bytes.push(u8::from(*open)),
                EntityKind::LaserEmitter { direction } => bytes.push(direction.bit()),
                EntityKind::PowerCell { is_powered, .. } => bytes.push(u8::from(*is_powered)),
                EntityKind::Button { pressed, .. } => bytes.push(u8::from(*pressed)),
                EntityKind::Wall { .. } | EntityKind::Player => {}
            }
        }
        xxh3_64(&bytes)
    }
}

fn build_world(catalog: &TemplateCatalog, seed: u64, level: u32) -> (WorldGraph, bool) {
    match generate_world(catalog, seed, level) {
        Ok(graph) => (graph, false),
        Err(error) => {
            log::error!("level {level} generation failed ({error}), installing the emergency level");
            (emergency_world(seed, level), true)
        }
    }
}
