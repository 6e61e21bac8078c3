//! Laser-to-cell power routing.
//!
//! This module exists to turn the beams traced each tick into edge-triggered cell power state,
//! per-(laser, cell) connection bookkeeping, and a stream of typed events. It does not trace
//! beams or own entities; it only writes `PowerCell` state through `EntityStore`.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::mem;

use crate::entity::{EntityKind, EntityStore};
use crate::laser::{LaserBeam, beam_origin};
use crate::types::{Direction, EntityId, Vec2};

/// Added to a cell's bounding radius when testing beam proximity.
pub const CELL_HIT_MARGIN: f32 = 4.0;
/// A beam whose start has drifted further than this from its emitter's face is stale.
pub const BEAM_MATCH_TOLERANCE: f32 = 2.0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PowerEvent {
    LaserActivated { laser: EntityId, at_ms: u64 },
    LaserDeactivated { laser: EntityId, at_ms: u64 },
    LaserRotated { laser: EntityId, direction: Direction, at_ms: u64 },
    LaserHitCell { laser: EntityId, cell: EntityId, at_ms: u64 },
    LaserLostCell { laser: EntityId, cell: EntityId, at_ms: u64, powered_for_ms: u64 },
    CellPowered { cell: EntityId, at_ms: u64 },
    CellUnpowered { cell: EntityId, at_ms: u64 },
}

pub type ListenerError = Box<dyn Error + Send + Sync>;
type Listener<E> = Box<dyn FnMut(&E) -> Result<(), ListenerError>>;

/// Synchronous publish/subscribe with a drainable log. A failing listener is logged and the
/// remaining listeners still run.
pub struct EventBus<E> {
    listeners: Vec<(String, Listener<E>)>,
    log: Vec<E>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self { listeners: Vec::new(), log: Vec::new() }
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .field("pending", &self.log.len())
            .finish()
    }
}

impl<E: fmt::Debug> EventBus<E> {
    pub fn subscribe<F>(&mut self, name: impl Into<String>, listener: F)
    where
        F: FnMut(&E) -> Result<(), ListenerError> + 'static,
    {
        self.listeners.push((name.into(), Box::new(listener)));
    }

    pub fn publish(&mut self, event: E) {
        for (name, listener) in &mut self.listeners {
            if let Err(error) = listener(&event) {
                log::warn!("listener `{name}` failed on {event:?}: {error}");
            }
        }
        self.log.push(event);
    }

    pub fn drain(&mut self) -> Vec<E> {
        mem::take(&mut self.log)
    }

    pub fn pending(&self) -> &[E] {
        &self.log
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PowerConnection {
    pub laser: EntityId,
    pub cell: EntityId,
    is_connected: bool,
    last_connected_ms: u64,
    total_power_ms: u64,
    connection_count: u32,
}

impl PowerConnection {
    pub fn new(laser: EntityId, cell: EntityId) -> Self {
        Self { laser, cell, is_connected: false, last_connected_ms: 0, total_power_ms: 0, connection_count: 0 }
    }

    /// Returns `true` only on the disconnected -> connected transition.
    pub fn connect(&mut self, now_ms: u64) -> bool {
        if self.is_connected {
            return false;
        }
        self.is_connected = true;
        self.last_connected_ms = now_ms;
        self.connection_count += 1;
        true
    }

    /// Returns `true` only on the connected -> disconnected transition.
    pub fn disconnect(&mut self, now_ms: u64) -> bool {
        if !self.is_connected {
            return false;
        }
        self.total_power_ms += now_ms.saturating_sub(self.last_connected_ms);
        self.is_connected = false;
        true
    }

    /// Accumulated connected time, including the live interval when connected.
    pub fn power_time(&self, now_ms: u64) -> u64 {
        let live = if self.is_connected { now_ms.saturating_sub(self.last_connected_ms) } else { 0 };
        self.total_power_ms + live
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected
    }

    pub fn last_connected_ms(&self) -> u64 {
        self.last_connected_ms
    }

    pub fn connection_count(&self) -> u32 {
        self.connection_count
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PowerStatistics {
    pub total_cell_powerings: u64,
    pub total_power_ms: u64,
    pub active_lasers: usize,
    pub total_lasers: usize,
    pub powered_cells: usize,
    pub total_cells: usize,
    pub active_connections: usize,
}

#[derive(Debug, Default)]
pub struct PowerManager {
    lasers: Vec<EntityId>,
    cells: Vec<EntityId>,
    connections: BTreeMap<(EntityId, EntityId), PowerConnection>,
    total_cell_powerings: u64,
    bus: EventBus<PowerEvent>,
}

impl PowerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the current lasers and cells. Connections and counters start empty.
    pub fn initialize(&mut self, entities: &EntityStore) {
        self.lasers = entities.laser_emitters();
        self.cells = entities.power_cells();
        self.connections.clear();
        self.total_cell_powerings = 0;
        self.bus.clear_log();
        log::debug!("power routing tracks {} lasers and {} cells", self.lasers.len(), self.cells.len());
    }

    /// Drops every connection and unpowers every cell without publishing events.
    pub fn clear_states(&mut self, entities: &mut EntityStore) {
        for &cell in &self.cells {
            if let Some(entity) = entities.get_mut(cell)
                && let EntityKind::PowerCell { is_powered, powering } = &mut entity.kind
            {
                *is_powered = false;
                powering.clear();
            }
        }
        self.connections.clear();
        self.total_cell_powerings = 0;
        self.bus.clear_log();
    }

    /// Re-derives every cell's powering lasers from this tick's beams and publishes the
    /// resulting transitions.
    pub fn update(&mut self, entities: &mut EntityStore, beams: &[LaserBeam], now_ms: u64) {
        let valid_beams: Vec<&LaserBeam> =
            beams.iter().filter(|beam| is_current_beam(entities, beam)).collect();

        let mut derived = Vec::with_capacity(self.cells.len());
        for &cell in &self.cells {
            let Some(entity) = entities.get(cell) else {
                continue;
            };
            let center = entity.center();
            let reach = entity.bounding_radius() + CELL_HIT_MARGIN;
            let mut powering: Vec<EntityId> = Vec::new();
            for beam in &valid_beams {
                if !powering.contains(&beam.source)
                    && point_segment_distance(center, beam.start, beam.end) <= reach
                {
                    powering.push(beam.source);
                }
            }
            derived.push((cell, powering));
        }

        for (cell, powering) in derived {
            self.apply_cell(entities, cell, powering, now_ms);
        }
    }

    pub fn laser_activated(&mut self, laser: EntityId, now_ms: u64) {
        self.bus.publish(PowerEvent::LaserActivated { laser, at_ms: now_ms });
    }

    pub fn laser_deactivated(&mut self, entities: &mut EntityStore, laser: EntityId, now_ms: u64) {
        self.bus.publish(PowerEvent::LaserDeactivated { laser, at_ms: now_ms });
        self.invalidate_laser(entities, laser, now_ms);
    }

    pub fn laser_rotated(
        &mut self,
        entities: &mut EntityStore,
        laser: EntityId,
        direction: Direction,
        now_ms: u64,
    ) {
        self.bus.publish(PowerEvent::LaserRotated { laser, direction, at_ms: now_ms });
        self.invalidate_laser(entities, laser, now_ms);
    }

    pub fn all_cells_powered(&self, entities: &EntityStore) -> bool {
        self.cells.iter().all(|&cell| entities.get(cell).is_none_or(|entity| entity.is_powered()))
    }

    pub fn statistics(&self, entities: &EntityStore, now_ms: u64) -> PowerStatistics {
        let present = |id: &&EntityId| entities.get(**id).is_some();
        PowerStatistics {
            total_cell_powerings: self.total_cell_powerings,
            total_power_ms: self.connections.values().map(|link| link.power_time(now_ms)).sum(),
            active_lasers: self
                .lasers
                .iter()
                .filter(|&&laser| entities.get(laser).is_some_and(|entity| entity.active))
                .count(),
            total_lasers: self.lasers.iter().filter(present).count(),
            powered_cells: self
                .cells
                .iter()
                .filter(|&&cell| entities.get(cell).is_some_and(|entity| entity.is_powered()))
                .count(),
            total_cells: self.cells.iter().filter(present).count(),
            active_connections: self.connections.values().filter(|link| link.is_connected()).count(),
        }
    }

    pub fn connection(&self, laser: EntityId, cell: EntityId) -> Option<&PowerConnection> {
        self.connections.get(&(laser, cell))
    }

    pub fn connections(&self) -> impl Iterator<Item = &PowerConnection> {
        self.connections.values()
    }

    pub fn events(&mut self) -> &mut EventBus<PowerEvent> {
        &mut self.bus
    }

    pub fn drain_events(&mut self) -> Vec<PowerEvent> {
        self.bus.drain()
    }

    /// Immediately detaches `laser` from every cell it was powering.
    fn invalidate_laser(&mut self, entities: &mut EntityStore, laser: EntityId, now_ms: u64) {
        let affected: Vec<(EntityId, Vec<EntityId>)> = self
            .cells
            .iter()
            .filter_map(|&cell| {
                let EntityKind::PowerCell { powering, .. } = &entities.get(cell)?.kind else {
                    return None;
                };
                powering.contains(&laser).then(|| {
                    (cell, powering.iter().copied().filter(|&other| other != laser).collect())
                })
            })
            .collect();
        for (cell, remaining) in affected {
            self.apply_cell(entities, cell, remaining, now_ms);
        }
    }

    fn apply_cell(
        &mut self,
        entities: &mut EntityStore,
        cell: EntityId,
        powering: Vec<EntityId>,
        now_ms: u64,
    ) {
        let Some(entity) = entities.get_mut(cell) else {
            return;
        };
        let EntityKind::PowerCell { is_powered, powering: current } = &mut entity.kind else {
            return;
        };

        let gained: Vec<EntityId> =
            powering.iter().copied().filter(|laser| !current.contains(laser)).collect();
        let lost: Vec<EntityId> =
            current.iter().copied().filter(|laser| !powering.contains(laser)).collect();
        let was_powered = *is_powered;
        let now_powered = !powering.is_empty();
        *is_powered = now_powered;
        *current = powering;

        for laser in gained {
            let link = self
                .connections
                .entry((laser, cell))
                .or_insert_with(|| PowerConnection::new(laser, cell));
            if link.connect(now_ms) {
                self.bus.publish(PowerEvent::LaserHitCell { laser, cell, at_ms: now_ms });
            }
        }
        for laser in lost {
            if let Some(link) = self.connections.get_mut(&(laser, cell))
                && link.disconnect(now_ms)
            {
                let powered_for_ms = link.power_time(now_ms);
                self.bus.publish(PowerEvent::LaserLostCell { laser, cell, at_ms: now_ms, powered_for_ms });
            }
        }

        if now_powered && !was_powered {
            self.total_cell_powerings += 1;
            self.bus.publish(PowerEvent::CellPowered { cell, at_ms: now_ms });
        } else if was_powered && !now_powered {
            self.bus.publish(PowerEvent::CellUnpowered { cell, at_ms: now_ms });
        }
    }
}

/// A beam counts only while its emitter is active and still fires from where the beam starts.
fn is_current_beam(entities: &EntityStore, beam: &LaserBeam) -> bool {
    let Some(emitter) = entities.get(beam.source) else {
        return false;
    };
    if !emitter.active {
        return false;
    }
    let Some(origin) = beam_origin(emitter) else {
        return false;
    };
    let current = origin.distance(beam.start) <= BEAM_MATCH_TOLERANCE;
    if !current {
        log::debug!("ignoring stale beam from {:?}", beam.source);
    }
    current
}

pub fn point_segment_distance(point: Vec2, start: Vec2, end: Vec2) -> f32 {
    let segment = end - start;
    let length_squared = segment.dot(segment);
    if length_squared <= f32::EPSILON {
        return point.distance(start);
    }
    let t = ((point - start).dot(segment) / length_squared).clamp(0.0, 1.0);
    point.distance(start + segment * t)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::entity::Entity;
    use crate::laser::LaserSystem;
    use crate::types::{RoomId, TILE_SIZE};

    fn tile(x: i32, y: i32) -> Vec2 {
        Vec2::new(x as f32 * TILE_SIZE, y as f32 * TILE_SIZE)
    }

    struct Bench {
        store: EntityStore,
        lasers: LaserSystem,
        power: PowerManager,
        laser: EntityId,
        cell: EntityId,
    }

    impl Bench {
        fn new() -> Self {
            let mut store = EntityStore::new();
            let laser = store.insert(Entity::laser_emitter(tile(2, 2), RoomId(0), Direction::E, true));
            let cell = store.insert(Entity::power_cell(tile(8, 2), RoomId(0)));
            store.rebuild_indices();
            let mut power = PowerManager::new();
            power.initialize(&store);
            Self { store, lasers: LaserSystem::new(), power, laser, cell }
        }

        fn tick(&mut self, now_ms: u64) {
            self.lasers.update(&self.store, |_| false);
            self.power.update(&mut self.store, self.lasers.active_beams(), now_ms);
        }

        fn cell_powered(&self) -> bool {
            self.store.get(self.cell).is_some_and(|entity| entity.is_powered())
        }
    }

    #[test]
    fn connection_is_idempotent_and_accumulates_connected_time_only() {
        let mut link = PowerConnection::new(EntityId::default(), EntityId::default());
        assert!(link.connect(100));
        assert!(!link.connect(150));
        assert_eq!(link.power_time(180), 80);
        assert!(link.disconnect(200));
        assert!(!link.disconnect(260));
        assert_eq!(link.power_time(1_000), 100);
        assert!(link.connect(1_000));
        assert_eq!(link.power_time(1_050), 150);
        assert_eq!(link.connection_count(), 2);
    }

    #[test]
    fn cell_power_lifecycle_fires_each_transition_once() {
        let mut bench = Bench::new();
        bench.tick(0);
        assert!(bench.cell_powered());
        assert_eq!(
            bench.power.drain_events(),
            vec![
                PowerEvent::LaserHitCell { laser: bench.laser, cell: bench.cell, at_ms: 0 },
                PowerEvent::CellPowered { cell: bench.cell, at_ms: 0 },
            ]
        );

        bench.tick(16);
        bench.tick(32);
        assert!(bench.power.drain_events().is_empty(), "steady state publishes nothing");

        if let Some(entity) = bench.store.get_mut(bench.laser) {
            entity.active = false;
        }
        bench.tick(500);
        assert!(!bench.cell_powered());
        assert_eq!(
            bench.power.drain_events(),
            vec![
                PowerEvent::LaserLostCell {
                    laser: bench.laser,
                    cell: bench.cell,
                    at_ms: 500,
                    powered_for_ms: 500
                },
                PowerEvent::CellUnpowered { cell: bench.cell, at_ms: 500 },
            ]
        );

        let stats = bench.power.statistics(&bench.store, 900);
        assert_eq!(stats.total_cell_powerings, 1);
        assert_eq!(stats.total_power_ms, 500);
        assert_eq!(stats.active_lasers, 0);
        assert_eq!((stats.powered_cells, stats.total_cells), (0, 1));
        assert_eq!(stats.active_connections, 0);
    }

    #[test]
    fn deactivation_unpowers_immediately_without_a_new_trace() {
        let mut bench = Bench::new();
        bench.tick(0);
        bench.power.drain_events();

        if let Some(entity) = bench.store.get_mut(bench.laser) {
            entity.active = false;
        }
        bench.power.laser_deactivated(&mut bench.store, bench.laser, 40);
        assert!(!bench.cell_powered());
        let events = bench.power.drain_events();
        assert_eq!(events.first(), Some(&PowerEvent::LaserDeactivated { laser: bench.laser, at_ms: 40 }));
        assert_eq!(events.last(), Some(&PowerEvent::CellUnpowered { cell: bench.cell, at_ms: 40 }));

        bench.tick(50);
        assert!(bench.power.drain_events().is_empty());
    }

    #[test]
    fn stale_beams_are_ignored() {
        let mut bench = Bench::new();
        bench.tick(0);
        let beams = bench.lasers.active_beams().to_vec();
        bench.power.clear_states(&mut bench.store);

        if let Some(entity) = bench.store.get_mut(bench.laser) {
            entity.pos = tile(2, 4);
        }
        bench.power.update(&mut bench.store, &beams, 10);
        assert!(!bench.cell_powered());
    }

    #[test]
    fn a_second_laser_keeps_the_cell_powered() {
        let mut bench = Bench::new();
        let backup = bench
            .store
            .insert(Entity::laser_emitter(tile(8, 6), RoomId(0), Direction::N, true));
        bench.store.rebuild_indices();
        bench.power.initialize(&bench.store);
        bench.tick(0);
        let links = bench.power.connections().filter(|link| link.is_connected()).count();
        assert_eq!(links, 2);

        bench.power.laser_rotated(&mut bench.store, backup, Direction::E, 10);
        assert!(bench.cell_powered());
        assert_eq!(bench.power.statistics(&bench.store, 10).total_cell_powerings, 1);
    }

    #[test]
    fn failing_listener_does_not_stop_the_others() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus: EventBus<PowerEvent> = EventBus::default();
        bus.subscribe("broken", |_| Err("boom".into()));
        let sink = Rc::clone(&seen);
        bus.subscribe("recorder", move |event: &PowerEvent| {
            sink.borrow_mut().push(event.clone());
            Ok(())
        });

        let event = PowerEvent::CellPowered { cell: EntityId::default(), at_ms: 3 };
        bus.publish(event.clone());
        assert_eq!(*seen.borrow(), vec![event.clone()]);
        assert_eq!(bus.drain(), vec![event]);
        assert!(bus.pending().is_empty());
        assert_eq!(bus.listener_count(), 2);
    }

    #[test]
    fn point_segment_distance_clamps_to_endpoints() {
        let start = Vec2::new(0.0, 0.0);
        let end = Vec2::new(10.0, 0.0);
        assert_eq!(point_segment_distance(Vec2::new(5.0, 3.0), start, end), 3.0);
        assert_eq!(point_segment_distance(Vec2::new(13.0, 4.0), start, end), 5.0);
        let degenerate = point_segment_distance(Vec2::new(1.0, 1.0), start, start);
        assert!((degenerate - 2.0_f32.sqrt()).abs() < 1e-6);
    }
}
