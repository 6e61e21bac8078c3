//! Turns a generated `WorldGraph` into entities.
//!
//! This module exists to run the per-room instantiation pipeline once per level: decorative wall
//! augmentation, wall entities, deduplicated edge walls, auto doors on shared strips, and
//! prefab spawning. It does not own entity lifetimes after population; `EntityStore` does.

use std::collections::BTreeSet;

use crate::catalog::{CollisionMask, PrefabKind};
use crate::entity::{Entity, EntityStore, WallShape};
use crate::mapgen::{GenRng, RoomInstance, WorldGraph, derive_level_seed, room_stream_seed};
use crate::types::{Direction, EntityId, GridPos, Rect, RoomId, TILE_SIZE, TilePos, Vec2};

/// Rooms whose interior walls exceed this share of all walls are left undecorated.
pub const COMPLEX_LAYOUT_RATIO: f32 = 0.2;
/// Shared strips shorter than this many tiles get no door.
pub const MIN_DOOR_OVERLAP_TILES: usize = 3;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PopulationReport {
    pub augmented_tiles: usize,
    pub interior_walls: usize,
    pub edge_walls: usize,
    pub auto_doors: usize,
    pub prefabs: usize,
    pub skipped_prefabs: usize,
    pub player: Option<EntityId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Augmentation {
    Bare,
    Pillars,
    Alcoves,
    CornerDetails,
}

impl Augmentation {
    const ALL: [Augmentation; 4] =
        [Augmentation::Bare, Augmentation::Pillars, Augmentation::Alcoves, Augmentation::CornerDetails];

    fn candidates(self, width: i32, height: i32) -> Vec<TilePos> {
        let mid_y = height / 2;
        match self {
            Augmentation::Bare => Vec::new(),
            Augmentation::Pillars => vec![
                TilePos::new(2, 2),
                TilePos::new(width - 3, 2),
                TilePos::new(2, height - 3),
                TilePos::new(width - 3, height - 3),
            ],
            Augmentation::Alcoves => vec![
                TilePos::new(1, mid_y - 2),
                TilePos::new(1, mid_y + 2),
                TilePos::new(width - 2, mid_y - 2),
                TilePos::new(width - 2, mid_y + 2),
            ],
            Augmentation::CornerDetails => vec![
                TilePos::new(1, 1),
                TilePos::new(width - 2, 1),
                TilePos::new(1, height - 2),
                TilePos::new(width - 2, height - 2),
            ],
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct DoorPlan {
    owner: RoomId,
    pos: Vec2,
    cells: [(RoomId, TilePos); 2],
}

/// Populates every room in placement order and rebuilds the store's indices.
pub fn populate(graph: &mut WorldGraph, store: &mut EntityStore) -> PopulationReport {
    let level_seed = derive_level_seed(graph.seed(), graph.level());
    let doors = plan_auto_doors(graph);
    for door in &doors {
        for &(room, tile) in &door.cells {
            if let Some(room) = graph.room_mut(room) {
                room.collision.set_wall(tile, false);
            }
        }
    }
    let footprints: Vec<(GridPos, Rect)> =
        graph.rooms().iter().map(|room| (room.grid, room.bounds())).collect();

    let mut report = PopulationReport::default();
    for room in graph.rooms_mut() {
        let door_tiles: BTreeSet<TilePos> = doors
            .iter()
            .flat_map(|door| door.cells)
            .filter(|&(owner, _)| owner == room.id)
            .map(|(_, tile)| tile)
            .collect();

        let mut rng = GenRng::new(room_stream_seed(level_seed, room.grid));
        report.augmented_tiles += augment_walls(room, &mut rng);
        spawn_interior_walls(room, store, &mut report);
        spawn_edge_walls(room, &door_tiles, &footprints, store, &mut report);
        for door in doors.iter().filter(|door| door.owner == room.id) {
            let id = store.insert(Entity::door(door.pos, room.id, true, false));
            room.entities.push(id);
            report.auto_doors += 1;
        }
        spawn_prefabs(room, store, &mut report);
    }

    if report.player.is_none() {
        spawn_fallback_player(graph, store, &mut report);
    }
    store.rebuild_indices();

    log::debug!(
        "populated {} rooms: {} interior walls, {} edge walls, {} doors, {} prefabs ({} skipped)",
        graph.len(),
        report.interior_walls,
        report.edge_walls,
        report.auto_doors,
        report.prefabs,
        report.skipped_prefabs
    );
    report
}

/// One door per grid-adjacent pair, owned by the lower-coordinate room and centred on the
/// shared strip.
fn plan_auto_doors(graph: &WorldGraph) -> Vec<DoorPlan> {
    let mut plans = Vec::new();
    for room in graph.rooms() {
        for (_, neighbour_id) in graph.neighbours(room.id) {
            let Some(neighbour) = graph.room(neighbour_id) else {
                continue;
            };
            if neighbour.grid < room.grid {
                continue;
            }
            let (own, other) = (room.bounds(), neighbour.bounds());
            let Some(overlap) = own.overlap(&other) else {
                log::debug!("rooms {:?} and {:?} do not share a strip", room.grid, neighbour.grid);
                continue;
            };

            let side_by_side = room.grid.y == neighbour.grid.y;
            let strip_length = if side_by_side { overlap.y } else { overlap.x };
            let tiles = (strip_length / TILE_SIZE).round() as usize;
            if tiles < MIN_DOOR_OVERLAP_TILES {
                log::debug!(
                    "strip between {:?} and {:?} is {tiles} tiles, too short for a door",
                    room.grid,
                    neighbour.grid
                );
                continue;
            }

            let strip_origin = Vec2::new(own.pos.x.max(other.pos.x), own.pos.y.max(other.pos.y));
            let offset = (tiles / 2) as f32 * TILE_SIZE;
            let pos = if side_by_side {
                strip_origin + Vec2::new(0.0, offset)
            } else {
                strip_origin + Vec2::new(offset, 0.0)
            };
            let probe = pos + Vec2::new(TILE_SIZE / 2.0, TILE_SIZE / 2.0);
            let (Some(own_tile), Some(other_tile)) =
                (room.world_to_tile(probe), neighbour.world_to_tile(probe))
            else {
                continue;
            };
            plans.push(DoorPlan {
                owner: room.id,
                pos,
                cells: [(room.id, own_tile), (neighbour.id, other_tile)],
            });
        }
    }
    plans
}

fn is_complex_layout(mask: &CollisionMask) -> bool {
    let total = mask.wall_count();
    total > 0 && mask.interior_wall_count() as f32 / total as f32 > COMPLEX_LAYOUT_RATIO
}

/// Adds decorative interior walls chosen by the room's own seeded stream. Returns how many
/// tiles were turned into walls.
fn augment_walls(room: &mut RoomInstance, rng: &mut GenRng) -> usize {
    let width = room.collision.width() as i32;
    let height = room.collision.height() as i32;
    if width < 5 || height < 5 || is_complex_layout(&room.template.collision) {
        return 0;
    }

    let Some(pick) = rng.pick_index(Augmentation::ALL.len()) else {
        return 0;
    };
    let protected = protected_tiles(room);
    let mut placed = 0;
    for pos in Augmentation::ALL[pick].candidates(width, height) {
        if protected.contains(&pos) || room.collision.is_wall(pos) {
            continue;
        }
        room.collision.set_wall(pos, true);
        placed += 1;
    }
    placed
}

/// Tiles decoration must leave open: the perimeter, exits, prefab cells and their neighbours,
/// emitter lanes, and the centre row and column.
fn protected_tiles(room: &RoomInstance) -> BTreeSet<TilePos> {
    let mask = &room.collision;
    let mut protected: BTreeSet<TilePos> = mask.perimeter_positions().collect();
    protected.extend(room.template.exits.values().copied());

    for prefab in &room.template.prefabs {
        protected.insert(prefab.pos);
        protected.extend(Direction::ALL.map(|direction| prefab.pos.step(direction)));
        if prefab.kind == PrefabKind::LaserEmitter
            && let Some(direction) = prefab.dir
        {
            let lane = mask.positions().filter(|pos| {
                if direction.is_horizontal() { pos.y == prefab.pos.y } else { pos.x == prefab.pos.x }
            });
            protected.extend(lane);
        }
    }

    let center = room.template.center();
    protected.extend(mask.positions().filter(|pos| pos.x == center.x || pos.y == center.y));
    protected
}

fn wall_shape(mask: &CollisionMask, pos: TilePos) -> WallShape {
    let neighbours = Direction::ALL
        .into_iter()
        .filter(|&direction| {
            let next = pos.step(direction);
            mask.in_bounds(next) && mask.is_wall(next)
        })
        .fold(0, |bits, direction| bits | direction.bit());
    WallShape::from_neighbour_mask(neighbours)
}

fn spawn_interior_walls(room: &mut RoomInstance, store: &mut EntityStore, report: &mut PopulationReport) {
    let tiles: Vec<TilePos> = room
        .collision
        .positions()
        .filter(|&pos| !room.collision.is_perimeter(pos) && room.collision.is_wall(pos))
        .collect();
    for pos in tiles {
        let shape = wall_shape(&room.collision, pos);
        let id = store.insert(Entity::wall(room.tile_to_world(pos), room.id, shape, false));
        room.entities.push(id);
        report.interior_walls += 1;
    }
}

/// Seals the perimeter. A shared tile is spawned only by the lowest-`GridPos` room that
/// contains it, so neighbours never stack two walls on one tile.
fn spawn_edge_walls(
    room: &mut RoomInstance,
    door_tiles: &BTreeSet<TilePos>,
    footprints: &[(GridPos, Rect)],
    store: &mut EntityStore,
    report: &mut PopulationReport,
) {
    let perimeter: Vec<TilePos> =
        room.collision.perimeter_positions().filter(|pos| !door_tiles.contains(pos)).collect();
    for &pos in &perimeter {
        room.collision.set_wall(pos, true);
    }

    for pos in perimeter {
        let world = room.tile_to_world(pos);
        let probe = world + Vec2::new(TILE_SIZE / 2.0, TILE_SIZE / 2.0);
        let owned_elsewhere =
            footprints.iter().any(|&(grid, bounds)| grid < room.grid && bounds.contains(probe));
        if owned_elsewhere {
            continue;
        }
        let shape = wall_shape(&room.collision, pos);
        let id = store.insert(Entity::wall(world, room.id, shape, true));
        room.entities.push(id);
        report.edge_walls += 1;
    }
}

fn spawn_prefabs(room: &mut RoomInstance, store: &mut EntityStore, report: &mut PopulationReport) {
    let mut spawned = Vec::new();
    for prefab in &room.template.prefabs {
        if room.collision.is_wall(prefab.pos) {
            log::warn!(
                "room `{}` {:?} at {:?} sits on a wall after population, skipping",
                room.template.id,
                prefab.kind,
                prefab.pos
            );
            report.skipped_prefabs += 1;
            continue;
        }
        let world = room.tile_to_world(prefab.pos);
        let entity = match prefab.kind {
            PrefabKind::Player => {
                if !room.is_start || report.player.is_some() {
                    log::debug!("ignoring extra player spawn in room `{}`", room.template.id);
                    report.skipped_prefabs += 1;
                    continue;
                }
                Entity::player(world, room.id)
            }
            PrefabKind::Door => Entity::door(world, room.id, false, prefab.exit),
            PrefabKind::AutoDoor => Entity::door(world, room.id, true, prefab.exit),
            PrefabKind::LaserEmitter => Entity::laser_emitter(
                world,
                room.id,
                prefab.dir.unwrap_or(Direction::E),
                prefab.active.unwrap_or(true),
            ),
            PrefabKind::Button => Entity::button(world, room.id, prefab.targets.clone()),
            PrefabKind::PowerCell => Entity::power_cell(world, room.id),
        };
        let is_player = entity.is_player();
        let id = store.insert(entity.with_tag(prefab.id.clone()));
        if is_player {
            report.player = Some(id);
        }
        spawned.push(id);
        report.prefabs += 1;
    }
    room.entities.extend(spawned);
}

/// Places the player on the floor tile nearest the start room's centre.
fn spawn_fallback_player(graph: &mut WorldGraph, store: &mut EntityStore, report: &mut PopulationReport) {
    let start = graph.start_room().id;
    let Some(room) = graph.room_mut(start) else {
        return;
    };
    let center = room.template.center();
    let Some(tile) = room
        .collision
        .positions()
        .filter(|&pos| !room.collision.is_wall(pos))
        .min_by_key(|pos| pos.manhattan_to(center))
    else {
        log::warn!("start room `{}` has no floor tile for the player", room.template.id);
        return;
    };
    log::debug!("no player prefab, spawning at {tile:?} in `{}`", room.template.id);
    let id = store.insert(Entity::player(room.tile_to_world(tile), room.id));
    room.entities.push(id);
    report.player = Some(id);
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::catalog::TemplateCatalog;
    use crate::entity::EntityKind;
    use crate::mapgen::generate_world;

    fn populated(seed: u64, level: u32) -> (WorldGraph, EntityStore, PopulationReport) {
        let mut graph =
            generate_world(&TemplateCatalog::builtin(), seed, level).expect("builtin generates");
        let mut store = EntityStore::new();
        let report = populate(&mut graph, &mut store);
        (graph, store, report)
    }

    fn tile_key(pos: Vec2) -> (i32, i32) {
        ((pos.x / TILE_SIZE).round() as i32, (pos.y / TILE_SIZE).round() as i32)
    }

    #[test]
    fn exactly_one_player_spawns_in_the_start_room() {
        let (graph, store, report) = populated(11, 3);
        let players = store.ids_where(Entity::is_player);
        assert_eq!(players.len(), 1);
        assert_eq!(report.player, Some(players[0]));
        let player = store.get(players[0]).expect("player exists");
        assert_eq!(player.room, graph.start_room().id);
    }

    #[test]
    fn wall_tiles_are_never_stacked() {
        for seed in 0..8 {
            let (_, store, _) = populated(seed, 5);
            let mut seen = BTreeMap::new();
            for (id, entity) in store.iter() {
                if matches!(entity.kind, EntityKind::Wall { .. } | EntityKind::Door { .. }) {
                    let previous = seen.insert(tile_key(entity.pos), id);
                    assert!(previous.is_none(), "seed={seed} two blockers at {:?}", entity.pos);
                }
            }
        }
    }

    #[test]
    fn every_adjacent_pair_gets_one_open_door_tile() {
        let (graph, store, report) = populated(21, 4);
        let pairs: usize = graph
            .rooms()
            .iter()
            .map(|room| {
                graph
                    .neighbours(room.id)
                    .iter()
                    .filter(|&&(_, neighbour)| graph.room(neighbour).is_some_and(|n| n.grid > room.grid))
                    .count()
            })
            .sum();
        assert_eq!(report.auto_doors, pairs);

        for (_, door) in store.iter().filter(|(_, entity)| matches!(entity.kind, EntityKind::Door { .. })) {
            let probe = door.center();
            let containing: Vec<_> =
                graph.rooms().iter().filter(|room| room.contains_point(probe)).collect();
            assert_eq!(containing.len(), 2, "door at {:?} should sit on a shared strip", door.pos);
            for room in containing {
                assert_eq!(room.is_wall_at(probe), Some(false));
            }
        }
    }

    #[test]
    fn perimeter_is_sealed_except_for_doors() {
        let (graph, _, _) = populated(4, 2);
        for room in graph.rooms() {
            for pos in room.collision.perimeter_positions() {
                if room.collision.is_wall(pos) {
                    continue;
                }
                let probe = room.tile_to_world(pos) + Vec2::new(TILE_SIZE / 2.0, TILE_SIZE / 2.0);
                let shared = graph.rooms().iter().filter(|other| other.contains_point(probe)).count();
                assert_eq!(shared, 2, "open perimeter tile {pos:?} in {:?} is not a doorway", room.grid);
            }
        }
    }

    #[test]
    fn decoration_keeps_emitter_lanes_and_centre_lines_open() {
        for seed in 0..12 {
            let (graph, _, _) = populated(seed, 6);
            for room in graph.rooms() {
                let center = room.template.center();
                for prefab in &room.template.prefabs {
                    assert!(!room.collision.is_wall(prefab.pos), "prefab tile walled in {:?}", room.grid);
                    if prefab.kind == PrefabKind::LaserEmitter && prefab.dir == Some(Direction::E) {
                        for x in prefab.pos.x..room.template.width as i32 - 1 {
                            assert!(!room.collision.is_wall(TilePos::new(x, prefab.pos.y)));
                        }
                    }
                }
                for x in 1..room.template.width as i32 - 1 {
                    assert!(!room.collision.is_wall(TilePos::new(x, center.y)));
                }
            }
        }
    }

    #[test]
    fn complex_layouts_are_left_undecorated() {
        let mut mask = CollisionMask::new(7, 7);
        for pos in [TilePos::new(2, 2), TilePos::new(3, 2), TilePos::new(4, 2), TilePos::new(2, 4)] {
            mask.set_wall(pos, true);
        }
        mask.set_wall(TilePos::new(0, 0), true);
        assert!(is_complex_layout(&mask));
        assert!(!is_complex_layout(&CollisionMask::new(7, 7)));
    }

    #[test]
    fn missing_player_prefab_spawns_at_start_centre() {
        let catalog = TemplateCatalog::load(&[r########"{
            "id": "bare_start", "size": [5, 5], "start": true,
            "collision": ["#####", "#...#", "#...#", "#...#", "#####"]
        }"########]);
        let mut graph = generate_world(&catalog, 1, 1).expect("start template exists");
        let mut store = EntityStore::new();
        let report = populate(&mut graph, &mut store);
        let player = report.player.and_then(|id| store.get(id)).expect("fallback player");
        let expected = graph.start_room().tile_to_world(TilePos::new(2, 2));
        assert!(player.bounds().contains(expected + Vec2::new(16.0, 16.0)));
    }

    #[test]
    fn wall_shape_reads_neighbours_inside_the_mask_only() {
        let mut mask = CollisionMask::new(3, 3);
        mask.set_wall(TilePos::new(0, 0), true);
        mask.set_wall(TilePos::new(1, 0), true);
        assert_eq!(wall_shape(&mask, TilePos::new(0, 0)), WallShape::Endcap);
        assert_eq!(wall_shape(&mask, TilePos::new(1, 1)), WallShape::Endcap);
        assert_eq!(wall_shape(&mask, TilePos::new(2, 2)), WallShape::Pillar);
    }
}
