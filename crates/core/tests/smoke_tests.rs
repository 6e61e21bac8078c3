use dungeon_core::entity::{PLAYER_SIZE, RoomLookup};
use dungeon_core::{EntityId, EntityKind, Level, LevelEvent, RoomId, TemplateCatalog, TickInput, Vec2};

const FRAME_MS: u64 = 16;

/// Top-left player position that puts the player's centre one tile east of `target`.
fn beside(level: &Level, target: EntityId) -> Vec2 {
    let center = level.entities().get(target).map(|entity| entity.center()).unwrap_or_default();
    center + Vec2::new(32.0 - PLAYER_SIZE / 2.0, -PLAYER_SIZE / 2.0)
}

fn use_entity(level: &mut Level, target: EntityId) {
    let report = level.tick(FRAME_MS, TickInput { player_pos: Some(beside(level, target)), interact: true });
    assert_eq!(report.interacted, Some(target), "interaction should pick the adjacent entity");
}

fn room_entities(level: &Level, room: RoomId, predicate: fn(&EntityKind) -> bool) -> Vec<EntityId> {
    level
        .entities()
        .entities_in_room(room)
        .iter()
        .copied()
        .filter(|&id| level.entities().get(id).is_some_and(|entity| predicate(&entity.kind)))
        .collect()
}

fn room_cells_powered(level: &Level, room: RoomId) -> bool {
    room_entities(level, room, |kind| matches!(kind, EntityKind::PowerCell { .. }))
        .into_iter()
        .all(|cell| level.entities().get(cell).is_some_and(|entity| entity.is_powered()))
}

/// Presses every button guarding a dormant emitter, then turns active emitters until each
/// room's cells light up.
fn solve(level: &mut Level) {
    let rooms: Vec<RoomId> = level.graph().rooms().iter().map(|room| room.id).collect();
    for room in rooms {
        let dormant = room_entities(level, room, |kind| matches!(kind, EntityKind::LaserEmitter { .. }))
            .into_iter()
            .any(|id| level.entities().get(id).is_some_and(|entity| !entity.active));
        if dormant {
            for button in room_entities(level, room, |kind| matches!(kind, EntityKind::Button { .. })) {
                use_entity(level, button);
            }
        }

        for emitter in room_entities(level, room, |kind| matches!(kind, EntityKind::LaserEmitter { .. })) {
            for _ in 0..4 {
                if room_cells_powered(level, room) {
                    break;
                }
                use_entity(level, emitter);
            }
        }
        assert!(room_cells_powered(level, room), "room {room:?} could not be powered");
    }
}

fn completions(level: &mut Level) -> usize {
    level
        .drain_events()
        .into_iter()
        .filter(|event| matches!(event, LevelEvent::Completed { .. }))
        .count()
}

fn enter_exit_room(level: &mut Level) -> TickInput {
    let exit = level.graph().exit_room().expect("builtin levels have an exit").bounds().center();
    let half = PLAYER_SIZE / 2.0;
    TickInput { player_pos: Some(exit - Vec2::new(half, half)), interact: false }
}

fn play_level(seed: u64, level_number: u32) -> u64 {
    let mut level = Level::new(TemplateCatalog::builtin(), level_number, Some(seed));
    assert!(!level.is_emergency());
    level.tick(FRAME_MS, TickInput::default());

    solve(&mut level);
    let stats = level.statistics();
    assert_eq!(stats.power.powered_cells, stats.power.total_cells);

    // Solving may already have finished the level if the exit room held a puzzle.
    let inside = enter_exit_room(&mut level);
    level.tick(FRAME_MS, inside);
    assert!(level.is_completed(), "seed {seed} level {level_number} should complete");
    assert_eq!(completions(&mut level), 1);
    level.snapshot_hash()
}

#[test]
fn test_smoke_builtin_levels_are_solvable() {
    for level_number in 1..=6 {
        for seed in [1_u64, 12_345, 987_654_321] {
            let hash = play_level(seed, level_number);
            assert_ne!(hash, 0);
        }
    }
}

#[test]
fn test_smoke_exit_room_without_power_does_not_complete() {
    let mut level = Level::new(TemplateCatalog::builtin(), 3, Some(2024));
    let inside = enter_exit_room(&mut level);
    level.tick(FRAME_MS, inside);
    let stats = level.statistics();
    assert_eq!(level.is_completed(), stats.power.powered_cells == stats.power.total_cells);

    solve(&mut level);
    for _ in 0..5 {
        level.tick(FRAME_MS, inside);
    }
    assert!(level.is_completed());
    assert_eq!(completions(&mut level), 1);
}
