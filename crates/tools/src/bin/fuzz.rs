use anyhow::{Result, bail};
use clap::Parser;
use game_core::{EntityKind, Level, TemplateCatalog, TickInput, Vec2};
use rand_chacha::{
    ChaCha8Rng,
    rand_core::{Rng, SeedableRng},
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value_t = 42)]
    seed: u64,
    /// Number of level seeds drawn from the master seed
    #[arg(long, default_value_t = 200)]
    seeds: u32,
    #[arg(long, default_value_t = 10)]
    max_level: u32,
    /// Random-walk ticks per generated level
    #[arg(short, long, default_value_t = 120)]
    ticks: u32,
}

fn check(level: &Level) -> Result<()> {
    let graph = level.graph();
    let constraints = graph.constraints();
    if !graph.is_connected() {
        bail!("room graph is disconnected");
    }
    if !level.is_emergency()
        && (graph.len() < constraints.min_rooms || graph.len() > constraints.max_rooms)
    {
        bail!("room count {} outside [{}, {}]", graph.len(), constraints.min_rooms, constraints.max_rooms);
    }
    let exits = graph.rooms().iter().filter(|room| room.is_exit).count();
    if exits != 1 {
        bail!("expected exactly one exit room, found {exits}");
    }

    let entities = level.entities();
    let players = entities.iter().filter(|(_, entity)| entity.is_player()).count();
    if players != 1 {
        bail!("expected exactly one player, found {players}");
    }
    for (_, entity) in entities.iter() {
        if entity.pos.x < 0.0 || entity.pos.y < 0.0 {
            bail!("{} at negative position {:?}", entity.kind.name(), entity.pos);
        }
        if let EntityKind::Door { open: true, .. } = entity.kind
            && !entity.solid
        {
            bail!("open door lost its solidity");
        }
    }
    let power = level.statistics().power;
    if power.powered_cells > power.total_cells || power.active_lasers > power.total_lasers {
        bail!("power counters out of range: {power:?}");
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    println!(
        "Fuzzing {} seeds across levels 1..={} from master seed {}...",
        args.seeds, args.max_level, args.seed
    );
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let mut failures = 0;

    for _ in 0..args.seeds {
        let seed = rng.next_u64();
        for number in 1..=args.max_level {
            let mut level = Level::new(TemplateCatalog::builtin(), number, Some(seed));
            let spawn = level.player().map(|player| player.pos).unwrap_or_default();
            for _ in 0..args.ticks {
                let jitter = Vec2::new((rng.next_u32() % 97) as f32 - 48.0, (rng.next_u32() % 97) as f32 - 48.0);
                let input = TickInput { player_pos: Some(spawn + jitter), interact: rng.next_u32() % 4 == 0 };
                level.tick(16, input);
            }
            if let Err(error) = check(&level) {
                failures += 1;
                log::error!("seed {seed} level {number}: {error}");
            }
        }
    }

    if failures > 0 {
        bail!("{failures} generated levels broke an invariant");
    }
    println!("All invariants held.");
    Ok(())
}
