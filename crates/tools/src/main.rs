use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, ensure};
use clap::Parser;
use game_core::{GridPos, Level, TemplateCatalog, TickInput, WorldGraph};

#[derive(Parser)]
#[command(author, version, about = "Generate a level and print its room layout", long_about = None)]
struct Args {
    /// Level seed; defaults to the level's stock seed
    #[arg(short, long)]
    seed: Option<u64>,
    #[arg(short, long, default_value_t = 1)]
    level: u32,
    /// Directory of room template JSON files; the builtin catalog is used when absent
    #[arg(short, long)]
    templates: Option<PathBuf>,
    /// Idle ticks to simulate after generation
    #[arg(long, default_value_t = 60)]
    ticks: u32,
    /// Also write the room map to this file
    #[arg(short, long)]
    out: Option<PathBuf>,
}

fn room_map(graph: &WorldGraph) -> String {
    let bounds = graph.bounds();
    let mut map = String::new();
    for y in bounds.min_y..=bounds.max_y {
        for x in bounds.min_x..=bounds.max_x {
            let glyph = match graph.room_at(GridPos::new(x, y)) {
                Some(room) if room.is_start => 'S',
                Some(room) if room.is_exit => 'E',
                Some(_) => '#',
                None => '.',
            };
            map.push(glyph);
        }
        map.push('\n');
    }
    map
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let catalog = match &args.templates {
        Some(dir) => {
            ensure!(dir.is_dir(), "template path {} is not a directory", dir.display());
            TemplateCatalog::load_dir(dir)
        }
        None => TemplateCatalog::builtin(),
    };
    log::info!("catalog holds {} templates", catalog.len());

    let mut level = Level::new(catalog, args.level, args.seed);
    if level.is_emergency() {
        log::warn!("generation failed; showing the emergency level");
    }

    let mut summary = String::new();
    writeln!(summary, "Level {} (seed {})", level.level(), level.seed())?;
    for room in level.graph().rooms() {
        writeln!(
            summary,
            "  {:>3} {:<14} grid ({:>3}, {:>3}) world ({:>6}, {:>6}){}{}",
            room.id.0,
            room.template.id,
            room.grid.x,
            room.grid.y,
            room.world.x,
            room.world.y,
            if room.is_start { " start" } else { "" },
            if room.is_exit { " exit" } else { "" },
        )?;
    }
    let map = room_map(level.graph());
    print!("{summary}\n{map}");

    for _ in 0..args.ticks {
        level.tick(16, TickInput::default());
    }
    let stats = level.statistics();
    println!(
        "After {} ms: {} entities, {}/{} lasers active, {}/{} cells powered, completed: {}",
        stats.elapsed_ms,
        stats.entities,
        stats.power.active_lasers,
        stats.power.total_lasers,
        stats.power.powered_cells,
        stats.power.total_cells,
        stats.completed,
    );
    println!("Snapshot Hash: {}", level.snapshot_hash());

    if let Some(path) = &args.out {
        fs::write(path, &map).with_context(|| format!("Failed to write map to {}", path.display()))?;
    }
    Ok(())
}
