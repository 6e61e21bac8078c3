//! Procedural room-graph generation split into coherent submodules.

pub mod model;
pub mod progression;

mod generator;
mod placement;
mod seed;

pub use generator::{GenerationError, WorldGraphBuilder};
pub use model::{RoomInstance, WorldGraph};
pub use progression::{GridBounds, LevelConstraints};
pub use seed::default_level_seed;

pub(crate) use generator::emergency_world;
pub(crate) use seed::{GenRng, derive_level_seed, room_stream_seed};

use crate::catalog::TemplateCatalog;

pub fn generate_world(
    catalog: &TemplateCatalog,
    seed: u64,
    level: u32,
) -> Result<WorldGraph, GenerationError> {
    WorldGraphBuilder::new(catalog, seed, level).generate()
}
