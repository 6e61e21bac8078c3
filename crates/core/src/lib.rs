pub mod catalog;
pub mod entity;
pub mod laser;
pub mod level;
pub mod mapgen;
pub mod populate;
pub mod power;
pub mod types;

pub use catalog::{TemplateCatalog, TemplateError};
pub use entity::{Entity, EntityKind, EntityStore, RoomLookup, WallShape};
pub use laser::{LaserBeam, LaserSystem, LaserTrace, trace_laser};
pub use level::{Level, LevelEvent, LevelStatistics, TickInput, TickReport};
pub use mapgen::{GenerationError, WorldGraph, WorldGraphBuilder, generate_world};
pub use power::{EventBus, PowerConnection, PowerEvent, PowerManager, PowerStatistics};
pub use types::*;
