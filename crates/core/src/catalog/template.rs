//! Authored room template model and JSON parsing.
//! Parsing only checks structural validity; gameplay repairs live in `repair`.

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

use super::mask::CollisionMask;
use crate::types::{Direction, TilePos};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
pub enum PrefabKind {
    Player,
    Door,
    AutoDoor,
    LaserEmitter,
    Button,
    PowerCell,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prefab {
    pub kind: PrefabKind,
    pub pos: TilePos,
    pub dir: Option<Direction>,
    pub id: Option<String>,
    pub targets: Vec<String>,
    pub exit: bool,
    pub active: Option<bool>,
}

impl Prefab {
    pub fn new(kind: PrefabKind, pos: TilePos) -> Self {
        Self { kind, pos, dir: None, id: None, targets: Vec::new(), exit: false, active: None }
    }

    pub fn with_dir(mut self, dir: Direction) -> Self {
        self.dir = Some(dir);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoomTemplate {
    pub id: String,
    pub name: String,
    pub width: usize,
    pub height: usize,
    pub is_start: bool,
    pub is_exit: bool,
    pub collision: CollisionMask,
    pub exits: BTreeMap<Direction, TilePos>,
    pub prefabs: Vec<Prefab>,
}

impl RoomTemplate {
    pub fn has_exits(&self, required: &[Direction]) -> bool {
        required.iter().all(|direction| self.exits.contains_key(direction))
    }

    pub fn is_exit_tile(&self, pos: TilePos) -> bool {
        self.exits.values().any(|&exit| exit == pos)
    }

    pub fn count_prefabs(&self, kind: PrefabKind) -> usize {
        self.prefabs.iter().filter(|prefab| prefab.kind == kind).count()
    }

    pub fn center(&self) -> TilePos {
        TilePos::new((self.width / 2) as i32, (self.height / 2) as i32)
    }
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("invalid template JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("template `{id}` has zero size")]
    ZeroSize { id: String },
    #[error("template `{id}` collision has {found} rows, size says {expected}")]
    RowCount { id: String, expected: usize, found: usize },
    #[error("template `{id}` collision row {row} is {found} wide, size says {expected}")]
    RowWidth { id: String, row: usize, expected: usize, found: usize },
    #[error("template `{id}` collision row {row} contains unknown cell `{cell}`")]
    UnknownCell { id: String, row: usize, cell: char },
    #[error("template `{id}` exit {direction:?} at {pos:?} lies outside the room")]
    ExitOutOfBounds { id: String, direction: Direction, pos: TilePos },
    #[error("template id `{id}` is defined more than once")]
    DuplicateId { id: String },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum TemplateDocument {
    Many(Vec<RawTemplate>),
    One(RawTemplate),
}

impl TemplateDocument {
    pub(super) fn into_templates(self) -> Vec<RawTemplate> {
        match self {
            TemplateDocument::Many(templates) => templates,
            TemplateDocument::One(template) => vec![template],
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct RawTemplate {
    id: String,
    #[serde(default)]
    name: Option<String>,
    size: [usize; 2],
    #[serde(default)]
    start: bool,
    #[serde(default)]
    exit: bool,
    collision: Vec<String>,
    #[serde(default)]
    exits: BTreeMap<Direction, [i32; 2]>,
    #[serde(default)]
    prefabs: Vec<RawPrefab>,
}

#[derive(Debug, Deserialize)]
struct RawPrefab {
    #[serde(rename = "type")]
    kind: PrefabKind,
    pos: [i32; 2],
    #[serde(default)]
    dir: Option<Direction>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    targets: Vec<String>,
    #[serde(default)]
    exit: bool,
    #[serde(default)]
    active: Option<bool>,
}

impl RawTemplate {
    pub(super) fn id(&self) -> &str {
        &self.id
    }

    pub(super) fn into_template(self) -> Result<RoomTemplate, TemplateError> {
        let [width, height] = self.size;
        if width == 0 || height == 0 {
            return Err(TemplateError::ZeroSize { id: self.id });
        }
        if self.collision.len() != height {
            return Err(TemplateError::RowCount {
                id: self.id,
                expected: height,
                found: self.collision.len(),
            });
        }
        for (row, line) in self.collision.iter().enumerate() {
            let found = line.chars().count();
            if found != width {
                return Err(TemplateError::RowWidth { id: self.id, row, expected: width, found });
            }
        }
        let collision = match CollisionMask::from_rows(&self.collision, width) {
            Ok(mask) => mask,
            Err((row, cell)) => return Err(TemplateError::UnknownCell { id: self.id, row, cell }),
        };

        let mut exits = BTreeMap::new();
        for (direction, [x, y]) in self.exits {
            let pos = TilePos::new(x, y);
            if !collision.in_bounds(pos) {
                return Err(TemplateError::ExitOutOfBounds { id: self.id, direction, pos });
            }
            if !collision.is_perimeter(pos) {
                log::warn!(
                    "template `{}` exit {direction:?} at ({x}, {y}) is not on the room boundary",
                    self.id
                );
            }
            exits.insert(direction, pos);
        }

        let prefabs = self
            .prefabs
            .into_iter()
            .map(|raw| Prefab {
                kind: raw.kind,
                pos: TilePos::new(raw.pos[0], raw.pos[1]),
                dir: raw.dir,
                id: raw.id,
                targets: raw.targets,
                exit: raw.exit,
                active: raw.active,
            })
            .collect();

        Ok(RoomTemplate {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            width,
            height,
            is_start: self.start,
            is_exit: self.exit,
            collision,
            exits,
            prefabs,
        })
    }
}
