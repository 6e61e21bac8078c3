use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    pub struct EntityId;
}

/// Edge length of one tile in world pixels.
pub const TILE_SIZE: f32 = 32.0;

/// Index of a room inside `WorldGraph::rooms` (placement order).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoomId(pub usize);

/// Coordinate of a room on the integer room grid.
///
/// Field order makes the derived `Ord` lexicographic on `x` then `y`, which is
/// the comparison used to decide which of two neighbouring rooms owns the
/// shared edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub const ORIGIN: Self = Self { x: 0, y: 0 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.grid_delta();
        Self { x: self.x + dx, y: self.y + dy }
    }

    pub fn manhattan(self) -> u32 {
        self.x.unsigned_abs() + self.y.unsigned_abs()
    }

    /// Direction from `self` to `other` when the two are grid-adjacent.
    pub fn direction_to(self, other: Self) -> Option<Direction> {
        Direction::ALL.into_iter().find(|&direction| self.step(direction) == other)
    }

    pub fn is_adjacent(self, other: Self) -> bool {
        self.direction_to(other).is_some()
    }
}

/// Local tile coordinate inside a room template.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TilePos {
    pub x: i32,
    pub y: i32,
}

impl TilePos {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.grid_delta();
        Self { x: self.x + dx, y: self.y + dy }
    }

    pub fn manhattan_to(self, other: Self) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        self.x.hypot(self.y)
    }

    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y
    }

    pub fn normalized(self) -> Self {
        let length = self.length();
        if length <= f32::EPSILON {
            return Self::ZERO;
        }
        Self { x: self.x / length, y: self.y / length }
    }
}

impl Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self { x: self.x + rhs.x, y: self.y + rhs.y }
    }
}

impl Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self { x: self.x - rhs.x, y: self.y - rhs.y }
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self { x: self.x * rhs, y: self.y * rhs }
    }
}

/// Axis-aligned rectangle in world pixels, `pos` is the top-left corner.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub pos: Vec2,
    pub size: Vec2,
}

impl Rect {
    pub fn new(pos: Vec2, size: Vec2) -> Self {
        Self { pos, size }
    }

    pub fn right(&self) -> f32 {
        self.pos.x + self.size.x
    }

    pub fn bottom(&self) -> f32 {
        self.pos.y + self.size.y
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.pos.x + self.size.x / 2.0, self.pos.y + self.size.y / 2.0)
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.pos.x && point.x < self.right() && point.y >= self.pos.y && point.y < self.bottom()
    }

    /// Overlap extents on each axis, `None` when the interiors do not intersect.
    pub fn overlap(&self, other: &Self) -> Option<Vec2> {
        let width = self.right().min(other.right()) - self.pos.x.max(other.pos.x);
        let height = self.bottom().min(other.bottom()) - self.pos.y.max(other.pos.y);
        if width > 0.0 && height > 0.0 { Some(Vec2::new(width, height)) } else { None }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(alias = "north", alias = "up", alias = "UP", alias = "Up")]
    N,
    #[serde(alias = "east", alias = "right", alias = "RIGHT", alias = "Right")]
    E,
    #[serde(alias = "south", alias = "down", alias = "DOWN", alias = "Down")]
    S,
    #[serde(alias = "west", alias = "left", alias = "LEFT", alias = "Left")]
    W,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Direction::N, Direction::E, Direction::S, Direction::W];

    pub fn grid_delta(self) -> (i32, i32) {
        match self {
            Direction::N => (0, -1),
            Direction::E => (1, 0),
            Direction::S => (0, 1),
            Direction::W => (-1, 0),
        }
    }

    pub fn vector(self) -> Vec2 {
        let (dx, dy) = self.grid_delta();
        Vec2::new(dx as f32, dy as f32)
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::N => Direction::S,
            Direction::E => Direction::W,
            Direction::S => Direction::N,
            Direction::W => Direction::E,
        }
    }

    pub fn clockwise(self) -> Self {
        match self {
            Direction::N => Direction::E,
            Direction::E => Direction::S,
            Direction::S => Direction::W,
            Direction::W => Direction::N,
        }
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::E | Direction::W)
    }

    pub fn bit(self) -> u8 {
        match self {
            Direction::N => 0b0001,
            Direction::E => 0b0010,
            Direction::S => 0b0100,
            Direction::W => 0b1000,
        }
    }
}
