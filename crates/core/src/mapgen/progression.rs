//! Level progression rules: room-count and grid-extent scaling by level number.

use crate::types::GridPos;

pub const MAX_LEVEL_ROOMS: usize = 24;
pub const MAX_MIN_ROOMS: usize = 14;
pub const MAX_GRID_EXTENT: usize = 9;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelConstraints {
    pub min_rooms: usize,
    pub max_rooms: usize,
    pub max_width: usize,
    pub max_height: usize,
    pub max_exits: usize,
}

impl LevelConstraints {
    /// Every field is non-decreasing in `level` and clamped. Level 0 is treated as level 1.
    pub fn for_level(level: u32) -> Self {
        let level = level.max(1) as usize;
        let max_rooms = (4 + 2 * level).min(MAX_LEVEL_ROOMS);
        let min_rooms = (3 + level).min(MAX_MIN_ROOMS).min(max_rooms);
        let extent = (3 + level).min(MAX_GRID_EXTENT);
        Self { min_rooms, max_rooms, max_width: extent, max_height: extent, max_exits: 1 }
    }

    pub fn bounds(&self) -> GridBounds {
        GridBounds::centered(self.max_width, self.max_height)
    }
}

/// Inclusive room-grid rectangle that always contains the origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridBounds {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
}

impl GridBounds {
    pub fn centered(width: usize, height: usize) -> Self {
        let width = width.max(1) as i32;
        let height = height.max(1) as i32;
        let min_x = -(width / 2);
        let min_y = -(height / 2);
        Self { min_x, max_x: min_x + width - 1, min_y, max_y: min_y + height - 1 }
    }

    pub fn contains(&self, pos: GridPos) -> bool {
        (self.min_x..=self.max_x).contains(&pos.x) && (self.min_y..=self.max_y).contains(&pos.y)
    }

    /// Every cell in ascending `GridPos` order (x, then y).
    pub fn cells(&self) -> impl Iterator<Item = GridPos> + '_ {
        (self.min_x..=self.max_x)
            .flat_map(move |x| (self.min_y..=self.max_y).map(move |y| GridPos::new(x, y)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraints_never_shrink_as_levels_rise() {
        let mut previous = LevelConstraints::for_level(1);
        for level in 2..40 {
            let current = LevelConstraints::for_level(level);
            assert!(current.min_rooms >= previous.min_rooms);
            assert!(current.max_rooms >= previous.max_rooms);
            assert!(current.max_width >= previous.max_width);
            assert!(current.max_height >= previous.max_height);
            assert!(current.min_rooms <= current.max_rooms);
            assert!(current.max_rooms <= MAX_LEVEL_ROOMS);
            assert!(current.min_rooms <= current.max_width * current.max_height);
            previous = current;
        }
    }

    #[test]
    fn level_one_matches_table() {
        let constraints = LevelConstraints::for_level(1);
        assert_eq!(
            constraints,
            LevelConstraints { min_rooms: 4, max_rooms: 6, max_width: 4, max_height: 4, max_exits: 1 }
        );
        assert_eq!(LevelConstraints::for_level(0), constraints);
    }

    #[test]
    fn bounds_have_requested_extent_and_contain_origin() {
        let bounds = GridBounds::centered(4, 5);
        assert!(bounds.contains(GridPos::ORIGIN));
        assert_eq!(bounds.max_x - bounds.min_x + 1, 4);
        assert_eq!(bounds.max_y - bounds.min_y + 1, 5);
        assert_eq!(bounds.cells().count(), 20);
        let cells: Vec<GridPos> = bounds.cells().collect();
        let mut sorted = cells.clone();
        sorted.sort();
        assert_eq!(cells, sorted);
    }
}
