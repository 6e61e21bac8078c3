//! Wall/floor occupancy grid shared by room templates and placed rooms.

use crate::types::TilePos;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollisionMask {
    width: usize,
    height: usize,
    walls: Vec<bool>,
}

impl CollisionMask {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, walls: vec![false; width * height] }
    }

    /// Parses `#` (wall) / `.` (floor) rows. Returns the offending `(row, char)` on failure.
    pub(crate) fn from_rows(rows: &[String], width: usize) -> Result<Self, (usize, char)> {
        let mut mask = Self::new(width, rows.len());
        for (y, row) in rows.iter().enumerate() {
            for (x, cell) in row.chars().enumerate() {
                match cell {
                    '#' => mask.walls[y * width + x] = true,
                    '.' | ' ' => {}
                    other => return Err((y, other)),
                }
            }
        }
        Ok(mask)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn in_bounds(&self, pos: TilePos) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as usize) < self.width && (pos.y as usize) < self.height
    }

    /// Out-of-bounds cells count as walls.
    pub fn is_wall(&self, pos: TilePos) -> bool {
        if !self.in_bounds(pos) {
            return true;
        }
        self.walls[self.index(pos)]
    }

    pub fn set_wall(&mut self, pos: TilePos, wall: bool) {
        if !self.in_bounds(pos) {
            return;
        }
        let index = self.index(pos);
        self.walls[index] = wall;
    }

    pub fn is_perimeter(&self, pos: TilePos) -> bool {
        self.in_bounds(pos)
            && (pos.x == 0
                || pos.y == 0
                || pos.x as usize == self.width - 1
                || pos.y as usize == self.height - 1)
    }

    pub fn positions(&self) -> impl Iterator<Item = TilePos> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| TilePos::new(x as i32, y as i32)))
    }

    pub fn perimeter_positions(&self) -> impl Iterator<Item = TilePos> + '_ {
        self.positions().filter(|&pos| self.is_perimeter(pos))
    }

    pub fn wall_count(&self) -> usize {
        self.walls.iter().filter(|&&wall| wall).count()
    }

    pub fn interior_wall_count(&self) -> usize {
        self.positions().filter(|&pos| !self.is_perimeter(pos) && self.is_wall(pos)).count()
    }

    pub fn to_rows(&self) -> Vec<String> {
        (0..self.height)
            .map(|y| {
                (0..self.width)
                    .map(|x| if self.walls[y * self.width + x] { '#' } else { '.' })
                    .collect()
            })
            .collect()
    }

    fn index(&self, pos: TilePos) -> usize {
        (pos.y as usize) * self.width + (pos.x as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|line| line.to_string()).collect()
    }

    #[test]
    fn parses_rows_and_treats_out_of_bounds_as_wall() {
        let mask = CollisionMask::from_rows(&rows(&["###", "#.#", "###"]), 3).expect("valid rows");
        assert!(!mask.is_wall(TilePos::new(1, 1)));
        assert!(mask.is_wall(TilePos::new(0, 1)));
        assert!(mask.is_wall(TilePos::new(-1, 1)));
        assert!(mask.is_wall(TilePos::new(1, 3)));
        assert_eq!(mask.wall_count(), 8);
        assert_eq!(mask.interior_wall_count(), 0);
    }

    #[test]
    fn rejects_unknown_cell_characters() {
        let error = CollisionMask::from_rows(&rows(&["#.#", "#x#"]), 3).unwrap_err();
        assert_eq!(error, (1, 'x'));
    }

    #[test]
    fn round_trips_through_rows() {
        let source = rows(&["#.##", "#..#", "####"]);
        let mask = CollisionMask::from_rows(&source, 4).expect("valid rows");
        assert_eq!(mask.to_rows(), source);
    }
}
