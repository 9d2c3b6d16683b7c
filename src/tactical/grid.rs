//! Command grid, subcell coordinates and the terrain grid
//!
//! Orders speak in command cells ("B4"); the simulation moves units across
//! subcells. Each command cell is `cell_size × cell_size` subcells.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, TacticalError};
use crate::tactical::constants::{DEFAULT_CELL_SIZE, MAX_COMMAND_COLUMNS, MAX_COMMAND_ROWS};
use crate::tactical::terrain::{TerrainProfile, TerrainTable, TerrainType};

/// Coarse order reference: column letter A–J, row digit 0–9
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommandCell {
    pub col: u8,
    pub row: u8,
}

impl CommandCell {
    pub fn new(col: u8, row: u8) -> Option<Self> {
        if col < MAX_COMMAND_COLUMNS && row < MAX_COMMAND_ROWS {
            Some(Self { col, row })
        } else {
            None
        }
    }

    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CommandCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", (b'A' + self.col) as char, self.row)
    }
}

impl FromStr for CommandCell {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        let (Some(letter), Some(digit), None) = (chars.next(), chars.next(), chars.next()) else {
            return Err(format!("command cell '{s}' must be a letter A-J and a digit 0-9"));
        };
        let letter = letter.to_ascii_uppercase();
        if !('A'..='J').contains(&letter) {
            return Err(format!("command cell '{s}' has column outside A-J"));
        }
        let row = digit
            .to_digit(10)
            .ok_or_else(|| format!("command cell '{s}' has row outside 0-9"))?;
        Ok(Self {
            col: letter as u8 - b'A',
            row: row as u8,
        })
    }
}

impl TryFrom<String> for CommandCell {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CommandCell> for String {
    fn from(cell: CommandCell) -> Self {
        cell.to_string()
    }
}

/// Fine-grained position on the whole map, in subcells
///
/// Ordered by row then column, which is the tie-break order used by the
/// pathfinder and station selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubcellCoord {
    pub x: i32,
    pub y: i32,
}

impl SubcellCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in subcells
    pub fn distance(&self, other: &SubcellCoord) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        (dx * dx + dy * dy).sqrt()
    }

    /// Octile distance: cheapest 8-directional step count with √2 diagonals
    pub fn octile_distance(&self, other: &SubcellCoord) -> f32 {
        let dx = (self.x - other.x).abs() as f32;
        let dy = (self.y - other.y).abs() as f32;
        let (lo, hi) = if dx < dy { (dx, dy) } else { (dy, dx) };
        hi + (std::f32::consts::SQRT_2 - 1.0) * lo
    }

    pub fn manhattan_distance(&self, other: &SubcellCoord) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    pub fn is_diagonal_to(&self, other: &SubcellCoord) -> bool {
        self.x != other.x && self.y != other.y
    }

    pub fn offset(&self, dx: i32, dy: i32) -> SubcellCoord {
        SubcellCoord::new(self.x + dx, self.y + dy)
    }

    /// Bresenham line from self to other, endpoints included
    pub fn line_to(&self, other: &SubcellCoord) -> Vec<SubcellCoord> {
        let (mut x, mut y) = (self.x, self.y);
        let dx = (other.x - x).abs();
        let dy = -(other.y - y).abs();
        let sx = if x < other.x { 1 } else { -1 };
        let sy = if y < other.y { 1 } else { -1 };
        let mut err = dx + dy;
        let mut line = Vec::with_capacity((dx - dy) as usize + 1);

        loop {
            line.push(SubcellCoord::new(x, y));
            if x == other.x && y == other.y {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }

        line
    }
}

impl Ord for SubcellCoord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.y.cmp(&other.y).then(self.x.cmp(&other.x))
    }
}

impl PartialOrd for SubcellCoord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Command grid within A–J × 0–9 and subcells within `[0, DEFAULT_CELL_SIZE)` per side
fn check_dimensions(width_cells: usize, height_cells: usize, cell_size: u32) -> Result<()> {
    if width_cells == 0
        || height_cells == 0
        || width_cells > MAX_COMMAND_COLUMNS as usize
        || height_cells > MAX_COMMAND_ROWS as usize
    {
        return Err(TacticalError::CorruptTerrain(format!(
            "command grid {}x{} outside 1..={}x1..={}",
            width_cells, height_cells, MAX_COMMAND_COLUMNS, MAX_COMMAND_ROWS
        )));
    }
    if cell_size == 0 || cell_size > DEFAULT_CELL_SIZE {
        return Err(TacticalError::CorruptTerrain(format!(
            "cell_size {cell_size} outside 1..={DEFAULT_CELL_SIZE}"
        )));
    }
    Ok(())
}

/// Immutable per-match terrain classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainGrid {
    pub width_cells: u8,
    pub height_cells: u8,
    /// Subcells per command-cell side
    pub cell_size: u32,
    cells: Vec<TerrainType>,
    pub table: TerrainTable,
}

impl TerrainGrid {
    /// Create a grid filled with one terrain type
    pub fn new(width_cells: u8, height_cells: u8, cell_size: u32, fill: TerrainType) -> Result<Self> {
        check_dimensions(width_cells as usize, height_cells as usize, cell_size)?;
        let grid = Self {
            width_cells,
            height_cells,
            cell_size,
            cells: vec![fill; width_cells as usize * height_cells as usize * (cell_size as usize).pow(2)],
            table: TerrainTable::default(),
        };
        grid.validate()?;
        Ok(grid)
    }

    /// Build a grid from glyph rows (one character per subcell)
    ///
    /// Row and column counts must be whole multiples of `cell_size`.
    pub fn from_rows(cell_size: u32, rows: &[&str]) -> Result<Self> {
        let corrupt = |msg: String| TacticalError::CorruptTerrain(msg);
        let height = rows.len();
        let width = rows.first().map(|r| r.chars().count()).unwrap_or(0);
        if cell_size == 0 || height == 0 || width == 0 {
            return Err(corrupt("empty terrain rows".into()));
        }
        if width % cell_size as usize != 0 || height % cell_size as usize != 0 {
            return Err(corrupt(format!(
                "{width}x{height} subcells is not a whole number of {cell_size}-subcell command cells"
            )));
        }
        let (columns, rows_of_cells) = (width / cell_size as usize, height / cell_size as usize);
        check_dimensions(columns, rows_of_cells, cell_size)?;

        let mut cells = Vec::with_capacity(width * height);
        for (y, row) in rows.iter().enumerate() {
            if row.chars().count() != width {
                return Err(corrupt(format!("row {y} has a different width")));
            }
            for c in row.chars() {
                let terrain = TerrainType::from_glyph(c)
                    .ok_or_else(|| corrupt(format!("unknown terrain glyph '{c}' in row {y}")))?;
                cells.push(terrain);
            }
        }

        let grid = Self {
            width_cells: columns as u8,
            height_cells: rows_of_cells as u8,
            cell_size,
            cells,
            table: TerrainTable::default(),
        };
        grid.validate()?;
        Ok(grid)
    }

    pub fn with_table(mut self, table: TerrainTable) -> Self {
        self.table = table;
        self
    }

    /// Check the grid is internally consistent
    pub fn validate(&self) -> Result<()> {
        check_dimensions(self.width_cells as usize, self.height_cells as usize, self.cell_size)?;
        let expected = self.width() as usize * self.height() as usize;
        if self.cells.len() != expected {
            return Err(TacticalError::CorruptTerrain(format!(
                "expected {} subcells, found {}",
                expected,
                self.cells.len()
            )));
        }
        self.table.validate().map_err(TacticalError::CorruptTerrain)
    }

    /// Width in subcells
    pub fn width(&self) -> i32 {
        self.width_cells as i32 * self.cell_size as i32
    }

    /// Height in subcells
    pub fn height(&self) -> i32 {
        self.height_cells as i32 * self.cell_size as i32
    }

    pub fn in_bounds(&self, coord: SubcellCoord) -> bool {
        coord.x >= 0 && coord.y >= 0 && coord.x < self.width() && coord.y < self.height()
    }

    fn index(&self, coord: SubcellCoord) -> Option<usize> {
        if self.in_bounds(coord) {
            Some(coord.y as usize * self.width() as usize + coord.x as usize)
        } else {
            None
        }
    }

    pub fn terrain_at(&self, coord: SubcellCoord) -> Option<TerrainType> {
        self.index(coord).map(|i| self.cells[i])
    }

    pub fn profile_at(&self, coord: SubcellCoord) -> Option<&TerrainProfile> {
        self.terrain_at(coord).map(|t| self.table.profile(t))
    }

    pub fn is_passable(&self, coord: SubcellCoord) -> bool {
        self.terrain_at(coord)
            .map(|t| self.table.move_cost(t).is_some())
            .unwrap_or(false)
    }

    /// Set terrain at a coordinate
    pub fn set_terrain(&mut self, coord: SubcellCoord, terrain: TerrainType) {
        if let Some(i) = self.index(coord) {
            self.cells[i] = terrain;
        }
    }

    /// Paint an inclusive rectangle of subcells
    pub fn fill_rect(&mut self, from: SubcellCoord, to: SubcellCoord, terrain: TerrainType) {
        for y in from.y.min(to.y)..=from.y.max(to.y) {
            for x in from.x.min(to.x)..=from.x.max(to.x) {
                self.set_terrain(SubcellCoord::new(x, y), terrain);
            }
        }
    }

    /// Paint a whole command cell
    pub fn fill_cell(&mut self, cell: CommandCell, terrain: TerrainType) {
        let (min, max) = self.cell_bounds(cell);
        self.fill_rect(min, max, terrain);
    }

    pub fn contains_cell(&self, cell: CommandCell) -> bool {
        cell.col < self.width_cells && cell.row < self.height_cells
    }

    /// Command cell containing a subcell
    pub fn cell_of(&self, coord: SubcellCoord) -> Option<CommandCell> {
        if !self.in_bounds(coord) {
            return None;
        }
        let size = self.cell_size as i32;
        CommandCell::new((coord.x / size) as u8, (coord.y / size) as u8)
    }

    /// Inclusive subcell bounds of a command cell
    pub fn cell_bounds(&self, cell: CommandCell) -> (SubcellCoord, SubcellCoord) {
        let size = self.cell_size as i32;
        let min = SubcellCoord::new(cell.col as i32 * size, cell.row as i32 * size);
        (min, min.offset(size - 1, size - 1))
    }

    pub fn cell_center(&self, cell: CommandCell) -> SubcellCoord {
        let (min, _) = self.cell_bounds(cell);
        let half = self.cell_size as i32 / 2;
        min.offset(half, half)
    }

    /// Subcell at local coordinates inside a command cell
    pub fn subcell_in(&self, cell: CommandCell, local_x: u32, local_y: u32) -> Option<SubcellCoord> {
        if !self.contains_cell(cell) || local_x >= self.cell_size || local_y >= self.cell_size {
            return None;
        }
        let (min, _) = self.cell_bounds(cell);
        Some(min.offset(local_x as i32, local_y as i32))
    }

    /// Local coordinates of a subcell within its command cell
    pub fn local_of(&self, coord: SubcellCoord) -> Option<(u32, u32)> {
        if !self.in_bounds(coord) {
            return None;
        }
        let size = self.cell_size as i32;
        Some(((coord.x % size) as u32, (coord.y % size) as u32))
    }

    /// Is any subcell strictly between `from` and `to` LOS-blocking?
    pub fn has_line_of_sight(&self, from: SubcellCoord, to: SubcellCoord) -> bool {
        let line = from.line_to(&to);
        line.iter()
            .skip(1)
            .take(line.len().saturating_sub(2))
            .all(|coord| {
                self.terrain_at(*coord)
                    .map(|t| !self.table.blocks_los(t))
                    .unwrap_or(true)
            })
    }

    /// Pick the subcell a unit should aim for inside a command cell
    ///
    /// Closest passable subcell of preferred terrain to the cell center, else
    /// the closest passable subcell. Ties resolve by row then column.
    pub fn station(&self, cell: CommandCell, prefer: &[TerrainType]) -> Option<SubcellCoord> {
        if !self.contains_cell(cell) {
            return None;
        }
        let center = self.cell_center(cell);
        let (min, max) = self.cell_bounds(cell);

        let mut best_preferred: Option<(i64, SubcellCoord)> = None;
        let mut best_any: Option<(i64, SubcellCoord)> = None;

        for y in min.y..=max.y {
            for x in min.x..=max.x {
                let coord = SubcellCoord::new(x, y);
                let Some(terrain) = self.terrain_at(coord) else {
                    continue;
                };
                if self.table.move_cost(terrain).is_none() {
                    continue;
                }
                let dx = (coord.x - center.x) as i64;
                let dy = (coord.y - center.y) as i64;
                let d2 = dx * dx + dy * dy;

                // Row-major scan, so strict less-than keeps the first tie
                if best_any.map_or(true, |(best, _)| d2 < best) {
                    best_any = Some((d2, coord));
                }
                if prefer.contains(&terrain) && best_preferred.map_or(true, |(best, _)| d2 < best) {
                    best_preferred = Some((d2, coord));
                }
            }
        }

        best_preferred.or(best_any).map(|(_, coord)| coord)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_cell_parse() {
        let cell: CommandCell = "B4".parse().unwrap();
        assert_eq!(cell.col, 1);
        assert_eq!(cell.row, 4);
        assert_eq!(cell.to_string(), "B4");
        assert_eq!("j9".parse::<CommandCell>().unwrap().to_string(), "J9");
    }

    #[test]
    fn test_command_cell_parse_rejects_bad_labels() {
        assert!("K1".parse::<CommandCell>().is_err());
        assert!("A10".parse::<CommandCell>().is_err());
        assert!("1A".parse::<CommandCell>().is_err());
        assert!("".parse::<CommandCell>().is_err());
    }

    #[test]
    fn test_command_cell_serde_as_string() {
        let cell: CommandCell = serde_json::from_str("\"C7\"").unwrap();
        assert_eq!(cell, CommandCell::new(2, 7).unwrap());
        assert_eq!(serde_json::to_string(&cell).unwrap(), "\"C7\"");
    }

    #[test]
    fn test_subcell_ordering_row_major() {
        assert!(SubcellCoord::new(5, 0) < SubcellCoord::new(0, 1));
        assert!(SubcellCoord::new(0, 1) < SubcellCoord::new(1, 1));
    }

    #[test]
    fn test_line_includes_endpoints() {
        let a = SubcellCoord::new(0, 0);
        let b = SubcellCoord::new(5, 2);
        let line = a.line_to(&b);
        assert_eq!(line.first(), Some(&a));
        assert_eq!(line.last(), Some(&b));
        assert_eq!(line.len(), 6);
    }

    #[test]
    fn test_cell_of_and_bounds() {
        let grid = TerrainGrid::new(3, 3, 10, TerrainType::Open).unwrap();
        let cell = grid.cell_of(SubcellCoord::new(15, 27)).unwrap();
        assert_eq!(cell.to_string(), "B2");
        let (min, max) = grid.cell_bounds(cell);
        assert_eq!(min, SubcellCoord::new(10, 20));
        assert_eq!(max, SubcellCoord::new(19, 29));
        assert_eq!(grid.local_of(SubcellCoord::new(15, 27)), Some((5, 7)));
        assert!(grid.cell_of(SubcellCoord::new(30, 0)).is_none());
    }

    #[test]
    fn test_line_of_sight_blocked_by_forest() {
        let mut grid = TerrainGrid::new(2, 1, 10, TerrainType::Open).unwrap();
        let from = SubcellCoord::new(0, 5);
        let to = SubcellCoord::new(15, 5);
        assert!(grid.has_line_of_sight(from, to));

        grid.set_terrain(SubcellCoord::new(8, 5), TerrainType::Forest);
        assert!(!grid.has_line_of_sight(from, to));
    }

    #[test]
    fn test_endpoints_do_not_block_los() {
        let mut grid = TerrainGrid::new(1, 1, 10, TerrainType::Open).unwrap();
        grid.set_terrain(SubcellCoord::new(0, 0), TerrainType::Building);
        grid.set_terrain(SubcellCoord::new(9, 0), TerrainType::Forest);
        assert!(grid.has_line_of_sight(SubcellCoord::new(0, 0), SubcellCoord::new(9, 0)));
    }

    #[test]
    fn test_from_rows() {
        let grid = TerrainGrid::from_rows(2, &["..FF", "..FF", "~~==", "~~=="]).unwrap();
        assert_eq!(grid.width_cells, 2);
        assert_eq!(grid.height_cells, 2);
        assert_eq!(grid.terrain_at(SubcellCoord::new(3, 0)), Some(TerrainType::Forest));
        assert_eq!(grid.terrain_at(SubcellCoord::new(0, 3)), Some(TerrainType::Water));
        assert!(!grid.is_passable(SubcellCoord::new(1, 2)));
    }

    #[test]
    fn test_from_rows_rejects_ragged_input() {
        assert!(TerrainGrid::from_rows(2, &["..", "..."]).is_err());
        assert!(TerrainGrid::from_rows(2, &["...", "..."]).is_err());
        assert!(TerrainGrid::from_rows(2, &["?.", ".."]).is_err());
    }

    #[test]
    fn test_oversized_grid_is_corrupt() {
        assert!(matches!(
            TerrainGrid::new(11, 1, 1, TerrainType::Open),
            Err(TacticalError::CorruptTerrain(_))
        ));
    }

    #[test]
    fn test_cell_size_capped_before_allocation() {
        assert!(matches!(
            TerrainGrid::new(10, 10, u32::MAX, TerrainType::Open),
            Err(TacticalError::CorruptTerrain(_))
        ));
        assert!(TerrainGrid::new(1, 1, DEFAULT_CELL_SIZE + 1, TerrainType::Open).is_err());
        assert!(TerrainGrid::new(1, 1, 0, TerrainType::Open).is_err());
        assert!(TerrainGrid::new(1, 1, DEFAULT_CELL_SIZE, TerrainType::Open).is_ok());

        // 11 command cells wide would wrap if narrowed before the check
        let wide = ".".repeat(11);
        assert!(TerrainGrid::from_rows(1, &[wide.as_str()]).is_err());
    }

    #[test]
    fn test_station_prefers_terrain() {
        let mut grid = TerrainGrid::new(1, 1, 10, TerrainType::Open).unwrap();
        grid.set_terrain(SubcellCoord::new(1, 1), TerrainType::Forest);

        let center = grid.station(CommandCell::new(0, 0).unwrap(), &[]).unwrap();
        assert_eq!(center, SubcellCoord::new(5, 5));

        let concealed = grid
            .station(CommandCell::new(0, 0).unwrap(), &[TerrainType::Forest])
            .unwrap();
        assert_eq!(concealed, SubcellCoord::new(1, 1));
    }

    #[test]
    fn test_station_avoids_water() {
        let mut grid = TerrainGrid::new(1, 1, 10, TerrainType::Open).unwrap();
        grid.set_terrain(SubcellCoord::new(5, 5), TerrainType::Water);
        let station = grid.station(CommandCell::new(0, 0).unwrap(), &[]).unwrap();
        assert_ne!(station, SubcellCoord::new(5, 5));
        assert_eq!(station, SubcellCoord::new(5, 4));
    }
}
