//! Tactical constants that are not tunable per match
//!
//! Tunable numbers live in `core::config::TacticalConfig`.

// Time
pub const TICK_MS: u32 = 100;
pub const TICKS_PER_SECOND: u32 = 1000 / TICK_MS;

// Command grid: columns A-J, rows 0-9
pub const MAX_COMMAND_COLUMNS: u8 = 10;
pub const MAX_COMMAND_ROWS: u8 = 10;
pub const DEFAULT_CELL_SIZE: u32 = 100;

// Pathfinding
pub const DIAGONAL_STEP: f32 = std::f32::consts::SQRT_2;
