//! Terrain classification and per-type modifiers
//!
//! The grid is supplied finished; the core only reads these tables.

use serde::{Deserialize, Serialize};

/// Terrain classification of a subcell
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TerrainType {
    Road,
    #[default]
    Open,
    Forest,
    Building,
    Water,
}

impl TerrainType {
    pub const ALL: [TerrainType; 5] = [
        TerrainType::Road,
        TerrainType::Open,
        TerrainType::Forest,
        TerrainType::Building,
        TerrainType::Water,
    ];

    /// Single-character glyph used by text grids and the CLI
    pub fn glyph(&self) -> char {
        match self {
            TerrainType::Road => '=',
            TerrainType::Open => '.',
            TerrainType::Forest => 'F',
            TerrainType::Building => 'B',
            TerrainType::Water => '~',
        }
    }

    pub fn from_glyph(c: char) -> Option<TerrainType> {
        match c {
            '=' => Some(TerrainType::Road),
            '.' => Some(TerrainType::Open),
            'F' => Some(TerrainType::Forest),
            'B' => Some(TerrainType::Building),
            '~' => Some(TerrainType::Water),
            _ => None,
        }
    }
}

/// Movement, concealment and cover modifiers for one terrain type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerrainProfile {
    /// Movement cost multiplier (1.0 = normal)
    pub move_cost: f32,
    /// Reduction of the chance to be detected (0.0 = none, 1.0 = invisible)
    pub concealment: f32,
    /// Reduction of the chance to be hit (0.0 = none, 1.0 = full)
    pub cover: f32,
    pub passable: bool,
    pub blocks_los: bool,
}

/// Per-type terrain modifiers for a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainTable {
    pub road: TerrainProfile,
    pub open: TerrainProfile,
    pub forest: TerrainProfile,
    pub building: TerrainProfile,
    pub water: TerrainProfile,
}

impl Default for TerrainTable {
    fn default() -> Self {
        Self {
            road: TerrainProfile {
                move_cost: 0.8,
                concealment: 0.0,
                cover: 0.0,
                passable: true,
                blocks_los: false,
            },
            open: TerrainProfile {
                move_cost: 1.0,
                concealment: 0.05,
                cover: 0.0,
                passable: true,
                blocks_los: false,
            },
            forest: TerrainProfile {
                move_cost: 2.0,
                concealment: 0.5,
                cover: 0.3,
                passable: true,
                blocks_los: true,
            },
            building: TerrainProfile {
                move_cost: 3.0,
                concealment: 0.6,
                cover: 0.6,
                passable: true,
                blocks_los: true,
            },
            water: TerrainProfile {
                move_cost: f32::INFINITY,
                concealment: 0.0,
                cover: 0.0,
                passable: false,
                blocks_los: false,
            },
        }
    }
}

impl TerrainTable {
    pub fn profile(&self, terrain: TerrainType) -> &TerrainProfile {
        match terrain {
            TerrainType::Road => &self.road,
            TerrainType::Open => &self.open,
            TerrainType::Forest => &self.forest,
            TerrainType::Building => &self.building,
            TerrainType::Water => &self.water,
        }
    }

    /// Movement cost, or None if impassable
    pub fn move_cost(&self, terrain: TerrainType) -> Option<f32> {
        let profile = self.profile(terrain);
        if profile.passable && profile.move_cost.is_finite() && profile.move_cost > 0.0 {
            Some(profile.move_cost)
        } else {
            None
        }
    }

    /// Speed multiplier for a unit standing on this terrain
    pub fn speed_multiplier(&self, terrain: TerrainType) -> f32 {
        self.move_cost(terrain).map(|cost| 1.0 / cost).unwrap_or(0.0)
    }

    pub fn blocks_los(&self, terrain: TerrainType) -> bool {
        self.profile(terrain).blocks_los
    }

    /// Check every passable profile has a usable cost
    pub fn validate(&self) -> Result<(), String> {
        for terrain in TerrainType::ALL {
            let profile = self.profile(terrain);
            if profile.passable && !(profile.move_cost.is_finite() && profile.move_cost > 0.0) {
                return Err(format!(
                    "{:?} is passable but has move cost {}",
                    terrain, profile.move_cost
                ));
            }
            if !(0.0..=1.0).contains(&profile.concealment) || !(0.0..=1.0).contains(&profile.cover)
            {
                return Err(format!("{:?} concealment/cover outside [0, 1]", terrain));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_terrain_no_penalty() {
        let table = TerrainTable::default();
        assert_eq!(table.move_cost(TerrainType::Open), Some(1.0));
    }

    #[test]
    fn test_water_impassable() {
        let table = TerrainTable::default();
        assert_eq!(table.move_cost(TerrainType::Water), None);
        assert_eq!(table.speed_multiplier(TerrainType::Water), 0.0);
    }

    #[test]
    fn test_forest_blocks_los() {
        let table = TerrainTable::default();
        assert!(table.blocks_los(TerrainType::Forest));
        assert!(table.blocks_los(TerrainType::Building));
        assert!(!table.blocks_los(TerrainType::Road));
    }

    #[test]
    fn test_road_faster_than_open() {
        let table = TerrainTable::default();
        assert!(table.speed_multiplier(TerrainType::Road) > table.speed_multiplier(TerrainType::Open));
    }

    #[test]
    fn test_glyph_roundtrip() {
        for terrain in TerrainType::ALL {
            assert_eq!(TerrainType::from_glyph(terrain.glyph()), Some(terrain));
        }
    }

    #[test]
    fn test_broken_table_fails_validation() {
        let mut table = TerrainTable::default();
        table.forest.move_cost = f32::INFINITY;
        assert!(table.validate().is_err());
    }
}
