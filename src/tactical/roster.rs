//! Match setup: roster entries and tent placements
//!
//! Unit ids are handed out in roster order starting at 1.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::error::{Result, TacticalError};
use crate::core::types::{Side, UnitId};
use crate::tactical::grid::{CommandCell, SubcellCoord, TerrainGrid};
use crate::tactical::rng::{DrawKey, DrawPurpose, TickStream};
use crate::tactical::units::{CommandTent, Fireteam, FireteamName, Posture, Roe, Unit};

/// Attempts at a random passable spawn before falling back to the cell station
const SPAWN_ATTEMPTS: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub callsign: String,
    pub side: Side,
    #[serde(default)]
    pub fireteam: Option<FireteamName>,
    #[serde(default)]
    pub leader: bool,
    pub cell: CommandCell,
    /// Local (x, y) inside `cell`; jittered when absent
    #[serde(default)]
    pub subcell: Option<[u32; 2]>,
    #[serde(default)]
    pub posture: Posture,
    #[serde(default)]
    pub roe: Roe,
}

impl RosterEntry {
    pub fn new(callsign: impl Into<String>, side: Side, cell: CommandCell) -> Self {
        Self {
            callsign: callsign.into(),
            side,
            fireteam: None,
            leader: false,
            cell,
            subcell: None,
            posture: Posture::Stand,
            roe: Roe::ReturnFire,
        }
    }

    pub fn at(mut self, local_x: u32, local_y: u32) -> Self {
        self.subcell = Some([local_x, local_y]);
        self
    }

    pub fn in_team(mut self, name: FireteamName) -> Self {
        self.fireteam = Some(name);
        self
    }

    pub fn leading(mut self) -> Self {
        self.leader = true;
        self
    }

    pub fn with_roe(mut self, roe: Roe) -> Self {
        self.roe = roe;
        self
    }

    pub fn with_posture(mut self, posture: Posture) -> Self {
        self.posture = posture;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TentPlacement {
    pub side: Side,
    pub cell: CommandCell,
    #[serde(default)]
    pub subcell: Option<[u32; 2]>,
}

/// Everything needed to start a match, and to replay it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSetup {
    pub seed: u64,
    pub roster: Vec<RosterEntry>,
    #[serde(default)]
    pub tents: Vec<TentPlacement>,
}

impl MatchSetup {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            roster: Vec::new(),
            tents: Vec::new(),
        }
    }

    pub fn unit(mut self, entry: RosterEntry) -> Self {
        self.roster.push(entry);
        self
    }

    pub fn tent(mut self, side: Side, cell: CommandCell, subcell: Option<[u32; 2]>) -> Self {
        self.tents.push(TentPlacement { side, cell, subcell });
        self
    }
}

/// Units, fireteams and tents built from a setup
pub struct Deployment {
    pub units: BTreeMap<UnitId, Unit>,
    pub fireteams: Vec<Fireteam>,
    pub tents: BTreeMap<Side, CommandTent>,
}

fn explicit_position(grid: &TerrainGrid, cell: CommandCell, local: [u32; 2], what: &str) -> Result<SubcellCoord> {
    let coord = grid.subcell_in(cell, local[0], local[1]).ok_or_else(|| {
        TacticalError::InvalidSetup(format!("{what}: subcell {local:?} outside {cell}"))
    })?;
    if !grid.is_passable(coord) {
        return Err(TacticalError::InvalidSetup(format!(
            "{what}: {cell} {local:?} is impassable"
        )));
    }
    Ok(coord)
}

/// Spawn position for a unit without explicit local coordinates
fn jittered_position(grid: &TerrainGrid, stream: &TickStream, id: UnitId, cell: CommandCell) -> Option<SubcellCoord> {
    let mut rng = stream.rng(DrawPurpose::SpawnJitter, DrawKey::Unit(id), DrawKey::None);
    for _ in 0..SPAWN_ATTEMPTS {
        let lx = rng.gen_range(0..grid.cell_size);
        let ly = rng.gen_range(0..grid.cell_size);
        if let Some(coord) = grid.subcell_in(cell, lx, ly) {
            if grid.is_passable(coord) {
                return Some(coord);
            }
        }
    }
    grid.station(cell, &[])
}

/// Place every roster entry and tent on the grid
pub fn deploy(setup: &MatchSetup, grid: &TerrainGrid) -> Result<Deployment> {
    let spawn_stream = TickStream::new(setup.seed, 0);
    let mut units = BTreeMap::new();
    let mut callsigns = BTreeSet::new();
    let mut teams: BTreeMap<(Side, FireteamName), (Vec<UnitId>, Vec<UnitId>)> = BTreeMap::new();

    for (index, entry) in setup.roster.iter().enumerate() {
        let id = UnitId(index as u32 + 1);
        if !callsigns.insert(entry.callsign.clone()) {
            return Err(TacticalError::InvalidSetup(format!(
                "duplicate callsign {}",
                entry.callsign
            )));
        }
        if !grid.contains_cell(entry.cell) {
            return Err(TacticalError::InvalidSetup(format!(
                "{} placed in {} outside the grid",
                entry.callsign, entry.cell
            )));
        }

        let position = match entry.subcell {
            Some(local) => explicit_position(grid, entry.cell, local, &entry.callsign)?,
            None => jittered_position(grid, &spawn_stream, id, entry.cell).ok_or_else(|| {
                TacticalError::InvalidSetup(format!(
                    "{}: no passable subcell in {}",
                    entry.callsign, entry.cell
                ))
            })?,
        };

        let mut unit = Unit::new(id, entry.callsign.clone(), entry.side, position);
        unit.posture = entry.posture;
        unit.roe = entry.roe;
        unit.fireteam = entry.fireteam;
        units.insert(id, unit);

        if let Some(name) = entry.fireteam {
            let (members, leaders) = teams.entry((entry.side, name)).or_default();
            members.push(id);
            if entry.leader {
                leaders.push(id);
            }
        }
    }

    let mut fireteams = Vec::with_capacity(teams.len());
    for ((side, name), (members, leaders)) in teams {
        let leader = match leaders.as_slice() {
            [] => members[0],
            [one] => *one,
            _ => {
                return Err(TacticalError::InvalidSetup(format!(
                    "fireteam {name:?} of {side:?} has more than one leader"
                )))
            }
        };
        fireteams.push(Fireteam {
            name,
            side,
            members,
            leader,
        });
    }

    let mut tents = BTreeMap::new();
    for placement in &setup.tents {
        let what = format!("{:?} tent", placement.side);
        if !grid.contains_cell(placement.cell) {
            return Err(TacticalError::InvalidSetup(format!(
                "{what} placed in {} outside the grid",
                placement.cell
            )));
        }
        let position = match placement.subcell {
            Some(local) => explicit_position(grid, placement.cell, local, &what)?,
            None => grid.station(placement.cell, &[]).ok_or_else(|| {
                TacticalError::InvalidSetup(format!("{what}: no passable subcell in {}", placement.cell))
            })?,
        };
        if tents
            .insert(placement.side, CommandTent::new(placement.side, position))
            .is_some()
        {
            return Err(TacticalError::InvalidSetup(format!("{what} placed twice")));
        }
    }

    Ok(Deployment {
        units,
        fireteams,
        tents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tactical::terrain::TerrainType;

    fn cell(label: &str) -> CommandCell {
        label.parse().unwrap()
    }

    fn grid() -> TerrainGrid {
        TerrainGrid::new(4, 4, 10, TerrainType::Open).unwrap()
    }

    #[test]
    fn test_ids_follow_roster_order() {
        let setup = MatchSetup::new(1)
            .unit(RosterEntry::new("Red", Side::Friendly, cell("A1")).at(0, 0))
            .unit(RosterEntry::new("Blue", Side::Enemy, cell("D3")).at(5, 5));
        let deployed = deploy(&setup, &grid()).unwrap();
        assert_eq!(deployed.units[&UnitId(1)].callsign, "Red");
        assert_eq!(deployed.units[&UnitId(2)].position, SubcellCoord::new(35, 35));
    }

    #[test]
    fn test_jitter_is_deterministic_and_inside_cell() {
        let setup = MatchSetup::new(77).unit(RosterEntry::new("Red", Side::Friendly, cell("B2")));
        let a = deploy(&setup, &grid()).unwrap();
        let b = deploy(&setup, &grid()).unwrap();
        let pos = a.units[&UnitId(1)].position;
        assert_eq!(pos, b.units[&UnitId(1)].position);
        assert_eq!(grid().cell_of(pos), Some(cell("B2")));
    }

    #[test]
    fn test_fireteam_leader_defaults_to_first_member() {
        let setup = MatchSetup::new(1)
            .unit(RosterEntry::new("A1", Side::Friendly, cell("A1")).in_team(FireteamName::Alpha))
            .unit(RosterEntry::new("A2", Side::Friendly, cell("A1")).in_team(FireteamName::Alpha));
        let deployed = deploy(&setup, &grid()).unwrap();
        assert_eq!(deployed.fireteams.len(), 1);
        assert_eq!(deployed.fireteams[0].leader, UnitId(1));
    }

    #[test]
    fn test_two_leaders_rejected() {
        let setup = MatchSetup::new(1)
            .unit(RosterEntry::new("A1", Side::Friendly, cell("A1")).in_team(FireteamName::Alpha).leading())
            .unit(RosterEntry::new("A2", Side::Friendly, cell("A1")).in_team(FireteamName::Alpha).leading());
        assert!(matches!(deploy(&setup, &grid()), Err(TacticalError::InvalidSetup(_))));
    }

    #[test]
    fn test_duplicate_callsign_rejected() {
        let setup = MatchSetup::new(1)
            .unit(RosterEntry::new("Red", Side::Friendly, cell("A1")))
            .unit(RosterEntry::new("Red", Side::Friendly, cell("A2")));
        assert!(deploy(&setup, &grid()).is_err());
    }

    #[test]
    fn test_unit_on_water_rejected() {
        let mut g = grid();
        g.fill_cell(cell("A1"), TerrainType::Water);
        let setup = MatchSetup::new(1).unit(RosterEntry::new("Red", Side::Friendly, cell("A1")).at(1, 1));
        assert!(deploy(&setup, &g).is_err());
    }

    #[test]
    fn test_tents_placed_at_station() {
        let setup = MatchSetup::new(1).tent(Side::Enemy, cell("D3"), None);
        let deployed = deploy(&setup, &grid()).unwrap();
        let tent = &deployed.tents[&Side::Enemy];
        assert_eq!(tent.position, grid().cell_center(cell("D3")));
        assert!(!tent.destroyed);
    }

    #[test]
    fn test_second_tent_rejected() {
        let setup = MatchSetup::new(1)
            .tent(Side::Enemy, cell("D3"), None)
            .tent(Side::Enemy, cell("C3"), None);
        assert!(deploy(&setup, &grid()).is_err());
    }
}
