//! Per-tick observable state
//!
//! Snapshots carry only what a spectator could see. Identical seeds and
//! order streams must produce byte-identical snapshot sequences, so no
//! match id, wall-clock time or hash-ordered collection appears here.

use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::core::types::{Side, Tick, UnitId};
use crate::tactical::execution::{Match, MatchOutcome};
use crate::tactical::grid::{CommandCell, SubcellCoord};
use crate::tactical::units::{BehaviorState, HealthState, Posture, Roe};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub id: UnitId,
    pub callsign: String,
    pub side: Side,
    pub position: SubcellCoord,
    pub cell: Option<CommandCell>,
    pub health: HealthState,
    pub posture: Posture,
    pub roe: Roe,
    pub state: BehaviorState,
    pub rounds: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TentSnapshot {
    pub side: Side,
    pub position: SubcellCoord,
    pub destroyed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: Tick,
    pub outcome: MatchOutcome,
    pub units: Vec<UnitSnapshot>,
    pub tents: Vec<TentSnapshot>,
}

impl Snapshot {
    pub fn capture(m: &Match) -> Self {
        let units = m
            .units
            .values()
            .map(|u| UnitSnapshot {
                id: u.id,
                callsign: u.callsign.clone(),
                side: u.side,
                position: u.position,
                cell: m.terrain.cell_of(u.position),
                health: u.health,
                posture: u.posture,
                roe: u.roe,
                state: u.state,
                rounds: u.fire.rounds,
            })
            .collect();
        let tents = m
            .tents
            .values()
            .map(|t| TentSnapshot {
                side: t.side,
                position: t.position,
                destroyed: t.destroyed,
            })
            .collect();

        Self {
            tick: m.tick(),
            outcome: m.outcome,
            units,
            tents,
        }
    }

    pub fn unit(&self, id: UnitId) -> Option<&UnitSnapshot> {
        self.units.iter().find(|u| u.id == id)
    }

    pub fn living(&self, side: Side) -> usize {
        self.units
            .iter()
            .filter(|u| u.side == side && u.health.is_alive())
            .count()
    }

    /// Canonical bytes used for determinism comparisons
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::core::config::TacticalConfig;
    use crate::tactical::grid::TerrainGrid;
    use crate::tactical::roster::{MatchSetup, RosterEntry};
    use crate::tactical::terrain::TerrainType;

    fn build(seed: u64) -> Match {
        let terrain = Arc::new(TerrainGrid::new(3, 3, 10, TerrainType::Open).unwrap());
        let setup = MatchSetup::new(seed)
            .unit(RosterEntry::new("Red", Side::Friendly, "A0".parse().unwrap()))
            .unit(RosterEntry::new("Blue", Side::Enemy, "C2".parse().unwrap()))
            .tent(Side::Enemy, "C2".parse().unwrap(), None);
        Match::new(setup, terrain, TacticalConfig::default()).unwrap()
    }

    #[test]
    fn test_capture_lists_units_in_id_order() {
        let m = build(1);
        let snap = m.snapshot();
        assert_eq!(snap.tick, 0);
        let ids: Vec<_> = snap.units.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![UnitId(1), UnitId(2)]);
        assert_eq!(snap.unit(UnitId(2)).unwrap().cell, Some("C2".parse::<CommandCell>().unwrap()));
        assert_eq!(snap.living(Side::Friendly), 1);
        assert_eq!(snap.tents.len(), 1);
    }

    #[test]
    fn test_snapshot_bytes_ignore_match_id() {
        let a = build(9);
        let b = build(9);
        assert_ne!(a.id, b.id);
        assert_eq!(a.snapshot().to_json().unwrap(), b.snapshot().to_json().unwrap());
    }
}
