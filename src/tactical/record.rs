//! Match record: seed, setup and every accepted order with its intake tick
//!
//! Replaying a record against the same terrain and config regenerates the
//! original run tick for tick.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::config::TacticalConfig;
use crate::core::error::Result;
use crate::core::types::{MatchId, Side, Tick};
use crate::tactical::execution::{Match, TickReport};
use crate::tactical::grid::TerrainGrid;
use crate::tactical::orders::Order;
use crate::tactical::roster::MatchSetup;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedOrder {
    pub intake_tick: Tick,
    pub side: Side,
    /// As submitted, before boundary defaults
    pub order: Order,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: MatchId,
    pub setup: MatchSetup,
    pub orders: Vec<RecordedOrder>,
}

impl MatchRecord {
    pub fn new(match_id: MatchId, setup: MatchSetup) -> Self {
        Self {
            match_id,
            setup,
            orders: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, intake_tick: Tick, side: Side, order: Order) {
        self.orders.push(RecordedOrder {
            intake_tick,
            side,
            order,
        });
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Re-run the match for up to `ticks` ticks, feeding each recorded order
    /// back in just before its intake tick
    pub fn replay(
        &self,
        terrain: Arc<TerrainGrid>,
        config: TacticalConfig,
        ticks: u64,
    ) -> Result<(Match, Vec<TickReport>)> {
        let mut m = Match::new(self.setup.clone(), terrain, config)?;
        let mut pending = self.orders.iter().peekable();
        let mut reports = Vec::new();

        for _ in 0..ticks {
            if m.is_finished() {
                break;
            }
            let next = m.tick() + 1;
            while let Some(recorded) = pending.next_if(|r| r.intake_tick <= next) {
                m.submit(recorded.side, recorded.order.clone());
            }
            reports.push(m.step()?);
        }

        tracing::debug!(
            ticks = reports.len(),
            orders = self.orders.len(),
            "Replay complete"
        );
        Ok((m, reports))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::UnitId;
    use crate::tactical::grid::CommandCell;
    use crate::tactical::roster::RosterEntry;
    use crate::tactical::terrain::TerrainType;
    use crate::tactical::units::Roe;

    fn cell(label: &str) -> CommandCell {
        label.parse().unwrap()
    }

    fn terrain() -> Arc<TerrainGrid> {
        let mut grid = TerrainGrid::new(5, 5, 10, TerrainType::Open).unwrap();
        grid.fill_cell(cell("C2"), TerrainType::Forest);
        Arc::new(grid)
    }

    fn setup() -> MatchSetup {
        MatchSetup::new(17)
            .unit(RosterEntry::new("Red", Side::Friendly, cell("A0")).with_roe(Roe::Free))
            .unit(RosterEntry::new("Blue", Side::Enemy, cell("E4")).with_roe(Roe::Free))
            .tent(Side::Friendly, cell("A4"), None)
            .tent(Side::Enemy, cell("E0"), None)
    }

    #[test]
    fn test_replay_reproduces_snapshots() {
        let mut live = Match::new(setup(), terrain(), TacticalConfig::default()).unwrap();
        let mut original = Vec::new();
        for tick in 0..60u64 {
            if tick == 2 {
                live.submit(Side::Friendly, Order::move_to(vec![UnitId(1)], vec![cell("D3").into()]));
            }
            if tick == 9 {
                live.submit(Side::Enemy, Order::move_to(vec![UnitId(2)], vec![cell("B1").into()]));
            }
            if live.is_finished() {
                break;
            }
            original.push(live.step().unwrap().snapshot);
        }
        assert_eq!(live.record.orders.len(), 2);

        let record = MatchRecord::from_json(&live.record.to_json().unwrap()).unwrap();
        let (_, reports) = record
            .replay(terrain(), TacticalConfig::default(), original.len() as u64)
            .unwrap();
        let replayed: Vec<_> = reports.into_iter().map(|r| r.snapshot).collect();
        assert_eq!(original, replayed);
    }

    #[test]
    fn test_rejected_orders_not_recorded() {
        let mut m = Match::new(setup(), terrain(), TacticalConfig::default()).unwrap();
        m.submit(Side::Friendly, Order::hold(vec![UnitId(2)]));
        m.step().unwrap();
        assert!(m.record.orders.is_empty());
        assert_eq!(m.dispatch_log.len(), 1);
    }
}
