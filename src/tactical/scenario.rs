//! TOML scenario files for the headless runner and integration tests
//!
//! A scenario bundles terrain, config overrides, roster, tents and a script
//! of timed orders. Scripted orders name units by callsign; ids are resolved
//! from roster order when the scenario is built.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::config::TacticalConfig;
use crate::core::error::{Result, TacticalError};
use crate::core::types::{Side, Tick, UnitId};
use crate::tactical::constants::DEFAULT_CELL_SIZE;
use crate::tactical::execution::{Match, TickReport};
use crate::tactical::grid::{CommandCell, SubcellCoord, TerrainGrid};
use crate::tactical::orders::Order;
use crate::tactical::roster::{MatchSetup, RosterEntry, TentPlacement};
use crate::tactical::terrain::{TerrainTable, TerrainType};

const DEMO_SCENARIO: &str = include_str!("../../data/scenarios/skirmish.toml");

fn default_ticks() -> u64 {
    600
}

fn default_cell_size() -> u32 {
    DEFAULT_CELL_SIZE
}

/// Paint whole command cells
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellPaint {
    pub cells: Vec<CommandCell>,
    pub terrain: TerrainType,
}

/// Paint an inclusive subcell rectangle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectPaint {
    pub from: [i32; 2],
    pub to: [i32; 2],
    pub terrain: TerrainType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainSpec {
    #[serde(default = "default_cell_size")]
    pub cell_size: u32,
    #[serde(default)]
    pub width: u8,
    #[serde(default)]
    pub height: u8,
    #[serde(default)]
    pub fill: TerrainType,
    /// Glyph rows; overrides width, height and fill when present
    #[serde(default)]
    pub rows: Option<Vec<String>>,
    #[serde(default)]
    pub cells: Vec<CellPaint>,
    #[serde(default)]
    pub rects: Vec<RectPaint>,
    #[serde(default)]
    pub table: Option<TerrainTable>,
}

impl TerrainSpec {
    pub fn build(&self) -> Result<TerrainGrid> {
        let mut grid = match &self.rows {
            Some(rows) => {
                let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
                TerrainGrid::from_rows(self.cell_size, &rows)?
            }
            None => TerrainGrid::new(self.width, self.height, self.cell_size, self.fill)?,
        };
        for paint in &self.cells {
            for cell in &paint.cells {
                if !grid.contains_cell(*cell) {
                    return Err(TacticalError::CorruptTerrain(format!(
                        "painted cell {cell} lies outside the grid"
                    )));
                }
                grid.fill_cell(*cell, paint.terrain);
            }
        }
        for rect in &self.rects {
            grid.fill_rect(
                SubcellCoord::new(rect.from[0], rect.from[1]),
                SubcellCoord::new(rect.to[0], rect.to[1]),
                rect.terrain,
            );
        }
        if let Some(table) = &self.table {
            grid = grid.with_table(table.clone());
        }
        grid.validate()?;
        Ok(grid)
    }
}

/// An order fed in at a fixed tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedOrder {
    /// Intake tick (orders at tick 0 are taken in on tick 1)
    pub tick: Tick,
    pub side: Side,
    #[serde(default)]
    pub callsigns: Vec<String>,
    pub order: Order,
}

/// On-disk scenario layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioFile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub seed: u64,
    #[serde(default = "default_ticks")]
    pub ticks: u64,
    pub terrain: TerrainSpec,
    #[serde(default)]
    pub config: TacticalConfig,
    #[serde(default)]
    pub units: Vec<RosterEntry>,
    #[serde(default)]
    pub tents: Vec<TentPlacement>,
    #[serde(default)]
    pub orders: Vec<ScriptedOrder>,
}

impl ScenarioFile {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Built-in two-sided skirmish
    pub fn demo() -> Result<Self> {
        Self::from_toml_str(DEMO_SCENARIO)
    }

    /// Resolve terrain, setup and script into a runnable scenario
    pub fn build(&self) -> Result<Scenario> {
        self.config.validate()?;
        let terrain = Arc::new(self.terrain.build()?);
        let setup = MatchSetup {
            seed: self.seed,
            roster: self.units.clone(),
            tents: self.tents.clone(),
        };

        let mut script = Vec::with_capacity(self.orders.len());
        for scripted in &self.orders {
            let mut order = scripted.order.clone();
            for callsign in &scripted.callsigns {
                order.units.push(self.resolve(callsign)?);
            }
            script.push((scripted.tick.max(1), scripted.side, order));
        }
        // Stable: same-tick orders keep file order
        script.sort_by_key(|(tick, _, _)| *tick);

        Ok(Scenario {
            name: self.name.clone(),
            ticks: self.ticks,
            terrain,
            config: self.config.clone(),
            setup,
            script,
        })
    }

    fn resolve(&self, callsign: &str) -> Result<UnitId> {
        self.units
            .iter()
            .position(|u| u.callsign == callsign)
            .map(|i| UnitId(i as u32 + 1))
            .ok_or_else(|| TacticalError::InvalidSetup(format!("unknown callsign '{callsign}' in order script")))
    }
}

/// A scenario ready to run
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub ticks: u64,
    pub terrain: Arc<TerrainGrid>,
    pub config: TacticalConfig,
    pub setup: MatchSetup,
    pub script: Vec<(Tick, Side, Order)>,
}

/// A finished scenario run
pub struct ScenarioRun {
    pub state: Match,
    pub reports: Vec<TickReport>,
}

impl Scenario {
    pub fn start(&self) -> Result<Match> {
        Match::new(self.setup.clone(), Arc::clone(&self.terrain), self.config.clone())
    }

    /// Run with a different seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.setup.seed = seed;
        self
    }

    /// Run for `ticks` ticks (or the scenario's own length), stopping when the match ends
    pub fn run(&self, ticks: Option<u64>) -> Result<ScenarioRun> {
        let ticks = ticks.unwrap_or(self.ticks);
        let mut state = self.start()?;
        let mut script = self.script.iter().peekable();
        let mut reports = Vec::new();

        tracing::info!(scenario = %self.name, ticks, "Running scenario");
        for _ in 0..ticks {
            if state.is_finished() {
                break;
            }
            let next = state.tick() + 1;
            while let Some((_, side, order)) = script.next_if(|(tick, _, _)| *tick <= next) {
                state.submit(*side, order.clone());
            }
            reports.push(state.step()?);
        }

        Ok(ScenarioRun { state, reports })
    }
}
