//! Match state and the tick scheduler
//!
//! Each tick: intake -> decide/path -> move -> combat -> radio -> snapshot

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::config::TacticalConfig;
use crate::core::error::{Result, TacticalError};
use crate::core::types::{MatchId, OrderId, Side, SubmissionId, Tick, UnitId};
use crate::tactical::behavior::{phase_decide, phase_move};
use crate::tactical::combat::{phase_combat, ShotRecord};
use crate::tactical::contacts::ContactBook;
use crate::tactical::dispatch::{dispatch_order, DispatchOutcome};
use crate::tactical::grid::TerrainGrid;
use crate::tactical::orders::Order;
use crate::tactical::radio::{RadioBus, RadioDestination, RadioEvent, RadioEventKind, RadioPayload, RadioSource};
use crate::tactical::record::MatchRecord;
use crate::tactical::rng::TickStream;
use crate::tactical::roster::{deploy, MatchSetup};
use crate::tactical::snapshot::Snapshot;
use crate::tactical::units::{CommandTent, Fireteam, FireteamName, Unit};

/// How the match stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchOutcome {
    #[default]
    InProgress,
    Victory { winner: Side, tick: Tick },
    Aborted { tick: Tick },
}

impl MatchOutcome {
    pub fn is_over(&self) -> bool {
        !matches!(self, MatchOutcome::InProgress)
    }
}

/// An order waiting for the next intake boundary
#[derive(Debug, Clone)]
struct Submission {
    id: SubmissionId,
    side: Side,
    order: Order,
}

/// Everything observable about one completed tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: Tick,
    pub snapshot: Snapshot,
    pub dispatched: Vec<DispatchOutcome>,
    pub radio: Vec<RadioEvent>,
    pub shots: Vec<ShotRecord>,
}

/// Complete match state
pub struct Match {
    pub id: MatchId,
    pub seed: u64,
    pub config: TacticalConfig,
    pub terrain: Arc<TerrainGrid>,

    // Time
    tick: Tick,
    last_snapshot_tick: Option<Tick>,
    pub outcome: MatchOutcome,

    // Forces
    pub units: BTreeMap<UnitId, Unit>,
    pub fireteams: Vec<Fireteam>,
    pub tents: BTreeMap<Side, CommandTent>,
    pub contacts: BTreeMap<Side, ContactBook>,

    // Communication
    pub radio: RadioBus,
    submissions: Vec<Submission>,
    next_submission: u64,
    next_order: u64,

    // Logs
    pub dispatch_log: Vec<DispatchOutcome>,
    pub shot_log: Vec<ShotRecord>,
    pub record: MatchRecord,
}

impl Match {
    pub fn new(setup: MatchSetup, terrain: Arc<TerrainGrid>, config: TacticalConfig) -> Result<Self> {
        config.validate()?;
        terrain.validate()?;

        let deployment = deploy(&setup, &terrain)?;
        let mut units = deployment.units;
        for unit in units.values_mut() {
            unit.fire.rounds = config.weapon.magazine;
        }

        let mut contacts = BTreeMap::new();
        contacts.insert(Side::Friendly, ContactBook::default());
        contacts.insert(Side::Enemy, ContactBook::default());

        let id = MatchId::new();
        tracing::info!(
            seed = setup.seed,
            units = units.len(),
            tents = deployment.tents.len(),
            "Match started"
        );

        Ok(Self {
            id,
            seed: setup.seed,
            radio: RadioBus::new(&config.radio),
            config,
            terrain,
            tick: 0,
            last_snapshot_tick: None,
            outcome: MatchOutcome::InProgress,
            units,
            fireteams: deployment.fireteams,
            tents: deployment.tents,
            contacts,
            submissions: Vec::new(),
            next_submission: 0,
            next_order: 0,
            dispatch_log: Vec::new(),
            shot_log: Vec::new(),
            record: MatchRecord::new(id, setup),
        })
    }

    /// Last completed tick (0 before the first step)
    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_over()
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    pub fn unit_id(&self, callsign: &str) -> Option<UnitId> {
        self.units
            .values()
            .find(|u| u.callsign == callsign)
            .map(|u| u.id)
    }

    pub fn tent(&self, side: Side) -> Option<&CommandTent> {
        self.tents.get(&side)
    }

    pub fn fireteam(&self, side: Side, name: FireteamName) -> Option<&Fireteam> {
        self.fireteams
            .iter()
            .find(|t| t.side == side && t.name == name)
    }

    /// Ids of living units in merge order
    pub fn living_ids(&self) -> Vec<UnitId> {
        self.units
            .values()
            .filter(|u| u.is_alive())
            .map(|u| u.id)
            .collect()
    }

    /// Whether per-unit work this tick should fan out across threads
    pub(crate) fn parallel(&self) -> bool {
        let living = self.units.values().filter(|u| u.is_alive()).count();
        living >= self.config.parallel_threshold
    }

    pub(crate) fn next_order_id(&mut self) -> OrderId {
        self.next_order += 1;
        OrderId(self.next_order)
    }

    pub(crate) fn emit(
        &mut self,
        source: RadioSource,
        destination: RadioDestination,
        kind: RadioEventKind,
        payload: RadioPayload,
    ) {
        self.radio.emit(self.tick, source, destination, kind, payload);
    }

    /// Buffer an order for the next intake boundary
    pub fn submit(&mut self, side: Side, order: Order) -> SubmissionId {
        self.next_submission += 1;
        let id = SubmissionId(self.next_submission);
        self.submissions.push(Submission { id, side, order });
        id
    }

    pub fn dispatch_outcome(&self, submission: SubmissionId) -> Option<&DispatchOutcome> {
        self.dispatch_log.iter().find(|o| o.submission == submission)
    }

    /// End the match without a winner
    pub fn abort(&mut self) {
        if !self.is_finished() {
            self.outcome = MatchOutcome::Aborted { tick: self.tick };
            self.submissions.clear();
            tracing::info!(tick = self.tick, "Match aborted");
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(self)
    }

    /// Run several ticks, stopping early when the match ends
    pub fn run_ticks(&mut self, ticks: u64) -> Result<Vec<TickReport>> {
        let mut reports = Vec::new();
        for _ in 0..ticks {
            if self.is_finished() {
                break;
            }
            reports.push(self.step()?);
        }
        Ok(reports)
    }

    /// Run one tick
    pub fn step(&mut self) -> Result<TickReport> {
        if self.is_finished() {
            return Err(TacticalError::MatchOver);
        }
        self.check_invariants()?;

        let previous = self.tick;
        self.tick = previous.checked_add(1).ok_or(TacticalError::TickRegression {
            previous,
            current: 0,
        })?;
        let stream = TickStream::new(self.seed, self.tick);
        let radio_before = self.radio.log().len();
        let shots_before = self.shot_log.len();

        // ===== PHASE 1: ORDER INTAKE =====
        let dispatched = self.phase_intake();

        // ===== PHASE 2: DECIDE / PATH =====
        phase_decide(self);

        // ===== PHASE 3: MOVE =====
        phase_move(self);

        // ===== PHASE 4: COMBAT =====
        phase_combat(self, &stream);

        // ===== PHASE 5: RADIO =====
        self.phase_radio();

        // ===== PHASE 6: SNAPSHOT =====
        let snapshot = Snapshot::capture(self);
        if let Some(last) = self.last_snapshot_tick {
            if snapshot.tick <= last {
                return Err(TacticalError::TickRegression {
                    previous: last,
                    current: snapshot.tick,
                });
            }
        }
        self.last_snapshot_tick = Some(snapshot.tick);

        if let MatchOutcome::Victory { winner, tick } = self.outcome {
            tracing::info!(?winner, tick, "Match ended");
        }
        tracing::debug!(
            tick = self.tick,
            pending_radio = self.radio.pending_count(),
            "Tick complete"
        );

        Ok(TickReport {
            tick: self.tick,
            snapshot,
            dispatched,
            radio: self.radio.log()[radio_before..].to_vec(),
            shots: self.shot_log[shots_before..].to_vec(),
        })
    }

    fn check_invariants(&self) -> Result<()> {
        self.terrain.validate()?;
        if let Some(last) = self.last_snapshot_tick {
            if self.tick < last {
                return Err(TacticalError::TickRegression {
                    previous: last,
                    current: self.tick,
                });
            }
        }
        for unit in self.units.values().filter(|u| u.is_alive()) {
            if !self.terrain.in_bounds(unit.position) {
                return Err(TacticalError::CorruptTerrain(format!(
                    "{} stands outside the grid at {:?}",
                    unit.id, unit.position
                )));
            }
        }
        Ok(())
    }

    fn phase_intake(&mut self) -> Vec<DispatchOutcome> {
        let mut batch = std::mem::take(&mut self.submissions);
        batch.sort_by(|a, b| b.order.priority.cmp(&a.order.priority).then(a.id.cmp(&b.id)));

        let mut outcomes = Vec::with_capacity(batch.len());
        for submission in batch {
            let result = dispatch_order(self, submission.side, submission.order);
            let outcome = DispatchOutcome {
                submission: submission.id,
                side: submission.side,
                tick: self.tick,
                result,
            };
            self.dispatch_log.push(outcome.clone());
            outcomes.push(outcome);
        }
        outcomes
    }

    fn phase_radio(&mut self) {
        let delivered = self.radio.deliver(self.tick);
        for event in delivered {
            if let RadioDestination::Unit(id) = event.destination {
                if let Some(unit) = self.units.get_mut(&id).filter(|u| u.is_alive()) {
                    unit.inbox.push(event);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tactical::grid::CommandCell;
    use crate::tactical::roster::RosterEntry;
    use crate::tactical::terrain::TerrainType;

    fn cell(label: &str) -> CommandCell {
        label.parse().unwrap()
    }

    fn small_match() -> Match {
        let terrain = Arc::new(TerrainGrid::new(4, 4, 10, TerrainType::Open).unwrap());
        let setup = MatchSetup::new(3)
            .unit(RosterEntry::new("Red", Side::Friendly, cell("A0")).at(1, 1))
            .tent(Side::Friendly, cell("A0"), None)
            .tent(Side::Enemy, cell("D3"), None);
        Match::new(setup, terrain, TacticalConfig::default()).unwrap()
    }

    #[test]
    fn test_step_advances_tick() {
        let mut m = small_match();
        assert_eq!(m.tick(), 0);
        let report = m.step().unwrap();
        assert_eq!(report.tick, 1);
        assert_eq!(report.snapshot.tick, 1);
        assert_eq!(m.tick(), 1);
    }

    #[test]
    fn test_run_ticks() {
        let mut m = small_match();
        let reports = m.run_ticks(5).unwrap();
        assert_eq!(reports.len(), 5);
        assert_eq!(m.tick(), 5);
    }

    #[test]
    fn test_aborted_match_refuses_steps() {
        let mut m = small_match();
        m.step().unwrap();
        m.abort();
        assert_eq!(m.outcome, MatchOutcome::Aborted { tick: 1 });
        assert!(matches!(m.step(), Err(TacticalError::MatchOver)));
        assert!(m.run_ticks(3).unwrap().is_empty());
    }

    #[test]
    fn test_huge_tick_count_does_not_preallocate() {
        let mut m = small_match();
        m.abort();
        assert!(m.run_ticks(u64::MAX).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let terrain = Arc::new(TerrainGrid::new(2, 2, 10, TerrainType::Open).unwrap());
        let mut config = TacticalConfig::default();
        config.radio.dedup_window_ticks = config.radio.latency_ticks + 1;
        assert!(matches!(
            Match::new(MatchSetup::new(1), terrain, config),
            Err(TacticalError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_unit_lookup_by_callsign() {
        let m = small_match();
        assert_eq!(m.unit_id("Red"), Some(UnitId(1)));
        assert_eq!(m.unit_id("Blue"), None);
        assert_eq!(m.unit(UnitId(1)).unwrap().fire.rounds, m.config.weapon.magazine);
    }

    #[test]
    fn test_submissions_wait_for_intake() {
        let mut m = small_match();
        let sub = m.submit(Side::Friendly, Order::hold(vec![UnitId(1)]));
        assert!(m.dispatch_outcome(sub).is_none());
        let report = m.step().unwrap();
        assert_eq!(report.dispatched.len(), 1);
        assert!(m.dispatch_outcome(sub).unwrap().result.is_ok());
    }
}
