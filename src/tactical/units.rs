//! Units, fireteams and command tents
//!
//! A unit is one infantryman. Fireteams group units around a leader for
//! cohesion. Each side has at most one command tent; losing it loses the match.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::core::types::{OrderId, Side, Tick, UnitId};
use crate::tactical::grid::{CommandCell, SubcellCoord};
use crate::tactical::orders::OrderQueue;
use crate::tactical::pathfinding::Route;
use crate::tactical::radio::RadioEvent;

/// Health has exactly three values and only ever gets worse
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum HealthState {
    #[default]
    Healthy,
    Wounded,
    #[serde(rename = "KIA")]
    Kia,
}

impl HealthState {
    pub fn is_alive(&self) -> bool {
        !matches!(self, HealthState::Kia)
    }

    /// Health after a hit; `fatal` comes from the severity split
    pub fn after_hit(&self, fatal: bool) -> HealthState {
        match (self, fatal) {
            (HealthState::Kia, _) | (_, true) => HealthState::Kia,
            _ => HealthState::Wounded,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Posture {
    #[default]
    Stand,
    Crouch,
    Prone,
}

/// Rules of engagement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Roe {
    Hold,
    #[default]
    ReturnFire,
    Free,
}

/// Movement pace; also scales how easily the unit is spotted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedSetting {
    Slow,
    #[default]
    Normal,
    Fast,
}

/// Per-unit behavior state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BehaviorState {
    #[default]
    Idle,
    Moving,
    Aiming,
    Firing,
    Reloading,
    Suppressed,
    Downed,
}

impl BehaviorState {
    /// Part of the aim/fire/reload cycle
    pub fn is_engaging(&self) -> bool {
        matches!(
            self,
            BehaviorState::Aiming | BehaviorState::Firing | BehaviorState::Reloading
        )
    }
}

/// Fixed set of fireteam names
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FireteamName {
    Alpha,
    Bravo,
    Charlie,
    Delta,
}

/// Something a unit can shoot at
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TargetRef {
    Unit(UnitId),
    Tent(Side),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fireteam {
    pub name: FireteamName,
    pub side: Side,
    /// Ordered member list, leader included
    pub members: Vec<UnitId>,
    pub leader: UnitId,
}

impl Fireteam {
    /// Leader for cohesion purposes: the designated leader, or the first
    /// living member once the leader is down
    pub fn effective_leader(&self, units: &BTreeMap<UnitId, Unit>) -> Option<UnitId> {
        let alive = |id: &UnitId| units.get(id).map(|u| u.is_alive()).unwrap_or(false);
        if alive(&self.leader) {
            return Some(self.leader);
        }
        self.members.iter().copied().find(alive)
    }
}

/// Binary objective: present or destroyed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandTent {
    pub side: Side,
    pub position: SubcellCoord,
    pub destroyed: bool,
}

impl CommandTent {
    pub fn new(side: Side, position: SubcellCoord) -> Self {
        Self {
            side,
            position,
            destroyed: false,
        }
    }
}

/// Why a unit is following its current route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutePurpose {
    Order(OrderId),
    Regroup,
}

/// A route being walked plus the order legs it serves
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveRoute {
    pub purpose: RoutePurpose,
    pub route: Route,
    /// Index of the route point the unit currently stands on
    pub cursor: usize,
    /// Leg destinations and the command cells they report as
    pub destinations: Vec<SubcellCoord>,
    pub labels: Vec<CommandCell>,
    /// First leg not yet reached
    pub next_leg: usize,
}

impl ActiveRoute {
    pub fn new(
        purpose: RoutePurpose,
        route: Route,
        destinations: Vec<SubcellCoord>,
        labels: Vec<CommandCell>,
    ) -> Self {
        Self {
            purpose,
            route,
            cursor: 0,
            destinations,
            labels,
            next_leg: 0,
        }
    }

    pub fn next_point(&self) -> Option<SubcellCoord> {
        self.route.points.get(self.cursor + 1).copied()
    }

    pub fn is_complete(&self) -> bool {
        self.cursor + 1 >= self.route.points.len()
    }

    pub fn remaining_destinations(&self) -> Vec<SubcellCoord> {
        self.destinations
            .get(self.next_leg..)
            .map(|d| d.to_vec())
            .unwrap_or_default()
    }

    pub fn remaining_labels(&self) -> Vec<CommandCell> {
        self.labels
            .get(self.next_leg..)
            .map(|l| l.to_vec())
            .unwrap_or_default()
    }
}

/// Attack order in force for a unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementOrder {
    pub order: OrderId,
    pub target_cells: Vec<CommandCell>,
    pub suppress_only: bool,
    /// Consecutive decide phases without a valid target
    pub idle_ticks: u64,
    /// A valid target has been seen inside the order's cells
    #[serde(default)]
    pub had_target: bool,
}

/// Aim/fire/reload bookkeeping
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FireCycle {
    pub target: Option<TargetRef>,
    pub rounds: u32,
    /// Ticks left in the current timed step (aim, shot interval, reload)
    pub timer: u32,
    /// A shot is due in this tick's combat phase
    pub shot_ready: bool,
    /// Current target came from a suppress-only attack order
    pub suppress_only: bool,
    /// The `engaging` report for this engagement has gone out
    pub announced: bool,
}

/// A contact relayed by a teammate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReportedContact {
    pub position: SubcellCoord,
    pub reported_at: Tick,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub callsign: String,
    pub side: Side,
    pub fireteam: Option<FireteamName>,
    pub position: SubcellCoord,
    pub health: HealthState,
    pub posture: Posture,
    pub roe: Roe,
    pub speed: SpeedSetting,
    pub state: BehaviorState,
    pub orders: OrderQueue,

    /// Hostiles detected in the latest combat phase
    pub visible_enemies: BTreeSet<UnitId>,
    pub reported_contacts: BTreeMap<UnitId, ReportedContact>,

    pub route: Option<ActiveRoute>,
    /// Order route parked while regrouping
    pub suspended_route: Option<ActiveRoute>,
    /// Route that must be re-planned from the current position next decide
    pub replan: Option<ActiveRoute>,
    /// Fractional progress toward the next route point
    pub move_progress: f32,

    pub engagement: Option<EngagementOrder>,
    pub fire: FireCycle,

    pub suppression: f32,
    pub suppressed_until: Option<Tick>,
    pub resume_state: Option<BehaviorState>,
    pub last_fired_upon: Option<Tick>,

    /// Consecutive ticks outside the cohesion radius
    pub separation_ticks: u32,

    /// Relayed radio traffic waiting for the next decide phase
    pub inbox: Vec<RadioEvent>,
}

impl Unit {
    pub fn new(id: UnitId, callsign: impl Into<String>, side: Side, position: SubcellCoord) -> Self {
        Self {
            id,
            callsign: callsign.into(),
            side,
            fireteam: None,
            position,
            health: HealthState::Healthy,
            posture: Posture::Stand,
            roe: Roe::ReturnFire,
            speed: SpeedSetting::Normal,
            state: BehaviorState::Idle,
            orders: OrderQueue::default(),
            visible_enemies: BTreeSet::new(),
            reported_contacts: BTreeMap::new(),
            route: None,
            suspended_route: None,
            replan: None,
            move_progress: 0.0,
            engagement: None,
            fire: FireCycle::default(),
            suppression: 0.0,
            suppressed_until: None,
            resume_state: None,
            last_fired_upon: None,
            separation_ticks: 0,
            inbox: Vec::new(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health.is_alive()
    }

    /// State the unit would be in if not pinned
    pub fn effective_state(&self) -> BehaviorState {
        match self.state {
            BehaviorState::Suppressed => self.resume_state.unwrap_or(BehaviorState::Idle),
            other => other,
        }
    }

    /// Drop every route and stop moving
    pub fn clear_movement(&mut self) {
        self.route = None;
        self.suspended_route = None;
        self.replan = None;
        self.move_progress = 0.0;
    }

    /// Leave the fire cycle, keeping the magazine
    pub fn clear_fire_cycle(&mut self) {
        self.fire.target = None;
        self.fire.timer = 0;
        self.fire.shot_ready = false;
        self.fire.suppress_only = false;
        self.fire.announced = false;
    }

    /// Resting state once nothing else claims the unit
    pub fn settle_state(&self) -> BehaviorState {
        if self.route.is_some() || self.replan.is_some() {
            BehaviorState::Moving
        } else {
            BehaviorState::Idle
        }
    }

    /// Enter the terminal Downed state
    pub fn go_down(&mut self) {
        self.health = HealthState::Kia;
        self.state = BehaviorState::Downed;
        self.clear_movement();
        self.clear_fire_cycle();
        self.engagement = None;
        self.orders.clear();
        self.visible_enemies.clear();
        self.inbox.clear();
        self.resume_state = None;
        self.suppressed_until = None;
    }
}
