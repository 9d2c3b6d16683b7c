//! Structured orders and the per-unit order queue
//!
//! Orders arrive already schema-valid. The dispatcher fills defaults and
//! checks semantics; once accepted an order never changes.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::types::{OrderId, Tick, UnitId};
use crate::tactical::grid::CommandCell;
use crate::tactical::terrain::TerrainType;
use crate::tactical::units::{Posture, Roe, SpeedSetting};

/// A waypoint: a whole command cell, or a specific subcell inside one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Waypoint {
    Cell(CommandCell),
    Subcell {
        cell: CommandCell,
        /// Local (x, y) inside the cell, each in `[0, cell_size)`
        subcell: [u32; 2],
    },
}

impl Waypoint {
    pub fn cell(&self) -> CommandCell {
        match self {
            Waypoint::Cell(cell) | Waypoint::Subcell { cell, .. } => *cell,
        }
    }
}

impl From<CommandCell> for Waypoint {
    fn from(cell: CommandCell) -> Self {
        Waypoint::Cell(cell)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    pub avoid_cells: Vec<CommandCell>,
    pub prefer_terrain: Vec<TerrainType>,
    pub stay_concealed: bool,
    pub speed: Option<SpeedSetting>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementSpec {
    pub target_cells: Vec<CommandCell>,
    pub suppress_only: bool,
}

/// Orders of one category replace each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    Movement,
    Engagement,
}

/// What the order asks for, tagged by intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum OrderKind {
    Move {
        waypoints: Vec<Waypoint>,
    },
    Retreat {
        waypoints: Vec<Waypoint>,
    },
    Attack {
        #[serde(default)]
        engagement: EngagementSpec,
    },
    Hold,
    Observe,
    /// Close on a friendly unit, or on waypoints when no ally is named
    Support {
        #[serde(default)]
        ally: Option<UnitId>,
        #[serde(default)]
        waypoints: Vec<Waypoint>,
    },
    /// Cancel one category, or everything when no category is given
    Cancel {
        #[serde(default)]
        category: Option<IntentCategory>,
    },
}

impl OrderKind {
    /// Category this order occupies in the queue. Cancel occupies none.
    pub fn category(&self) -> Option<IntentCategory> {
        match self {
            OrderKind::Move { .. }
            | OrderKind::Retreat { .. }
            | OrderKind::Hold
            | OrderKind::Observe
            | OrderKind::Support { .. } => Some(IntentCategory::Movement),
            OrderKind::Attack { .. } => Some(IntentCategory::Engagement),
            OrderKind::Cancel { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OrderKind::Move { .. } => "move",
            OrderKind::Retreat { .. } => "retreat",
            OrderKind::Attack { .. } => "attack",
            OrderKind::Hold => "hold",
            OrderKind::Observe => "observe",
            OrderKind::Support { .. } => "support",
            OrderKind::Cancel { .. } => "cancel",
        }
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        match self {
            OrderKind::Move { waypoints }
            | OrderKind::Retreat { waypoints }
            | OrderKind::Support { waypoints, .. } => waypoints,
            _ => &[],
        }
    }
}

fn default_ack() -> bool {
    true
}

/// A player order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(default)]
    pub units: Vec<UnitId>,
    #[serde(flatten)]
    pub kind: OrderKind,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub roe: Option<Roe>,
    #[serde(default)]
    pub posture: Option<Posture>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_ack")]
    pub ack: bool,
}

impl Order {
    pub fn new(units: Vec<UnitId>, kind: OrderKind) -> Self {
        Self {
            units,
            kind,
            constraints: Constraints::default(),
            roe: None,
            posture: None,
            priority: Priority::Normal,
            ack: true,
        }
    }

    pub fn move_to(units: Vec<UnitId>, waypoints: Vec<Waypoint>) -> Self {
        Self::new(units, OrderKind::Move { waypoints })
    }

    pub fn retreat(units: Vec<UnitId>, waypoints: Vec<Waypoint>) -> Self {
        Self::new(units, OrderKind::Retreat { waypoints })
    }

    pub fn attack(units: Vec<UnitId>, target_cells: Vec<CommandCell>) -> Self {
        Self::new(
            units,
            OrderKind::Attack {
                engagement: EngagementSpec {
                    target_cells,
                    suppress_only: false,
                },
            },
        )
    }

    pub fn hold(units: Vec<UnitId>) -> Self {
        Self::new(units, OrderKind::Hold)
    }

    pub fn observe(units: Vec<UnitId>) -> Self {
        Self::new(units, OrderKind::Observe)
    }

    pub fn support(units: Vec<UnitId>, ally: UnitId) -> Self {
        Self::new(
            units,
            OrderKind::Support {
                ally: Some(ally),
                waypoints: Vec::new(),
            },
        )
    }

    pub fn cancel(units: Vec<UnitId>, category: Option<IntentCategory>) -> Self {
        Self::new(units, OrderKind::Cancel { category })
    }

    pub fn with_roe(mut self, roe: Roe) -> Self {
        self.roe = Some(roe);
        self
    }

    pub fn with_posture(mut self, posture: Posture) -> Self {
        self.posture = Some(posture);
        self
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn without_ack(mut self) -> Self {
        self.ack = false;
        self
    }

    pub fn suppress_only(mut self) -> Self {
        if let OrderKind::Attack { engagement } = &mut self.kind {
            engagement.suppress_only = true;
        }
        self
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Speed the order moves at once defaults are applied
    pub fn speed(&self) -> SpeedSetting {
        self.constraints.speed.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Accepted, not yet picked up by the unit's decide phase
    Pending,
    Active,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedOrder {
    pub id: OrderId,
    pub order: Arc<Order>,
    pub accepted_tick: Tick,
    pub status: OrderStatus,
}

impl QueuedOrder {
    pub fn category(&self) -> Option<IntentCategory> {
        self.order.kind.category()
    }
}

/// One unit's orders: at most one per intent category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderQueue {
    entries: VecDeque<QueuedOrder>,
}

impl OrderQueue {
    /// Enqueue an accepted order, returning the ids it displaced
    pub fn enqueue(&mut self, queued: QueuedOrder) -> Vec<OrderId> {
        let displaced = match queued.category() {
            Some(category) => self.remove_category(Some(category)),
            None => Vec::new(),
        };
        self.entries.push_back(queued);
        displaced
    }

    /// Remove orders in a category (all categories for `None`)
    pub fn remove_category(&mut self, category: Option<IntentCategory>) -> Vec<OrderId> {
        let mut removed = Vec::new();
        self.entries.retain(|entry| {
            let hit = match (category, entry.category()) {
                (_, None) => false,
                (None, Some(_)) => true,
                (Some(wanted), Some(have)) => wanted == have,
            };
            if hit {
                removed.push(entry.id);
            }
            !hit
        });
        removed
    }

    /// Activate pending entries accepted before `tick`, in queue order
    ///
    /// Orders taken in at this tick's intake wait for the next decide phase.
    pub fn activate_pending(&mut self, tick: Tick) -> Vec<QueuedOrder> {
        let mut activated = Vec::new();
        for entry in self.entries.iter_mut() {
            if entry.status == OrderStatus::Pending && entry.accepted_tick < tick {
                entry.status = OrderStatus::Active;
                activated.push(entry.clone());
            }
        }
        activated
    }

    pub fn active(&self, category: IntentCategory) -> Option<&QueuedOrder> {
        self.entries
            .iter()
            .find(|e| e.status == OrderStatus::Active && e.category() == Some(category))
    }

    pub fn contains(&self, id: OrderId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn complete(&mut self, id: OrderId) {
        self.entries.retain(|e| e.id != id);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedOrder> {
        self.entries.iter()
    }
}
