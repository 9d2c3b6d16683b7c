//! Order dispatch: semantic validation, defaults and enqueueing
//!
//! A rejected order leaves no trace in the match beyond its dispatch
//! outcome. An accepted order is resolved against defaults once and never
//! changes afterwards.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{OrderId, Side, SubmissionId, Tick, UnitId};
use crate::tactical::execution::Match;
use crate::tactical::grid::CommandCell;
use crate::tactical::orders::{IntentCategory, Order, OrderKind, OrderStatus, QueuedOrder, Waypoint};
use crate::tactical::radio::{RadioDestination, RadioEventKind, RadioPayload, RadioSource};
use crate::tactical::terrain::TerrainType;
use crate::tactical::units::{Posture, Roe, SpeedSetting};

/// Why the dispatcher refused an order
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum Rejection {
    #[error("order names no units")]
    EmptyUnitList,

    #[error("unit {0} listed more than once")]
    DuplicateUnit(UnitId),

    #[error("unknown unit {0}")]
    UnknownUnit(UnitId),

    #[error("unit {0} is KIA")]
    UnitDown(UnitId),

    #[error("unit {0} belongs to the other side")]
    NotYourUnit(UnitId),

    #[error("movement order has no waypoints")]
    NoWaypoints,

    #[error("waypoint {0} is outside the grid")]
    WaypointOutOfBounds(CommandCell),

    #[error("subcell {local:?} is outside command cell {cell}")]
    SubcellOutOfBounds { cell: CommandCell, local: [u32; 2] },

    #[error("ROE hold forbids an attack")]
    RoeForbidsAttack,

    #[error("no target cells given and no contacts to infer them from")]
    NoTargets,

    #[error("target cell {0} is outside the grid")]
    TargetOutOfBounds(CommandCell),

    #[error("target cell {0} contains only friendly units")]
    FriendlyFireViolation(CommandCell),

    #[error("unit {0} cannot be supported")]
    BadSupportTarget(UnitId),
}

/// Result of one intake, recorded exactly once in the dispatch log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub submission: SubmissionId,
    pub side: Side,
    pub tick: Tick,
    pub result: Result<OrderId, Rejection>,
}

/// Fill in defaults that depend on the intent
pub fn resolve_defaults(order: &Order) -> Order {
    let mut resolved = order.clone();
    let constraints = &mut resolved.constraints;

    if constraints.stay_concealed {
        if !constraints.prefer_terrain.contains(&TerrainType::Forest) {
            constraints.prefer_terrain.push(TerrainType::Forest);
        }
        if constraints.speed.is_none() || constraints.speed == Some(SpeedSetting::Normal) {
            constraints.speed = Some(SpeedSetting::Slow);
        }
    }

    match resolved.kind {
        OrderKind::Retreat { .. } => {
            resolved.constraints.speed = Some(SpeedSetting::Fast);
        }
        OrderKind::Attack { .. } => {
            resolved.roe.get_or_insert(Roe::Free);
        }
        OrderKind::Observe => {
            resolved.roe.get_or_insert(Roe::Hold);
            resolved.posture.get_or_insert(Posture::Prone);
        }
        _ => {}
    }
    resolved.constraints.speed.get_or_insert(SpeedSetting::Normal);
    resolved
}

fn check_units(m: &Match, side: Side, units: &[UnitId]) -> Result<(), Rejection> {
    if units.is_empty() {
        return Err(Rejection::EmptyUnitList);
    }
    let mut seen = HashSet::with_capacity(units.len());
    for &id in units {
        if !seen.insert(id) {
            return Err(Rejection::DuplicateUnit(id));
        }
        let unit = m.units.get(&id).ok_or(Rejection::UnknownUnit(id))?;
        if !unit.is_alive() {
            return Err(Rejection::UnitDown(id));
        }
        if unit.side != side {
            return Err(Rejection::NotYourUnit(id));
        }
    }
    Ok(())
}

fn check_waypoints(m: &Match, waypoints: &[Waypoint]) -> Result<(), Rejection> {
    if waypoints.is_empty() {
        return Err(Rejection::NoWaypoints);
    }
    for waypoint in waypoints {
        let cell = waypoint.cell();
        if !m.terrain.contains_cell(cell) {
            return Err(Rejection::WaypointOutOfBounds(cell));
        }
        if let Waypoint::Subcell { subcell, .. } = waypoint {
            if m.terrain.subcell_in(cell, subcell[0], subcell[1]).is_none() {
                return Err(Rejection::SubcellOutOfBounds {
                    cell,
                    local: *subcell,
                });
            }
        }
    }
    Ok(())
}

/// The ally must be a living teammate on our side that is not itself ordered
fn check_ally(m: &Match, side: Side, units: &[UnitId], ally: UnitId) -> Result<(), Rejection> {
    let valid = m
        .units
        .get(&ally)
        .map(|u| u.is_alive() && u.side == side)
        .unwrap_or(false);
    if !valid || units.contains(&ally) {
        return Err(Rejection::BadSupportTarget(ally));
    }
    Ok(())
}

/// Cells of enemies the ordered units know about, by sight or by relay
fn infer_target_cells(m: &Match, side: Side, units: &[UnitId]) -> Vec<CommandCell> {
    let mut cells = BTreeSet::new();
    let alive = |enemy: &UnitId| m.units.get(enemy).map(|u| u.is_alive()).unwrap_or(false);

    for id in units {
        if let Some(book) = m.contacts.get(&side) {
            for record in book.contacts_of(*id).filter(|r| alive(&r.enemy)) {
                cells.extend(m.terrain.cell_of(record.last_position));
            }
        }
        if let Some(unit) = m.units.get(id) {
            for (_, report) in unit.reported_contacts.iter().filter(|(e, _)| alive(e)) {
                cells.extend(m.terrain.cell_of(report.position));
            }
        }
    }
    cells.into_iter().collect()
}

/// A cell holding only our own people (or our own tent) may never be targeted
fn check_friendly_fire(m: &Match, side: Side, cell: CommandCell) -> Result<(), Rejection> {
    let in_cell = |pos| m.terrain.cell_of(pos) == Some(cell);

    let mut friendly = false;
    let mut hostile = false;
    for unit in m.units.values().filter(|u| u.is_alive() && in_cell(u.position)) {
        if unit.side == side {
            friendly = true;
        } else {
            hostile = true;
        }
    }
    for tent in m.tents.values().filter(|t| !t.destroyed && in_cell(t.position)) {
        if tent.side == side {
            friendly = true;
        } else {
            hostile = true;
        }
    }

    if friendly && !hostile {
        return Err(Rejection::FriendlyFireViolation(cell));
    }
    Ok(())
}

/// Check an order and resolve its defaults without touching the match
pub fn validate_order(m: &Match, side: Side, order: &Order) -> Result<Order, Rejection> {
    check_units(m, side, &order.units)?;

    let mut resolved = resolve_defaults(order);
    match &mut resolved.kind {
        OrderKind::Move { waypoints } | OrderKind::Retreat { waypoints } => {
            check_waypoints(m, waypoints)?;
        }
        OrderKind::Attack { engagement } => {
            if order.roe == Some(Roe::Hold) {
                return Err(Rejection::RoeForbidsAttack);
            }
            if engagement.target_cells.is_empty() {
                engagement.target_cells = infer_target_cells(m, side, &order.units);
                if engagement.target_cells.is_empty() {
                    return Err(Rejection::NoTargets);
                }
            }
            for &cell in &engagement.target_cells {
                if !m.terrain.contains_cell(cell) {
                    return Err(Rejection::TargetOutOfBounds(cell));
                }
                check_friendly_fire(m, side, cell)?;
            }
        }
        OrderKind::Support { ally, waypoints } => {
            if let Some(ally) = ally {
                check_ally(m, side, &order.units, *ally)?;
            }
            if !waypoints.is_empty() {
                check_waypoints(m, waypoints)?;
            }
        }
        OrderKind::Hold | OrderKind::Observe | OrderKind::Cancel { .. } => {}
    }
    Ok(resolved)
}

/// Accept or reject one order at the current intake
pub fn dispatch_order(m: &mut Match, side: Side, order: Order) -> Result<OrderId, Rejection> {
    let resolved = match validate_order(m, side, &order) {
        Ok(resolved) => resolved,
        Err(rejection) => {
            tracing::warn!(tick = m.tick(), ?side, %rejection, "Order rejected");
            return Err(rejection);
        }
    };

    let id = m.next_order_id();
    let tick = m.tick();
    let queued = QueuedOrder {
        id,
        order: Arc::new(resolved),
        accepted_tick: tick,
        status: OrderStatus::Pending,
    };
    let intent = queued.order.kind.name();

    for unit_id in &queued.order.units {
        let Some(unit) = m.units.get_mut(unit_id) else {
            continue;
        };
        match &queued.order.kind {
            // Cancel takes effect here and never occupies the queue
            OrderKind::Cancel { category } => {
                let cancelled = unit.orders.remove_category(*category);
                tracing::debug!(unit = %unit_id, ?cancelled, "Orders cancelled");
            }
            OrderKind::Retreat { .. } => {
                unit.orders.remove_category(Some(IntentCategory::Engagement));
            }
            _ => {}
        }
        if queued.category().is_some() {
            let displaced = unit.orders.enqueue(queued.clone());
            if !displaced.is_empty() {
                tracing::debug!(unit = %unit_id, ?displaced, "Orders displaced");
            }
        }

        if let Some(roe) = queued.order.roe {
            unit.roe = roe;
        }
        if let Some(posture) = queued.order.posture {
            unit.posture = posture;
        }
    }

    if queued.order.ack {
        for unit_id in &queued.order.units {
            m.emit(
                RadioSource::Unit(*unit_id),
                RadioDestination::Side(side),
                RadioEventKind::Ack,
                RadioPayload::Ack {
                    order: id,
                    intent: intent.to_string(),
                },
            );
        }
    }

    m.record.push(tick, side, order);
    tracing::debug!(tick, order = %id, intent, units = queued.order.units.len(), "Order accepted");
    Ok(id)
}
