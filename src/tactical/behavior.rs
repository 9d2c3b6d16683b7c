//! Per-unit behavior: the decide and move phases
//!
//! Decide turns new orders into routes, runs cohesion checks and advances
//! the aim/fire/reload cycle. Move walks routes. Neither phase touches
//! health; that belongs to combat.

use std::collections::{BTreeMap, BTreeSet};

use ahash::{AHashMap, AHashSet};
use ordered_float::OrderedFloat;
use rayon::prelude::*;

use crate::core::config::TacticalConfig;
use crate::core::types::{OrderId, Side, Tick, UnitId};
use crate::tactical::constants::DIAGONAL_STEP;
use crate::tactical::execution::Match;
use crate::tactical::grid::{CommandCell, SubcellCoord, TerrainGrid};
use crate::tactical::orders::{Order, OrderKind, Waypoint};
use crate::tactical::pathfinding::{find_route, CostTable, PathError, PathRequest, Route};
use crate::tactical::radio::{FailureReason, Outbox, RadioEventKind, RadioPayload};
use crate::tactical::terrain::TerrainType;
use crate::tactical::units::{
    ActiveRoute, BehaviorState, EngagementOrder, ReportedContact, Roe, RoutePurpose, TargetRef, Unit,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobKind {
    /// First plan for a newly activated movement order
    Fresh,
    /// Re-plan from the current position (blocked route, end of regroup)
    Replan,
    Regroup,
}

/// One path to plan this tick
struct PathJob {
    unit: UnitId,
    kind: JobKind,
    purpose: RoutePurpose,
    destinations: Vec<SubcellCoord>,
    labels: Vec<CommandCell>,
    /// `None` when a waypoint had no reachable station
    request: Option<PathRequest>,
}

/// Target picked for a unit in the decide phase
#[derive(Debug, Clone, Copy, Default)]
struct TargetChoice {
    target: Option<TargetRef>,
    suppress_only: bool,
    /// A valid target exists inside the attack order's cells
    ordered: bool,
    /// A tracked candidate in the order's cells is beyond weapon range
    out_of_range: bool,
    /// No living hostile unit or standing hostile tent is left in the order's cells
    cells_clear: bool,
}

/// Does ROE let the unit open fire this tick?
pub fn roe_permits(unit: &Unit, tick: Tick, config: &TacticalConfig) -> bool {
    match unit.roe {
        Roe::Hold => false,
        Roe::Free => true,
        Roe::ReturnFire => unit
            .last_fired_upon
            .map(|t| tick.saturating_sub(t) <= config.engagement.return_fire_memory_ticks)
            .unwrap_or(false),
    }
}

/// Subcell a waypoint resolves to
pub fn resolve_waypoint(terrain: &TerrainGrid, waypoint: &Waypoint, prefer: &[TerrainType]) -> Option<SubcellCoord> {
    match waypoint {
        Waypoint::Cell(cell) => terrain.station(*cell, prefer),
        Waypoint::Subcell { cell, subcell } => terrain
            .subcell_in(*cell, subcell[0], subcell[1])
            .filter(|c| terrain.is_passable(*c)),
    }
}

/// Put an idle unit on its feet, including one pinned in place
fn start_moving(unit: &mut Unit) {
    match unit.state {
        BehaviorState::Idle => unit.state = BehaviorState::Moving,
        BehaviorState::Suppressed => {
            if matches!(unit.resume_state, None | Some(BehaviorState::Idle)) {
                unit.resume_state = Some(BehaviorState::Moving);
            }
        }
        _ => {}
    }
}

/// Recompute Idle/Moving after routes change
fn settle(unit: &mut Unit) {
    let rest = unit.settle_state();
    match unit.state {
        BehaviorState::Idle | BehaviorState::Moving => unit.state = rest,
        BehaviorState::Suppressed => {
            if matches!(
                unit.resume_state,
                None | Some(BehaviorState::Idle) | Some(BehaviorState::Moving)
            ) {
                unit.resume_state = Some(rest);
            }
        }
        _ => {}
    }
}

fn end_engagement(unit: &mut Unit) {
    unit.clear_fire_cycle();
    unit.state = unit.settle_state();
}

fn absorb_inbox(unit: &mut Unit) {
    for event in unit.inbox.drain(..) {
        for payload in &event.payloads {
            if let RadioPayload::Contact { enemy, position, .. } = *payload {
                unit.reported_contacts.insert(
                    enemy,
                    ReportedContact {
                        position,
                        reported_at: event.origination_tick,
                    },
                );
            }
        }
    }
}

fn relax_suppression(unit: &mut Unit, config: &TacticalConfig, tick: Tick) {
    unit.suppression = (unit.suppression - config.suppression.decay_per_tick).max(0.0);
    if unit.state != BehaviorState::Suppressed {
        return;
    }
    if unit.suppressed_until.map_or(true, |until| tick >= until) {
        unit.state = unit.resume_state.take().unwrap_or(BehaviorState::Idle);
        unit.suppressed_until = None;
        if matches!(unit.state, BehaviorState::Idle | BehaviorState::Moving) {
            unit.state = unit.settle_state();
        }
        tracing::debug!(unit = %unit.id, state = ?unit.state, "Suppression lifted");
    }
}

/// Drop routes and engagements whose orders left the queue
fn drop_withdrawn(unit: &mut Unit) {
    let withdrawn = |route: &Option<ActiveRoute>, unit: &Unit| match route {
        Some(ActiveRoute {
            purpose: RoutePurpose::Order(id),
            ..
        }) => !unit.orders.contains(*id),
        _ => false,
    };
    if withdrawn(&unit.route, unit) {
        unit.route = None;
        unit.move_progress = 0.0;
    }
    if withdrawn(&unit.suspended_route, unit) {
        unit.suspended_route = None;
    }
    if withdrawn(&unit.replan, unit) {
        unit.replan = None;
    }
    if let Some(engagement) = &unit.engagement {
        if !unit.orders.contains(engagement.order) {
            unit.engagement = None;
        }
    }
    settle(unit);
}

fn order_job(terrain: &TerrainGrid, config: &TacticalConfig, unit: &Unit, id: OrderId, order: &Order) -> PathJob {
    let prefer = &order.constraints.prefer_terrain;
    let waypoints = order.kind.waypoints();
    let destinations: Option<Vec<SubcellCoord>> = waypoints
        .iter()
        .map(|wp| resolve_waypoint(terrain, wp, prefer))
        .collect();
    let labels = waypoints.iter().map(|wp| wp.cell()).collect();
    fresh_job(terrain, config, unit, id, order, destinations, labels)
}

/// Route to where the ally stands now; a fallen ally leaves nothing to plan
fn ally_job(
    terrain: &TerrainGrid,
    config: &TacticalConfig,
    unit: &Unit,
    id: OrderId,
    order: &Order,
    ally: Option<SubcellCoord>,
) -> PathJob {
    let labels = ally.and_then(|pos| terrain.cell_of(pos)).into_iter().collect();
    fresh_job(terrain, config, unit, id, order, ally.map(|pos| vec![pos]), labels)
}

fn fresh_job(
    terrain: &TerrainGrid,
    config: &TacticalConfig,
    unit: &Unit,
    id: OrderId,
    order: &Order,
    destinations: Option<Vec<SubcellCoord>>,
    labels: Vec<CommandCell>,
) -> PathJob {
    let prefer = &order.constraints.prefer_terrain;
    let request = destinations.as_ref().map(|destinations| {
        let costs = CostTable::new(&terrain.table, prefer, config.pathfinding.preference_bias);
        PathRequest::new(unit.position, destinations.clone(), costs)
            .forbid_cells(order.constraints.avoid_cells.iter().copied())
            .with_diagonal(config.pathfinding.diagonal)
    });

    PathJob {
        unit: unit.id,
        kind: JobKind::Fresh,
        purpose: RoutePurpose::Order(id),
        destinations: destinations.unwrap_or_default(),
        labels,
        request,
    }
}

fn replan_job(
    terrain: &TerrainGrid,
    config: &TacticalConfig,
    unit: &Unit,
    previous: &ActiveRoute,
    hostile: Option<&AHashSet<SubcellCoord>>,
) -> Option<PathJob> {
    let order = match previous.purpose {
        RoutePurpose::Order(id) => Some(unit.orders.iter().find(|q| q.id == id)?.order.clone()),
        RoutePurpose::Regroup => None,
    };
    let destinations = previous.remaining_destinations();
    if destinations.is_empty() {
        return None;
    }

    let (prefer, avoid) = match &order {
        Some(order) => (
            order.constraints.prefer_terrain.clone(),
            order.constraints.avoid_cells.clone(),
        ),
        None => (Vec::new(), Vec::new()),
    };
    let costs = CostTable::new(&terrain.table, &prefer, config.pathfinding.preference_bias);
    let request = PathRequest::new(unit.position, destinations.clone(), costs)
        .forbid_cells(avoid)
        .forbid_subcells(hostile.into_iter().flatten().copied())
        .with_diagonal(config.pathfinding.diagonal);

    Some(PathJob {
        unit: unit.id,
        kind: JobKind::Replan,
        purpose: previous.purpose,
        destinations,
        labels: previous.remaining_labels(),
        request: Some(request),
    })
}

/// Subcells held by living units, per side
fn occupied_subcells(m: &Match) -> BTreeMap<Side, AHashSet<SubcellCoord>> {
    let mut occupied: BTreeMap<Side, AHashSet<SubcellCoord>> = BTreeMap::new();
    for unit in m.units.values().filter(|u| u.is_alive()) {
        occupied.entry(unit.side).or_default().insert(unit.position);
    }
    occupied
}

/// Leader position for every fireteam member that is not the leader
fn cohesion_anchors(m: &Match) -> AHashMap<UnitId, SubcellCoord> {
    let mut anchors = AHashMap::new();
    for team in &m.fireteams {
        let Some(leader) = team.effective_leader(&m.units) else {
            continue;
        };
        let Some(leader_pos) = m.units.get(&leader).map(|u| u.position) else {
            continue;
        };
        for member in team.members.iter().filter(|id| **id != leader) {
            if m.units.get(member).map(|u| u.is_alive()).unwrap_or(false) {
                anchors.insert(*member, leader_pos);
            }
        }
    }
    anchors
}

/// Positions of living units, read before any unit is refreshed
fn living_positions(m: &Match) -> AHashMap<UnitId, SubcellCoord> {
    m.units
        .values()
        .filter(|u| u.is_alive())
        .map(|u| (u.id, u.position))
        .collect()
}

/// Refresh one unit and turn newly active orders into at most one path job
fn prepare_unit(
    m: &mut Match,
    id: UnitId,
    tick: Tick,
    occupied: &BTreeMap<Side, AHashSet<SubcellCoord>>,
    positions: &AHashMap<UnitId, SubcellCoord>,
) -> Option<PathJob> {
    let config = &m.config;
    let terrain = &m.terrain;
    let unit = m.units.get_mut(&id)?;

    absorb_inbox(unit);
    relax_suppression(unit, config, tick);
    unit.fire.shot_ready = false;

    let mut job = None;
    for queued in unit.orders.activate_pending(tick) {
        match &queued.order.kind {
            OrderKind::Move { .. } | OrderKind::Retreat { .. } => {
                if matches!(queued.order.kind, OrderKind::Retreat { .. }) {
                    unit.engagement = None;
                    if unit.state.is_engaging() {
                        end_engagement(unit);
                    }
                }
                unit.speed = queued.order.speed();
                unit.clear_movement();
                job = Some(order_job(terrain, config, unit, queued.id, &queued.order));
            }
            OrderKind::Support { ally: Some(ally), .. } => {
                unit.speed = queued.order.speed();
                unit.clear_movement();
                let target = positions.get(ally).copied();
                job = Some(ally_job(terrain, config, unit, queued.id, &queued.order, target));
            }
            OrderKind::Support { ally: None, waypoints } if !waypoints.is_empty() => {
                unit.speed = queued.order.speed();
                unit.clear_movement();
                job = Some(order_job(terrain, config, unit, queued.id, &queued.order));
            }
            OrderKind::Hold | OrderKind::Observe | OrderKind::Support { .. } => {
                unit.clear_movement();
                job = None;
            }
            OrderKind::Attack { engagement } => {
                unit.engagement = Some(EngagementOrder {
                    order: queued.id,
                    target_cells: engagement.target_cells.clone(),
                    suppress_only: engagement.suppress_only,
                    idle_ticks: 0,
                    had_target: false,
                });
            }
            // Applied at intake, never queued
            OrderKind::Cancel { .. } => {}
        }
    }
    drop_withdrawn(unit);

    if job.is_none() {
        if let Some(previous) = unit.replan.take() {
            let hostile = occupied.get(&unit.side.opponent());
            job = replan_job(terrain, config, unit, &previous, hostile);
            if job.is_none() {
                settle(unit);
            }
        }
    }
    job
}

/// Members that have been out of formation too long plan a route back
fn cohesion_jobs(m: &mut Match, busy: &BTreeSet<UnitId>) -> Vec<PathJob> {
    let mut anchors: Vec<(UnitId, SubcellCoord)> = cohesion_anchors(m).into_iter().collect();
    anchors.sort_by_key(|(id, _)| *id);

    let config = &m.config;
    let terrain = &m.terrain;
    let mut jobs = Vec::new();
    for (id, leader_pos) in anchors {
        let Some(unit) = m.units.get_mut(&id) else {
            continue;
        };
        if unit.position.distance(&leader_pos) <= config.cohesion.radius {
            unit.separation_ticks = 0;
            continue;
        }
        unit.separation_ticks = unit.separation_ticks.saturating_add(1);

        let regrouping = matches!(
            unit.route.as_ref().map(|r| r.purpose),
            Some(RoutePurpose::Regroup)
        );
        if unit.separation_ticks < config.cohesion.regroup_ticks
            || busy.contains(&id)
            || regrouping
            || unit.state.is_engaging()
            || unit.state == BehaviorState::Suppressed
        {
            continue;
        }

        let costs = CostTable::new(&terrain.table, &[], config.pathfinding.preference_bias);
        let request = PathRequest::new(unit.position, vec![leader_pos], costs)
            .with_diagonal(config.pathfinding.diagonal);
        tracing::debug!(unit = %id, separation = unit.separation_ticks, "Regrouping on leader");
        jobs.push(PathJob {
            unit: id,
            kind: JobKind::Regroup,
            purpose: RoutePurpose::Regroup,
            destinations: vec![leader_pos],
            labels: Vec::new(),
            request: Some(request),
        });
    }
    jobs
}

fn solve_jobs(m: &Match, jobs: &[PathJob]) -> Vec<Option<Result<Route, PathError>>> {
    let terrain = &m.terrain;
    let solve = |job: &PathJob| job.request.as_ref().map(|r| find_route(terrain, r));
    if m.parallel() {
        jobs.par_iter().map(solve).collect()
    } else {
        jobs.iter().map(solve).collect()
    }
}

fn apply_route(m: &mut Match, job: PathJob, result: Option<Result<Route, PathError>>, outbox: &mut Outbox) {
    let tick = m.tick();
    let Some(unit) = m.units.get_mut(&job.unit) else {
        return;
    };

    match (job.kind, result) {
        (JobKind::Regroup, Some(Ok(route))) => {
            if let Some(current) = unit.route.take().or_else(|| unit.replan.take()) {
                unit.suspended_route = Some(current);
            }
            unit.route = Some(ActiveRoute::new(job.purpose, route, job.destinations, job.labels));
            unit.move_progress = 0.0;
            unit.separation_ticks = 0;
            start_moving(unit);
        }
        (JobKind::Regroup, _) => {
            tracing::trace!(unit = %job.unit, "No route back to leader");
            unit.separation_ticks = 0;
        }
        (_, Some(Ok(route))) => {
            unit.route = Some(ActiveRoute::new(job.purpose, route, job.destinations, job.labels));
            unit.move_progress = 0.0;
            start_moving(unit);
        }
        (_, failure) => {
            let reason = match failure {
                Some(Err(err)) => err.to_string(),
                _ => "waypoint has no passable subcell".to_string(),
            };
            unit.clear_movement();
            settle(unit);
            if let RoutePurpose::Order(order) = job.purpose {
                tracing::warn!(tick, unit = %job.unit, %order, %reason, "Unable to comply");
                unit.orders.complete(order);
                outbox.report(
                    unit.id,
                    unit.side,
                    RadioEventKind::UnableToComply,
                    RadioPayload::UnableToComply {
                        order,
                        reason: FailureReason::NoRoute,
                    },
                );
            }
        }
    }
}

fn choose_target(m: &Match, id: UnitId, tick: Tick) -> TargetChoice {
    let Some(unit) = m.units.get(&id).filter(|u| u.is_alive()) else {
        return TargetChoice::default();
    };
    let config = &m.config;
    let far = config.weapon.far_range;
    let grace = config.detection.contact_grace_ticks;
    let book = m.contacts.get(&unit.side);
    let in_order_cells = |pos: SubcellCoord| match (&unit.engagement, m.terrain.cell_of(pos)) {
        (Some(engagement), Some(cell)) => engagement.target_cells.contains(&cell),
        _ => false,
    };

    let cells_clear = unit.engagement.is_some()
        && !m
            .units
            .values()
            .any(|u| u.is_alive() && unit.side.is_hostile_to(u.side) && in_order_cells(u.position))
        && !m
            .tents
            .values()
            .any(|t| !t.destroyed && unit.side.is_hostile_to(t.side) && in_order_cells(t.position));

    let mut ordered: Vec<(OrderedFloat<f32>, TargetRef)> = Vec::new();
    let mut anywhere: Vec<(OrderedFloat<f32>, TargetRef)> = Vec::new();
    let mut out_of_range = false;

    for enemy in m.units.values() {
        if !enemy.is_alive() || !unit.side.is_hostile_to(enemy.side) {
            continue;
        }
        let tracked = unit.visible_enemies.contains(&enemy.id)
            || book
                .map(|b| b.is_tracked(unit.id, enemy.id, tick, grace))
                .unwrap_or(false);
        if !tracked {
            continue;
        }
        let distance = unit.position.distance(&enemy.position);
        let candidate = (OrderedFloat(distance), TargetRef::Unit(enemy.id));
        let wanted = in_order_cells(enemy.position);
        if distance <= far {
            anywhere.push(candidate);
            if wanted {
                ordered.push(candidate);
            }
        } else if wanted {
            out_of_range = true;
        }
    }

    for tent in m.tents.values() {
        if tent.destroyed || !unit.side.is_hostile_to(tent.side) {
            continue;
        }
        let distance = unit.position.distance(&tent.position);
        let wanted = in_order_cells(tent.position);
        if distance > far {
            out_of_range |= wanted;
            continue;
        }
        if !m.terrain.has_line_of_sight(unit.position, tent.position) {
            continue;
        }
        let candidate = (OrderedFloat(distance), TargetRef::Tent(tent.side));
        anywhere.push(candidate);
        if wanted {
            ordered.push(candidate);
        }
    }

    if !roe_permits(unit, tick, config) {
        return TargetChoice {
            out_of_range,
            cells_clear,
            ..TargetChoice::default()
        };
    }

    ordered.sort();
    anywhere.sort();
    match ordered.first() {
        Some((_, target)) => TargetChoice {
            target: Some(*target),
            suppress_only: unit.engagement.as_ref().map(|e| e.suppress_only).unwrap_or(false),
            ordered: true,
            out_of_range,
            cells_clear,
        },
        None => TargetChoice {
            target: anywhere.first().map(|(_, t)| *t),
            suppress_only: false,
            ordered: false,
            out_of_range,
            cells_clear,
        },
    }
}

fn begin_aim(unit: &mut Unit, target: TargetRef, suppress_only: bool, aim_ticks: u32) {
    unit.state = BehaviorState::Aiming;
    unit.fire.target = Some(target);
    unit.fire.suppress_only = suppress_only;
    unit.fire.timer = aim_ticks;
}

fn advance_fire_cycle(m: &mut Match, id: UnitId, choice: TargetChoice, tick: Tick, outbox: &mut Outbox) {
    let weapon = m.config.weapon.clone();
    let patience = m.config.engagement.attack_patience_ticks;
    let Some(unit) = m.units.get_mut(&id).filter(|u| u.is_alive()) else {
        return;
    };

    if let Some(engagement) = unit.engagement.as_mut() {
        if choice.ordered {
            engagement.idle_ticks = 0;
            engagement.had_target = true;
        } else if engagement.had_target && choice.cells_clear {
            let order = engagement.order;
            tracing::debug!(tick, unit = %id, %order, "Attack complete, target cells clear");
            unit.engagement = None;
            unit.orders.complete(order);
        } else {
            engagement.idle_ticks += 1;
            if engagement.idle_ticks >= patience {
                let order = engagement.order;
                let reason = if choice.out_of_range {
                    FailureReason::OutOfRange
                } else {
                    FailureReason::TargetLost
                };
                tracing::warn!(tick, unit = %id, %order, ?reason, "Unable to comply");
                unit.engagement = None;
                unit.orders.complete(order);
                outbox.report(
                    id,
                    unit.side,
                    RadioEventKind::UnableToComply,
                    RadioPayload::UnableToComply { order, reason },
                );
            }
        }
    }

    match (unit.state, choice.target) {
        (BehaviorState::Downed | BehaviorState::Suppressed, _) => {}
        (BehaviorState::Idle | BehaviorState::Moving, Some(target)) => {
            unit.fire.announced = false;
            begin_aim(unit, target, choice.suppress_only, weapon.aim_ticks);
        }
        (BehaviorState::Idle | BehaviorState::Moving, None) => {}
        (BehaviorState::Aiming, None) | (BehaviorState::Firing, None) => end_engagement(unit),
        (BehaviorState::Aiming, Some(target)) => {
            unit.fire.target = Some(target);
            unit.fire.suppress_only = choice.suppress_only;
            unit.fire.timer = unit.fire.timer.saturating_sub(1);
            if unit.fire.timer == 0 {
                if unit.fire.rounds == 0 {
                    unit.state = BehaviorState::Reloading;
                    unit.fire.timer = weapon.reload_ticks;
                } else {
                    unit.state = BehaviorState::Firing;
                    unit.fire.shot_ready = true;
                    unit.fire.timer = weapon.ticks_per_shot;
                }
            }
        }
        (BehaviorState::Firing, Some(target)) => {
            if unit.fire.target != Some(target) {
                begin_aim(unit, target, choice.suppress_only, weapon.aim_ticks);
            } else if unit.fire.rounds == 0 {
                unit.state = BehaviorState::Reloading;
                unit.fire.timer = weapon.reload_ticks;
            } else {
                unit.fire.timer = unit.fire.timer.saturating_sub(1);
                if unit.fire.timer == 0 {
                    unit.fire.shot_ready = true;
                    unit.fire.timer = weapon.ticks_per_shot;
                }
            }
        }
        (BehaviorState::Reloading, target) => {
            unit.fire.timer = unit.fire.timer.saturating_sub(1);
            if unit.fire.timer == 0 {
                unit.fire.rounds = weapon.magazine;
                match target {
                    Some(target) => begin_aim(unit, target, choice.suppress_only, weapon.aim_ticks),
                    None => end_engagement(unit),
                }
            }
        }
    }
}

/// Decide phase: orders, routes, cohesion and the fire cycle
pub fn phase_decide(m: &mut Match) {
    let tick = m.tick();
    let ids = m.living_ids();
    let occupied = occupied_subcells(m);
    let positions = living_positions(m);
    let mut outbox = Outbox::default();

    let mut jobs: Vec<PathJob> = ids
        .iter()
        .filter_map(|id| prepare_unit(m, *id, tick, &occupied, &positions))
        .collect();
    let busy: BTreeSet<UnitId> = jobs.iter().map(|j| j.unit).collect();
    jobs.extend(cohesion_jobs(m, &busy));
    jobs.sort_by_key(|j| j.unit);

    let results = solve_jobs(m, &jobs);
    for (job, result) in jobs.into_iter().zip(results) {
        apply_route(m, job, result, &mut outbox);
    }

    let view: &Match = m;
    let choices: Vec<TargetChoice> = if view.parallel() {
        ids.par_iter().map(|id| choose_target(view, *id, tick)).collect()
    } else {
        ids.iter().map(|id| choose_target(view, *id, tick)).collect()
    };
    for (id, choice) in ids.iter().zip(choices) {
        advance_fire_cycle(m, *id, choice, tick, &mut outbox);
    }

    outbox.flush(&mut m.radio, tick);
}

/// Finish a walked route; regroups hand back to the parked order route
fn finish_route(unit: &mut Unit, route: ActiveRoute) {
    unit.move_progress = 0.0;
    match route.purpose {
        RoutePurpose::Order(order) => {
            unit.orders.complete(order);
            tracing::debug!(unit = %unit.id, %order, "Route complete");
        }
        RoutePurpose::Regroup => {
            unit.separation_ticks = 0;
            unit.replan = unit.suspended_route.take();
        }
    }
    settle(unit);
}

fn move_unit(
    m: &mut Match,
    id: UnitId,
    occupied: &BTreeMap<Side, AHashSet<SubcellCoord>>,
    anchor: Option<SubcellCoord>,
    outbox: &mut Outbox,
) {
    let config = &m.config;
    let terrain = &m.terrain;
    let Some(unit) = m.units.get_mut(&id) else {
        return;
    };
    if unit.effective_state() != BehaviorState::Moving {
        return;
    }
    let Some(mut active) = unit.route.take() else {
        return;
    };
    let hostile = occupied.get(&unit.side.opponent());

    let terrain_multiplier = terrain
        .terrain_at(unit.position)
        .map(|t| terrain.table.speed_multiplier(t))
        .unwrap_or(1.0);
    let mut speed = config.movement.base_speed
        * config.posture.profile(unit.posture).speed
        * terrain_multiplier
        * config.speed.profile(unit.speed).movement;
    if unit.state == BehaviorState::Suppressed {
        speed *= config.movement.suppressed_multiplier;
    }
    if let (Some(anchor), Some(next)) = (anchor, active.next_point()) {
        let gap = unit.position.distance(&anchor);
        if gap > config.cohesion.radius && next.distance(&anchor) > gap {
            speed *= config.cohesion.drag_multiplier;
        }
    }
    unit.move_progress += speed;

    let mut moved = false;
    loop {
        let mut reached = false;
        while let Some(&end) = active.route.leg_ends.get(active.next_leg) {
            if end > active.cursor {
                break;
            }
            if let (RoutePurpose::Order(_), Some(cell)) = (active.purpose, active.labels.get(active.next_leg)) {
                outbox.report(
                    id,
                    unit.side,
                    RadioEventKind::WaypointReached,
                    RadioPayload::WaypointReached { cell: *cell },
                );
            }
            active.next_leg += 1;
            reached = true;
        }

        if active.is_complete() {
            finish_route(unit, active);
            return;
        }
        if reached && moved {
            // No carry-over past a waypoint
            unit.move_progress = 0.0;
            break;
        }

        let Some(next) = active.next_point() else {
            break;
        };
        if hostile.map_or(false, |h| h.contains(&next)) {
            tracing::debug!(unit = %id, ?next, "Route blocked by enemy");
            unit.move_progress = 0.0;
            unit.replan = Some(active);
            return;
        }
        let step = if unit.position.is_diagonal_to(&next) {
            DIAGONAL_STEP
        } else {
            1.0
        };
        if unit.move_progress < step {
            break;
        }
        unit.move_progress -= step;
        unit.position = next;
        active.cursor += 1;
        moved = true;
    }
    unit.route = Some(active);
}

/// Move phase: walk every moving unit along its route
pub fn phase_move(m: &mut Match) {
    let tick = m.tick();
    let ids = m.living_ids();
    let occupied = occupied_subcells(m);
    let anchors = cohesion_anchors(m);
    let mut outbox = Outbox::default();

    for id in ids {
        let anchor = anchors.get(&id).copied();
        move_unit(m, id, &occupied, anchor, &mut outbox);
    }
    outbox.flush(&mut m.radio, tick);
}
