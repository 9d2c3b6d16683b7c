//! Combat resolution: sensing, detection and firing
//!
//! Sensing and shot planning read last-committed state and may run on worker
//! threads. All writes are merged afterwards in unit-id order. This is the
//! only module that changes health or destroys tents.

use std::collections::BTreeSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::config::TacticalConfig;
use crate::core::types::{Side, Tick, UnitId};
use crate::tactical::behavior::roe_permits;
use crate::tactical::execution::{Match, MatchOutcome};
use crate::tactical::grid::{SubcellCoord, TerrainGrid};
use crate::tactical::radio::{Outbox, RadioDestination, RadioEventKind, RadioPayload, RadioSource};
use crate::tactical::rng::{DrawKey, DrawPurpose, TickStream};
use crate::tactical::units::{BehaviorState, HealthState, TargetRef, Unit};

/// Outcome of one shot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShotOutcome {
    Miss,
    Wounded,
    Kia,
    TentDestroyed,
    Suppressing,
}

/// Append-only combat log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotRecord {
    pub tick: Tick,
    pub shooter: UnitId,
    pub target: TargetRef,
    pub suppress_only: bool,
    pub distance: f32,
    pub hit_probability: f32,
    pub outcome: ShotOutcome,
}

/// One observer's sightings this tick
#[derive(Debug, Clone)]
struct Sighting {
    observer: UnitId,
    detected: Vec<(UnitId, SubcellCoord)>,
}

/// A shot planned against last-committed state, draws already taken
#[derive(Debug, Clone)]
struct ShotPlan {
    shooter: UnitId,
    target: TargetRef,
    suppress_only: bool,
    distance: f32,
    hit_probability: f32,
    hit: bool,
    severity_draw: f32,
}

fn draw_key(target: TargetRef) -> DrawKey {
    match target {
        TargetRef::Unit(id) => DrawKey::Unit(id),
        TargetRef::Tent(side) => DrawKey::Tent(side),
    }
}

/// Combined terrain and posture concealment of a unit where it stands
fn concealment(config: &TacticalConfig, terrain: &TerrainGrid, unit: &Unit) -> f32 {
    let ground = terrain.profile_at(unit.position).map(|p| p.concealment).unwrap_or(0.0);
    let posture = config.posture.profile(unit.posture).concealment;
    1.0 - (1.0 - ground) * (1.0 - posture)
}

/// Combined terrain and posture cover of a unit where it stands
fn cover(config: &TacticalConfig, terrain: &TerrainGrid, unit: &Unit) -> f32 {
    let ground = terrain.profile_at(unit.position).map(|p| p.cover).unwrap_or(0.0);
    let posture = config.posture.profile(unit.posture).cover;
    1.0 - (1.0 - ground) * (1.0 - posture)
}

/// Chance an observer picks out `target` at `distance`, line of sight assumed
pub fn detection_probability(config: &TacticalConfig, terrain: &TerrainGrid, target: &Unit, distance: f32) -> f32 {
    let detection = &config.detection;
    if distance > detection.sight_range {
        return 0.0;
    }
    let range_curve = detection.base_probability * (1.0 - distance / detection.sight_range);
    let stealth = config.speed.profile(target.speed).stealth;
    (range_curve * (1.0 - concealment(config, terrain, target)) * stealth).clamp(0.0, 1.0)
}

/// Chance a shot from `shooter` hits a unit or tent with the given cover
pub fn hit_probability(config: &TacticalConfig, shooter: &Unit, distance: f32, target_cover: f32) -> Option<f32> {
    let band = config.weapon.accuracy_at(distance)?;
    let posture = config.posture.profile(shooter.posture).accuracy;
    let suppression = &config.suppression;
    let penalty = (shooter.suppression / suppression.threshold).min(1.0) * suppression.accuracy_penalty;
    Some((band * posture * (1.0 - penalty) * (1.0 - target_cover)).clamp(0.0, 1.0))
}

fn sense(m: &Match, stream: &TickStream, observer: &Unit) -> Sighting {
    let config = &m.config;
    let mut detected = Vec::new();
    for target in m.units.values() {
        if !target.is_alive() || !observer.side.is_hostile_to(target.side) {
            continue;
        }
        let distance = observer.position.distance(&target.position);
        if distance > config.detection.sight_range {
            continue;
        }
        if !m.terrain.has_line_of_sight(observer.position, target.position) {
            continue;
        }
        let seen = distance <= config.detection.auto_detect_range || {
            let p = detection_probability(config, &m.terrain, target, distance);
            p > stream.draw(DrawPurpose::Detect, DrawKey::Unit(observer.id), DrawKey::Unit(target.id))
        };
        if seen {
            detected.push((target.id, target.position));
        }
    }
    Sighting {
        observer: observer.id,
        detected,
    }
}

fn plan_shot(m: &Match, stream: &TickStream, shooter: &Unit, tick: Tick) -> Option<ShotPlan> {
    let config = &m.config;
    if !shooter.fire.shot_ready || shooter.state != BehaviorState::Firing || shooter.fire.rounds == 0 {
        return None;
    }
    if !roe_permits(shooter, tick, config) {
        return None;
    }
    let target = shooter.fire.target?;

    let (position, target_cover) = match target {
        TargetRef::Unit(id) => {
            let enemy = m.units.get(&id).filter(|u| u.is_alive())?;
            if !shooter.side.is_hostile_to(enemy.side) {
                return None;
            }
            let tracked = shooter.visible_enemies.contains(&id)
                || m.contacts
                    .get(&shooter.side)
                    .map(|b| b.is_tracked(shooter.id, id, tick, config.detection.contact_grace_ticks))
                    .unwrap_or(false);
            if !tracked {
                return None;
            }
            (enemy.position, cover(config, &m.terrain, enemy))
        }
        TargetRef::Tent(side) => {
            let tent = m.tents.get(&side).filter(|t| !t.destroyed)?;
            if !shooter.side.is_hostile_to(tent.side)
                || !m.terrain.has_line_of_sight(shooter.position, tent.position)
            {
                return None;
            }
            let ground = m.terrain.profile_at(tent.position).map(|p| p.cover).unwrap_or(0.0);
            (tent.position, ground)
        }
    };

    let distance = shooter.position.distance(&position);
    let hit_probability = hit_probability(config, shooter, distance, target_cover)?;
    let key = draw_key(target);
    let hit = stream.draw(DrawPurpose::Hit, DrawKey::Unit(shooter.id), key) < hit_probability;
    let severity_draw = stream.draw(DrawPurpose::Severity, DrawKey::Unit(shooter.id), key);

    Some(ShotPlan {
        shooter: shooter.id,
        target,
        suppress_only: shooter.fire.suppress_only,
        distance,
        hit_probability,
        hit,
        severity_draw,
    })
}

/// Relay a fresh contact to the rest of the observer's fireteam
fn relay_targets(m: &Match, observer: &Unit) -> Vec<UnitId> {
    let Some(name) = observer.fireteam else {
        return Vec::new();
    };
    m.fireteam(observer.side, name)
        .map(|team| {
            team.members
                .iter()
                .copied()
                .filter(|id| *id != observer.id)
                .filter(|id| m.units.get(id).map(|u| u.is_alive()).unwrap_or(false))
                .collect()
        })
        .unwrap_or_default()
}

fn merge_sightings(m: &mut Match, sightings: Vec<Sighting>, tick: Tick, outbox: &mut Outbox) {
    for sighting in sightings {
        let Some(observer) = m.units.get(&sighting.observer) else {
            continue;
        };
        let side = observer.side;
        let relays = relay_targets(m, observer);

        let mut visible = BTreeSet::new();
        for (enemy, position) in &sighting.detected {
            visible.insert(*enemy);
            let Some(book) = m.contacts.get_mut(&side) else {
                continue;
            };
            if !book.refresh(sighting.observer, *enemy, *position, tick) {
                continue;
            }
            tracing::debug!(tick, observer = %sighting.observer, %enemy, "Contact");
            let payload = RadioPayload::Contact {
                enemy: *enemy,
                position: *position,
                cell: m.terrain.cell_of(*position),
            };
            outbox.report(sighting.observer, side, RadioEventKind::Contact, payload.clone());
            for mate in &relays {
                outbox.push(
                    RadioSource::Unit(sighting.observer),
                    RadioDestination::Unit(*mate),
                    RadioEventKind::Contact,
                    payload.clone(),
                );
            }
        }
        if let Some(observer) = m.units.get_mut(&sighting.observer) {
            observer.visible_enemies = visible;
        }
    }

    let grace = m.config.detection.contact_grace_ticks;
    for (side, book) in m.contacts.iter_mut() {
        for lost in book.expire(tick, grace) {
            tracing::debug!(tick, observer = %lost.observer, enemy = %lost.enemy, "Contact lost");
            outbox.report(
                lost.observer,
                *side,
                RadioEventKind::ContactLost,
                RadioPayload::ContactLost {
                    enemy: lost.enemy,
                    last_seen: lost.last_position,
                },
            );
        }
    }
}

fn resolve_on_unit(m: &mut Match, plan: &ShotPlan, target_id: UnitId, tick: Tick, outbox: &mut Outbox) -> ShotOutcome {
    let suppression = m.config.suppression.clone();
    let weapon = m.config.weapon.clone();
    let Some(target) = m.units.get_mut(&target_id).filter(|u| u.is_alive()) else {
        return ShotOutcome::Miss;
    };
    target.last_fired_upon = Some(tick);

    if plan.suppress_only {
        target.suppression += suppression.per_suppressive_shot;
        return ShotOutcome::Suppressing;
    }
    if !plan.hit {
        target.suppression += suppression.per_near_miss;
        return ShotOutcome::Miss;
    }

    let kia_chance = match target.health {
        HealthState::Wounded => weapon.kia_chance_wounded,
        _ => weapon.kia_chance,
    };
    let health = target.health.after_hit(plan.severity_draw < kia_chance);
    let side = target.side;
    target.health = health;
    outbox.report(target_id, side, RadioEventKind::Casualty, RadioPayload::Casualty { health });

    if health.is_alive() {
        tracing::debug!(tick, shooter = %plan.shooter, target = %target_id, "Unit wounded");
        return ShotOutcome::Wounded;
    }

    target.go_down();
    tracing::info!(tick, shooter = %plan.shooter, target = %target_id, "Unit killed");
    if let Some(book) = m.contacts.get_mut(&side.opponent()) {
        book.remove_enemy(target_id);
    }
    if let Some(book) = m.contacts.get_mut(&side) {
        book.remove_observer(target_id);
    }
    for unit in m.units.values_mut() {
        unit.visible_enemies.remove(&target_id);
        unit.reported_contacts.remove(&target_id);
    }
    outbox.report(
        plan.shooter,
        side.opponent(),
        RadioEventKind::EnemyNeutralized,
        RadioPayload::EnemyNeutralized {
            target: TargetRef::Unit(target_id),
        },
    );
    ShotOutcome::Kia
}

fn resolve_on_tent(m: &mut Match, plan: &ShotPlan, side: Side, tick: Tick, outbox: &mut Outbox) -> ShotOutcome {
    let Some(tent) = m.tents.get_mut(&side).filter(|t| !t.destroyed) else {
        return ShotOutcome::Miss;
    };
    if plan.suppress_only {
        return ShotOutcome::Suppressing;
    }
    if !plan.hit {
        return ShotOutcome::Miss;
    }

    tent.destroyed = true;
    let winner = side.opponent();
    tracing::info!(tick, shooter = %plan.shooter, ?side, "Command tent destroyed");
    if !m.outcome.is_over() {
        m.outcome = MatchOutcome::Victory { winner, tick };
    }
    for channel in [Side::Friendly, Side::Enemy] {
        outbox.push(
            RadioSource::System,
            RadioDestination::Side(channel),
            RadioEventKind::TentDestroyed,
            RadioPayload::TentDestroyed { side },
        );
    }
    outbox.report(
        plan.shooter,
        winner,
        RadioEventKind::EnemyNeutralized,
        RadioPayload::EnemyNeutralized {
            target: TargetRef::Tent(side),
        },
    );
    ShotOutcome::TentDestroyed
}

fn merge_shots(m: &mut Match, plans: Vec<ShotPlan>, tick: Tick, outbox: &mut Outbox) {
    for plan in plans {
        let Some(shooter) = m.units.get_mut(&plan.shooter).filter(|u| u.is_alive()) else {
            continue;
        };
        shooter.fire.rounds = shooter.fire.rounds.saturating_sub(1);
        let side = shooter.side;
        if !shooter.fire.announced {
            shooter.fire.announced = true;
            outbox.report(
                plan.shooter,
                side,
                RadioEventKind::Engaging,
                RadioPayload::Engaging { target: plan.target },
            );
        }

        let outcome = match plan.target {
            TargetRef::Unit(id) => resolve_on_unit(m, &plan, id, tick, outbox),
            TargetRef::Tent(side) => resolve_on_tent(m, &plan, side, tick, outbox),
        };
        m.shot_log.push(ShotRecord {
            tick,
            shooter: plan.shooter,
            target: plan.target,
            suppress_only: plan.suppress_only,
            distance: plan.distance,
            hit_probability: plan.hit_probability,
            outcome,
        });
    }
}

/// Pin every unit whose suppression crossed the threshold
fn apply_suppression(m: &mut Match, tick: Tick) {
    let config = m.config.suppression.clone();
    for unit in m.units.values_mut().filter(|u| u.is_alive()) {
        if unit.suppression < config.threshold || unit.state == BehaviorState::Suppressed {
            continue;
        }
        unit.resume_state = Some(unit.state);
        unit.state = BehaviorState::Suppressed;
        unit.suppressed_until = Some(tick + config.pinned_ticks);
        unit.suppression -= config.threshold;
        unit.fire.shot_ready = false;
        tracing::debug!(tick, unit = %unit.id, "Suppressed");
    }
}

/// Combat phase: sense, then fire
pub fn phase_combat(m: &mut Match, stream: &TickStream) {
    let tick = m.tick();
    let mut outbox = Outbox::default();

    let view: &Match = m;
    let observers: Vec<&Unit> = view.units.values().filter(|u| u.is_alive()).collect();
    let sightings: Vec<Sighting> = if view.parallel() {
        observers.par_iter().map(|u| sense(view, stream, u)).collect()
    } else {
        observers.iter().map(|u| sense(view, stream, u)).collect()
    };
    merge_sightings(m, sightings, tick, &mut outbox);

    let view: &Match = m;
    let shooters: Vec<&Unit> = view.units.values().filter(|u| u.is_alive()).collect();
    let plans: Vec<ShotPlan> = if view.parallel() {
        shooters.par_iter().filter_map(|u| plan_shot(view, stream, u, tick)).collect()
    } else {
        shooters.iter().filter_map(|u| plan_shot(view, stream, u, tick)).collect()
    };
    merge_shots(m, plans, tick, &mut outbox);
    apply_suppression(m, tick);

    outbox.flush(&mut m.radio, tick);
}
