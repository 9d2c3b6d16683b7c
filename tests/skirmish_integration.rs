//! Skirmish integration tests

use std::sync::Arc;

use command_tent::core::config::TacticalConfig;
use command_tent::core::error::TacticalError;
use command_tent::core::types::{Side, UnitId};
use command_tent::tactical::*;

fn cell(label: &str) -> CommandCell {
    label.parse().unwrap()
}

fn scenario(path: &str) -> Scenario {
    ScenarioFile::load(path).unwrap().build().unwrap()
}

fn snapshot_bytes(reports: &[TickReport]) -> Vec<Vec<u8>> {
    reports.iter().map(|r| r.snapshot.to_json().unwrap()).collect()
}

#[test]
fn test_same_seed_same_snapshots() {
    let demo = ScenarioFile::demo().unwrap().build().unwrap();
    let first = demo.run(Some(300)).unwrap();
    let second = demo.run(Some(300)).unwrap();

    assert_eq!(snapshot_bytes(&first.reports), snapshot_bytes(&second.reports));
    assert_eq!(first.state.shot_log, second.state.shot_log);
    assert_eq!(first.state.radio.log(), second.state.radio.log());
}

#[test]
fn test_parallel_matches_sequential() {
    let demo = ScenarioFile::demo().unwrap().build().unwrap();
    let sequential = demo.run(Some(200)).unwrap();

    let mut parallel = demo.clone();
    parallel.config.parallel_threshold = 1;
    let parallel = parallel.run(Some(200)).unwrap();

    assert_eq!(snapshot_bytes(&sequential.reports), snapshot_bytes(&parallel.reports));
}

#[test]
fn test_red_moves_a1_to_b4_by_road() {
    let red_patrol = scenario("data/scenarios/red_patrol.toml");
    let run = red_patrol.run(None).unwrap();
    let state = &run.state;
    let red = state.unit_id("Red").unwrap();

    // Weapons held throughout
    assert!(state.shot_log.iter().all(|s| s.shooter != red));

    // Every position Red occupied was on the road
    for report in &run.reports {
        let position = report.snapshot.unit(red).unwrap().position;
        assert_eq!(
            red_patrol.terrain.terrain_at(position),
            Some(TerrainType::Road),
            "Red left the road at tick {}",
            report.tick
        );
    }

    let arrival = state
        .radio
        .log()
        .iter()
        .find(|e| e.kind == RadioEventKind::WaypointReached && e.source == RadioSource::Unit(red))
        .expect("waypoint-reached should be delivered");
    assert_eq!(
        arrival.payload(),
        Some(&RadioPayload::WaypointReached { cell: cell("B4") })
    );
    assert_eq!(arrival.delivery_tick - arrival.origination_tick, state.config.radio.latency_ticks);
    assert_eq!(state.terrain.cell_of(state.unit(red).unwrap().position), Some(cell("B4")));
    assert_eq!(state.unit(red).unwrap().state, BehaviorState::Idle);
}

#[test]
fn test_alpha_contact_then_engaging() {
    let alpha = scenario("data/scenarios/alpha_contact.toml");
    let run = alpha.run(None).unwrap();
    let state = &run.state;
    let alpha_ids: Vec<UnitId> = ["Alpha1", "Alpha2", "Alpha3"]
        .iter()
        .map(|c| state.unit_id(c).unwrap())
        .collect();
    let from_alpha = |e: &&RadioEvent| matches!(e.source, RadioSource::Unit(id) if alpha_ids.contains(&id));

    let contact = state
        .radio
        .log()
        .iter()
        .filter(from_alpha)
        .find(|e| e.kind == RadioEventKind::Contact && e.destination == RadioDestination::Side(Side::Friendly))
        .expect("Alpha should report contact");
    let engaging = state
        .radio
        .log()
        .iter()
        .filter(from_alpha)
        .find(|e| e.kind == RadioEventKind::Engaging)
        .expect("Alpha should report engaging");
    assert!(contact.origination_tick < engaging.origination_tick);
    assert!(state.shot_log.iter().any(|s| alpha_ids.contains(&s.shooter)));

    // Same seed, same fight
    let rerun = alpha.run(None).unwrap();
    assert_eq!(rerun.state.outcome, state.outcome);
    assert_eq!(rerun.state.shot_log, state.shot_log);
    assert_eq!(snapshot_bytes(&rerun.reports), snapshot_bytes(&run.reports));
}

#[test]
fn test_friendly_only_cell_rejected() {
    let terrain = Arc::new(TerrainGrid::new(4, 4, 10, TerrainType::Open).unwrap());
    let setup = MatchSetup::new(3)
        .unit(RosterEntry::new("Red", Side::Friendly, cell("A0")))
        .unit(RosterEntry::new("Green", Side::Friendly, cell("C2")))
        .unit(RosterEntry::new("Blue", Side::Enemy, cell("D3")))
        .tent(Side::Friendly, cell("B3"), None);
    let mut m = Match::new(setup, terrain, TacticalConfig::default()).unwrap();

    let at_green = m.submit(Side::Friendly, Order::attack(vec![UnitId(1)], vec![cell("C2")]));
    let at_tent = m.submit(Side::Friendly, Order::attack(vec![UnitId(1)], vec![cell("B3")]));
    let at_blue = m.submit(Side::Friendly, Order::attack(vec![UnitId(1)], vec![cell("D3")]));
    m.step().unwrap();

    assert_eq!(
        m.dispatch_outcome(at_green).unwrap().result,
        Err(Rejection::FriendlyFireViolation(cell("C2")))
    );
    assert_eq!(
        m.dispatch_outcome(at_tent).unwrap().result,
        Err(Rejection::FriendlyFireViolation(cell("B3")))
    );
    assert!(m.dispatch_outcome(at_blue).unwrap().result.is_ok());
    assert_eq!(m.dispatch_log.len(), 3);
    assert_eq!(m.record.orders.len(), 1);
}

#[test]
fn test_tent_destruction_ends_match() {
    let terrain = Arc::new(TerrainGrid::new(4, 4, 10, TerrainType::Open).unwrap());
    let setup = MatchSetup::new(21)
        .unit(RosterEntry::new("Raider", Side::Enemy, cell("B1")).at(2, 5))
        .tent(Side::Friendly, cell("B1"), Some([8, 5]))
        .tent(Side::Enemy, cell("D3"), None);
    let mut m = Match::new(setup, terrain, TacticalConfig::default()).unwrap();
    m.submit(Side::Enemy, Order::attack(vec![UnitId(1)], vec![cell("B1")]));

    let mut destroyed_at = None;
    for _ in 0..400 {
        if m.is_finished() {
            break;
        }
        let report = m.step().unwrap();
        let tent = report.snapshot.tents.iter().find(|t| t.side == Side::Friendly).unwrap();
        if tent.destroyed && destroyed_at.is_none() {
            destroyed_at = Some(report.tick);
        }
    }

    let tick = destroyed_at.expect("the tent should fall");
    assert_eq!(m.outcome, MatchOutcome::Victory { winner: Side::Enemy, tick });
    assert!(!m.tent(Side::Enemy).unwrap().destroyed);
    assert_eq!(
        m.shot_log.iter().filter(|s| s.outcome == ShotOutcome::TentDestroyed).count(),
        1
    );
    assert!(matches!(m.step(), Err(TacticalError::MatchOver)));
}

#[test]
fn test_radio_latency_and_dedup_hold_over_a_match() {
    let demo = ScenarioFile::demo().unwrap().build().unwrap();
    let run = demo.run(Some(400)).unwrap();
    let radio = &run.state.config.radio;
    let log = run.state.radio.log();
    assert!(!log.is_empty());

    for event in log {
        assert!(event.delivered);
        assert_eq!(event.delivery_tick - event.origination_tick, radio.latency_ticks);
    }
    for (i, a) in log.iter().enumerate() {
        for b in &log[i + 1..] {
            let same_key = a.source == b.source && a.kind == b.kind && a.destination == b.destination;
            if same_key {
                let gap = a.origination_tick.abs_diff(b.origination_tick);
                assert!(gap > radio.dedup_window_ticks, "events {} and {} should have folded", a.seq, b.seq);
            }
        }
    }
}

#[test]
fn test_no_friendly_fire_over_a_match() {
    let demo = ScenarioFile::demo().unwrap().build().unwrap();
    let run = demo.run(Some(600)).unwrap();
    let state = &run.state;
    for shot in &state.shot_log {
        let shooter = state.unit(shot.shooter).unwrap();
        let target_side = match shot.target {
            TargetRef::Unit(id) => state.unit(id).unwrap().side,
            TargetRef::Tent(side) => side,
        };
        assert!(shooter.side.is_hostile_to(target_side), "shot {shot:?} hit its own side");
    }
}

#[test]
fn test_replayed_record_matches_live_run() {
    let demo = ScenarioFile::demo().unwrap().build().unwrap();
    let live = demo.run(Some(150)).unwrap();
    let record = MatchRecord::from_json(&live.state.record.to_json().unwrap()).unwrap();

    let (_, replayed) = record
        .replay(Arc::clone(&demo.terrain), demo.config.clone(), 150)
        .unwrap();
    assert_eq!(snapshot_bytes(&live.reports), snapshot_bytes(&replayed));
}

#[test]
fn test_order_json_round_trip_through_dispatch() {
    let json = r#"{
        "units": [1],
        "intent": "move",
        "waypoints": ["C1", {"cell": "C3", "subcell": [2, 2]}],
        "constraints": {"avoid_cells": ["B2"], "stay_concealed": true},
        "priority": "high"
    }"#;
    let order = Order::from_json(json).unwrap();
    assert_eq!(order.priority, Priority::High);
    assert!(order.ack);

    let terrain = Arc::new(TerrainGrid::new(4, 4, 10, TerrainType::Open).unwrap());
    let setup = MatchSetup::new(1).unit(RosterEntry::new("Red", Side::Friendly, cell("A0")));
    let mut m = Match::new(setup, terrain, TacticalConfig::default()).unwrap();
    let submission = m.submit(Side::Friendly, order);
    m.run_ticks(200).unwrap();

    assert!(m.dispatch_outcome(submission).unwrap().result.is_ok());
    let red = m.unit(UnitId(1)).unwrap();
    assert_eq!(red.speed, SpeedSetting::Slow);
    assert_eq!(m.terrain.cell_of(red.position), Some(cell("C3")));
}

#[test]
fn test_order_acts_from_the_tick_after_intake() {
    let terrain = Arc::new(TerrainGrid::new(4, 4, 10, TerrainType::Open).unwrap());
    let setup = MatchSetup::new(1).unit(RosterEntry::new("Red", Side::Friendly, cell("A0")).at(0, 0));
    let mut m = Match::new(setup, terrain, TacticalConfig::default()).unwrap();
    let start = m.unit(UnitId(1)).unwrap().position;

    let submission = m.submit(Side::Friendly, Order::move_to(vec![UnitId(1)], vec![cell("D3").into()]));
    let intake = m.step().unwrap();
    assert_eq!(intake.dispatched.len(), 1);
    assert!(m.dispatch_outcome(submission).unwrap().result.is_ok());
    assert_eq!(intake.snapshot.unit(UnitId(1)).unwrap().position, start);

    let next = m.step().unwrap();
    assert_ne!(next.snapshot.unit(UnitId(1)).unwrap().position, start);
}
