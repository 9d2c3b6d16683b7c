use std::sync::Arc;

use command_tent::core::config::TacticalConfig;
use command_tent::core::types::Side;
use command_tent::tactical::{
    find_route, CommandCell, CostTable, Match, MatchSetup, PathRequest, Roe, RosterEntry,
    ScenarioFile, SubcellCoord, TerrainGrid, TerrainTable, TerrainType,
};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

/// Two lines of riflemen facing each other across open ground
fn firefight(units_per_side: u32, parallel_threshold: usize) -> Match {
    let terrain = Arc::new(TerrainGrid::new(10, 10, 20, TerrainType::Open).unwrap());
    let mut setup = MatchSetup::new(99);
    for i in 0..units_per_side {
        let row = (i % 10) as u8;
        let west = CommandCell::new(1, row).unwrap();
        let east = CommandCell::new(6, row).unwrap();
        setup = setup
            .unit(RosterEntry::new(format!("W{i}"), Side::Friendly, west).with_roe(Roe::Free))
            .unit(RosterEntry::new(format!("E{i}"), Side::Enemy, east).with_roe(Roe::Free));
    }
    let config = TacticalConfig {
        parallel_threshold,
        ..TacticalConfig::default()
    };
    Match::new(setup, terrain, config).unwrap()
}

fn bench_ticks(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");

    for units in [8u32, 32, 64] {
        for (label, threshold) in [("sequential", usize::MAX), ("parallel", 1)] {
            group.bench_with_input(BenchmarkId::new(label, units * 2), &units, |b, &units| {
                b.iter_batched(
                    || firefight(units, threshold),
                    |mut m| {
                        m.run_ticks(50).unwrap();
                    },
                    BatchSize::SmallInput,
                )
            });
        }
    }

    group.finish();
}

fn bench_demo(c: &mut Criterion) {
    let demo = ScenarioFile::demo().unwrap().build().unwrap();
    c.bench_function("demo_300_ticks", |b| {
        b.iter(|| demo.run(Some(300)).unwrap())
    });
}

fn bench_route(c: &mut Criterion) {
    let mut grid = TerrainGrid::new(10, 10, 100, TerrainType::Open).unwrap();
    grid.fill_rect(SubcellCoord::new(300, 0), SubcellCoord::new(320, 900), TerrainType::Water);
    grid.fill_rect(SubcellCoord::new(600, 100), SubcellCoord::new(620, 999), TerrainType::Forest);
    let costs = CostTable::new(&TerrainTable::default(), &[TerrainType::Road], 0.7);
    let request = PathRequest::new(
        SubcellCoord::new(10, 10),
        vec![SubcellCoord::new(990, 990)],
        costs,
    );

    c.bench_function("route_full_map", |b| {
        b.iter(|| find_route(&grid, &request).unwrap())
    });
}

criterion_group!(tick_benches, bench_ticks, bench_demo, bench_route);
criterion_main!(tick_benches);
