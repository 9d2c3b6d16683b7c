//! Headless Skirmish Runner
//!
//! Runs a TOML scenario (or the built-in demo) and prints the outcome,
//! radio traffic and final positions as JSON or text.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use command_tent::core::config::TacticalConfig;
use command_tent::core::error::Result;
use command_tent::core::types::Side;
use command_tent::tactical::radio::{RadioDestination, RadioSource};
use command_tent::tactical::scenario::{ScenarioFile, ScenarioRun};
use command_tent::tactical::snapshot::UnitSnapshot;
use command_tent::tactical::{Match, MatchOutcome, ShotOutcome};
use serde::Serialize;

/// Headless Skirmish Runner - play a scripted scenario without a client
#[derive(Parser, Debug)]
#[command(name = "skirmish")]
#[command(about = "Run a tactical skirmish scenario and report the result")]
struct Args {
    /// Scenario TOML file (built-in demo when omitted)
    scenario: Option<PathBuf>,

    /// Override the scenario seed
    #[arg(long)]
    seed: Option<u64>,

    /// Ticks to run (scenario default when omitted)
    #[arg(long)]
    ticks: Option<u64>,

    /// Replace the scenario's tactical config with this TOML file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format: json or text
    #[arg(long, default_value = "text")]
    format: String,

    /// Write the match record (seed, setup, accepted orders) to this file
    #[arg(long)]
    record: Option<PathBuf>,

    /// Debug-level logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[derive(Serialize)]
struct RadioLine {
    tick: u64,
    channel: String,
    burst: u32,
    text: String,
}

/// JSON output structure
#[derive(Serialize)]
struct SkirmishResult {
    scenario: String,
    seed: u64,
    ticks: u64,
    outcome: MatchOutcome,
    orders_accepted: usize,
    orders_rejected: usize,
    shots: usize,
    hits: usize,
    friendly_alive: usize,
    enemy_alive: usize,
    units: Vec<UnitSnapshot>,
    radio: Vec<RadioLine>,
}

fn radio_lines(state: &Match) -> Vec<RadioLine> {
    state
        .radio
        .log()
        .iter()
        .map(|event| {
            let callsign = match event.source {
                RadioSource::Unit(id) => state.unit(id).map(|u| u.callsign.as_str()).unwrap_or("?"),
                RadioSource::System => "HQ",
            };
            let channel = match event.destination {
                RadioDestination::Side(side) => format!("{side:?}"),
                RadioDestination::Unit(id) => state
                    .unit(id)
                    .map(|u| format!("relay:{}", u.callsign))
                    .unwrap_or_else(|| format!("relay:{id}")),
            };
            RadioLine {
                tick: event.delivery_tick,
                channel,
                burst: event.burst_count,
                text: event.describe(callsign),
            }
        })
        .collect()
}

fn summarize(name: &str, seed: u64, run: &ScenarioRun) -> SkirmishResult {
    let state = &run.state;
    let snapshot = state.snapshot();
    let hits = state
        .shot_log
        .iter()
        .filter(|s| {
            matches!(
                s.outcome,
                ShotOutcome::Wounded | ShotOutcome::Kia | ShotOutcome::TentDestroyed
            )
        })
        .count();
    let accepted = state.dispatch_log.iter().filter(|o| o.result.is_ok()).count();

    SkirmishResult {
        scenario: name.to_string(),
        seed,
        ticks: state.tick(),
        outcome: state.outcome,
        orders_accepted: accepted,
        orders_rejected: state.dispatch_log.len() - accepted,
        shots: state.shot_log.len(),
        hits,
        friendly_alive: snapshot.living(Side::Friendly),
        enemy_alive: snapshot.living(Side::Enemy),
        units: snapshot.units,
        radio: radio_lines(state),
    }
}

fn print_text(result: &SkirmishResult) {
    println!("Skirmish Result");
    println!("===============");
    println!("Scenario: {}", result.scenario);
    println!("Seed: {}", result.seed);
    println!("Ticks: {}", result.ticks);
    println!("Outcome: {:?}", result.outcome);
    println!(
        "Orders: {} accepted, {} rejected",
        result.orders_accepted, result.orders_rejected
    );
    println!("Shots: {} ({} hits)", result.shots, result.hits);
    println!(
        "Alive: {} friendly, {} enemy",
        result.friendly_alive, result.enemy_alive
    );
    println!();
    println!("Radio log:");
    for line in &result.radio {
        let burst = if line.burst > 1 {
            format!(" (x{})", line.burst)
        } else {
            String::new()
        };
        println!("  [{:>5}] {:<16} {}{}", line.tick, line.channel, line.text, burst);
    }
    println!();
    println!("Final positions:");
    for unit in &result.units {
        let cell = unit.cell.map(|c| c.to_string()).unwrap_or_else(|| "--".into());
        println!(
            "  {:<10} {:?} {} ({},{}) {:?} {:?}",
            unit.callsign, unit.side, cell, unit.position.x, unit.position.y, unit.health, unit.state
        );
    }
}

fn run(args: &Args) -> Result<()> {
    let mut file = match &args.scenario {
        Some(path) => ScenarioFile::load(path)?,
        None => ScenarioFile::demo()?,
    };
    if let Some(path) = &args.config {
        file.config = TacticalConfig::load(path)?;
    }
    let seed = args.seed.unwrap_or(file.seed);
    let scenario = file.build()?.with_seed(seed);

    let run = scenario.run(args.ticks)?;
    if let Some(path) = &args.record {
        fs::write(path, run.state.record.to_json()?)?;
        tracing::info!(path = %path.display(), "Match record written");
    }

    let result = summarize(&scenario.name, seed, &run);
    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        "text" => print_text(&result),
        other => {
            eprintln!("Unknown format '{}', defaulting to text", other);
            print_text(&result);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("skirmish: {e}");
            ExitCode::FAILURE
        }
    }
}
