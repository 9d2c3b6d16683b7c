//! Tactical skirmish core: one authoritative match, stepped in fixed ticks
//!
//! Players issue orders against command cells; units carry them out on the
//! subcell grid and report back over a delayed radio net.
//!
//! - Orders are validated at the boundary and never half-applied
//! - Every random draw is keyed by (seed, tick, purpose, subject, object)
//! - Per-unit work may run in parallel; writes merge in unit-id order

pub mod behavior;
pub mod combat;
pub mod constants;
pub mod contacts;
pub mod dispatch;
pub mod execution;
pub mod grid;
pub mod orders;
pub mod pathfinding;
pub mod radio;
pub mod record;
pub mod rng;
pub mod roster;
pub mod scenario;
pub mod snapshot;
pub mod terrain;
pub mod units;

// Re-exports for convenient access
pub use combat::{detection_probability, hit_probability, phase_combat, ShotOutcome, ShotRecord};
pub use constants::*;
pub use contacts::{ContactBook, ContactRecord};
pub use dispatch::{dispatch_order, validate_order, DispatchOutcome, Rejection};
pub use execution::{Match, MatchOutcome, TickReport};
pub use grid::{CommandCell, SubcellCoord, TerrainGrid};
pub use orders::{
    Constraints, EngagementSpec, IntentCategory, Order, OrderKind, OrderQueue, Priority, Waypoint,
};
pub use pathfinding::{find_route, route_cost, CostTable, PathError, PathRequest, Route};
pub use radio::{
    FailureReason, RadioBus, RadioDestination, RadioEvent, RadioEventKind, RadioPayload,
    RadioSource,
};
pub use record::{MatchRecord, RecordedOrder};
pub use rng::{DrawKey, DrawPurpose, TickStream};
pub use roster::{MatchSetup, RosterEntry, TentPlacement};
pub use scenario::{Scenario, ScenarioFile, ScenarioRun};
pub use snapshot::{Snapshot, TentSnapshot, UnitSnapshot};
pub use terrain::{TerrainProfile, TerrainTable, TerrainType};
pub use units::{
    BehaviorState, CommandTent, Fireteam, FireteamName, HealthState, Posture, Roe, SpeedSetting,
    TargetRef, Unit,
};
