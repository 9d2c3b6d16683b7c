//! Latency-delayed radio bus
//!
//! Every report a unit makes reaches its player (or a teammate) exactly
//! `latency_ticks` after it was sent. Repeated reports of the same kind from
//! the same source are folded into one pending event that carries every
//! folded payload and a burst count.

use std::collections::{BTreeMap, BTreeSet};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::core::config::RadioConfig;
use crate::core::types::{OrderId, Side, Tick, UnitId};
use crate::tactical::grid::{CommandCell, SubcellCoord};
use crate::tactical::units::{HealthState, TargetRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RadioSource {
    Unit(UnitId),
    System,
}

/// Side channel (player UI) or a unit-to-unit relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RadioDestination {
    Side(Side),
    Unit(UnitId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RadioEventKind {
    Ack,
    Contact,
    ContactLost,
    Casualty,
    WaypointReached,
    UnableToComply,
    EnemyNeutralized,
    Engaging,
    TentDestroyed,
}

/// Why an accepted order could not be carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NoRoute,
    TargetLost,
    OutOfRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadioPayload {
    Ack { order: OrderId, intent: String },
    Contact { enemy: UnitId, position: SubcellCoord, cell: Option<CommandCell> },
    ContactLost { enemy: UnitId, last_seen: SubcellCoord },
    Casualty { health: HealthState },
    WaypointReached { cell: CommandCell },
    UnableToComply { order: OrderId, reason: FailureReason },
    EnemyNeutralized { target: TargetRef },
    Engaging { target: TargetRef },
    TentDestroyed { side: Side },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioEvent {
    pub seq: u64,
    pub source: RadioSource,
    pub destination: RadioDestination,
    pub kind: RadioEventKind,
    /// Payloads of every folded emission, oldest first
    pub payloads: Vec<RadioPayload>,
    pub origination_tick: Tick,
    pub delivery_tick: Tick,
    pub delivered: bool,
    /// Emissions folded into this event, itself included
    pub burst_count: u32,
}

impl RadioEvent {
    /// Most recent payload of the burst
    pub fn payload(&self) -> Option<&RadioPayload> {
        self.payloads.last()
    }

    /// Human-readable radio line
    pub fn describe(&self, callsign: &str) -> String {
        let Some(latest) = self.payload() else {
            return format!("{callsign}: ...");
        };
        match latest {
            RadioPayload::Ack { .. } => {
                let intents: Vec<&str> = self
                    .payloads
                    .iter()
                    .filter_map(|p| match p {
                        RadioPayload::Ack { intent, .. } => Some(intent.as_str()),
                        _ => None,
                    })
                    .collect();
                format!("{callsign}: copy, {}", intents.join(", "))
            }
            RadioPayload::Contact { .. } => {
                let cells: BTreeSet<CommandCell> = self
                    .payloads
                    .iter()
                    .filter_map(|p| match p {
                        RadioPayload::Contact { cell, .. } => *cell,
                        _ => None,
                    })
                    .collect();
                if cells.is_empty() {
                    format!("{callsign}: contact")
                } else {
                    let cells: Vec<String> = cells.iter().map(|c| c.to_string()).collect();
                    format!("{callsign}: contact, {}", cells.join(", "))
                }
            }
            RadioPayload::ContactLost { .. } => {
                let enemies: BTreeSet<UnitId> = self
                    .payloads
                    .iter()
                    .filter_map(|p| match p {
                        RadioPayload::ContactLost { enemy, .. } => Some(*enemy),
                        _ => None,
                    })
                    .collect();
                let enemies: Vec<String> = enemies.iter().map(|e| e.to_string()).collect();
                format!("{callsign}: lost contact with {}", enemies.join(", "))
            }
            RadioPayload::Casualty { health } => format!("{callsign}: I'm hit ({health:?})"),
            RadioPayload::WaypointReached { cell } => format!("{callsign}: at {cell}"),
            RadioPayload::UnableToComply { reason, .. } => {
                format!("{callsign}: unable to comply ({reason:?})")
            }
            RadioPayload::EnemyNeutralized { .. } => format!("{callsign}: enemy down"),
            RadioPayload::Engaging { .. } => format!("{callsign}: engaging enemy"),
            RadioPayload::TentDestroyed { side } => format!("command tent lost: {side:?}"),
        }
    }
}

type BurstKey = (RadioSource, RadioEventKind, RadioDestination);

/// Queue of in-flight radio traffic plus the delivered log
#[derive(Debug, Clone)]
pub struct RadioBus {
    latency_ticks: Tick,
    dedup_window_ticks: Tick,
    next_seq: u64,
    /// Keyed by (delivery tick, sequence)
    pending: BTreeMap<(Tick, u64), RadioEvent>,
    /// Latest pending event per burst key
    bursts: AHashMap<BurstKey, (Tick, u64)>,
    log: Vec<RadioEvent>,
}

impl RadioBus {
    pub fn new(config: &RadioConfig) -> Self {
        Self {
            latency_ticks: config.latency_ticks,
            dedup_window_ticks: config.dedup_window_ticks,
            next_seq: 0,
            pending: BTreeMap::new(),
            bursts: AHashMap::new(),
            log: Vec::new(),
        }
    }

    pub fn latency_ticks(&self) -> Tick {
        self.latency_ticks
    }

    /// Queue an emission; returns the sequence number of the event carrying it
    pub fn emit(
        &mut self,
        tick: Tick,
        source: RadioSource,
        destination: RadioDestination,
        kind: RadioEventKind,
        payload: RadioPayload,
    ) -> u64 {
        let key = (source, kind, destination);
        if let Some(slot) = self.bursts.get(&key) {
            if let Some(event) = self.pending.get_mut(slot) {
                if tick.saturating_sub(event.origination_tick) <= self.dedup_window_ticks {
                    event.burst_count += 1;
                    event.payloads.push(payload);
                    tracing::trace!(seq = event.seq, burst = event.burst_count, "radio burst folded");
                    return event.seq;
                }
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let delivery_tick = tick + self.latency_ticks;
        let event = RadioEvent {
            seq,
            source,
            destination,
            kind,
            payloads: vec![payload],
            origination_tick: tick,
            delivery_tick,
            delivered: false,
            burst_count: 1,
        };
        self.pending.insert((delivery_tick, seq), event);
        self.bursts.insert(key, (delivery_tick, seq));
        seq
    }

    /// Deliver every event due at or before `tick`, in (delivery tick, sequence) order
    pub fn deliver(&mut self, tick: Tick) -> Vec<RadioEvent> {
        let later = self.pending.split_off(&(tick + 1, 0));
        let due = std::mem::replace(&mut self.pending, later);
        if due.is_empty() {
            return Vec::new();
        }

        let pending = &self.pending;
        self.bursts.retain(|_, slot| pending.contains_key(slot));

        let delivered: Vec<RadioEvent> = due
            .into_values()
            .map(|mut event| {
                event.delivered = true;
                event
            })
            .collect();
        self.log.extend(delivered.iter().cloned());
        delivered
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self) -> impl Iterator<Item = &RadioEvent> {
        self.pending.values()
    }

    /// Append-only log of delivered events
    pub fn log(&self) -> &[RadioEvent] {
        &self.log
    }
}

/// Emissions collected while unit state is borrowed, flushed in push order
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    entries: Vec<(RadioSource, RadioDestination, RadioEventKind, RadioPayload)>,
}

impl Outbox {
    pub(crate) fn push(
        &mut self,
        source: RadioSource,
        destination: RadioDestination,
        kind: RadioEventKind,
        payload: RadioPayload,
    ) {
        self.entries.push((source, destination, kind, payload));
    }

    /// Report from a unit to its own side's channel
    pub(crate) fn report(&mut self, unit: UnitId, side: Side, kind: RadioEventKind, payload: RadioPayload) {
        self.push(RadioSource::Unit(unit), RadioDestination::Side(side), kind, payload);
    }

    pub(crate) fn flush(self, bus: &mut RadioBus, tick: Tick) {
        for (source, destination, kind, payload) in self.entries {
            bus.emit(tick, source, destination, kind, payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus(latency: Tick, window: Tick) -> RadioBus {
        RadioBus::new(&RadioConfig {
            latency_ticks: latency,
            dedup_window_ticks: window,
        })
    }

    fn casualty(health: HealthState) -> RadioPayload {
        RadioPayload::Casualty { health }
    }

    const TO_FRIENDLY: RadioDestination = RadioDestination::Side(Side::Friendly);

    #[test]
    fn test_delivery_after_latency() {
        let mut bus = bus(5, 3);
        bus.emit(10, RadioSource::Unit(UnitId(1)), TO_FRIENDLY, RadioEventKind::Casualty, casualty(HealthState::Wounded));

        for t in 10..15 {
            assert!(bus.deliver(t).is_empty(), "delivered early at {t}");
        }
        let delivered = bus.deliver(15);
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].delivered);
        assert_eq!(delivered[0].delivery_tick, 15);
        assert_eq!(bus.log().len(), 1);
    }

    #[test]
    fn test_burst_folds_and_keeps_every_payload() {
        let mut bus = bus(5, 3);
        let src = RadioSource::Unit(UnitId(1));
        let first = bus.emit(10, src, TO_FRIENDLY, RadioEventKind::Casualty, casualty(HealthState::Wounded));
        let second = bus.emit(12, src, TO_FRIENDLY, RadioEventKind::Casualty, casualty(HealthState::Kia));
        assert_eq!(first, second);
        assert_eq!(bus.pending_count(), 1);

        let delivered = bus.deliver(15);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].burst_count, 2);
        assert_eq!(delivered[0].origination_tick, 10);
        assert_eq!(
            delivered[0].payloads,
            vec![casualty(HealthState::Wounded), casualty(HealthState::Kia)]
        );
        assert_eq!(delivered[0].payload(), Some(&casualty(HealthState::Kia)));
    }

    #[test]
    fn test_contact_burst_names_every_enemy() {
        let mut bus = bus(5, 3);
        let src = RadioSource::Unit(UnitId(1));
        for (enemy, label) in [(3, "B0"), (4, "A1")] {
            let cell: CommandCell = label.parse().unwrap();
            bus.emit(
                1,
                src,
                TO_FRIENDLY,
                RadioEventKind::Contact,
                RadioPayload::Contact {
                    enemy: UnitId(enemy),
                    position: SubcellCoord::new(0, 0),
                    cell: Some(cell),
                },
            );
        }
        let delivered = bus.deliver(6);
        assert_eq!(delivered.len(), 1);
        let enemies: Vec<UnitId> = delivered[0]
            .payloads
            .iter()
            .filter_map(|p| match p {
                RadioPayload::Contact { enemy, .. } => Some(*enemy),
                _ => None,
            })
            .collect();
        assert_eq!(enemies, vec![UnitId(3), UnitId(4)]);
        assert_eq!(delivered[0].describe("Lead"), "Lead: contact, A1, B0");
    }

    #[test]
    fn test_outside_window_not_folded() {
        let mut bus = bus(5, 3);
        let src = RadioSource::Unit(UnitId(1));
        bus.emit(10, src, TO_FRIENDLY, RadioEventKind::Casualty, casualty(HealthState::Wounded));
        bus.emit(14, src, TO_FRIENDLY, RadioEventKind::Casualty, casualty(HealthState::Kia));
        assert_eq!(bus.pending_count(), 2);
    }

    #[test]
    fn test_different_destinations_not_folded() {
        let mut bus = bus(5, 3);
        let src = RadioSource::Unit(UnitId(1));
        let payload = RadioPayload::Contact {
            enemy: UnitId(9),
            position: SubcellCoord::new(3, 3),
            cell: None,
        };
        bus.emit(10, src, TO_FRIENDLY, RadioEventKind::Contact, payload.clone());
        bus.emit(10, src, RadioDestination::Unit(UnitId(2)), RadioEventKind::Contact, payload);
        assert_eq!(bus.pending_count(), 2);
    }

    #[test]
    fn test_delivered_burst_starts_new_event() {
        let mut bus = bus(2, 2);
        let src = RadioSource::Unit(UnitId(1));
        bus.emit(1, src, TO_FRIENDLY, RadioEventKind::Engaging, RadioPayload::Engaging { target: TargetRef::Tent(Side::Enemy) });
        assert_eq!(bus.deliver(3).len(), 1);
        bus.emit(3, src, TO_FRIENDLY, RadioEventKind::Engaging, RadioPayload::Engaging { target: TargetRef::Tent(Side::Enemy) });
        assert_eq!(bus.pending_count(), 1);
        assert_eq!(bus.deliver(5)[0].burst_count, 1);
    }

    #[test]
    fn test_delivery_ordered_by_sequence() {
        let mut bus = bus(3, 0);
        for id in [4, 2, 7] {
            bus.emit(1, RadioSource::Unit(UnitId(id)), TO_FRIENDLY, RadioEventKind::Ack, RadioPayload::Ack { order: OrderId(1), intent: "hold".into() });
        }
        let seqs: Vec<u64> = bus.deliver(4).iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }
}
