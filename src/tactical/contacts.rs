//! Per-side contact memory
//!
//! A contact is one observer's knowledge of one enemy. Records survive a
//! short grace window after the last sighting, which keeps firing
//! continuous through flickering line of sight.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::types::{Tick, UnitId};
use crate::tactical::grid::SubcellCoord;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub observer: UnitId,
    pub enemy: UnitId,
    pub last_position: SubcellCoord,
    pub first_seen: Tick,
    pub last_seen: Tick,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactBook {
    records: BTreeMap<(UnitId, UnitId), ContactRecord>,
}

impl ContactBook {
    /// Record a sighting; true when the contact is new
    pub fn refresh(&mut self, observer: UnitId, enemy: UnitId, position: SubcellCoord, tick: Tick) -> bool {
        match self.records.get_mut(&(observer, enemy)) {
            Some(record) => {
                record.last_position = position;
                record.last_seen = tick;
                false
            }
            None => {
                self.records.insert(
                    (observer, enemy),
                    ContactRecord {
                        observer,
                        enemy,
                        last_position: position,
                        first_seen: tick,
                        last_seen: tick,
                    },
                );
                true
            }
        }
    }

    /// Drop records older than the grace window, returning them in key order
    pub fn expire(&mut self, tick: Tick, grace: Tick) -> Vec<ContactRecord> {
        let stale: Vec<(UnitId, UnitId)> = self
            .records
            .iter()
            .filter(|(_, r)| tick.saturating_sub(r.last_seen) > grace)
            .map(|(k, _)| *k)
            .collect();
        stale
            .into_iter()
            .filter_map(|k| self.records.remove(&k))
            .collect()
    }

    /// Forget everything about a dead enemy
    pub fn remove_enemy(&mut self, enemy: UnitId) {
        self.records.retain(|(_, e), _| *e != enemy);
    }

    /// Forget everything a dead observer knew
    pub fn remove_observer(&mut self, observer: UnitId) {
        self.records.retain(|(o, _), _| *o != observer);
    }

    pub fn get(&self, observer: UnitId, enemy: UnitId) -> Option<&ContactRecord> {
        self.records.get(&(observer, enemy))
    }

    /// Tracked and seen within the grace window
    pub fn is_tracked(&self, observer: UnitId, enemy: UnitId, tick: Tick, grace: Tick) -> bool {
        self.get(observer, enemy)
            .map(|r| tick.saturating_sub(r.last_seen) <= grace)
            .unwrap_or(false)
    }

    pub fn contacts_of(&self, observer: UnitId) -> impl Iterator<Item = &ContactRecord> {
        self.records
            .range((observer, UnitId(0))..=(observer, UnitId(u32::MAX)))
            .map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_reports_new_once() {
        let mut book = ContactBook::default();
        assert!(book.refresh(UnitId(1), UnitId(9), SubcellCoord::new(1, 1), 5));
        assert!(!book.refresh(UnitId(1), UnitId(9), SubcellCoord::new(2, 1), 6));
        let record = book.get(UnitId(1), UnitId(9)).unwrap();
        assert_eq!(record.first_seen, 5);
        assert_eq!(record.last_position, SubcellCoord::new(2, 1));
    }

    #[test]
    fn test_expire_after_grace() {
        let mut book = ContactBook::default();
        book.refresh(UnitId(1), UnitId(9), SubcellCoord::new(1, 1), 5);
        assert!(book.expire(15, 10).is_empty());
        assert!(book.is_tracked(UnitId(1), UnitId(9), 15, 10));
        let lost = book.expire(16, 10);
        assert_eq!(lost.len(), 1);
        assert!(book.is_empty());
    }

    #[test]
    fn test_contacts_of_observer() {
        let mut book = ContactBook::default();
        book.refresh(UnitId(1), UnitId(9), SubcellCoord::new(1, 1), 5);
        book.refresh(UnitId(1), UnitId(8), SubcellCoord::new(1, 2), 5);
        book.refresh(UnitId(2), UnitId(9), SubcellCoord::new(1, 1), 5);
        let enemies: Vec<UnitId> = book.contacts_of(UnitId(1)).map(|r| r.enemy).collect();
        assert_eq!(enemies, vec![UnitId(8), UnitId(9)]);
    }

    #[test]
    fn test_remove_enemy_and_observer() {
        let mut book = ContactBook::default();
        book.refresh(UnitId(1), UnitId(9), SubcellCoord::new(1, 1), 5);
        book.refresh(UnitId(2), UnitId(9), SubcellCoord::new(1, 1), 5);
        book.refresh(UnitId(2), UnitId(8), SubcellCoord::new(1, 1), 5);
        book.remove_enemy(UnitId(9));
        assert_eq!(book.len(), 1);
        book.remove_observer(UnitId(2));
        assert!(book.is_empty());
    }
}
