use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::model::{Slot, SlotKey};

/// Reports slots that were not present on the previous observation of the
/// same monitored entity.
///
/// The snapshot for an id is replaced on every call, so "new" is relative to
/// the immediately preceding call only. The first call for an id records a
/// baseline and reports nothing.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    snapshots: HashMap<String, HashSet<SlotKey>>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detect(&mut self, id: &str, current: &[Slot]) -> Vec<Slot> {
        let keys: HashSet<SlotKey> = current.iter().map(Slot::key).collect();

        let Some(previous) = self.snapshots.insert(id.to_string(), keys) else {
            debug!(target_id = id, slots = current.len(), "recorded baseline snapshot");
            return Vec::new();
        };

        // Keep array order and drop duplicate keys within one fetch.
        let mut seen = HashSet::new();
        let new_slots: Vec<Slot> = current
            .iter()
            .filter(|s| {
                let key = s.key();
                !previous.contains(&key) && seen.insert(key)
            })
            .cloned()
            .collect();

        if new_slots.is_empty() {
            debug!(target_id = id, "no new slots");
        } else {
            info!(target_id = id, count = new_slots.len(), "detected new slots");
        }
        new_slots
    }
}
