use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::{DateWindow, MonitoredTarget, Slot, TimeWindow};

/// Configured date and time window a slot must fall into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preference {
    pub dates: DateWindow,
    pub times: TimeWindow,
}

/// A slot field the filter could not interpret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MalformedSlot {
    Date(String),
    Time(String),
}

impl Preference {
    pub fn of(target: &MonitoredTarget) -> Self {
        Self {
            dates: target.dates,
            times: target.times,
        }
    }

    /// Pure predicate: both bounds inclusive.
    pub fn admits(&self, slot: &Slot) -> Result<bool, MalformedSlot> {
        let date = slot
            .parsed_date()
            .ok_or_else(|| MalformedSlot::Date(slot.date.clone()))?;
        let time = slot
            .parsed_time()
            .ok_or_else(|| MalformedSlot::Time(slot.time.clone()))?;
        Ok(self.dates.contains(date) && self.times.contains(time))
    }

    /// Keeps matching slots in order. Malformed slots are skipped with a warning.
    pub fn filter(&self, slots: &[Slot]) -> Vec<Slot> {
        let mut kept = Vec::new();
        for slot in slots {
            match self.admits(slot) {
                Ok(true) => {
                    debug!(date = %slot.date, time = %slot.time, "slot matches preferences");
                    kept.push(slot.clone());
                }
                Ok(false) => {
                    debug!(date = %slot.date, time = %slot.time, "slot outside preferences");
                }
                Err(bad) => {
                    warn!(slot_id = %slot.slot_id, field = ?bad, "skipping slot with malformed field");
                }
            }
        }
        debug!("filtered {}/{} slots matching preferences", kept.len(), slots.len());
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ActionRef;

    fn pref() -> Preference {
        Preference {
            dates: DateWindow::parse("2026-01-15", "2026-01-20").unwrap(),
            times: TimeWindow::parse("10:00", "16:00").unwrap(),
        }
    }

    fn slot(date: &str, time: &str) -> Slot {
        Slot {
            date: date.into(),
            time: time.into(),
            slot_id: format!("{date}-{time}"),
            capacity: 1,
            action: ActionRef::new("?slot=1"),
            deadline: None,
        }
    }

    #[test]
    fn window_scenario() {
        let p = pref();
        assert_eq!(p.admits(&slot("2026-01-18", "14:00")), Ok(true));
        assert_eq!(p.admits(&slot("2026-01-25", "14:00")), Ok(false));
        assert_eq!(p.admits(&slot("2026-01-18", "08:00")), Ok(false));
    }

    #[test]
    fn bounds_are_inclusive() {
        let p = pref();
        assert_eq!(p.admits(&slot("2026-01-15", "10:00")), Ok(true));
        assert_eq!(p.admits(&slot("2026-01-20", "16:00")), Ok(true));
        assert_eq!(p.admits(&slot("2026-01-14", "12:00")), Ok(false));
        assert_eq!(p.admits(&slot("2026-01-18", "16:01")), Ok(false));
    }

    #[test]
    fn malformed_slot_is_skipped_not_fatal() {
        let p = pref();
        let slots = vec![
            slot("soon", "14:00"),
            slot("2026-01-18", "2pm"),
            slot("2026-01-18", "14:00"),
        ];
        let kept = p.filter(&slots);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].date, "2026-01-18");
    }

    #[test]
    fn reservation_table_dates_are_understood() {
        assert_eq!(pref().admits(&slot("18.01.2026", "14:00")), Ok(true));
    }
}
