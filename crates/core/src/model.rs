use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Platform-imposed minimum polling interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Detector key used for the single seeker target.
pub const SEEKER_ID: &str = "seeker";

macro_rules! ref_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

ref_newtype!(
    /// Address of a booking page (absolute URL).
    PageRef
);
ref_newtype!(
    /// Opaque, single-use reserve or release action for one slot.
    ActionRef
);

/// Inclusive date range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Parses `YYYY-MM-DD` bounds. Fails on malformed or inverted bounds.
    pub fn parse(start: &str, end: &str) -> Result<Self, ConfigError> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map_err(|_| ConfigError::InvalidDate(s.to_string()))
        };
        let (start, end) = (parse(start)?, parse(end)?);
        if start > end {
            return Err(ConfigError::InvertedRange(format!("{start}..{end}")));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Inclusive time-of-day range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    /// Parses `HH:MM` bounds. Fails on malformed or inverted bounds.
    pub fn parse(start: &str, end: &str) -> Result<Self, ConfigError> {
        let parse = |s: &str| {
            NaiveTime::parse_from_str(s.trim(), "%H:%M")
                .map_err(|_| ConfigError::InvalidTime(s.to_string()))
        };
        let (start, end) = (parse(start)?, parse(end)?);
        if start > end {
            return Err(ConfigError::InvertedRange(format!("{start}..{end}")));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time <= self.end
    }
}

/// One configured page/section being polled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitoredTarget {
    pub id: String,
    pub name: String,
    pub page: PageRef,
    pub section: String,
    pub interval: Duration,
    pub dates: DateWindow,
    pub times: TimeWindow,
}

/// A configured destination for relocating the seeker reservation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTarget {
    pub name: String,
    pub page: PageRef,
    pub section: String,
}

/// Identity of a slot for diffing purposes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub date: String,
    pub time: String,
    pub slot_id: String,
}

/// A bookable or reserved exam slot as reported by the booking page.
///
/// Date and time are kept as the page reported them (normalised to
/// `YYYY-MM-DD` / `HH:MM` where the source could); consumers parse them and
/// skip slots whose fields do not parse.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub date: String,
    pub time: String,
    pub slot_id: String,
    #[serde(default)]
    pub capacity: u32,
    /// Reserve link for available slots, release link for reserved ones.
    pub action: ActionRef,
    /// Release deadline as printed next to a reservation, if any.
    #[serde(default)]
    pub deadline: Option<String>,
}

impl Slot {
    pub fn key(&self) -> SlotKey {
        SlotKey {
            date: self.date.clone(),
            time: self.time.clone(),
            slot_id: self.slot_id.clone(),
        }
    }

    pub fn parsed_date(&self) -> Option<NaiveDate> {
        parse_slot_date(&self.date)
    }

    pub fn parsed_time(&self) -> Option<NaiveTime> {
        parse_slot_time(&self.time)
    }

    /// True when both slots start at the same date and time.
    pub fn same_start(&self, other: &Slot) -> bool {
        match (
            self.parsed_date(),
            self.parsed_time(),
            other.parsed_date(),
            other.parsed_time(),
        ) {
            (Some(d1), Some(t1), Some(d2), Some(t2)) => d1 == d2 && t1 == t2,
            _ => self.date.trim() == other.date.trim() && self.time.trim() == other.time.trim(),
        }
    }
}

/// Accepts ISO dates and the `DD.MM.YYYY` form used in reservation tables.
pub fn parse_slot_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d.%m.%Y"))
        .ok()
}

pub fn parse_slot_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

/// Slots of one section of one page at a point in time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SectionView {
    pub available: Vec<Slot>,
    pub reserved: Vec<Slot>,
}

impl SectionView {
    pub fn is_reserved(&self) -> bool {
        !self.reserved.is_empty()
    }
}

/// Lifecycle of a legacy target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetState {
    Active,
    Booked,
}
