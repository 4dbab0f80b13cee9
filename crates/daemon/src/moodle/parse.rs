//! Regex extraction over the TC booking pages.
//!
//! The pages are server-rendered Moodle output with a stable shape: calendar
//! and time grids are tables whose bookable cells carry `alert-success`, and
//! reservations are listed in a table under a "rezervované termíny" heading
//! inside each test's `h3` block.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use tcseek_core::{parse_slot_date, parse_slot_time, ActionRef, Slot};
use tracing::{debug, warn};

macro_rules! re {
    ($name:ident, $pat:expr) => {
        static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($pat).expect("static regex should compile"));
    };
}

re!(SUCCESS_CELL, r#"(?is)<td[^>]*class="[^"]*\balert-success\b[^"]*"[^>]*>(.*?)</td>"#);
re!(ANCHOR, r#"(?is)<a\b[^>]*href="([^"]*)"[^>]*>(.*?)</a>"#);
re!(DAY_PARAM, r"day=(\d{4}-\d{2}-\d{2})");
re!(SLOT_PARAM, r"slot=(\d+)");
re!(UNREGISTER_PARAM, r"unregister=(\d+)");
re!(CAPACITY, r"\((\d+)\s*🪑\)");
re!(LEADING_TIME, r"^\s*(\d{1,2}:\d{2})");
re!(ANY_TIME, r"(\d{1,2}:\d{2})");
re!(H3_OPEN, r"(?i)<h3\b");
re!(H3_BLOCK, r"(?is)<h3\b[^>]*>(.*?)</h3>");
re!(H4_BLOCK, r"(?is)<h4\b[^>]*>(.*?)</h4>");
re!(TABLE, r"(?is)<table\b.*?</table>");
re!(ROW, r"(?is)<tr\b[^>]*>(.*?)</tr>");
re!(DATA_CELL, r"(?is)<td\b[^>]*>(.*?)</td>");
re!(DEADLINE, r"\(do\s+([^)]+)\)");
re!(LOGIN_INPUT, r#"(?is)<input\b[^>]*\bname="logintoken"[^>]*>"#);
re!(VALUE_ATTR, r#"(?i)\bvalue="([^"]*)""#);
re!(ALERT_DANGER, r#"(?is)<div[^>]*class="[^"]*\balert-danger\b[^"]*"[^>]*>(.*?)</div>"#);
re!(TAG, r"(?s)<[^>]*>");
re!(SPACES, r"\s+");

const RESERVED_HEADING: &str = "rezervované termíny";

/// A day in the calendar with at least one free seat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DateCell {
    pub date: String,
    pub link: String,
    pub capacity: u32,
}

/// A bookable time on one day's page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeCell {
    pub time: String,
    pub slot_id: String,
    pub link: String,
    pub capacity: u32,
}

/// Visible text of an HTML fragment with tags stripped and whitespace collapsed.
pub fn text_of(fragment: &str) -> String {
    let stripped = TAG.replace_all(fragment, " ");
    let decoded = decode_entities(&stripped);
    SPACES.replace_all(decoded.trim(), " ").into_owned()
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn capacity_in(text: &str) -> u32 {
    CAPACITY
        .captures(text)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0)
}

/// Zero-pads `H:MM` to `HH:MM`.
fn normalize_time(raw: &str) -> String {
    parse_slot_time(raw)
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| raw.trim().to_string())
}

pub fn available_dates(html: &str) -> Vec<DateCell> {
    let mut out = Vec::new();
    for cell in SUCCESS_CELL.captures_iter(html) {
        let Some(a) = ANCHOR.captures(&cell[1]) else {
            continue;
        };
        let link = decode_entities(&a[1]);
        let Some(day) = DAY_PARAM.captures(&link) else {
            continue;
        };
        out.push(DateCell {
            date: day[1].to_string(),
            capacity: capacity_in(&text_of(&a[2])),
            link: link.clone(),
        });
    }
    debug!("found {} available dates", out.len());
    out
}

pub fn available_times(html: &str) -> Vec<TimeCell> {
    let mut out = Vec::new();
    for cell in SUCCESS_CELL.captures_iter(html) {
        let Some(a) = ANCHOR.captures(&cell[1]) else {
            continue;
        };
        let link = decode_entities(&a[1]);
        let Some(slot) = SLOT_PARAM.captures(&link) else {
            continue;
        };
        let label = text_of(&a[2]);
        let Some(time) = LEADING_TIME.captures(&label) else {
            continue;
        };
        out.push(TimeCell {
            time: normalize_time(&time[1]),
            slot_id: slot[1].to_string(),
            capacity: capacity_in(&text_of(&cell[1])),
            link: link.clone(),
        });
    }
    debug!("found {} available time slots", out.len());
    out
}

/// Reservations listed under every `h3` whose text contains `section`.
/// Rows dated before `today` are dropped.
pub fn reserved_slots(html: &str, section: &str, today: NaiveDate) -> Vec<Slot> {
    let mut out = Vec::new();
    for header in H3_BLOCK.captures_iter(html) {
        if !text_of(&header[1]).contains(section) {
            continue;
        }
        let Some(whole) = header.get(0) else {
            continue;
        };
        let rest = &html[whole.end()..];
        let block_end = H3_OPEN.find(rest).map(|m| m.start()).unwrap_or(rest.len());
        let block = &rest[..block_end];

        let Some(h4) = H4_BLOCK
            .captures_iter(block)
            .find(|h| text_of(&h[1]).to_lowercase().contains(RESERVED_HEADING))
        else {
            continue;
        };
        let Some(h4_end) = h4.get(0).map(|m| m.end()) else {
            continue;
        };
        let Some(table) = TABLE.find(&rest[h4_end..]) else {
            continue;
        };
        out.extend(reserved_rows(table.as_str(), today));
    }
    debug!(section, "found {} future reserved slots", out.len());
    out
}

fn reserved_rows(table: &str, today: NaiveDate) -> Vec<Slot> {
    let mut out = Vec::new();
    for row in ROW.captures_iter(table).skip(1) {
        let cells: Vec<&str> = DATA_CELL
            .captures_iter(&row[1])
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        if cells.len() < 5 {
            continue;
        }
        let raw_date = text_of(cells[1]);
        let Some(date) = parse_slot_date(&raw_date) else {
            warn!(date = %raw_date, "could not parse reserved slot date");
            continue;
        };
        if date < today {
            debug!(date = %raw_date, "skipping past reserved slot");
            continue;
        }
        let time_text = text_of(cells[2]);
        let time = ANY_TIME
            .captures(&time_text)
            .map(|c| normalize_time(&c[1]))
            .unwrap_or(time_text);

        let link = ANCHOR
            .captures(cells[4])
            .map(|a| decode_entities(&a[1]))
            .unwrap_or_default();
        let action_text = text_of(cells[4]);
        let deadline = DEADLINE.captures(&action_text).map(|c| c[1].trim().to_string());
        let slot_id = UNREGISTER_PARAM
            .captures(&link)
            .map(|c| c[1].to_string())
            .unwrap_or_default();

        out.push(Slot {
            date: date.format("%Y-%m-%d").to_string(),
            time,
            slot_id,
            capacity: 0,
            action: ActionRef::new(link),
            deadline,
        });
    }
    out
}

pub fn login_token(html: &str) -> Option<String> {
    let input = LOGIN_INPUT.find(html)?;
    VALUE_ATTR
        .captures(input.as_str())
        .map(|c| c[1].to_string())
        .filter(|v| !v.is_empty())
}

/// Text of the first `alert-danger` block, if any.
pub fn danger_alert(html: &str) -> Option<String> {
    ALERT_DANGER.captures(html).map(|c| text_of(&c[1]))
}

pub fn confirms_reservation(html: &str) -> bool {
    html.to_lowercase().contains("rezervovaný termín")
}

pub fn confirms_release(html: &str) -> bool {
    let lower = html.to_lowercase();
    lower.contains("byl odhlášen") || lower.contains("úspěšně odhlášen")
}
