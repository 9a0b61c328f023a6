use chrono::{DateTime, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Storage form of `work_began` / `work_ended`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static TIMESTAMP_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}$").expect("valid timestamp regex"));

/// Parses a timestamp in storage form. Anything that is not exactly
/// `YYYY-MM-DD HH:MM:SS` naming a real calendar instant yields `None`.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if !TIMESTAMP_SHAPE.is_match(raw) {
        return None;
    }
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).ok()
}

/// Accepts the storage form plus the shapes card snapshots tend to carry:
/// RFC 3339 (converted to UTC) and `YYYY-MM-DD HH:MM:SS.fraction Z`.
pub fn parse_loose_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if let Some(value) = parse_timestamp(trimmed) {
        return Some(value);
    }
    if let Ok(value) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(value.naive_utc());
    }
    let without_zone = trimmed
        .strip_suffix(" Z")
        .or_else(|| trimmed.strip_suffix(" UTC"))
        .or_else(|| trimmed.strip_suffix(" +00:00"))
        .unwrap_or(trimmed);
    NaiveDateTime::parse_from_str(without_zone, "%Y-%m-%d %H:%M:%S%.f").ok()
}

pub fn format_timestamp(value: NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SizeClass {
    S,
    M,
    L,
}

impl SizeClass {
    pub const ALL: [SizeClass; 3] = [SizeClass::S, SizeClass::M, SizeClass::L];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::S => "S",
            Self::M => "M",
            Self::L => "L",
        }
    }
}

/// Number of small, medium and large tasks declared on a card. Signed so that
/// malformed input reaches validation instead of failing deserialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    #[serde(rename = "S", default)]
    pub s: i64,
    #[serde(rename = "M", default)]
    pub m: i64,
    #[serde(rename = "L", default)]
    pub l: i64,
}

impl TaskCounts {
    pub fn new(s: i64, m: i64, l: i64) -> Self {
        Self { s, m, l }
    }

    pub fn get(&self, size: SizeClass) -> i64 {
        match size {
            SizeClass::S => self.s,
            SizeClass::M => self.m,
            SizeClass::L => self.l,
        }
    }

    pub fn increment(&mut self, size: SizeClass) {
        match size {
            SizeClass::S => self.s += 1,
            SizeClass::M => self.m += 1,
            SizeClass::L => self.l += 1,
        }
    }

    pub fn total(&self) -> i64 {
        self.s + self.m + self.l
    }
}

/// Points assigned to each task size. Loaded once from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaskWeights {
    #[serde(rename = "S")]
    pub s: f64,
    #[serde(rename = "M")]
    pub m: f64,
    #[serde(rename = "L")]
    pub l: f64,
}

impl TaskWeights {
    pub fn new(s: f64, m: f64, l: f64) -> Self {
        Self { s, m, l }
    }

    pub fn get(&self, size: SizeClass) -> f64 {
        match size {
            SizeClass::S => self.s,
            SizeClass::M => self.m,
            SizeClass::L => self.l,
        }
    }
}

/// A card as handed to storage by the ingestion side. Missing text fields
/// deserialize as empty strings and are rejected by validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardRecord {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub tasks: TaskCounts,
    #[serde(default)]
    pub work_began: Option<String>,
    #[serde(default)]
    pub work_ended: Option<String>,
    #[serde(default)]
    pub work_duration: Option<f64>,
}

/// Traceability fields for an in-progress card. Not used by the simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardIdentity {
    pub uuid: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletedCard {
    pub tasks: TaskCounts,
    pub work_duration: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InProgressCard {
    pub identity: CardIdentity,
    pub tasks: TaskCounts,
    pub hours_already_spent: f64,
}

/// One line of the stats report: an owner's cards in one completion state.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub owner: String,
    pub is_complete: bool,
    pub card_count: i64,
    pub mean_s: f64,
    pub mean_m: f64,
    pub mean_l: f64,
    pub total_work_hours: f64,
    pub earliest_began: Option<NaiveDateTime>,
    pub latest_ended: Option<NaiveDateTime>,
    pub elapsed_hours: Option<f64>,
}
