//! Lenient field codecs for records coming out of a spreadsheet.
//!
//! Sheet cells are loosely typed: an id typed as a number comes back as a JSON
//! number, a date column comes back as a full timestamp and an empty optional
//! cell comes back as `""`. Everything here accepts those shapes and always
//! writes the canonical one.

use std::{fmt, sync::OnceLock};

use jiff::{Timestamp, civil::Date, tz::TimeZone};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Text(text) => text,
            Scalar::Integer(n) => n.to_string(),
            Scalar::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => (f as i64).to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

/// Identifier shared by every record kind. Compared as a string no matter how
/// the sheet stored it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Millisecond timestamp id, bumped until it does not collide with an id
    /// already taken.
    pub fn generate(now: Timestamp, taken: impl Fn(&RecordId) -> bool) -> Self {
        let mut millis = now.as_millisecond();
        loop {
            let candidate = RecordId(millis.to_string());
            if !taken(&candidate) {
                return candidate;
            }
            millis += 1;
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Scalar::deserialize(deserializer).map(|s| RecordId(s.into_text()))
    }
}

pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Scalar::deserialize(deserializer).map(Scalar::into_text)
}

pub fn optional_text<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let value = Option::<Scalar>::deserialize(deserializer)?;
    Ok(value
        .map(Scalar::into_text)
        .filter(|text| !text.trim().is_empty()))
}

static SHEET_TIME_ZONE: OnceLock<TimeZone> = OnceLock::new();

/// Zone the sheet writes deadline timestamps in. Only the first call counts;
/// without one the system zone is used.
pub fn set_sheet_time_zone(tz: TimeZone) {
    if SHEET_TIME_ZONE.set(tz).is_err() {
        tracing::debug!("sheet time zone already set");
    }
}

fn sheet_time_zone() -> TimeZone {
    SHEET_TIME_ZONE.get().cloned().unwrap_or_else(TimeZone::system)
}

/// Parses a deadline cell. A bare date is taken as is; a timestamp is moved
/// into the sheet's time zone first, since the sheet stores local midnight.
pub fn parse_deadline(raw: &str) -> Option<Date> {
    parse_deadline_in(raw, &sheet_time_zone())
}

pub fn parse_deadline_in(raw: &str, tz: &TimeZone) -> Option<Date> {
    let raw = raw.trim();
    if let Ok(date) = raw.parse::<Date>() {
        return Some(date);
    }
    raw.parse::<Timestamp>()
        .ok()
        .map(|ts| ts.to_zoned(tz.clone()).date())
}

pub fn deadline<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Date, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_deadline(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid deadline '{raw}'")))
}

pub fn optional_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Timestamp>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<Timestamp>()
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid timestamp '{value}': {e}"))),
    }
}
