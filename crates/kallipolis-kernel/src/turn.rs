//! Turns: immutable records of one participant's message.
//!
//! The wire shape is one JSON object per line:
//! `{"timestamp": "2025-03-01T14:02:11", "speaker": "God", "message": "...", "phase": "crisis"}`.
//! The timestamp is local wall-clock time at second precision with no
//! offset. `phase` is advisory and may be absent in older transcripts.

use std::fmt;

use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Stage of the cycle a turn belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Crisis,
    Consult,
    Directive,
    Judgment,
    Allocation,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Crisis => "crisis",
            Self::Consult => "consult",
            Self::Directive => "directive",
            Self::Judgment => "judgment",
            Self::Allocation => "allocation",
        };
        write!(f, "{}", s)
    }
}

/// One recorded unit of dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    #[serde(with = "iso_seconds")]
    pub timestamp: NaiveDateTime,
    pub speaker: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
}

impl Turn {
    pub fn new(
        timestamp: NaiveDateTime,
        speaker: impl Into<String>,
        message: impl Into<String>,
        phase: Option<Phase>,
    ) -> Self {
        Self {
            timestamp,
            speaker: speaker.into(),
            message: message.into(),
            phase,
        }
    }
}

/// Hands out turn timestamps that never go backwards.
///
/// Wall-clock adjustments between two turns would otherwise break the
/// non-decreasing order of a transcript.
#[derive(Debug, Default, Clone)]
pub struct TurnClock {
    last: Option<NaiveDateTime>,
}

impl TurnClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current local time truncated to seconds, clamped to the last value handed out.
    pub fn now(&mut self) -> NaiveDateTime {
        let now = Local::now().naive_local();
        self.observe(now.with_nanosecond(0).unwrap_or(now))
    }

    fn observe(&mut self, candidate: NaiveDateTime) -> NaiveDateTime {
        let stamp = match self.last {
            Some(last) if last > candidate => last,
            _ => candidate,
        };
        self.last = Some(stamp);
        stamp
    }
}

mod iso_seconds {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        // Accept fractional seconds written by other tools
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f"))
            .map_err(serde::de::Error::custom)
    }
}
