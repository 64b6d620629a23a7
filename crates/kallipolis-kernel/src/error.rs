//! Error types for the crisis-resolution cycle.
//!
//! Each failure kind a cycle can hit has its own type so the batch runner
//! can report it by name. `CycleError` is the umbrella that aborts one
//! scenario without touching the others.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::cycle::CycleStage;

/// The text-generation capability could not produce a completion.
///
/// Covers an unreachable backend, a non-success response, a malformed or
/// empty body, and a timeout. Partial output is never returned.
#[derive(Debug, Clone, Error)]
#[error("text generation unavailable: {reason}")]
pub struct GenerationUnavailable {
    pub reason: String,
}

impl GenerationUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn timed_out(after: Duration) -> Self {
        Self::new(format!("no completion within {:?}", after))
    }

    pub fn empty() -> Self {
        Self::new("backend returned an empty completion")
    }
}

/// The roster handed to an orchestrator cannot support a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RosterError {
    #[error("roster has no citizens to consult")]
    NoCitizens,

    #[error("participant name '{0}' appears more than once")]
    DuplicateName(String),

    #[error("participant name '{0}' cannot be addressed with a routing directive")]
    InvalidName(String),
}

/// The Ruler's allocation text could not be turned into a per-citizen mapping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationParseError {
    #[error("no Name=value pairs found in allocation")]
    NoEntries,

    #[error("allocation is missing citizens: {}", .0.join(", "))]
    MissingCitizens(Vec<String>),

    #[error("allocation for {citizen} is negative ({value})")]
    Negative { citizen: String, value: i64 },

    #[error("allocation for {citizen} is not a valid amount: {raw}")]
    InvalidAmount { citizen: String, raw: String },
}

/// A turn could not be persisted.
#[derive(Debug, Error)]
#[error("failed to append turn to {}: {source}", path.display())]
pub struct SinkWriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Errors that end a crisis cycle early.
#[derive(Debug, Error)]
pub enum CycleError {
    /// Generation kept failing after the configured retries.
    #[error("{speaker} could not respond after {attempts} attempt(s): {source}")]
    Generation {
        speaker: String,
        attempts: u32,
        #[source]
        source: GenerationUnavailable,
    },

    /// A consultation directive named someone who is not a consultable citizen.
    #[error("routing directive names unknown citizen '{target}'")]
    Routing { target: String },

    #[error("allocation could not be parsed: {0}")]
    AllocationParse(#[from] AllocationParseError),

    #[error(transparent)]
    SinkWrite(#[from] SinkWriteError),

    #[error("invalid roster: {0}")]
    Roster(#[from] RosterError),

    #[error("refusing to record turn: {0}")]
    InvalidTurn(String),

    #[error("illegal cycle transition {from:?} -> {to:?}")]
    IllegalTransition { from: CycleStage, to: CycleStage },
}

impl CycleError {
    /// Short machine-friendly name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Generation { .. } => "generation_unavailable",
            Self::Routing { .. } => "routing_error",
            Self::AllocationParse(_) => "allocation_parse_error",
            Self::SinkWrite(_) => "sink_write_error",
            Self::Roster(_) => "roster_error",
            Self::InvalidTurn(_) => "invalid_turn",
            Self::IllegalTransition { .. } => "illegal_transition",
        }
    }
}
