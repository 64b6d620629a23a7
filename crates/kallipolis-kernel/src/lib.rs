//! Kallipolis Kernel: the crisis-resolution turn protocol.
//!
//! A God, a Ruler and a roster of citizens resolve one crisis per cycle:
//! God poses the crisis, the Ruler consults citizens one at a time, issues
//! a directive, God judges it, and on approval the Ruler allocates a fixed
//! salary budget. The language model behind each agent is abstracted by
//! [`TextGenerator`]; every reply becomes an immutable [`Turn`] appended to
//! a [`TranscriptSink`].

pub mod agent;
pub mod config;
pub mod cycle;
pub mod error;
pub mod prompts;
pub mod protocol;
pub mod roster;
pub mod transcript;
pub mod turn;

pub use agent::{Agent, ChatMessage, CompletionRequest, TextGenerator};
pub use config::CycleConfig;
pub use cycle::{CrisisSeed, CycleOutcome, CycleReport, CycleStage, CycleState, Orchestrator};
pub use error::{AllocationParseError, CycleError, GenerationUnavailable, RosterError, SinkWriteError};
pub use prompts::{CitizenSpec, PromptTemplates, SocietyConfig};
pub use protocol::{Allocation, Judgment, RulerMove, Verdict};
pub use roster::{Participant, Role, Roster};
pub use transcript::{JsonlTranscript, TranscriptSink};
pub use turn::{Phase, Turn, TurnClock};
