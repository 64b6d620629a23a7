//! The crisis orchestrator: one crisis-resolution cycle as a state machine.
//!
//! ```text
//! Init -> CrisisPosed -> Consulting -> DirectiveIssued -> Judging -> Allocating -> Terminal
//!                                                               \-> Rejected   -> Terminal
//! ```
//!
//! Every agent reply is recorded as a [`Turn`] and appended to the sink
//! before the orchestrator acts on it, so a failed cycle still leaves a
//! valid transcript prefix behind. Agent calls happen one at a time.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agent::{build_context, Agent, TextGenerator};
use crate::config::CycleConfig;
use crate::error::CycleError;
use crate::prompts::SocietyConfig;
use crate::protocol::{
    parse_allocation, parse_final_directive, parse_judgment, parse_ruler_move, Allocation,
    Judgment, RulerMove,
};
use crate::roster::Roster;
use crate::transcript::TranscriptSink;
use crate::turn::{Phase, Turn, TurnClock};

/// Stage of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStage {
    Init,
    CrisisPosed,
    Consulting,
    DirectiveIssued,
    Judging,
    Allocating,
    Rejected,
    Terminal,
}

impl CycleStage {
    pub fn can_advance_to(self, next: CycleStage) -> bool {
        use CycleStage::*;
        matches!(
            (self, next),
            (Init, CrisisPosed)
                | (CrisisPosed, Consulting)
                | (Consulting, DirectiveIssued)
                | (DirectiveIssued, Judging)
                | (Judging, Allocating)
                | (Judging, Rejected)
                | (Allocating, Terminal)
                | (Rejected, Terminal)
        )
    }
}

/// Where the crisis comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrisisSeed {
    /// Ask God to generate a crisis from this scenario prompt
    Prompt(String),
    /// Use this text verbatim as God's crisis
    Fixed(String),
}

/// One piece of advice gathered during consultation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consultation {
    pub citizen: String,
    pub advice: String,
}

/// Working state of one cycle. Owned by the orchestrator for the cycle's lifetime.
#[derive(Debug, Clone)]
pub struct CycleState {
    stage: CycleStage,
    crisis: Option<String>,
    consultations: Vec<Consultation>,
    directive: Option<String>,
    judgment: Option<Judgment>,
    allocation: Option<Allocation>,
    turns: Vec<Turn>,
}

impl CycleState {
    fn new() -> Self {
        Self {
            stage: CycleStage::Init,
            crisis: None,
            consultations: Vec::new(),
            directive: None,
            judgment: None,
            allocation: None,
            turns: Vec::new(),
        }
    }

    pub fn stage(&self) -> CycleStage {
        self.stage
    }

    pub fn crisis(&self) -> Option<&str> {
        self.crisis.as_deref()
    }

    pub fn consultations(&self) -> &[Consultation] {
        &self.consultations
    }

    pub fn directive(&self) -> Option<&str> {
        self.directive.as_deref()
    }

    pub fn judgment(&self) -> Option<&Judgment> {
        self.judgment.as_ref()
    }

    pub fn allocation(&self) -> Option<&Allocation> {
        self.allocation.as_ref()
    }

    /// Turns recorded so far, in creation order.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    fn advance(&mut self, next: CycleStage) -> Result<(), CycleError> {
        if !self.stage.can_advance_to(next) {
            return Err(CycleError::IllegalTransition {
                from: self.stage,
                to: next,
            });
        }
        debug!(from = ?self.stage, to = ?next, "Cycle transition");
        self.stage = next;
        Ok(())
    }
}

/// How a cycle that ran to the end terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Directive approved and salaries allocated
    Allocated(Allocation),
    /// Directive rejected (or the verdict was ambiguous); no allocation
    Rejected(Judgment),
}

/// Final state of a cycle together with how it ended.
#[derive(Debug)]
pub struct CycleReport {
    pub state: CycleState,
    pub result: Result<CycleOutcome, CycleError>,
}

/// Runs crisis cycles against a text-generation backend.
pub struct Orchestrator<G> {
    generator: Arc<G>,
    society: Arc<SocietyConfig>,
    config: CycleConfig,
}

impl<G: TextGenerator> Orchestrator<G> {
    pub fn new(generator: Arc<G>, society: Arc<SocietyConfig>, config: CycleConfig) -> Self {
        Self {
            generator,
            society,
            config,
        }
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    /// Run one full cycle, appending every turn to `sink`.
    ///
    /// Each call builds a fresh roster and state. The report always carries
    /// the state reached, even when the cycle failed.
    pub async fn run<S: TranscriptSink>(&self, seed: &CrisisSeed, sink: &mut S) -> CycleReport {
        let roster = match self.society.roster() {
            Ok(roster) => roster,
            Err(e) => {
                return CycleReport {
                    state: CycleState::new(),
                    result: Err(e.into()),
                }
            }
        };

        let mut cycle = Cycle::new(&self.generator, &self.society, &self.config, roster, sink);
        let result = cycle.drive(seed).await;

        match &result {
            Ok(CycleOutcome::Allocated(a)) => {
                info!(total = a.total(), budget = a.budget, "Cycle finished with allocation")
            }
            Ok(CycleOutcome::Rejected(j)) => info!(verdict = ?j.verdict, "Cycle finished without allocation"),
            Err(e) => warn!(error = %e, stage = ?cycle.state.stage, "Cycle aborted"),
        }

        CycleReport {
            state: cycle.state,
            result,
        }
    }
}

/// Per-run working set: roster, agents, state and the sink.
struct Cycle<'a, G, S> {
    roster: Roster,
    god: Agent<G>,
    ruler: Agent<G>,
    citizens: Vec<Agent<G>>,
    society: &'a SocietyConfig,
    config: &'a CycleConfig,
    sink: &'a mut S,
    clock: TurnClock,
    state: CycleState,
}

impl<'a, G: TextGenerator, S: TranscriptSink> Cycle<'a, G, S> {
    fn new(
        generator: &Arc<G>,
        society: &'a SocietyConfig,
        config: &'a CycleConfig,
        roster: Roster,
        sink: &'a mut S,
    ) -> Self {
        let timeout = config.generation_timeout;
        let god = Agent::new(
            roster.god().clone(),
            society.god_system(),
            generator.clone(),
            timeout,
        );
        let ruler = Agent::new(
            roster.ruler().clone(),
            society.ruler_system(&roster, config.budget),
            generator.clone(),
            timeout,
        );
        let citizens = roster
            .citizens()
            .iter()
            .map(|c| Agent::new(c.clone(), society.citizen_system(c), generator.clone(), timeout))
            .collect();

        Self {
            roster,
            god,
            ruler,
            citizens,
            society,
            config,
            sink,
            clock: TurnClock::new(),
            state: CycleState::new(),
        }
    }

    async fn drive(&mut self, seed: &CrisisSeed) -> Result<CycleOutcome, CycleError> {
        self.pose_crisis(seed).await?;

        self.state.advance(CycleStage::Consulting)?;
        let directive = match self.consult().await? {
            Some(directive) => directive,
            None => self.demand_directive().await?,
        };
        self.state.directive = Some(directive.clone());
        self.state.advance(CycleStage::DirectiveIssued)?;

        self.state.advance(CycleStage::Judging)?;
        let judgment = self.judge(&directive).await?;
        self.state.judgment = Some(judgment.clone());

        if !judgment.approved() {
            self.state.advance(CycleStage::Rejected)?;
            self.state.advance(CycleStage::Terminal)?;
            return Ok(CycleOutcome::Rejected(judgment));
        }

        self.state.advance(CycleStage::Allocating)?;
        let allocation = self.allocate().await?;
        self.state.allocation = Some(allocation.clone());
        self.state.advance(CycleStage::Terminal)?;

        Ok(CycleOutcome::Allocated(allocation))
    }

    async fn pose_crisis(&mut self, seed: &CrisisSeed) -> Result<(), CycleError> {
        let crisis = match seed {
            CrisisSeed::Fixed(text) => text.trim().to_string(),
            CrisisSeed::Prompt(scenario) => {
                let cue = self.society.crisis_request(scenario);
                self.call(&self.god, &cue).await?
            }
        };

        let god = self.god.name().to_string();
        self.record(&god, &crisis, Phase::Crisis)?;
        self.state.crisis = Some(crisis);
        self.state.advance(CycleStage::CrisisPosed)
    }

    /// Consultation loop. Returns the directive if the Ruler issued one,
    /// `None` if the consultation limit ran out first.
    async fn consult(&mut self) -> Result<Option<String>, CycleError> {
        let ruler = self.ruler.name().to_string();

        for round in 0..self.config.max_consultations {
            let text = self.call(&self.ruler, &self.society.prompts.consult_cue).await?;
            let parsed = parse_ruler_move(&text, &self.roster);

            let phase = match parsed {
                Ok(RulerMove::Directive(_)) => Phase::Directive,
                _ => Phase::Consult,
            };
            self.record(&ruler, &text, phase)?;

            match parsed? {
                RulerMove::Directive(directive) => return Ok(Some(directive)),
                RulerMove::Consult(citizen) => {
                    debug!(round = round, citizen = %citizen, "Ruler consults citizen");
                    let advice = self.ask_citizen(&citizen).await?;
                    self.state.consultations.push(Consultation { citizen, advice });
                }
            }
        }

        info!(
            limit = self.config.max_consultations,
            "Consultation limit reached, demanding directive"
        );
        Ok(None)
    }

    async fn ask_citizen(&mut self, name: &str) -> Result<String, CycleError> {
        let agent = self
            .citizens
            .iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| CycleError::Routing {
                target: name.to_string(),
            })?;
        let cue = self.society.citizen_cue(agent.participant());
        let advice = self.call(agent, &cue).await?;

        self.record(name, &advice, Phase::Consult)?;
        Ok(advice)
    }

    async fn demand_directive(&mut self) -> Result<String, CycleError> {
        let text = self.call(&self.ruler, &self.society.prompts.directive_cue).await?;
        let ruler = self.ruler.name().to_string();
        self.record(&ruler, &text, Phase::Directive)?;
        Ok(parse_final_directive(&text))
    }

    async fn judge(&mut self, directive: &str) -> Result<Judgment, CycleError> {
        let cue = self.society.judgment_cue(directive);
        let text = self.call(&self.god, &cue).await?;
        let god = self.god.name().to_string();
        self.record(&god, &text, Phase::Judgment)?;

        let judgment = parse_judgment(&text);
        info!(verdict = ?judgment.verdict, "God judged the directive");
        Ok(judgment)
    }

    async fn allocate(&mut self) -> Result<Allocation, CycleError> {
        let cue = self.society.allocation_cue(&self.roster, self.config.budget);
        let text = self.call(&self.ruler, &cue).await?;
        let ruler = self.ruler.name().to_string();
        self.record(&ruler, &text, Phase::Allocation)?;

        let allocation = parse_allocation(&text, &self.roster, self.config.budget)?;
        match allocation.overage() {
            None => info!(total = allocation.total(), budget = allocation.budget, "Allocation within budget"),
            Some(over) => warn!(
                total = allocation.total(),
                budget = allocation.budget,
                over = over,
                "Allocation over budget, recorded as given"
            ),
        }
        Ok(allocation)
    }

    /// One agent call with the configured retry policy.
    async fn call(&self, agent: &Agent<G>, cue: &str) -> Result<String, CycleError> {
        let context = build_context(agent.name(), &self.state.turns, cue);
        let max_attempts = self.config.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match agent.respond(&context).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < max_attempts => {
                    warn!(
                        agent = %agent.name(),
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %e,
                        "Generation failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                }
                Err(e) => {
                    return Err(CycleError::Generation {
                        speaker: agent.name().to_string(),
                        attempts: attempt,
                        source: e,
                    })
                }
            }
        }
    }

    fn record(&mut self, speaker: &str, message: &str, phase: Phase) -> Result<(), CycleError> {
        if !self.roster.contains(speaker) {
            return Err(CycleError::InvalidTurn(format!(
                "speaker '{}' is not on the roster",
                speaker
            )));
        }
        if message.trim().is_empty() {
            return Err(CycleError::InvalidTurn(format!(
                "empty message from {}",
                speaker
            )));
        }

        let turn = Turn::new(self.clock.now(), speaker, message, Some(phase));
        self.sink.append(&turn)?;

        info!(speaker = speaker, phase = %phase, turn = self.state.turns.len() + 1, "Turn recorded");
        debug!(text = message, "Turn message");
        self.state.turns.push(turn);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_transitions() {
        use CycleStage::*;
        assert!(Init.can_advance_to(CrisisPosed));
        assert!(Judging.can_advance_to(Allocating));
        assert!(Judging.can_advance_to(Rejected));
        assert!(Rejected.can_advance_to(Terminal));

        assert!(!Init.can_advance_to(Consulting));
        assert!(!Rejected.can_advance_to(Allocating));
        assert!(!Terminal.can_advance_to(Init));
        assert!(!Consulting.can_advance_to(Judging));
    }

    #[test]
    fn test_state_refuses_illegal_transition() {
        let mut state = CycleState::new();
        let err = state.advance(CycleStage::Allocating).unwrap_err();
        assert!(matches!(
            err,
            CycleError::IllegalTransition {
                from: CycleStage::Init,
                to: CycleStage::Allocating
            }
        ));
        assert_eq!(state.stage(), CycleStage::Init);
    }
}
