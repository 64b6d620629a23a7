//! Results collection and output for crisis batches.
//!
//! One [`ScenarioOutcome`] per cycle run, plus an aggregate [`BatchSummary`]:
//! - Allocated / rejected / error counts
//! - Approval rate among judged runs
//! - Mean consultations per run
//! - Budget overruns

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kallipolis_kernel::{CycleOutcome, CycleReport, Verdict};

/// How a scenario run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    /// Directive approved and salaries allocated
    Allocated,
    /// Directive rejected or verdict ambiguous
    Rejected,
    /// Cycle aborted with an error
    Error,
}

/// Result of one scenario run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub run_id: Uuid,
    pub scenario: String,
    pub prompt: String,
    /// JSONL transcript written for this run
    pub transcript: PathBuf,
    pub status: ScenarioStatus,
    pub turns: usize,
    /// Citizens consulted, in order (repeats included)
    pub consulted: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crisis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directive: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation: Option<BTreeMap<String, u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Amount above budget; 0 when within budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub over_budget_by: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error category (`generation_unavailable`, `routing_error`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ScenarioOutcome {
    /// Summarize a finished cycle.
    pub fn from_report(
        scenario: &str,
        prompt: &str,
        transcript: PathBuf,
        report: &CycleReport,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Self {
        let state = &report.state;
        let judgment = state.judgment();
        let allocation = state.allocation();

        let (status, error, error_kind) = match &report.result {
            Ok(CycleOutcome::Allocated(_)) => (ScenarioStatus::Allocated, None, None),
            Ok(CycleOutcome::Rejected(_)) => (ScenarioStatus::Rejected, None, None),
            Err(e) => (
                ScenarioStatus::Error,
                Some(e.to_string()),
                Some(e.kind().to_string()),
            ),
        };

        Self {
            run_id: Uuid::new_v4(),
            scenario: scenario.to_string(),
            prompt: prompt.to_string(),
            transcript,
            status,
            turns: state.turns().len(),
            consulted: state
                .consultations()
                .iter()
                .map(|c| c.citizen.clone())
                .collect(),
            crisis: state.crisis().map(str::to_string),
            directive: state.directive().map(str::to_string),
            verdict: judgment.map(|j| j.verdict),
            reason: judgment.and_then(|j| j.reason.clone()),
            allocation: allocation.map(|a| a.shares.clone()),
            total: allocation.map(|a| a.total()),
            over_budget_by: allocation.map(|a| a.overage().unwrap_or(0)),
            error,
            error_kind,
            started_at,
            ended_at,
            duration_ms: elapsed_ms(started_at, ended_at),
        }
    }

    /// Outcome for a run that failed before the cycle could start.
    pub fn failed(scenario: &str, prompt: &str, transcript: PathBuf, error: &anyhow::Error) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            scenario: scenario.to_string(),
            prompt: prompt.to_string(),
            transcript,
            status: ScenarioStatus::Error,
            turns: 0,
            consulted: Vec::new(),
            crisis: None,
            directive: None,
            verdict: None,
            reason: None,
            allocation: None,
            total: None,
            over_budget_by: None,
            error: Some(format!("{:#}", error)),
            error_kind: Some("setup".to_string()),
            started_at: now,
            ended_at: now,
            duration_ms: 0,
        }
    }

    pub fn is_over_budget(&self) -> bool {
        self.over_budget_by.is_some_and(|over| over > 0)
    }

    /// Human-readable budget audit line, if an allocation was made.
    pub fn budget_audit(&self) -> Option<String> {
        let total = self.total?;
        Some(match self.over_budget_by {
            Some(over) if over > 0 => format!("total {} over budget by {}", total, over),
            _ => format!("total {} within budget", total),
        })
    }
}

/// Settings a batch ran with, stored alongside the outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMetadata {
    pub model: String,
    pub base_url: String,
    pub society_version: String,
    pub budget: u32,
    pub max_consultations: usize,
    pub parallelism: usize,
}

/// Aggregate statistics over a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub scenarios: usize,
    pub allocated: usize,
    pub rejected: usize,
    pub errors: usize,
    /// Approved verdicts over runs that reached a verdict
    pub approval_rate: f64,
    pub mean_consultations: f64,
    pub over_budget: usize,
    pub total_duration_ms: u64,
}

/// All outcomes of a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub metadata: BatchMetadata,
    pub outcomes: Vec<ScenarioOutcome>,
    pub summary: BatchSummary,
}

impl BatchReport {
    pub fn new(metadata: BatchMetadata) -> Self {
        Self {
            metadata,
            outcomes: Vec::new(),
            summary: BatchSummary::default(),
        }
    }

    pub fn add(&mut self, outcome: ScenarioOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn compute_summary(&mut self) {
        let scenarios = self.outcomes.len();
        let count = |status: ScenarioStatus| self.outcomes.iter().filter(|o| o.status == status).count();

        let judged: Vec<&ScenarioOutcome> =
            self.outcomes.iter().filter(|o| o.verdict.is_some()).collect();
        let approved = judged
            .iter()
            .filter(|o| o.verdict == Some(Verdict::Approved))
            .count();
        let approval_rate = if judged.is_empty() {
            0.0
        } else {
            approved as f64 / judged.len() as f64
        };

        let mean_consultations = if scenarios == 0 {
            0.0
        } else {
            self.outcomes.iter().map(|o| o.consulted.len()).sum::<usize>() as f64 / scenarios as f64
        };

        self.summary = BatchSummary {
            scenarios,
            allocated: count(ScenarioStatus::Allocated),
            rejected: count(ScenarioStatus::Rejected),
            errors: count(ScenarioStatus::Error),
            approval_rate,
            mean_consultations,
            over_budget: self.outcomes.iter().filter(|o| o.is_over_budget()).count(),
            total_duration_ms: self.outcomes.iter().map(|o| o.duration_ms).sum(),
        };
    }

    /// Outcomes that ended in error.
    pub fn failures(&self) -> impl Iterator<Item = &ScenarioOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == ScenarioStatus::Error)
    }

    /// Save results to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Load results from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let report = serde_json::from_str(&json)?;
        Ok(report)
    }
}

fn elapsed_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    u64::try_from((end - start).num_milliseconds()).unwrap_or(0)
}

/// Format a duration in milliseconds for display.
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{:.1}m", ms as f64 / 60_000.0)
    }
}
