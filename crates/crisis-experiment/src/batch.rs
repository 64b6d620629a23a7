//! Batch runner: one crisis cycle per scenario, each with its own transcript.
//!
//! A failing scenario is recorded as an error outcome and the batch moves
//! on. With `parallelism > 1` up to that many cycles run concurrently,
//! bounded by a semaphore; cycles never share a sink.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use kallipolis_kernel::{CrisisSeed, JsonlTranscript, Orchestrator, TextGenerator};

use crate::results::{format_duration, ScenarioOutcome, ScenarioStatus};
use crate::scenarios::Scenario;

/// Configuration for [`BatchRunner`].
#[derive(Debug, Clone)]
pub struct BatchRunnerConfig {
    /// Directory for JSONL transcripts
    pub log_dir: PathBuf,
    /// Maximum cycles in flight
    pub parallelism: usize,
    /// Pause after each scenario before its slot is released
    pub cooldown: Duration,
}

impl Default for BatchRunnerConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            parallelism: 1,
            cooldown: Duration::from_secs(2),
        }
    }
}

/// Runs scenarios through an [`Orchestrator`].
pub struct BatchRunner<G> {
    orchestrator: Orchestrator<G>,
    config: BatchRunnerConfig,
    /// Shared by every transcript name in this batch
    stamp: String,
}

impl<G: TextGenerator> BatchRunner<G> {
    pub fn new(orchestrator: Orchestrator<G>, config: BatchRunnerConfig) -> Self {
        Self {
            orchestrator,
            config,
            stamp: Local::now().format("%Y%m%d_%H%M%S").to_string(),
        }
    }

    /// Transcript path for the scenario at `index` (1-based).
    pub fn transcript_path(&self, index: usize) -> PathBuf {
        self.config
            .log_dir
            .join(format!("kallipolis_logs_{}_{:02}.jsonl", self.stamp, index))
    }

    /// Run a single cycle and summarize it.
    pub async fn run_one(&self, index: usize, name: &str, seed: &CrisisSeed) -> ScenarioOutcome {
        let prompt = match seed {
            CrisisSeed::Prompt(p) | CrisisSeed::Fixed(p) => p.as_str(),
        };
        let path = self.transcript_path(index);

        let mut sink = match JsonlTranscript::create(&path) {
            Ok(sink) => sink,
            Err(e) => {
                let e = anyhow::Error::new(e);
                warn!(scenario = name, error = %e, "Could not open transcript");
                return ScenarioOutcome::failed(name, prompt, path, &e);
            }
        };

        info!(scenario = name, transcript = %path.display(), "Starting scenario");
        let started_at = Utc::now();
        let report = self.orchestrator.run(seed, &mut sink).await;
        let ended_at = Utc::now();

        let outcome = ScenarioOutcome::from_report(name, prompt, path, &report, started_at, ended_at);
        let audit = outcome.budget_audit();
        match outcome.status {
            ScenarioStatus::Error => warn!(
                scenario = name,
                turns = outcome.turns,
                error = outcome.error.as_deref().unwrap_or_default(),
                "Scenario ended in error"
            ),
            status => info!(
                scenario = name,
                status = ?status,
                turns = outcome.turns,
                consulted = outcome.consulted.len(),
                budget = audit.as_deref().unwrap_or("no allocation"),
                duration = %format_duration(outcome.duration_ms),
                "Scenario finished"
            ),
        }
        outcome
    }

    /// Run every scenario, returning outcomes in input order.
    pub async fn run(&self, scenarios: &[Scenario]) -> Vec<ScenarioOutcome> {
        let total = scenarios.len();
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));

        info!(
            scenarios = total,
            parallelism = self.config.parallelism.max(1),
            log_dir = %self.config.log_dir.display(),
            "Starting batch"
        );

        let futures = scenarios.iter().enumerate().map(|(i, scenario)| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await.ok();
                info!(progress = format!("{}/{}", i + 1, total), scenario = scenario.name, "Running scenario");

                let seed = CrisisSeed::Prompt(scenario.prompt.to_string());
                let outcome = self.run_one(i + 1, scenario.name, &seed).await;

                if i + 1 < total && !self.config.cooldown.is_zero() {
                    tokio::time::sleep(self.config.cooldown).await;
                }
                outcome
            }
        });

        join_all(futures).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kallipolis_kernel::{CompletionRequest, CycleConfig, GenerationUnavailable, SocietyConfig};

    struct Offline;

    impl TextGenerator for Offline {
        async fn complete(
            &self,
            _request: CompletionRequest<'_>,
        ) -> Result<String, GenerationUnavailable> {
            Err(GenerationUnavailable::new("offline"))
        }
    }

    fn runner(log_dir: PathBuf) -> BatchRunner<Offline> {
        let config = CycleConfig {
            generation_retries: 0,
            retry_backoff: Duration::ZERO,
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(Arc::new(Offline), Arc::new(SocietyConfig::default()), config);
        BatchRunner::new(
            orchestrator,
            BatchRunnerConfig {
                log_dir,
                parallelism: 1,
                cooldown: Duration::ZERO,
            },
        )
    }

    #[test]
    fn test_transcript_path_format() {
        let runner = runner(PathBuf::from("logs"));
        let path = runner.transcript_path(3);
        let file = path.file_name().unwrap().to_str().unwrap();
        assert!(file.starts_with("kallipolis_logs_"));
        assert!(file.ends_with("_03.jsonl"));
        // kallipolis_logs_YYYYmmdd_HHMMSS_NN.jsonl
        assert_eq!(file.len(), "kallipolis_logs_20260101_000000_03.jsonl".len());
        assert_eq!(path.parent(), Some(std::path::Path::new("logs")));
    }

    #[tokio::test]
    async fn test_offline_generator_yields_error_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(dir.path().to_path_buf());
        let seed = CrisisSeed::Prompt("God, create a crisis involving a plague.".to_string());

        let outcome = runner.run_one(1, "plague", &seed).await;

        assert_eq!(outcome.status, ScenarioStatus::Error);
        assert_eq!(outcome.error_kind.as_deref(), Some("generation_unavailable"));
        assert_eq!(outcome.turns, 0);
        // Transcript is created (empty) even when no turn was produced
        assert!(outcome.transcript.exists());
    }
}
