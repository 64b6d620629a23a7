//! Batch runs against a stub backend, plus one live-server smoke test.

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crisis_experiment::batch::{BatchRunner, BatchRunnerConfig};
use crisis_experiment::chat_client::{ChatClient, ChatClientConfig};
use crisis_experiment::results::{BatchMetadata, BatchReport, ScenarioStatus};
use crisis_experiment::scenarios::{self, SCENARIOS};
use kallipolis_kernel::{
    CompletionRequest, CrisisSeed, CycleConfig, GenerationUnavailable, Orchestrator, SocietyConfig,
    TextGenerator,
};

/// Plays every role with canned replies; the crisis prompt decides God's verdict.
struct CannedCity;

impl TextGenerator for CannedCity {
    async fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<String, GenerationUnavailable> {
        let last = request
            .messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let crisis = request
            .messages
            .first()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let ruler_spoke = request.messages.iter().any(|m| m.role == "assistant");

        let reply = match request.agent {
            "God" if last.starts_with("Simulation Start.") => {
                if last.contains("plague") {
                    r#"{"crisis": "A plague spreads."}"#.to_string()
                } else if last.contains("wells") {
                    return Err(GenerationUnavailable::new("model crashed"));
                } else {
                    r#"{"crisis": "Trouble in the city."}"#.to_string()
                }
            }
            "God" => {
                if crisis.contains("plague") {
                    r#"{"judgement": "Too slow.", "solved": false}"#.to_string()
                } else {
                    r#"{"judgement": "Sound plan.", "solved": true}"#.to_string()
                }
            }
            "Philosopher_Ruler" if last.contains("SET_SALARY") => "SET_SALARY\n\
                Farmer=100\nBuilder=100\nWarrior=100\nMerchant=100\n\
                Artist=100\nHealer=100\nTeacher=150"
                .to_string(),
            "Philosopher_Ruler" if !ruler_spoke => "Healer, what do you advise? speak @Healer".to_string(),
            "Philosopher_Ruler" => r#"{"directive": "Act on the Healer's advice."}"#.to_string(),
            citizen => format!("{} advises caution.", citizen),
        };
        Ok(reply)
    }
}

fn runner(log_dir: PathBuf, parallelism: usize) -> BatchRunner<CannedCity> {
    let config = CycleConfig {
        generation_retries: 1,
        retry_backoff: Duration::ZERO,
        generation_timeout: Duration::from_secs(5),
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(Arc::new(CannedCity), Arc::new(SocietyConfig::v2()), config);
    BatchRunner::new(
        orchestrator,
        BatchRunnerConfig {
            log_dir,
            parallelism,
            cooldown: Duration::ZERO,
        },
    )
}

fn read_jsonl(path: &std::path::Path) -> Vec<serde_json::Value> {
    let file = std::fs::File::open(path).unwrap();
    BufReader::new(file)
        .lines()
        .map(|l| serde_json::from_str(&l.unwrap()).unwrap())
        .collect()
}

#[tokio::test]
async fn test_batch_isolates_failures_and_keeps_order() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path().join("logs"), 3);
    let selected = scenarios::select(&[
        "plague".to_string(),
        "fire".to_string(),
        "wells".to_string(),
        "earthquake".to_string(),
    ])
    .unwrap();

    let outcomes = runner.run(&selected).await;

    let names: Vec<_> = outcomes.iter().map(|o| o.scenario.as_str()).collect();
    assert_eq!(names, vec!["plague", "fire", "wells", "earthquake"]);

    assert_eq!(outcomes[0].status, ScenarioStatus::Rejected);
    assert_eq!(outcomes[0].reason.as_deref(), Some("Too slow."));
    assert!(outcomes[0].allocation.is_none());

    assert_eq!(outcomes[1].status, ScenarioStatus::Allocated);
    assert_eq!(outcomes[1].consulted, vec!["Healer".to_string()]);
    assert_eq!(outcomes[1].total, Some(750));
    assert_eq!(outcomes[1].over_budget_by, Some(50));
    assert_eq!(outcomes[1].turns, 6);

    assert_eq!(outcomes[2].status, ScenarioStatus::Error);
    assert_eq!(outcomes[2].error_kind.as_deref(), Some("generation_unavailable"));
    assert_eq!(outcomes[2].turns, 0);

    assert_eq!(outcomes[3].status, ScenarioStatus::Allocated);

    // Every run has its own transcript
    let mut paths: Vec<_> = outcomes.iter().map(|o| o.transcript.clone()).collect();
    paths.dedup();
    assert_eq!(paths.len(), 4);

    let fire = read_jsonl(&outcomes[1].transcript);
    assert_eq!(fire.len(), 6);
    let speakers: Vec<_> = fire.iter().map(|r| r["speaker"].as_str().unwrap()).collect();
    assert_eq!(
        speakers,
        vec!["God", "Philosopher_Ruler", "Healer", "Philosopher_Ruler", "God", "Philosopher_Ruler"]
    );
    assert!(fire.iter().all(|r| r["timestamp"].as_str().unwrap().len() == 19));

    assert!(read_jsonl(&outcomes[2].transcript).is_empty());
}

#[tokio::test]
async fn test_batch_report_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path().join("logs"), 1);
    let selected = scenarios::select(&["fire".to_string(), "plague".to_string()]).unwrap();

    let mut report = BatchReport::new(BatchMetadata {
        model: "canned".to_string(),
        base_url: "stub".to_string(),
        society_version: "v2".to_string(),
        budget: 700,
        max_consultations: 10,
        parallelism: 1,
    });
    for outcome in runner.run(&selected).await {
        report.add(outcome);
    }
    report.compute_summary();

    assert_eq!(report.summary.allocated, 1);
    assert_eq!(report.summary.rejected, 1);
    assert_eq!(report.summary.errors, 0);
    assert!((report.summary.approval_rate - 0.5).abs() < 1e-9);
    assert_eq!(report.summary.over_budget, 1);

    let path = dir.path().join("batch-summary.json");
    report.save(&path).unwrap();
    let loaded = BatchReport::load(&path).unwrap();
    assert_eq!(loaded.outcomes.len(), 2);
    assert_eq!(loaded.outcomes[0].run_id, report.outcomes[0].run_id);
    assert_ne!(loaded.outcomes[0].run_id, loaded.outcomes[1].run_id);
}

#[tokio::test]
async fn test_fixed_crisis_single_run() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path().to_path_buf(), 1);
    let seed = CrisisSeed::Fixed("The river has flooded the lower city.".to_string());

    let outcome = runner.run_one(1, "single", &seed).await;

    assert_eq!(outcome.status, ScenarioStatus::Allocated);
    assert_eq!(outcome.crisis.as_deref(), Some("The river has flooded the lower city."));
    let records = read_jsonl(&outcome.transcript);
    assert_eq!(records[0]["speaker"], "God");
    assert_eq!(records[0]["message"], "The river has flooded the lower city.");
    assert_eq!(records[0]["phase"], "crisis");
}

#[tokio::test]
#[ignore = "requires a chat completions server at KALLIPOLIS_LLM_URL"]
async fn test_live_fire_scenario() {
    let mut config = ChatClientConfig::default();
    if let Ok(url) = std::env::var("KALLIPOLIS_LLM_URL") {
        config.base_url = url;
    }
    if let Ok(model) = std::env::var("KALLIPOLIS_MODEL") {
        config.model = model;
    }
    let client = ChatClient::new(config).unwrap();
    assert!(client.health_check().await, "server not reachable");

    let dir = tempfile::tempdir().unwrap();
    let cycle = CycleConfig {
        max_consultations: 3,
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(Arc::new(client), Arc::new(SocietyConfig::v2()), cycle);
    let runner = BatchRunner::new(
        orchestrator,
        BatchRunnerConfig {
            log_dir: dir.path().to_path_buf(),
            parallelism: 1,
            cooldown: Duration::ZERO,
        },
    );

    let fire = scenarios::find("fire").unwrap();
    let outcome = runner
        .run_one(1, fire.name, &CrisisSeed::Prompt(fire.prompt.to_string()))
        .await;

    assert!(outcome.turns >= 4);
    assert!(outcome.consulted.len() <= 3);
    assert_eq!(read_jsonl(&outcome.transcript).len(), outcome.turns);
    assert!(SCENARIOS.iter().any(|s| s.name == outcome.scenario));
}
