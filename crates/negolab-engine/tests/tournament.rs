//! Integration tests for the tournament scheduler.
//!
//! Domains are registered in memory on the catalog, sessions are played by
//! the reference agents plus a few faulty scripted ones, and rows are
//! collected through a result sink.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use negolab_domain::DomainCatalog;
use negolab_engine::test_support::{fixture_domain_named, PanickingAgent, RecordingLogger};
use negolab_engine::{builtin_agent, AgentEntry, ResultSink, SinkError, Tournament};
use negolab_models::{DeadlineConfig, OutcomeKind, SessionResult};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct MemorySink {
    rows: Mutex<Vec<SessionResult>>,
}

#[async_trait]
impl ResultSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn append(&self, result: &SessionResult) -> Result<(), SinkError> {
        self.rows.lock().unwrap().push(result.clone());
        Ok(())
    }
}

struct BrokenSink;

#[async_trait]
impl ResultSink for BrokenSink {
    fn name(&self) -> &str {
        "broken"
    }

    async fn append(&self, _result: &SessionResult) -> Result<(), SinkError> {
        Err(SinkError::new("broken", "connection refused"))
    }
}

async fn catalog() -> Arc<DomainCatalog> {
    let catalog = Arc::new(DomainCatalog::new("unused", 8));
    catalog.insert(fixture_domain_named("1")).await;
    catalog.insert(fixture_domain_named("2")).await;
    catalog
}

fn agents(names: &[&str]) -> Vec<AgentEntry> {
    names
        .iter()
        .map(|name| builtin_agent(name, Some(3)).unwrap())
        .collect()
}

fn domains() -> Vec<String> {
    vec!["1".to_string(), "2".to_string()]
}

#[tokio::test]
async fn three_agents_two_domains_repeat_two() {
    let sink = Arc::new(MemorySink::default());
    let logger = Arc::new(RecordingLogger::default());

    let tournament = Tournament::new(
        agents(&["boulware", "conceder", "hardliner"]),
        domains(),
        catalog().await,
        DeadlineConfig::rounds(40),
    )
    .repeat(2)
    .max_parallel_sessions(4)
    .with_sink(sink.clone())
    .with_sink(Arc::new(BrokenSink))
    .with_logger(logger.clone());

    let report = tournament.run(CancellationToken::new()).await.unwrap();

    assert_eq!(report.planned, 24);
    assert!(!report.cancelled);
    assert_eq!(report.results.len(), 24);
    assert_eq!(sink.rows.lock().unwrap().len(), 24);
    assert_eq!(logger.tournament_ends(), 1);
    assert_eq!(
        logger.hooks().iter().filter(|hook| **hook == "end").count(),
        24
    );

    for row in &report.results {
        assert_ne!(row.agent_a, row.agent_b);
        assert!(!row.result.is_fault());
        assert!(row.rounds <= 40);
    }

    assert_eq!(report.summaries.len(), 3);
    for summary in &report.summaries {
        assert_eq!(summary.count, 16);
        assert_eq!(summary.acceptance + summary.failed, 16);
    }

    // Two concession agents always meet before the deadline.
    assert!(report
        .results
        .iter()
        .filter(|row| row.agent_a != "hardliner" && row.agent_b != "hardliner")
        .all(|row| row.result == OutcomeKind::Acceptance));
}

#[tokio::test]
async fn faulty_agent_does_not_stop_the_tournament() {
    let mut entries = agents(&["linear"]);
    entries.push(AgentEntry::new("panicking", || Box::new(PanickingAgent)));

    let report = Tournament::new(entries, domains(), catalog().await, DeadlineConfig::rounds(20))
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.results.len(), 4);
    assert!(report
        .results
        .iter()
        .all(|row| row.result == OutcomeKind::Error && row.is_offender("panicking")));

    let panicking = &report.summaries[1];
    assert_eq!(panicking.agent, "panicking");
    assert_eq!(panicking.self_error, 4);
    assert_eq!(panicking.avg_utility, 0.0);

    let linear = &report.summaries[0];
    assert_eq!(linear.error, 4);
    assert_eq!(linear.self_error, 0);
}

#[tokio::test]
async fn cancelled_before_start_runs_nothing() {
    let logger = Arc::new(RecordingLogger::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = Tournament::new(
        agents(&["boulware", "linear"]),
        domains(),
        catalog().await,
        DeadlineConfig::rounds(20),
    )
    .with_logger(logger.clone())
    .run(cancel)
    .await
    .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.planned, 4);
    assert!(report.results.is_empty());
    assert_eq!(logger.tournament_ends(), 1);
}

#[tokio::test]
async fn opponent_models_are_evaluated_per_session() {
    let report = Tournament::new(
        agents(&["boulware", "conceder"]),
        vec!["1".to_string()],
        catalog().await,
        DeadlineConfig::rounds(30),
    )
    .with_opponent_models(vec![
        negolab_engine::OpponentModelEntry::classic_frequency(),
        negolab_engine::OpponentModelEntry::frequency_window(),
    ])
    .run(CancellationToken::new())
    .await
    .unwrap();

    assert_eq!(report.results.len(), 2);
    for row in &report.results {
        assert_eq!(row.estimator_metrics.len(), 4);
    }
}
