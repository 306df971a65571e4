//! Integration tests for persisting tournament rows and reading them back.
//!
//! A tournament writes through the store as its result sink; the database
//! is then reopened from disk, as a later analysis run would.

use std::sync::Arc;

use negolab_domain::DomainCatalog;
use negolab_engine::test_support::fixture_domain_named;
use negolab_engine::{builtin_agent, summarize, Tournament};
use negolab_models::DeadlineConfig;
use negolab_store::SqliteResultStore;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn tournament_rows_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("results").join("results.db");

    let catalog = Arc::new(DomainCatalog::new(dir.path(), 4));
    catalog.insert(fixture_domain_named("1")).await;

    let store = Arc::new(SqliteResultStore::open(&db_path).unwrap());
    let agents = ["linear", "hardliner"]
        .iter()
        .map(|name| builtin_agent(name, Some(11)).unwrap())
        .collect();
    let report = Tournament::new(agents, vec!["1".to_string()], catalog, DeadlineConfig::rounds(20))
        .repeat(3)
        .with_sink(store.clone())
        .run(CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.results.len(), 6);
    drop(store);

    let reopened = SqliteResultStore::open(&db_path).unwrap();
    assert_eq!(reopened.count().unwrap(), 6);

    let mut stored = reopened.load_all().unwrap();
    let mut in_memory = report.results.clone();
    stored.sort_by_key(|row| row.session_id);
    in_memory.sort_by_key(|row| row.session_id);
    assert_eq!(stored, in_memory);

    let names = vec!["linear".to_string(), "hardliner".to_string()];
    for (resumed, live) in summarize(&stored, &names).iter().zip(&report.summaries) {
        assert_eq!(resumed.agent, live.agent);
        assert_eq!(resumed.count, 6);
        assert_eq!(resumed.count, live.count);
        assert_eq!(resumed.failed, live.failed);
        assert!((resumed.avg_utility - live.avg_utility).abs() < 1e-9);
    }
}

#[test]
fn wal_mode_is_enabled_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("wal.db");
    let _store = SqliteResultStore::open(&db_path).unwrap();

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let mode: String = conn
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
}
