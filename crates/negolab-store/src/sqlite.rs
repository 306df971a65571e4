use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use negolab_engine::{ResultSink, SinkError};
use negolab_models::result_schema::RESULTS_TABLE_DDL;
use negolab_models::{Bid, EstimatorReport, OutcomeKind, SessionResult, Side};
use rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;

const SELECT_COLUMNS: &str = "SELECT session_id, agent_a, agent_b, domain, result, who, rounds, \
     final_time, agent_a_utility, agent_b_utility, nash_product, social_welfare, nash_distance, \
     kalai_distance, accepted_bid_json, reason, estimators_json, started_at, elapsed_ms \
     FROM session_results";

/// Append-only SQLite store of tournament result rows.
///
/// Opens the database in WAL mode so an analysis process can read while a
/// tournament is still writing.
pub struct SqliteResultStore {
    conn: Mutex<Connection>,
}

impl SqliteResultStore {
    /// Open or create the database, creating parent directories and the
    /// schema as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(RESULTS_TABLE_DDL)?;
        debug!(path = %path.display(), "Opened result store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(RESULTS_TABLE_DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one row. Rows are never replaced; a repeated session id is an
    /// error.
    pub fn insert(&self, result: &SessionResult) -> Result<(), StoreError> {
        let accepted_bid = result
            .accepted_bid
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let estimators = serde_json::to_string(&result.estimator_metrics)?;

        self.conn().execute(
            "INSERT INTO session_results \
             (session_id, agent_a, agent_b, domain, result, who, rounds, final_time, \
              agent_a_utility, agent_b_utility, nash_product, social_welfare, nash_distance, \
              kalai_distance, accepted_bid_json, reason, estimators_json, started_at, elapsed_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            rusqlite::params![
                result.session_id.to_string(),
                result.agent_a,
                result.agent_b,
                result.domain,
                result.result.as_str(),
                result.who.map(Side::as_str),
                result.rounds,
                result.time,
                result.agent_a_utility,
                result.agent_b_utility,
                result.nash_product,
                result.social_welfare,
                result.nash_distance,
                result.kalai_distance,
                accepted_bid,
                result.reason,
                estimators,
                result.started_at,
                result.elapsed_ms as i64,
            ],
        )?;
        Ok(())
    }

    /// Every stored row, in insertion order.
    pub fn load_all(&self) -> Result<Vec<SessionResult>, StoreError> {
        self.query(&format!("{SELECT_COLUMNS} ORDER BY rowid"), &[])
    }

    /// Rows played on one domain, in insertion order.
    pub fn load_domain(&self, domain: &str) -> Result<Vec<SessionResult>, StoreError> {
        self.query(
            &format!("{SELECT_COLUMNS} WHERE domain = ?1 ORDER BY rowid"),
            &[&domain],
        )
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let count: usize =
            self.conn()
                .query_row("SELECT COUNT(*) FROM session_results", [], |row| row.get(0))?;
        Ok(count)
    }

    fn query(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<SessionResult>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok(StoredRow {
                    session_id: row.get(0)?,
                    agent_a: row.get(1)?,
                    agent_b: row.get(2)?,
                    domain: row.get(3)?,
                    result: row.get(4)?,
                    who: row.get(5)?,
                    rounds: row.get(6)?,
                    final_time: row.get(7)?,
                    agent_a_utility: row.get(8)?,
                    agent_b_utility: row.get(9)?,
                    nash_product: row.get(10)?,
                    social_welfare: row.get(11)?,
                    nash_distance: row.get(12)?,
                    kalai_distance: row.get(13)?,
                    accepted_bid_json: row.get(14)?,
                    reason: row.get(15)?,
                    estimators_json: row.get(16)?,
                    started_at: row.get(17)?,
                    elapsed_ms: row.get(18)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(StoredRow::into_result).collect()
    }
}

#[async_trait]
impl ResultSink for SqliteResultStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append(&self, result: &SessionResult) -> Result<(), SinkError> {
        self.insert(result)
            .map_err(|e| SinkError::new(self.name(), e.to_string()))
    }
}

/// Raw column values of one row.
struct StoredRow {
    session_id: String,
    agent_a: String,
    agent_b: String,
    domain: String,
    result: String,
    who: Option<String>,
    rounds: u32,
    final_time: f64,
    agent_a_utility: f64,
    agent_b_utility: f64,
    nash_product: f64,
    social_welfare: f64,
    nash_distance: f64,
    kalai_distance: f64,
    accepted_bid_json: Option<String>,
    reason: Option<String>,
    estimators_json: String,
    started_at: DateTime<Utc>,
    elapsed_ms: i64,
}

impl StoredRow {
    fn corrupt(&self, reason: impl Into<String>) -> StoreError {
        StoreError::Corrupt {
            session_id: self.session_id.clone(),
            reason: reason.into(),
        }
    }

    fn into_result(self) -> Result<SessionResult, StoreError> {
        let session_id = Uuid::parse_str(&self.session_id)
            .map_err(|e| self.corrupt(format!("session id: {e}")))?;
        let result = OutcomeKind::parse(&self.result)
            .ok_or_else(|| self.corrupt(format!("unknown result '{}'", self.result)))?;
        let who = match self.who.as_deref() {
            None => None,
            Some("A") => Some(Side::A),
            Some("B") => Some(Side::B),
            Some(other) => return Err(self.corrupt(format!("unknown side '{other}'"))),
        };
        let accepted_bid: Option<Bid> = self
            .accepted_bid_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        let estimator_metrics: Vec<EstimatorReport> = serde_json::from_str(&self.estimators_json)?;

        Ok(SessionResult {
            session_id,
            agent_a: self.agent_a,
            agent_b: self.agent_b,
            domain: self.domain,
            result,
            who,
            rounds: self.rounds,
            time: self.final_time,
            agent_a_utility: self.agent_a_utility,
            agent_b_utility: self.agent_b_utility,
            nash_product: self.nash_product,
            social_welfare: self.social_welfare,
            nash_distance: self.nash_distance,
            kalai_distance: self.kalai_distance,
            accepted_bid,
            reason: self.reason,
            estimator_metrics,
            started_at: self.started_at,
            elapsed_ms: self.elapsed_ms.max(0) as u64,
        })
    }
}
