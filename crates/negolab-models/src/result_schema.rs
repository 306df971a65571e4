/// Table the result store appends one row per finished session to.
///
/// Structured columns cover everything the summaries read; the accepted bid
/// and the estimator metrics are stored as JSON.
pub const RESULTS_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS session_results (
    session_id         TEXT PRIMARY KEY,
    agent_a            TEXT NOT NULL,
    agent_b            TEXT NOT NULL,
    domain             TEXT NOT NULL,
    result             TEXT NOT NULL,
    who                TEXT,
    rounds             INTEGER NOT NULL,
    final_time         REAL NOT NULL,
    agent_a_utility    REAL NOT NULL,
    agent_b_utility    REAL NOT NULL,
    nash_product       REAL NOT NULL,
    social_welfare     REAL NOT NULL,
    nash_distance      REAL NOT NULL,
    kalai_distance     REAL NOT NULL,
    accepted_bid_json  TEXT,
    reason             TEXT,
    estimators_json    TEXT NOT NULL,
    started_at         TEXT NOT NULL,
    elapsed_ms         INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_results_domain ON session_results(domain);
CREATE INDEX IF NOT EXISTS idx_results_agents ON session_results(agent_a, agent_b);
";
