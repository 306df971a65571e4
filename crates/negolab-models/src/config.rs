use serde::{Deserialize, Serialize};

use crate::action::Side;

/// Top-level configuration for a negolab run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NegolabConfig {
    pub tournament: TournamentConfig,
    pub deadline: DeadlineConfig,
    #[serde(default)]
    pub domains: DomainsConfig,
    #[serde(default)]
    pub results: ResultsConfig,
}

/// Which sessions to run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TournamentConfig {
    /// Names of the registered agents taking part.
    pub agents: Vec<String>,
    /// Domain names, resolved as `<domains.root>/domain<name>/`.
    pub domains: Vec<String>,
    /// Opponent model names instantiated for every agent in every session.
    #[serde(default)]
    pub opponent_models: Vec<String>,
    /// Let agents negotiate against another instance of themselves.
    #[serde(default)]
    pub self_negotiation: bool,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
    #[serde(default)]
    pub shuffle: bool,
    /// Seed for shuffling and any seeded agent randomness.
    pub seed: Option<u64>,
    #[serde(default = "default_parallel_sessions")]
    pub max_parallel_sessions: usize,
    /// Pass the opponent's name to `initiate` (for learning agents).
    #[serde(default)]
    pub share_opponent_names: bool,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self {
            agents: vec![],
            domains: vec![],
            opponent_models: vec![],
            self_negotiation: false,
            repeat: default_repeat(),
            shuffle: false,
            seed: None,
            max_parallel_sessions: default_parallel_sessions(),
            share_opponent_names: false,
        }
    }
}

/// Session deadline and per-turn budget. At least one of `rounds` and
/// `time_seconds` must be set; when both are, whichever runs out first ends
/// the session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeadlineConfig {
    /// Round-based deadline: maximum number of offers.
    pub rounds: Option<u32>,
    /// Time-based deadline in seconds.
    pub time_seconds: Option<u64>,
    /// Hard wall-clock budget for a single agent call.
    #[serde(default = "default_turn_timeout_ms")]
    pub turn_timeout_ms: u64,
    #[serde(default)]
    pub first_mover: Side,
    /// Upper bound on live guard workers (including abandoned ones) per session.
    #[serde(default = "default_guard_workers")]
    pub max_guard_workers: usize,
}

impl DeadlineConfig {
    pub fn rounds(rounds: u32) -> Self {
        Self {
            rounds: Some(rounds),
            ..Self::default()
        }
    }

    pub fn seconds(seconds: u64) -> Self {
        Self {
            rounds: None,
            time_seconds: Some(seconds),
            ..Self::default()
        }
    }

    pub fn with_turn_timeout_ms(mut self, turn_timeout_ms: u64) -> Self {
        self.turn_timeout_ms = turn_timeout_ms;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.rounds.is_none() && self.time_seconds.is_none() {
            return Err("no deadline: set `rounds` and/or `time_seconds`".to_string());
        }
        if self.rounds == Some(0) {
            return Err("`rounds` must be positive".to_string());
        }
        if self.time_seconds == Some(0) {
            return Err("`time_seconds` must be positive".to_string());
        }
        if self.turn_timeout_ms == 0 {
            return Err("`turn_timeout_ms` must be positive".to_string());
        }
        if self.max_guard_workers == 0 {
            return Err("`max_guard_workers` must be positive".to_string());
        }
        Ok(())
    }
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            rounds: Some(1000),
            time_seconds: None,
            turn_timeout_ms: default_turn_timeout_ms(),
            first_mover: Side::A,
            max_guard_workers: default_guard_workers(),
        }
    }
}

/// Where domain profiles live and how many loaded domains to keep in memory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainsConfig {
    #[serde(default = "default_domain_root")]
    pub root: String,
    #[serde(default = "default_domain_cache_capacity")]
    pub cache_capacity: u64,
}

impl Default for DomainsConfig {
    fn default() -> Self {
        Self {
            root: default_domain_root(),
            cache_capacity: default_domain_cache_capacity(),
        }
    }
}

/// Where session results are persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ResultsConfig {
    /// SQLite file receiving one row per finished session. Disabled when unset.
    pub sqlite_path: Option<String>,
}

fn default_repeat() -> u32 {
    1
}
fn default_parallel_sessions() -> usize {
    1
}
fn default_turn_timeout_ms() -> u64 {
    1000
}
fn default_guard_workers() -> usize {
    4
}
fn default_domain_root() -> String {
    "domains".to_string()
}
fn default_domain_cache_capacity() -> u64 {
    64
}
