use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::Side;
use crate::bid::Bid;

/// What happened on one transition of a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Both agents initiated; the first turn follows.
    Start,
    Offer,
    Accept,
    Fail,
    Error,
    TimedOut,
}

/// A single entry in a session trace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionEvent {
    /// Number of offers made before this event.
    pub round: u32,
    /// `None` for engine-driven transitions (start, deadline).
    pub actor: Option<Side>,
    pub kind: EventKind,
    pub bid: Option<Bid>,
    /// Normalized negotiation time in [0, 1].
    pub time: f64,
    pub utility_a: f64,
    pub utility_b: f64,
    pub detail: Option<String>,
}

/// Terminal state of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionOutcome {
    Accepted { by: Side, bid: Bid },
    FailedDeadline,
    AgentError { who: Side, reason: String },
    AgentTimeout { who: Side },
}

impl SessionOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            SessionOutcome::Accepted { .. } => OutcomeKind::Acceptance,
            SessionOutcome::FailedDeadline => OutcomeKind::Failed,
            SessionOutcome::AgentError { .. } => OutcomeKind::Error,
            SessionOutcome::AgentTimeout { .. } => OutcomeKind::TimedOut,
        }
    }

    /// The side whose fault ended the session, if any.
    pub fn offender(&self) -> Option<Side> {
        match self {
            SessionOutcome::AgentError { who, .. } | SessionOutcome::AgentTimeout { who } => {
                Some(*who)
            }
            _ => None,
        }
    }

    pub fn accepted_bid(&self) -> Option<&Bid> {
        match self {
            SessionOutcome::Accepted { bid, .. } => Some(bid),
            _ => None,
        }
    }
}

/// Flat outcome label used in result rows and summaries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Acceptance,
    Failed,
    Error,
    TimedOut,
}

impl OutcomeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeKind::Acceptance => "Acceptance",
            OutcomeKind::Failed => "Failed",
            OutcomeKind::Error => "Error",
            OutcomeKind::TimedOut => "TimedOut",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "Acceptance" => Some(OutcomeKind::Acceptance),
            "Failed" => Some(OutcomeKind::Failed),
            "Error" => Some(OutcomeKind::Error),
            "TimedOut" => Some(OutcomeKind::TimedOut),
            _ => None,
        }
    }

    /// Error and TimedOut rows, as opposed to genuine negotiation outcomes.
    pub fn is_fault(self) -> bool {
        matches!(self, OutcomeKind::Error | OutcomeKind::TimedOut)
    }
}

/// Accuracy of one opponent model at the end of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EstimatorReport {
    pub estimator: String,
    /// The side that owned the model (it estimated the other side).
    pub side: Side,
    pub rmse: f64,
    pub spearman: f64,
    pub kendall_tau: f64,
}

/// One row of the tournament result set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionResult {
    pub session_id: Uuid,
    pub agent_a: String,
    pub agent_b: String,
    pub domain: String,
    pub result: OutcomeKind,
    /// Offending side for Error / TimedOut rows.
    pub who: Option<Side>,
    pub rounds: u32,
    pub time: f64,
    pub agent_a_utility: f64,
    pub agent_b_utility: f64,
    pub nash_product: f64,
    pub social_welfare: f64,
    pub nash_distance: f64,
    pub kalai_distance: f64,
    pub accepted_bid: Option<Bid>,
    pub reason: Option<String>,
    pub estimator_metrics: Vec<EstimatorReport>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl SessionResult {
    /// Utility obtained by `agent` in this row, if it took part.
    pub fn utility_of(&self, agent: &str) -> Option<f64> {
        if self.agent_a == agent {
            Some(self.agent_a_utility)
        } else if self.agent_b == agent {
            Some(self.agent_b_utility)
        } else {
            None
        }
    }

    /// Utility obtained by the opponent of `agent`, if it took part.
    pub fn opponent_utility_of(&self, agent: &str) -> Option<f64> {
        if self.agent_a == agent {
            Some(self.agent_b_utility)
        } else if self.agent_b == agent {
            Some(self.agent_a_utility)
        } else {
            None
        }
    }

    pub fn involves(&self, agent: &str) -> bool {
        self.agent_a == agent || self.agent_b == agent
    }

    /// Whether `agent` was the offending side of an Error / TimedOut row.
    pub fn is_offender(&self, agent: &str) -> bool {
        match self.who {
            Some(Side::A) => self.agent_a == agent,
            Some(Side::B) => self.agent_b == agent,
            None => false,
        }
    }
}
