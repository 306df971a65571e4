use negolab_domain::DomainError;
use negolab_models::{SessionOutcome, Side};
use thiserror::Error;

/// Failure reported by strategy code.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Strategy error: {0}")]
    Strategy(String),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

/// Faults inside a single negotiation. These end the session; they never
/// escape into the tournament loop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NegotiationError {
    #[error("Protocol violation by {side}: {reason}")]
    ProtocolViolation { side: Side, reason: String },

    #[error("Agent {side} failed: {reason}")]
    AgentFault { side: Side, reason: String },

    #[error("Agent {side} exceeded its turn budget")]
    AgentTimeout { side: Side },
}

impl NegotiationError {
    /// The offending side.
    pub fn side(&self) -> Side {
        match self {
            NegotiationError::ProtocolViolation { side, .. }
            | NegotiationError::AgentFault { side, .. }
            | NegotiationError::AgentTimeout { side } => *side,
        }
    }

    /// The terminal session state this fault leads to.
    pub fn into_outcome(self) -> SessionOutcome {
        match self {
            NegotiationError::ProtocolViolation { side, reason } => SessionOutcome::AgentError {
                who: side,
                reason: format!("protocol violation: {reason}"),
            },
            NegotiationError::AgentFault { side, reason } => {
                SessionOutcome::AgentError { who: side, reason }
            }
            NegotiationError::AgentTimeout { side } => SessionOutcome::AgentTimeout { who: side },
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Session record is sealed")]
pub struct RecordSealed;

/// Fatal tournament setup errors, raised before the first session runs.
#[derive(Error, Debug)]
pub enum TournamentError {
    #[error("Invalid tournament configuration: {0}")]
    Config(String),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

#[derive(Error, Debug)]
#[error("Logger {logger} failed: {reason}")]
pub struct LoggerError {
    pub logger: String,
    pub reason: String,
}

impl LoggerError {
    pub fn new(logger: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            logger: logger.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
#[error("Result sink {sink} failed: {reason}")]
pub struct SinkError {
    pub sink: String,
    pub reason: String,
}

impl SinkError {
    pub fn new(sink: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            reason: reason.into(),
        }
    }
}
