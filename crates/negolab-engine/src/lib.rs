pub mod agent;
pub mod error;
pub mod guard;
pub mod logger;
pub mod opponent_model;
pub mod record;
pub mod session;
pub mod strategies;
pub mod summary;
pub mod tournament;

pub mod test_support;

pub use agent::{Agent, AgentContext, AgentEntry, AgentFactory, Participant};
pub use error::{AgentError, LoggerError, NegotiationError, RecordSealed, SinkError, TournamentError};
pub use guard::{ExecutionGuard, GuardOutcome};
pub use logger::{SessionInfo, SessionLogger, TracingLogger};
pub use opponent_model::{OpponentModel, OpponentModelEntry, OpponentModelFactory};
pub use record::SessionRecord;
pub use session::{NegotiationSession, SessionConfig, SessionReport, SessionState};
pub use strategies::builtin_agent;
pub use summary::{summarize, AgentSummary};
pub use tournament::{ResultSink, SessionPlan, Tournament, TournamentReport};
