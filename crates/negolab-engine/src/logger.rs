use negolab_models::{SessionEvent, SessionResult};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::LoggerError;

/// Identity of the session a logger hook refers to.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub agent_a: String,
    pub agent_b: String,
    pub domain: String,
}

/// Observer of sessions and tournaments.
///
/// Hooks are pure event sinks: they cannot alter a session, and an error from
/// one is logged and otherwise ignored.
pub trait SessionLogger: Send + Sync {
    fn name(&self) -> &str;

    fn before_session_start(&self, _session: &SessionInfo) -> Result<(), LoggerError> {
        Ok(())
    }

    fn on_offer(&self, _session: &SessionInfo, _event: &SessionEvent) -> Result<(), LoggerError> {
        Ok(())
    }

    fn on_accept(&self, _session: &SessionInfo, _event: &SessionEvent) -> Result<(), LoggerError> {
        Ok(())
    }

    /// Any terminal event other than acceptance: deadline, error or timeout.
    fn on_fail(&self, _session: &SessionInfo, _event: &SessionEvent) -> Result<(), LoggerError> {
        Ok(())
    }

    fn on_session_end(&self, _session: &SessionInfo, _result: &SessionResult) -> Result<(), LoggerError> {
        Ok(())
    }

    /// Called exactly once, after the last session.
    fn on_tournament_end(
        &self,
        _results: &[SessionResult],
        _agent_names: &[String],
        _domain_names: &[String],
    ) -> Result<(), LoggerError> {
        Ok(())
    }
}

/// Writes session milestones to `tracing`.
#[derive(Debug, Default)]
pub struct TracingLogger;

impl SessionLogger for TracingLogger {
    fn name(&self) -> &str {
        "tracing"
    }

    fn before_session_start(&self, session: &SessionInfo) -> Result<(), LoggerError> {
        debug!(
            session = %session.session_id,
            agent_a = %session.agent_a,
            agent_b = %session.agent_b,
            domain = %session.domain,
            "Session starting"
        );
        Ok(())
    }

    fn on_offer(&self, session: &SessionInfo, event: &SessionEvent) -> Result<(), LoggerError> {
        debug!(
            session = %session.session_id,
            round = event.round,
            t = event.time,
            utility_a = event.utility_a,
            utility_b = event.utility_b,
            "Offer"
        );
        Ok(())
    }

    fn on_session_end(&self, session: &SessionInfo, result: &SessionResult) -> Result<(), LoggerError> {
        info!(
            session = %session.session_id,
            agent_a = %result.agent_a,
            agent_b = %result.agent_b,
            domain = %result.domain,
            result = result.result.as_str(),
            rounds = result.rounds,
            utility_a = result.agent_a_utility,
            utility_b = result.agent_b_utility,
            elapsed_ms = result.elapsed_ms,
            "Session finished"
        );
        Ok(())
    }

    fn on_tournament_end(
        &self,
        results: &[SessionResult],
        agent_names: &[String],
        domain_names: &[String],
    ) -> Result<(), LoggerError> {
        info!(
            sessions = results.len(),
            agents = agent_names.len(),
            domains = domain_names.len(),
            "Tournament finished"
        );
        Ok(())
    }
}
