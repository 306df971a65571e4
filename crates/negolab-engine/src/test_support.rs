//! Fixture domain and scripted agents for exercising the engine.
//!
//! The fixture is a 3x3 seller/buyer domain with opposed price preferences
//! and partly opposed delivery preferences, small enough to reason about by
//! hand.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use negolab_domain::{Domain, Preference};
use negolab_models::{Action, Bid, SessionEvent, SessionResult};

use crate::agent::{Agent, AgentContext};
use crate::error::{AgentError, LoggerError};
use crate::logger::{SessionInfo, SessionLogger};

pub const SELLER_PROFILE: &str = r#"{
    "reservationValue": 0.2,
    "issueWeights": {"price": 0.6, "delivery": 0.4},
    "issues": {
        "price": {"high": 1.0, "mid": 0.6, "low": 0.0},
        "delivery": {"slow": 1.0, "normal": 0.5, "fast": 0.0}
    }
}"#;

pub const BUYER_PROFILE: &str = r#"{
    "reservationValue": 0.3,
    "issueWeights": {"price": 0.5, "delivery": 0.5},
    "issues": {
        "price": {"high": 0.0, "mid": 0.5, "low": 1.0},
        "delivery": {"slow": 0.1, "normal": 0.6, "fast": 1.0}
    }
}"#;

/// The fixture domain, named "fixture".
pub fn fixture_domain() -> Arc<Domain> {
    Arc::new(fixture_domain_named("fixture"))
}

/// The fixture profiles under another name, for multi-domain tournaments.
pub fn fixture_domain_named(name: &str) -> Domain {
    let seller = Preference::from_json(SELLER_PROFILE).expect("seller fixture");
    let buyer = Preference::from_json(BUYER_PROFILE).expect("buyer fixture");
    Domain::from_preferences(name, seller, buyer).expect("fixture domain")
}

/// Accepts any offer it has received; otherwise offers its best bid.
#[derive(Debug, Default)]
pub struct EagerAcceptor;

impl EagerAcceptor {
    pub fn new() -> Self {
        Self
    }
}

impl Agent for EagerAcceptor {
    fn name(&self) -> &str {
        "eager"
    }

    fn act(&mut self, ctx: &AgentContext, _t: f64) -> Result<Action, AgentError> {
        if ctx.can_accept() {
            Ok(Action::Accept)
        } else {
            Ok(Action::Offer(ctx.preference().max_util_bid()))
        }
    }
}

/// Offers the same bid every turn and never accepts.
#[derive(Debug)]
pub struct ScriptedAgent {
    name: String,
    bid: Bid,
}

impl ScriptedAgent {
    pub fn repeating(name: &str, bid: Bid) -> Self {
        Self {
            name: name.to_string(),
            bid,
        }
    }
}

impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn act(&mut self, _ctx: &AgentContext, _t: f64) -> Result<Action, AgentError> {
        Ok(Action::Offer(self.bid.clone()))
    }
}

/// Sleeps through every turn, ignoring cancellation.
#[derive(Debug)]
pub struct SleepyAgent {
    nap: Duration,
}

impl SleepyAgent {
    pub fn new(nap: Duration) -> Self {
        Self { nap }
    }
}

impl Agent for SleepyAgent {
    fn name(&self) -> &str {
        "sleepy"
    }

    fn act(&mut self, ctx: &AgentContext, _t: f64) -> Result<Action, AgentError> {
        std::thread::sleep(self.nap);
        Ok(Action::Offer(ctx.preference().max_util_bid()))
    }
}

#[derive(Debug, Default)]
pub struct PanickingAgent;

impl Agent for PanickingAgent {
    fn name(&self) -> &str {
        "panicking"
    }

    fn act(&mut self, _ctx: &AgentContext, _t: f64) -> Result<Action, AgentError> {
        panic!("strategy blew up")
    }
}

/// Offers a value that does not exist in the domain.
#[derive(Debug, Default)]
pub struct InvalidBidder;

impl InvalidBidder {
    pub fn new() -> Self {
        Self
    }
}

impl Agent for InvalidBidder {
    fn name(&self) -> &str {
        "invalid"
    }

    fn act(&mut self, ctx: &AgentContext, _t: f64) -> Result<Action, AgentError> {
        Ok(Action::Offer(
            ctx.preference().max_util_bid().with("price", "free"),
        ))
    }
}

/// Counts `terminate` calls delivered to the wrapped agent.
pub struct TerminationCounter {
    inner: Box<dyn Agent>,
    count: Arc<AtomicUsize>,
}

impl TerminationCounter {
    pub fn wrap(inner: Box<dyn Agent>) -> (Self, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                count: Arc::clone(&count),
            },
            count,
        )
    }
}

impl Agent for TerminationCounter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn initiate(&mut self, ctx: &AgentContext, opponent_name: Option<&str>) -> Result<(), AgentError> {
        self.inner.initiate(ctx, opponent_name)
    }

    fn receive_offer(&mut self, ctx: &AgentContext, bid: &Bid, t: f64) -> Result<(), AgentError> {
        self.inner.receive_offer(ctx, bid, t)
    }

    fn act(&mut self, ctx: &AgentContext, t: f64) -> Result<Action, AgentError> {
        self.inner.act(ctx, t)
    }

    fn terminate(&mut self, ctx: &AgentContext, accepted: bool, opponent_name: &str, t: f64) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.inner.terminate(ctx, accepted, opponent_name, t);
    }
}

/// Records which hooks fired, in order.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    hooks: Mutex<Vec<&'static str>>,
    tournament_ends: AtomicUsize,
}

impl RecordingLogger {
    pub fn hooks(&self) -> Vec<&'static str> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn tournament_ends(&self) -> usize {
        self.tournament_ends.load(Ordering::SeqCst)
    }

    fn push(&self, hook: &'static str) -> Result<(), LoggerError> {
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
        Ok(())
    }
}

impl SessionLogger for RecordingLogger {
    fn name(&self) -> &str {
        "recording"
    }

    fn before_session_start(&self, _session: &SessionInfo) -> Result<(), LoggerError> {
        self.push("start")
    }

    fn on_offer(&self, _session: &SessionInfo, _event: &SessionEvent) -> Result<(), LoggerError> {
        self.push("offer")
    }

    fn on_accept(&self, _session: &SessionInfo, _event: &SessionEvent) -> Result<(), LoggerError> {
        self.push("accept")
    }

    fn on_fail(&self, _session: &SessionInfo, _event: &SessionEvent) -> Result<(), LoggerError> {
        self.push("fail")
    }

    fn on_session_end(&self, _session: &SessionInfo, _result: &SessionResult) -> Result<(), LoggerError> {
        self.push("end")
    }

    fn on_tournament_end(
        &self,
        _results: &[SessionResult],
        _agent_names: &[String],
        _domain_names: &[String],
    ) -> Result<(), LoggerError> {
        self.tournament_ends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A logger whose every hook fails.
#[derive(Debug, Default)]
pub struct FailingLogger;

impl SessionLogger for FailingLogger {
    fn name(&self) -> &str {
        "failing"
    }

    fn on_offer(&self, _session: &SessionInfo, _event: &SessionEvent) -> Result<(), LoggerError> {
        Err(LoggerError::new("failing", "disk full"))
    }

    fn on_session_end(&self, _session: &SessionInfo, _result: &SessionResult) -> Result<(), LoggerError> {
        Err(LoggerError::new("failing", "disk full"))
    }
}
