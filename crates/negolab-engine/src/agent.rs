use std::fmt;
use std::sync::Arc;

use negolab_domain::{EstimationMetrics, Preference};
use negolab_models::{Action, Bid, Side};
use tokio_util::sync::CancellationToken;

use crate::error::AgentError;
use crate::opponent_model::{OpponentModel, OpponentModelEntry};

/// A negotiation strategy.
///
/// Every call runs on a blocking worker under a wall-clock budget. A call
/// that overruns is abandoned: the session ends with a timeout and the agent
/// only receives `terminate` once the overrunning call has returned.
/// Long-running strategies should poll [`AgentContext::is_cancelled`].
pub trait Agent: Send {
    fn name(&self) -> &str;

    /// Called once before the first turn. `opponent_name` is only provided
    /// when the tournament shares names.
    fn initiate(&mut self, _ctx: &AgentContext, _opponent_name: Option<&str>) -> Result<(), AgentError> {
        Ok(())
    }

    /// Called after the engine has recorded an incoming offer and updated
    /// the opponent models.
    fn receive_offer(&mut self, _ctx: &AgentContext, _bid: &Bid, _t: f64) -> Result<(), AgentError> {
        Ok(())
    }

    fn act(&mut self, ctx: &AgentContext, t: f64) -> Result<Action, AgentError>;

    /// Called exactly once when the session ends, whatever the outcome.
    fn terminate(&mut self, _ctx: &AgentContext, _accepted: bool, _opponent_name: &str, _t: f64) {}
}

/// Read-only view of one side's negotiation state.
pub struct AgentContext {
    side: Side,
    preference: Arc<Preference>,
    last_received_bids: Vec<Bid>,
    opponent_models: Vec<Box<dyn OpponentModel>>,
    cancel: CancellationToken,
}

impl AgentContext {
    pub fn new(side: Side, preference: Arc<Preference>) -> Self {
        Self {
            side,
            preference,
            last_received_bids: Vec::new(),
            opponent_models: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_opponent_models(mut self, models: Vec<Box<dyn OpponentModel>>) -> Self {
        self.opponent_models = models;
        self
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn preference(&self) -> &Arc<Preference> {
        &self.preference
    }

    /// Offers received so far, oldest first, each carrying this side's
    /// utility.
    pub fn last_received_bids(&self) -> &[Bid] {
        &self.last_received_bids
    }

    pub fn last_received_bid(&self) -> Option<&Bid> {
        self.last_received_bids.last()
    }

    pub fn opponent_models(&self) -> &[Box<dyn OpponentModel>] {
        &self.opponent_models
    }

    /// Accepting is only legal once an offer has been received.
    pub fn can_accept(&self) -> bool {
        !self.last_received_bids.is_empty()
    }

    /// Set when the current call has exceeded its budget.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentContext")
            .field("side", &self.side)
            .field("received", &self.last_received_bids.len())
            .field("opponent_models", &self.opponent_models.len())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// An agent bound to its context for the duration of one session.
pub struct Participant {
    label: String,
    agent: Box<dyn Agent>,
    ctx: AgentContext,
}

impl Participant {
    pub fn new(label: impl Into<String>, agent: Box<dyn Agent>, ctx: AgentContext) -> Self {
        Self {
            label: label.into(),
            agent,
            ctx,
        }
    }

    /// Fresh models from every entry, seeded with this side's preference.
    pub fn with_models(mut self, entries: &[OpponentModelEntry]) -> Self {
        let models = entries
            .iter()
            .map(|entry| entry.instantiate(&self.ctx.preference))
            .collect();
        self.ctx.opponent_models = models;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn side(&self) -> Side {
        self.ctx.side
    }

    pub fn context(&self) -> &AgentContext {
        &self.ctx
    }

    pub fn initiate(&mut self, opponent_name: Option<&str>) -> Result<(), AgentError> {
        self.agent.initiate(&self.ctx, opponent_name)
    }

    /// Record an incoming offer, update every opponent model, then hand the
    /// offer to the strategy.
    pub fn receive_bid(&mut self, bid: &Bid, t: f64) -> Result<(), AgentError> {
        let utility = self.ctx.preference.utility(bid);
        let received = bid.without_utility().with_utility(utility);

        self.ctx.last_received_bids.push(received.clone());
        for model in self.ctx.opponent_models.iter_mut() {
            model.update(&received, t);
        }
        self.agent.receive_offer(&self.ctx, &received, t)
    }

    pub fn act(&mut self, t: f64) -> Result<Action, AgentError> {
        self.agent.act(&self.ctx, t)
    }

    pub fn terminate(&mut self, accepted: bool, opponent_name: &str, t: f64) {
        self.agent.terminate(&self.ctx, accepted, opponent_name, t);
    }

    /// Accuracy of every opponent model against the opponent's true profile.
    pub fn estimator_metrics(&self, truth: &Preference) -> Vec<(String, EstimationMetrics)> {
        self.ctx
            .opponent_models
            .iter()
            .map(|model| (model.name().to_string(), model.error_against(truth)))
            .collect()
    }
}

impl fmt::Debug for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Participant")
            .field("label", &self.label)
            .field("agent", &self.agent.name())
            .field("ctx", &self.ctx)
            .finish()
    }
}

/// Builds a fresh agent instance for every session.
pub type AgentFactory = Arc<dyn Fn() -> Box<dyn Agent> + Send + Sync>;

/// A registered strategy.
#[derive(Clone)]
pub struct AgentEntry {
    name: String,
    factory: AgentFactory,
}

impl AgentEntry {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Agent> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instantiate(&self) -> Box<dyn Agent> {
        (self.factory)()
    }
}

impl fmt::Debug for AgentEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentEntry")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
