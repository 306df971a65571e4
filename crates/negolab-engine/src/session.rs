use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant};

use chrono::Utc;
use negolab_domain::{BidPoint, Domain};
use negolab_models::{
    Action, Bid, DeadlineConfig, EstimatorReport, EventKind, SessionEvent, SessionOutcome,
    SessionResult, Side,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::agent::{Agent, AgentContext, Participant};
use crate::error::{AgentError, LoggerError, NegotiationError};
use crate::guard::{ExecutionGuard, GuardOutcome};
use crate::logger::{SessionInfo, SessionLogger};
use crate::opponent_model::OpponentModelEntry;
use crate::record::SessionRecord;

/// Deadline and per-call budget of a session. Always has at least one
/// deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    rounds: Option<u32>,
    time_limit: Option<Duration>,
    turn_budget: Duration,
    first_mover: Side,
    max_guard_workers: usize,
}

impl SessionConfig {
    pub fn from_deadline(deadline: &DeadlineConfig) -> Result<Self, String> {
        deadline.validate()?;
        Ok(Self {
            rounds: deadline.rounds,
            time_limit: deadline.time_seconds.map(Duration::from_secs),
            turn_budget: Duration::from_millis(deadline.turn_timeout_ms),
            first_mover: deadline.first_mover,
            max_guard_workers: deadline.max_guard_workers,
        })
    }

    /// Round-based deadline with the default turn budget.
    pub fn rounds(rounds: u32) -> Self {
        let defaults = DeadlineConfig::default();
        Self {
            rounds: Some(rounds.max(1)),
            time_limit: None,
            turn_budget: Duration::from_millis(defaults.turn_timeout_ms),
            first_mover: defaults.first_mover,
            max_guard_workers: defaults.max_guard_workers,
        }
    }

    /// Time-based deadline with the default turn budget.
    pub fn time_limit(limit: Duration) -> Self {
        Self {
            rounds: None,
            time_limit: Some(limit.max(Duration::from_millis(1))),
            ..Self::rounds(1)
        }
    }

    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = Some(rounds.max(1));
        self
    }

    pub fn with_turn_budget(mut self, budget: Duration) -> Self {
        self.turn_budget = budget;
        self
    }

    pub fn with_first_mover(mut self, side: Side) -> Self {
        self.first_mover = side;
        self
    }

    pub fn with_max_guard_workers(mut self, workers: usize) -> Self {
        self.max_guard_workers = workers.max(1);
        self
    }

    pub fn turn_budget(&self) -> Duration {
        self.turn_budget
    }

    pub fn first_mover(&self) -> Side {
        self.first_mover
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    InProgress,
    Accepted,
    FailedDeadline,
    AgentError,
    AgentTimeout,
}

impl SessionState {
    fn terminal(outcome: &SessionOutcome) -> Self {
        match outcome {
            SessionOutcome::Accepted { .. } => SessionState::Accepted,
            SessionOutcome::FailedDeadline => SessionState::FailedDeadline,
            SessionOutcome::AgentError { .. } => SessionState::AgentError,
            SessionOutcome::AgentTimeout { .. } => SessionState::AgentTimeout,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionState::NotStarted | SessionState::InProgress)
    }
}

/// Everything a finished session produced.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub state: SessionState,
    pub record: SessionRecord,
    pub result: SessionResult,
}

impl SessionReport {
    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.record.outcome()
    }
}

/// One alternating-offers negotiation between two agents.
pub struct NegotiationSession {
    domain: Arc<Domain>,
    config: SessionConfig,
    labels: [String; 2],
    agents: [Box<dyn Agent>; 2],
    models: Vec<OpponentModelEntry>,
    loggers: Vec<Arc<dyn SessionLogger>>,
    share_opponent_names: bool,
}

impl NegotiationSession {
    /// `agent_a` negotiates with profile A of `domain`, `agent_b` with B.
    pub fn new(
        domain: Arc<Domain>,
        config: SessionConfig,
        agent_a: Box<dyn Agent>,
        agent_b: Box<dyn Agent>,
    ) -> Self {
        let labels = [agent_a.name().to_string(), agent_b.name().to_string()];
        Self {
            domain,
            config,
            labels,
            agents: [agent_a, agent_b],
            models: Vec::new(),
            loggers: Vec::new(),
            share_opponent_names: false,
        }
    }

    /// Names used in events and the result row (defaults to the agents' own).
    pub fn with_labels(mut self, a: impl Into<String>, b: impl Into<String>) -> Self {
        self.labels = [a.into(), b.into()];
        self
    }

    pub fn with_opponent_models(mut self, models: Vec<OpponentModelEntry>) -> Self {
        self.models = models;
        self
    }

    pub fn with_loggers(mut self, loggers: Vec<Arc<dyn SessionLogger>>) -> Self {
        self.loggers = loggers;
        self
    }

    pub fn share_opponent_names(mut self, share: bool) -> Self {
        self.share_opponent_names = share;
        self
    }

    /// Run to a terminal state. Agent faults end the session; they are
    /// reported in the result, never returned as errors.
    pub async fn run(self) -> SessionReport {
        let NegotiationSession {
            domain,
            config,
            labels: [label_a, label_b],
            agents: [agent_a, agent_b],
            models,
            loggers,
            share_opponent_names,
        } = self;

        let started_at = Utc::now();
        let info = SessionInfo {
            session_id: Uuid::new_v4(),
            agent_a: label_a.clone(),
            agent_b: label_b.clone(),
            domain: domain.name().to_string(),
        };

        let seats = [
            Seat::new(Side::A, label_a, agent_a, &domain, &models),
            Seat::new(Side::B, label_b, agent_b, &domain, &models),
        ];

        let mut run = SessionRun {
            info,
            guard: ExecutionGuard::new(config.turn_budget, config.max_guard_workers),
            clock: SessionClock::new(config.rounds, config.time_limit),
            domain,
            config,
            seats,
            loggers,
            share_opponent_names,
            record: SessionRecord::new(),
            state: SessionState::NotStarted,
            offers: 0,
            t: 0.0,
        };

        run.notify("before_session_start", |logger, info| logger.before_session_start(info));

        let outcome = run.negotiate().await;
        run.finish(outcome, started_at).await
    }
}

struct Seat {
    label: String,
    participant: Arc<Mutex<Participant>>,
    cancel: CancellationToken,
    /// A call on this seat overran its budget and may still be running.
    abandoned: bool,
}

impl Seat {
    fn new(
        side: Side,
        label: String,
        agent: Box<dyn Agent>,
        domain: &Domain,
        models: &[OpponentModelEntry],
    ) -> Self {
        let preference = match side {
            Side::A => domain.profile_a().clone(),
            Side::B => domain.profile_b().clone(),
        };
        let ctx = AgentContext::new(side, preference);
        let cancel = ctx.cancel_token().clone();
        let participant = Participant::new(label.clone(), agent, ctx).with_models(models);

        Self {
            label,
            participant: Arc::new(Mutex::new(participant)),
            cancel,
            abandoned: false,
        }
    }
}

/// Normalized time: the larger of elapsed/limit and offers/rounds, clamped
/// to [0, 1] and never decreasing.
struct SessionClock {
    started: Instant,
    rounds: Option<u32>,
    time_limit: Option<Duration>,
    last: f64,
}

impl SessionClock {
    fn new(rounds: Option<u32>, time_limit: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            rounds,
            time_limit,
            last: 0.0,
        }
    }

    fn now(&mut self, offers: u32) -> f64 {
        let mut t = 0.0_f64;
        if let Some(limit) = self.time_limit {
            t = t.max(self.started.elapsed().as_secs_f64() / limit.as_secs_f64());
        }
        if let Some(rounds) = self.rounds {
            t = t.max(f64::from(offers) / f64::from(rounds));
        }
        self.last = t.clamp(0.0, 1.0).max(self.last);
        self.last
    }
}

fn seat_index(side: Side) -> usize {
    match side {
        Side::A => 0,
        Side::B => 1,
    }
}

struct SessionRun {
    info: SessionInfo,
    domain: Arc<Domain>,
    config: SessionConfig,
    guard: ExecutionGuard,
    clock: SessionClock,
    seats: [Seat; 2],
    loggers: Vec<Arc<dyn SessionLogger>>,
    share_opponent_names: bool,
    record: SessionRecord,
    state: SessionState,
    offers: u32,
    t: f64,
}

impl SessionRun {
    fn seat(&self, side: Side) -> &Seat {
        &self.seats[seat_index(side)]
    }

    async fn negotiate(&mut self) -> SessionOutcome {
        let first = self.config.first_mover;

        for side in [first, first.other()] {
            let hint = self
                .share_opponent_names
                .then(|| self.seat(side.other()).label.clone());
            if let Err(fault) = self.call(side, move |p| p.initiate(hint.as_deref())).await {
                return self.fault(fault);
            }
        }
        self.state = SessionState::InProgress;
        let t = self.clock.now(0);
        self.append(SessionEvent {
            round: 0,
            actor: None,
            kind: EventKind::Start,
            bid: None,
            time: t,
            utility_a: 0.0,
            utility_b: 0.0,
            detail: None,
        });

        let mut turn = first;
        let mut last_offer: Option<Bid> = None;
        loop {
            let t = self.clock.now(self.offers);
            self.t = t;
            if t >= 1.0 {
                return SessionOutcome::FailedDeadline;
            }

            let action = match self.call(turn, move |p| p.act(t)).await {
                Ok(action) => action,
                Err(fault) => return self.fault(fault),
            };

            match action {
                Action::Accept => {
                    return match last_offer.take() {
                        Some(bid) => SessionOutcome::Accepted { by: turn, bid },
                        None => self.fault(NegotiationError::ProtocolViolation {
                            side: turn,
                            reason: "accepted before receiving an offer".to_string(),
                        }),
                    };
                }
                Action::Offer(bid) => {
                    if let Err(e) = self.domain.profile_a().validate_bid(&bid) {
                        return self.fault(NegotiationError::ProtocolViolation {
                            side: turn,
                            reason: e.to_string(),
                        });
                    }

                    let bid = bid.without_utility();
                    self.offers += 1;
                    self.record_offer(turn, &bid, t);

                    let forwarded = bid.clone();
                    let receiver = turn.other();
                    if let Err(fault) = self
                        .call(receiver, move |p| p.receive_bid(&forwarded, t))
                        .await
                    {
                        return self.fault(fault);
                    }

                    last_offer = Some(bid);
                    turn = receiver;
                }
            }
        }
    }

    /// Run one agent call under the guard and classify its failure.
    async fn call<T, F>(&mut self, side: Side, call: F) -> Result<T, NegotiationError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Participant) -> Result<T, AgentError> + Send + 'static,
    {
        let seat = &self.seats[seat_index(side)];
        let outcome = self.guard.run(&seat.participant, &seat.cancel, call).await;
        match outcome {
            GuardOutcome::Completed(Ok(value)) => Ok(value),
            GuardOutcome::Completed(Err(e)) => Err(NegotiationError::AgentFault {
                side,
                reason: e.to_string(),
            }),
            GuardOutcome::Panicked(message) => Err(NegotiationError::AgentFault {
                side,
                reason: format!("panicked: {message}"),
            }),
            GuardOutcome::TimedOut => {
                self.seats[seat_index(side)].abandoned = true;
                Err(NegotiationError::AgentTimeout { side })
            }
            GuardOutcome::NoWorker => Err(NegotiationError::AgentTimeout { side }),
        }
    }

    fn fault(&self, fault: NegotiationError) -> SessionOutcome {
        warn!(
            session = %self.info.session_id,
            agent = %self.seat(fault.side()).label,
            error = %fault,
            "Session ended by agent fault"
        );
        fault.into_outcome()
    }

    fn record_offer(&mut self, actor: Side, bid: &Bid, t: f64) {
        let event = SessionEvent {
            round: self.offers,
            actor: Some(actor),
            kind: EventKind::Offer,
            bid: Some(bid.clone()),
            time: t,
            utility_a: self.domain.profile_a().utility(bid),
            utility_b: self.domain.profile_b().utility(bid),
            detail: None,
        };
        self.notify("on_offer", |logger, info| logger.on_offer(info, &event));
        self.append(event);
    }

    fn append(&mut self, event: SessionEvent) {
        if let Err(e) = self.record.append(event) {
            warn!(session = %self.info.session_id, error = %e, "Dropped session event");
        }
    }

    fn notify<F>(&self, hook: &str, call: F)
    where
        F: Fn(&dyn SessionLogger, &SessionInfo) -> Result<(), LoggerError>,
    {
        for logger in &self.loggers {
            if let Err(e) = call(logger.as_ref(), &self.info) {
                warn!(logger = %logger.name(), hook, error = %e, "Session logger failed");
            }
        }
    }

    /// Utilities credited to (A, B) for a terminal outcome.
    fn credit(&self, outcome: &SessionOutcome) -> (f64, f64) {
        let profile_a = self.domain.profile_a();
        let profile_b = self.domain.profile_b();
        let reservation = (profile_a.reservation_value(), profile_b.reservation_value());

        match outcome {
            SessionOutcome::Accepted { bid, .. } => (profile_a.utility(bid), profile_b.utility(bid)),
            SessionOutcome::FailedDeadline => reservation,
            SessionOutcome::AgentError { who, .. } | SessionOutcome::AgentTimeout { who } => {
                match who {
                    Side::A => (0.0, reservation.1),
                    Side::B => (reservation.0, 0.0),
                }
            }
        }
    }

    async fn finish(
        mut self,
        outcome: SessionOutcome,
        started_at: chrono::DateTime<Utc>,
    ) -> SessionReport {
        let t = self.t;
        let (utility_a, utility_b) = self.credit(&outcome);

        let reason = match &outcome {
            SessionOutcome::AgentError { reason, .. } => Some(reason.clone()),
            SessionOutcome::AgentTimeout { .. } => Some(format!(
                "turn budget of {} ms exceeded",
                self.config.turn_budget.as_millis()
            )),
            _ => None,
        };
        let (actor, kind) = match &outcome {
            SessionOutcome::Accepted { by, .. } => (Some(*by), EventKind::Accept),
            SessionOutcome::FailedDeadline => (None, EventKind::Fail),
            SessionOutcome::AgentError { who, .. } => (Some(*who), EventKind::Error),
            SessionOutcome::AgentTimeout { who } => (Some(*who), EventKind::TimedOut),
        };
        let event = SessionEvent {
            round: self.offers,
            actor,
            kind,
            bid: outcome.accepted_bid().cloned(),
            time: t,
            utility_a,
            utility_b,
            detail: reason.clone(),
        };
        if kind == EventKind::Accept {
            self.notify("on_accept", |logger, info| logger.on_accept(info, &event));
        } else {
            self.notify("on_fail", |logger, info| logger.on_fail(info, &event));
        }
        self.append(event);
        self.state = SessionState::terminal(&outcome);

        self.terminate_both(outcome.accepted_bid().is_some(), t).await;
        let estimator_metrics = self.estimator_reports().await;

        let point = BidPoint::at(utility_a, utility_b);
        let bid_space = self.domain.bid_space();
        let result = SessionResult {
            session_id: self.info.session_id,
            agent_a: self.info.agent_a.clone(),
            agent_b: self.info.agent_b.clone(),
            domain: self.info.domain.clone(),
            result: outcome.kind(),
            who: outcome.offender(),
            rounds: self.offers,
            time: t,
            agent_a_utility: utility_a,
            agent_b_utility: utility_b,
            nash_product: point.nash_product(),
            social_welfare: point.social_welfare(),
            nash_distance: bid_space.nash_distance(&point),
            kalai_distance: bid_space.kalai_distance(&point),
            accepted_bid: outcome.accepted_bid().cloned(),
            reason,
            estimator_metrics,
            started_at,
            elapsed_ms: (Utc::now() - started_at).num_milliseconds().max(0) as u64,
        };

        if let Err(e) = self.record.seal(outcome) {
            warn!(session = %self.info.session_id, error = %e, "Session record already sealed");
        }
        self.notify("on_session_end", |logger, info| logger.on_session_end(info, &result));

        SessionReport {
            state: self.state,
            record: self.record,
            result,
        }
    }

    /// Deliver `terminate` exactly once to each side. An abandoned side gets
    /// it from a detached task once its overrunning call returns, and so
    /// does a side whose terminate could not get a worker in time.
    async fn terminate_both(&mut self, accepted: bool, t: f64) {
        for side in [Side::A, Side::B] {
            let opponent = self.seat(side.other()).label.clone();
            let seat = &self.seats[seat_index(side)];
            let participant = Arc::clone(&seat.participant);

            if seat.abandoned {
                debug!(agent = %seat.label, "Deferring terminate of abandoned agent");
                self.guard
                    .detach(participant, move |p| p.terminate(accepted, &opponent, t));
                continue;
            }

            let deferred = opponent.clone();
            let outcome = self
                .guard
                .run(&participant, &seat.cancel, move |p| {
                    p.terminate(accepted, &opponent, t)
                })
                .await;
            match outcome {
                GuardOutcome::Completed(()) => {}
                GuardOutcome::TimedOut => {
                    warn!(agent = %seat.label, "terminate exceeded its budget");
                    self.seats[seat_index(side)].abandoned = true;
                }
                GuardOutcome::NoWorker => {
                    debug!(agent = %seat.label, "No worker for terminate, deferring");
                    self.guard
                        .detach(participant, move |p| p.terminate(accepted, &deferred, t));
                }
                GuardOutcome::Panicked(message) => {
                    warn!(agent = %seat.label, panic = %message, "terminate panicked");
                }
            }
        }
    }

    /// Accuracy of every opponent model of every side that is not still
    /// busy.
    async fn estimator_reports(&self) -> Vec<EstimatorReport> {
        let mut reports = Vec::new();
        for side in [Side::A, Side::B] {
            let seat = self.seat(side);
            if seat.abandoned {
                continue;
            }
            let truth = match side {
                Side::A => self.domain.profile_b().clone(),
                Side::B => self.domain.profile_a().clone(),
            };
            let participant = Arc::clone(&seat.participant);

            let metrics = tokio::task::spawn_blocking(move || match participant.try_lock() {
                Ok(p) => p.estimator_metrics(&truth),
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().estimator_metrics(&truth),
                Err(TryLockError::WouldBlock) => Vec::new(),
            })
            .await;

            match metrics {
                Ok(metrics) => {
                    reports.extend(metrics.into_iter().map(|(estimator, m)| EstimatorReport {
                        estimator,
                        side,
                        rmse: m.rmse,
                        spearman: m.spearman,
                        kendall_tau: m.kendall_tau,
                    }));
                }
                Err(e) => {
                    warn!(agent = %seat.label, error = %e, "Estimator evaluation failed")
                }
            }
        }
        reports
    }
}
