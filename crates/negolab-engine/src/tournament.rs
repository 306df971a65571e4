use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use negolab_domain::DomainCatalog;
use negolab_models::{DeadlineConfig, SessionResult, TournamentConfig};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agent::AgentEntry;
use crate::error::{SinkError, TournamentError};
use crate::logger::SessionLogger;
use crate::opponent_model::OpponentModelEntry;
use crate::session::{NegotiationSession, SessionConfig};
use crate::summary::{summarize, AgentSummary};

/// Destination for result rows, fed as soon as each session completes.
#[async_trait]
pub trait ResultSink: Send + Sync {
    fn name(&self) -> &str;

    async fn append(&self, result: &SessionResult) -> Result<(), SinkError>;
}

/// One scheduled session. Agents are indices into the tournament's entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPlan {
    pub domain: String,
    pub agent_a: usize,
    pub agent_b: usize,
    pub repetition: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct TournamentReport {
    pub planned: usize,
    /// Set when the run was cancelled before every plan was scheduled.
    pub cancelled: bool,
    pub results: Vec<SessionResult>,
    pub summaries: Vec<AgentSummary>,
    pub elapsed_ms: u64,
}

/// Every ordered pairing of agents on every domain, run with bounded
/// parallelism.
pub struct Tournament {
    agents: Vec<AgentEntry>,
    domains: Vec<String>,
    catalog: Arc<DomainCatalog>,
    deadline: DeadlineConfig,
    opponent_models: Vec<OpponentModelEntry>,
    loggers: Vec<Arc<dyn SessionLogger>>,
    sinks: Vec<Arc<dyn ResultSink>>,
    self_negotiation: bool,
    repeat: u32,
    shuffle: bool,
    seed: Option<u64>,
    max_parallel_sessions: usize,
    share_opponent_names: bool,
}

impl Tournament {
    pub fn new(
        agents: Vec<AgentEntry>,
        domains: Vec<String>,
        catalog: Arc<DomainCatalog>,
        deadline: DeadlineConfig,
    ) -> Self {
        Self {
            agents,
            domains,
            catalog,
            deadline,
            opponent_models: Vec::new(),
            loggers: Vec::new(),
            sinks: Vec::new(),
            self_negotiation: false,
            repeat: 1,
            shuffle: false,
            seed: None,
            max_parallel_sessions: 1,
            share_opponent_names: false,
        }
    }

    /// Apply the scheduling options of a `[tournament]` section. Agents and
    /// models are resolved by the caller.
    pub fn from_config(
        config: &TournamentConfig,
        deadline: DeadlineConfig,
        agents: Vec<AgentEntry>,
        opponent_models: Vec<OpponentModelEntry>,
        catalog: Arc<DomainCatalog>,
    ) -> Self {
        let mut tournament = Self::new(agents, config.domains.clone(), catalog, deadline)
            .with_opponent_models(opponent_models)
            .self_negotiation(config.self_negotiation)
            .repeat(config.repeat)
            .max_parallel_sessions(config.max_parallel_sessions)
            .share_opponent_names(config.share_opponent_names);
        tournament.seed = config.seed;
        tournament.shuffle = config.shuffle;
        tournament
    }

    pub fn with_opponent_models(mut self, models: Vec<OpponentModelEntry>) -> Self {
        self.opponent_models = models;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn SessionLogger>) -> Self {
        self.loggers.push(logger);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn self_negotiation(mut self, enabled: bool) -> Self {
        self.self_negotiation = enabled;
        self
    }

    pub fn repeat(mut self, repeat: u32) -> Self {
        self.repeat = repeat;
        self
    }

    /// Shuffle the session order, reproducibly when `seed` is set.
    pub fn shuffled(mut self, seed: Option<u64>) -> Self {
        self.shuffle = true;
        self.seed = seed;
        self
    }

    pub fn max_parallel_sessions(mut self, sessions: usize) -> Self {
        self.max_parallel_sessions = sessions.max(1);
        self
    }

    pub fn share_opponent_names(mut self, share: bool) -> Self {
        self.share_opponent_names = share;
        self
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name().to_string()).collect()
    }

    pub fn domain_names(&self) -> &[String] {
        &self.domains
    }

    /// The session schedule: domain x ordered agent pair x repetition.
    pub fn combinations(&self) -> Vec<SessionPlan> {
        let mut plans = Vec::new();
        for domain in &self.domains {
            for (a, entry_a) in self.agents.iter().enumerate() {
                for (b, entry_b) in self.agents.iter().enumerate() {
                    if entry_a.name() == entry_b.name() && !self.self_negotiation {
                        continue;
                    }
                    for repetition in 0..self.repeat.max(1) {
                        plans.push(SessionPlan {
                            domain: domain.clone(),
                            agent_a: a,
                            agent_b: b,
                            repetition,
                        });
                    }
                }
            }
        }

        if self.shuffle {
            let mut rng = match self.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            plans.shuffle(&mut rng);
        }
        plans
    }

    fn validate(&self) -> Result<SessionConfig, TournamentError> {
        if self.agents.is_empty() {
            return Err(TournamentError::Config("no agents registered".to_string()));
        }
        if self.domains.is_empty() {
            return Err(TournamentError::Config("no domains listed".to_string()));
        }
        let mut seen = HashSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.name()) {
                return Err(TournamentError::Config(format!(
                    "duplicate agent name: {}",
                    agent.name()
                )));
            }
        }
        if self.repeat == 0 {
            warn!("repeat = 0, running each pairing once");
        }
        SessionConfig::from_deadline(&self.deadline).map_err(TournamentError::Config)
    }

    /// Run every session. Only setup problems are errors; agent faults end
    /// up as rows. Cancelling `cancel` stops scheduling new sessions and
    /// lets running ones finish.
    pub async fn run(&self, cancel: CancellationToken) -> Result<TournamentReport, TournamentError> {
        let session_config = self.validate()?;
        let started = Instant::now();

        let mut domains = HashMap::new();
        for name in &self.domains {
            let domain = self.catalog.get(name).await?;
            info!(domain = %name, bids = domain.size(), "Domain loaded");
            domains.insert(name.clone(), domain);
        }

        let plans = self.combinations();
        let planned = plans.len();
        info!(
            sessions = planned,
            agents = self.agents.len(),
            domains = self.domains.len(),
            parallel = self.max_parallel_sessions,
            "Tournament starting"
        );

        let permits = Arc::new(Semaphore::new(self.max_parallel_sessions.max(1)));
        let results = Arc::new(Mutex::new(Vec::with_capacity(planned)));
        let mut join_set = JoinSet::new();
        let mut cancelled = false;

        for plan in plans {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let Some(domain) = domains.get(&plan.domain).cloned() else {
                continue;
            };
            let (entry_a, entry_b) = (&self.agents[plan.agent_a], &self.agents[plan.agent_b]);
            let session = NegotiationSession::new(
                domain,
                session_config.clone(),
                entry_a.instantiate(),
                entry_b.instantiate(),
            )
            .with_labels(entry_a.name(), entry_b.name())
            .with_opponent_models(self.opponent_models.clone())
            .with_loggers(self.loggers.clone())
            .share_opponent_names(self.share_opponent_names);

            let sinks = self.sinks.clone();
            let results = Arc::clone(&results);
            join_set.spawn(async move {
                let _permit = permit;
                let report = session.run().await;
                for sink in &sinks {
                    if let Err(e) = sink.append(&report.result).await {
                        warn!(sink = %sink.name(), error = %e, "Result sink failed");
                    }
                }
                results
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(report.result);
            });
        }

        if cancelled {
            warn!(running = join_set.len(), "Tournament cancelled, draining running sessions");
        }
        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Session task failed");
            }
        }

        let results = std::mem::take(&mut *results.lock().unwrap_or_else(PoisonError::into_inner));
        let agent_names = self.agent_names();
        for logger in &self.loggers {
            if let Err(e) = logger.on_tournament_end(&results, &agent_names, &self.domains) {
                warn!(logger = %logger.name(), error = %e, "Session logger failed");
            }
        }

        let summaries = summarize(&results, &agent_names);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            sessions = results.len(),
            planned,
            cancelled,
            elapsed_ms,
            "Tournament complete"
        );

        Ok(TournamentReport {
            planned,
            cancelled,
            results,
            summaries,
            elapsed_ms,
        })
    }
}
