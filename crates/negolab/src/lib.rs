//! negolab - bilateral negotiation lab
//!
//! Runs alternating-offers negotiation tournaments between pluggable agents
//! over multi-issue domains, and scores every session against the Pareto
//! frontier, Nash point and Kalai point of the domain.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use negolab::domain::{DomainCatalog, Preference};
//! use negolab::engine::{Agent, AgentEntry, NegotiationSession, Tournament};
//! use negolab::models::config::NegolabConfig;
//! use negolab::store::SqliteResultStore;
//! ```

pub use negolab_domain as domain;
pub use negolab_engine as engine;
pub use negolab_models as models;
pub use negolab_store as store;

use std::sync::Arc;

use anyhow::{anyhow, Context};
use negolab_domain::DomainCatalog;
use negolab_engine::strategies::BUILTIN_AGENTS;
use negolab_engine::{
    builtin_agent, AgentEntry, OpponentModelEntry, Tournament, TournamentReport, TracingLogger,
};
use negolab_models::{NegolabConfig, TournamentConfig};
use negolab_store::SqliteResultStore;
use tokio_util::sync::CancellationToken;

/// Resolve the configured agent names against the reference agents.
pub fn resolve_agents(config: &TournamentConfig) -> Result<Vec<AgentEntry>, anyhow::Error> {
    config
        .agents
        .iter()
        .map(|name| {
            builtin_agent(name, config.seed).ok_or_else(|| {
                anyhow!(
                    "Unknown agent '{name}' (available: {})",
                    BUILTIN_AGENTS.join(", ")
                )
            })
        })
        .collect()
}

/// Resolve the configured opponent model names.
pub fn resolve_opponent_models(
    config: &TournamentConfig,
) -> Result<Vec<OpponentModelEntry>, anyhow::Error> {
    config
        .opponent_models
        .iter()
        .map(|name| {
            OpponentModelEntry::builtin(name)
                .ok_or_else(|| anyhow!("Unknown opponent model '{name}'"))
        })
        .collect()
}

/// Build a Tournament from configuration, with the tracing logger and, when
/// configured, the SQLite result store attached.
pub fn build_tournament(config: &NegolabConfig) -> Result<Tournament, anyhow::Error> {
    let agents = resolve_agents(&config.tournament)?;
    let models = resolve_opponent_models(&config.tournament)?;
    let catalog = Arc::new(DomainCatalog::new(
        &config.domains.root,
        config.domains.cache_capacity,
    ));

    let mut tournament = Tournament::from_config(
        &config.tournament,
        config.deadline.clone(),
        agents,
        models,
        catalog,
    )
    .with_logger(Arc::new(TracingLogger));

    if let Some(path) = &config.results.sqlite_path {
        let store = SqliteResultStore::open(path)
            .with_context(|| format!("Failed to open result store: {path}"))?;
        tournament = tournament.with_sink(Arc::new(store));
    }

    Ok(tournament)
}

/// Build and run the configured tournament.
pub async fn run(
    config: &NegolabConfig,
    cancel: CancellationToken,
) -> Result<TournamentReport, anyhow::Error> {
    let tournament = build_tournament(config)?;
    let report = tournament.run(cancel).await?;
    Ok(report)
}
