use negolab_models::{OutcomeKind, SessionResult, Side};
use serde::{Deserialize, Serialize};

/// Per-agent aggregate over a tournament's result rows.
///
/// A row counts once for every side the agent played, so a self-negotiation
/// contributes two observations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentSummary {
    pub agent: String,
    pub count: usize,
    pub avg_utility: f64,
    pub std_utility: f64,
    pub avg_opponent_utility: f64,
    /// Mean normalized time of accepted sessions.
    pub avg_acceptance_time: f64,
    pub avg_rounds: f64,
    pub avg_nash_product: f64,
    pub avg_social_welfare: f64,
    pub avg_nash_distance: f64,
    pub avg_kalai_distance: f64,
    pub acceptance_rate: f64,
    pub acceptance: usize,
    pub failed: usize,
    pub error: usize,
    pub timed_out: usize,
    /// Error rows this agent caused.
    pub self_error: usize,
    /// TimedOut rows this agent caused.
    pub self_timed_out: usize,
}

/// One summary per name in `agent_names`, in that order.
pub fn summarize(results: &[SessionResult], agent_names: &[String]) -> Vec<AgentSummary> {
    agent_names
        .iter()
        .map(|name| summarize_agent(results, name))
        .collect()
}

fn summarize_agent(results: &[SessionResult], agent: &str) -> AgentSummary {
    let mut summary = AgentSummary {
        agent: agent.to_string(),
        ..AgentSummary::default()
    };

    let mut utilities = Vec::new();
    let mut opponent_total = 0.0;
    let mut acceptance_time = 0.0;
    let mut rounds = 0.0;
    let mut nash_product = 0.0;
    let mut social_welfare = 0.0;
    let mut nash_distance = 0.0;
    let mut kalai_distance = 0.0;

    for row in results {
        for side in [Side::A, Side::B] {
            let (name, utility, opponent) = match side {
                Side::A => (&row.agent_a, row.agent_a_utility, row.agent_b_utility),
                Side::B => (&row.agent_b, row.agent_b_utility, row.agent_a_utility),
            };
            if name != agent {
                continue;
            }

            utilities.push(utility);
            opponent_total += opponent;
            rounds += f64::from(row.rounds);
            nash_product += row.nash_product;
            social_welfare += row.social_welfare;
            nash_distance += row.nash_distance;
            kalai_distance += row.kalai_distance;

            let offender = row.who == Some(side);
            match row.result {
                OutcomeKind::Acceptance => {
                    summary.acceptance += 1;
                    acceptance_time += row.time;
                }
                OutcomeKind::Failed => summary.failed += 1,
                OutcomeKind::Error => {
                    summary.error += 1;
                    summary.self_error += usize::from(offender);
                }
                OutcomeKind::TimedOut => {
                    summary.timed_out += 1;
                    summary.self_timed_out += usize::from(offender);
                }
            }
        }
    }

    summary.count = utilities.len();
    if summary.count == 0 {
        return summary;
    }

    let n = summary.count as f64;
    let mean = utilities.iter().sum::<f64>() / n;
    let variance = utilities.iter().map(|u| (u - mean).powi(2)).sum::<f64>() / n;

    summary.avg_utility = mean;
    summary.std_utility = variance.sqrt();
    summary.avg_opponent_utility = opponent_total / n;
    summary.avg_rounds = rounds / n;
    summary.avg_nash_product = nash_product / n;
    summary.avg_social_welfare = social_welfare / n;
    summary.avg_nash_distance = nash_distance / n;
    summary.avg_kalai_distance = kalai_distance / n;
    summary.acceptance_rate = summary.acceptance as f64 / n;
    if summary.acceptance > 0 {
        summary.avg_acceptance_time = acceptance_time / summary.acceptance as f64;
    }
    summary
}
