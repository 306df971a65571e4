use std::sync::Arc;

use negolab_models::Bid;
use tracing::debug;

use crate::bid_space::{pareto_frontier, BidPoint};
use crate::estimated::EstimatedPreference;
use crate::preference::Preference;

/// Estimated Pareto frontier between an own preference and an opponent
/// estimate, refreshed periodically.
///
/// The frontier is recomputed from scratch on the first call, after
/// [`ParetoCache::invalidate`], and once `update_frequency` calls have been
/// served from the cache. On the calls in between only the opponent
/// utilities of the cached points are re-scored. Membership of the returned
/// frontier is therefore at most `update_frequency` calls old while the
/// opponent utilities on it are always current.
#[derive(Debug)]
pub struct ParetoCache {
    preference: Arc<Preference>,
    minimum_utility: f64,
    candidates: Vec<Bid>,
    update_frequency: usize,
    calls_since_refresh: usize,
    frontier: Option<Vec<BidPoint>>,
}

impl ParetoCache {
    /// Only own bids with utility of at least `minimum_utility` are
    /// considered.
    pub fn new(preference: Arc<Preference>, minimum_utility: f64, update_frequency: usize) -> Self {
        let candidates = preference.bids_in_range(minimum_utility, 1.0);
        Self {
            preference,
            minimum_utility,
            candidates,
            update_frequency,
            calls_since_refresh: 0,
            frontier: None,
        }
    }

    pub fn minimum_utility(&self) -> f64 {
        self.minimum_utility
    }

    pub fn update_frequency(&self) -> usize {
        self.update_frequency
    }

    /// Points of the frontier, in own utility order (best first).
    pub fn frontier(&mut self, estimate: &EstimatedPreference) -> &[BidPoint] {
        let refresh = self.frontier.is_none() || self.calls_since_refresh >= self.update_frequency;

        if refresh {
            let points: Vec<BidPoint> = self
                .candidates
                .iter()
                .map(|bid| BidPoint::new(bid, self.preference.utility(bid), estimate.utility(bid)))
                .collect();
            let frontier = pareto_frontier(&points);
            debug!(
                candidates = points.len(),
                frontier = frontier.len(),
                "Recomputed estimated Pareto frontier"
            );
            self.frontier = Some(frontier);
            self.calls_since_refresh = 0;
        } else if let Some(frontier) = self.frontier.as_mut() {
            self.calls_since_refresh += 1;
            for point in frontier.iter_mut() {
                let utility_b = point.bid().map_or(point.utility_b(), |bid| estimate.utility(bid));
                *point = point.clone().with_utility_b(utility_b);
            }
        }

        self.frontier.as_deref().unwrap_or_default()
    }

    /// Force a full recompute on the next call.
    pub fn invalidate(&mut self) {
        self.frontier = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preference::tests::three_by_three;

    fn own() -> Arc<Preference> {
        Arc::new(three_by_three(0.6, [0.2, 1.0, 0.5], [1.0, 0.4, 0.0]))
    }

    fn members(frontier: &[BidPoint]) -> Vec<Bid> {
        frontier.iter().filter_map(|p| p.bid().cloned()).collect()
    }

    #[test]
    fn frontier_respects_minimum_utility() {
        let own = own();
        let estimate = EstimatedPreference::inverse_of(&own);
        let mut cache = ParetoCache::new(own.clone(), 0.5, 3);

        let frontier = cache.frontier(&estimate);
        assert!(!frontier.is_empty());
        assert!(frontier.iter().all(|p| p.utility_a() >= 0.5));
    }

    #[test]
    fn membership_is_stale_until_refresh_but_scores_are_current() {
        let own = own();
        let mut estimate = EstimatedPreference::inverse_of(&own);
        let mut cache = ParetoCache::new(own.clone(), 0.0, 2);

        let initial = members(cache.frontier(&estimate));

        // Make the opponent agree with us: the true frontier collapses to
        // our best bid.
        for issue in own.issues() {
            estimate.set_issue_weight(issue.name(), own.issue_weight(issue.name()));
            for value in issue.values() {
                estimate.set_value_weight(issue.name(), value, own.value_weight(issue.name(), value));
            }
        }
        estimate.normalize();

        for _ in 0..2 {
            let frontier = cache.frontier(&estimate).to_vec();
            assert_eq!(members(&frontier), initial);
            for point in &frontier {
                let bid = point.bid().unwrap();
                assert_eq!(point.utility_b(), estimate.utility(bid));
            }
        }

        let refreshed = members(cache.frontier(&estimate));
        assert_eq!(refreshed, vec![own.max_util_bid().without_utility()]);
    }

    #[test]
    fn invalidate_forces_recompute() {
        let own = own();
        let mut estimate = EstimatedPreference::inverse_of(&own);
        let mut cache = ParetoCache::new(own.clone(), 0.0, 100);
        let _ = cache.frontier(&estimate);

        for issue in own.issues() {
            estimate.set_issue_weight(issue.name(), own.issue_weight(issue.name()));
            for value in issue.values() {
                estimate.set_value_weight(issue.name(), value, own.value_weight(issue.name(), value));
            }
        }
        estimate.normalize();
        cache.invalidate();

        assert_eq!(cache.frontier(&estimate).len(), 1);
    }
}
