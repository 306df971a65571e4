use std::collections::BTreeMap;

use negolab_domain::{EstimatedPreference, Preference};
use negolab_models::Bid;

use super::OpponentModel;

pub const NAME: &str = "classic_frequency";

const DEFAULT_ALPHA: f64 = 0.1;

/// Frequency model: values the opponent offers often are valued highly, and
/// issues it keeps fixed between consecutive offers are weighted up by
/// `alpha * (1 - t)`.
///
/// Only the previous offer is retained.
pub struct ClassicFrequencyModel {
    estimate: EstimatedPreference,
    issue_counts: BTreeMap<String, f64>,
    value_counts: BTreeMap<String, BTreeMap<String, f64>>,
    previous: Option<Bid>,
    alpha: f64,
}

impl ClassicFrequencyModel {
    /// Counters start from the inverse of `own`.
    pub fn new(own: &Preference) -> Self {
        let estimate = EstimatedPreference::inverse_of(own);

        let issue_counts = estimate
            .issues()
            .iter()
            .map(|issue| (issue.name().to_string(), estimate.issue_weight(issue.name())))
            .collect();
        let value_counts = estimate
            .issues()
            .iter()
            .map(|issue| {
                let counts = issue
                    .values()
                    .iter()
                    .map(|value| (value.clone(), estimate.value_weight(issue.name(), value)))
                    .collect();
                (issue.name().to_string(), counts)
            })
            .collect();

        Self {
            estimate,
            issue_counts,
            value_counts,
            previous: None,
            alpha: DEFAULT_ALPHA,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    fn refresh(&mut self) {
        for (issue, count) in &self.issue_counts {
            self.estimate.set_issue_weight(issue, *count);
        }
        for (issue, counts) in &self.value_counts {
            for (value, count) in counts {
                self.estimate.set_value_weight(issue, value, *count);
            }
        }
        self.estimate.normalize();
    }
}

impl OpponentModel for ClassicFrequencyModel {
    fn name(&self) -> &str {
        NAME
    }

    fn update(&mut self, bid: &Bid, t: f64) {
        let t = t.clamp(0.0, 1.0);
        for (issue, value) in bid.iter() {
            if let Some(count) = self
                .value_counts
                .get_mut(issue)
                .and_then(|counts| counts.get_mut(value))
            {
                *count += 1.0;
            }

            let repeated = self
                .previous
                .as_ref()
                .is_some_and(|previous| previous.get(issue) == Some(value));
            if repeated {
                if let Some(count) = self.issue_counts.get_mut(issue) {
                    *count += self.alpha * (1.0 - t);
                }
            }
        }

        self.previous = Some(bid.without_utility());
        self.refresh();
    }

    fn preference(&self) -> &EstimatedPreference {
        &self.estimate
    }
}
