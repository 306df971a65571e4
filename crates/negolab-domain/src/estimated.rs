use std::collections::BTreeMap;

use negolab_models::{Bid, Issue};

use crate::preference::Preference;

/// Mutable estimate of an opponent's preference, written by an opponent model.
///
/// Setters accept any non-negative value; call [`EstimatedPreference::normalize`]
/// to restore the weight invariants. Normalization never fails: an all-zero
/// issue (or value set) falls back to uniform weights.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatedPreference {
    issues: Vec<Issue>,
    issue_weights: BTreeMap<String, f64>,
    value_weights: BTreeMap<String, BTreeMap<String, f64>>,
}

impl EstimatedPreference {
    /// Equal issue weights, every value weight 1.
    pub fn uniform(issues: &[Issue]) -> Self {
        let issue_weights = issues
            .iter()
            .map(|issue| (issue.name().to_string(), 1.0))
            .collect();
        let value_weights = issues
            .iter()
            .map(|issue| {
                let values = issue.values().iter().map(|v| (v.clone(), 1.0)).collect();
                (issue.name().to_string(), values)
            })
            .collect();

        let mut estimate = Self {
            issues: issues.to_vec(),
            issue_weights,
            value_weights,
        };
        estimate.normalize();
        estimate
    }

    /// Prior that assumes the opponent wants the opposite of `reference`:
    /// every weight becomes `1 - w`, then normalized.
    pub fn inverse_of(reference: &Preference) -> Self {
        let issue_weights = reference
            .issue_weights()
            .iter()
            .map(|(name, w)| (name.clone(), 1.0 - w))
            .collect();
        let value_weights = reference
            .value_weights()
            .iter()
            .map(|(name, values)| {
                let values = values.iter().map(|(v, w)| (v.clone(), 1.0 - w)).collect();
                (name.clone(), values)
            })
            .collect();

        let mut estimate = Self {
            issues: reference.issues().to_vec(),
            issue_weights,
            value_weights,
        };
        estimate.normalize();
        estimate
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn issue_weight(&self, issue: &str) -> f64 {
        self.issue_weights.get(issue).copied().unwrap_or(0.0)
    }

    pub fn value_weight(&self, issue: &str, value: &str) -> f64 {
        self.value_weights
            .get(issue)
            .and_then(|values| values.get(value))
            .copied()
            .unwrap_or(0.0)
    }

    /// Unknown issues are ignored. Negative or non-finite weights are stored
    /// as 0.
    pub fn set_issue_weight(&mut self, issue: &str, weight: f64) {
        if let Some(slot) = self.issue_weights.get_mut(issue) {
            *slot = sanitize(weight);
        }
    }

    /// Unknown issues or values are ignored.
    pub fn set_value_weight(&mut self, issue: &str, value: &str, weight: f64) {
        if let Some(slot) = self
            .value_weights
            .get_mut(issue)
            .and_then(|values| values.get_mut(value))
        {
            *slot = sanitize(weight);
        }
    }

    /// Issue weights sum to 1; each issue's best value has weight 1.
    pub fn normalize(&mut self) {
        let issue_count = self.issue_weights.len().max(1) as f64;
        let issue_total: f64 = self.issue_weights.values().sum();
        for weight in self.issue_weights.values_mut() {
            *weight = if issue_total > 0.0 {
                *weight / issue_total
            } else {
                1.0 / issue_count
            };
        }

        for values in self.value_weights.values_mut() {
            let max = values.values().cloned().fold(0.0_f64, f64::max);
            for weight in values.values_mut() {
                *weight = if max > 0.0 { *weight / max } else { 1.0 };
            }
        }
    }

    pub fn utility(&self, bid: &Bid) -> f64 {
        bid.iter()
            .map(|(issue, value)| self.issue_weight(issue) * self.value_weight(issue, value))
            .sum()
    }
}

fn sanitize(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0.0 {
        weight
    } else {
        0.0
    }
}
