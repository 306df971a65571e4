use std::collections::{BTreeMap, VecDeque};

use negolab_domain::{EstimatedPreference, Preference};
use negolab_models::Bid;
use tracing::trace;

use super::OpponentModel;

pub const NAME: &str = "frequency_window";

/// Tuning knobs for [`FrequencyWindowModel`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowParams {
    /// Scale of the issue weight bump.
    pub alpha: f64,
    /// Time exponent of the bump: `alpha * (1 - t^beta)`.
    pub beta: f64,
    /// Offers per comparison window.
    pub window_size: usize,
    /// Value weight exponent: `(count / max)^gamma`.
    pub gamma: f64,
    /// Chi-square p-value above which an issue counts as unchanged.
    pub significance: f64,
    /// No updates once `t` exceeds this.
    pub freeze_after: f64,
}

impl Default for WindowParams {
    fn default() -> Self {
        Self {
            alpha: 10.0,
            beta: 5.0,
            window_size: 48,
            gamma: 0.25,
            significance: 0.05,
            freeze_after: 0.8,
        }
    }
}

#[derive(Debug, Clone)]
struct IssueEstimator {
    weight: f64,
    counters: BTreeMap<String, f64>,
    value_weights: BTreeMap<String, f64>,
}

impl IssueEstimator {
    fn observe(&mut self, value: &str, gamma: f64) {
        let Some(counter) = self.counters.get_mut(value) else {
            return;
        };
        *counter += 1.0;

        let max = self.counters.values().cloned().fold(0.0_f64, f64::max);
        if max <= 0.0 {
            return;
        }
        for (name, count) in &self.counters {
            self.value_weights
                .insert(name.clone(), (count / max).powf(gamma));
        }
    }

    /// Laplace-smoothed value frequencies of `window`, in value order.
    fn frequencies<'a>(&self, issue: &str, window: impl Iterator<Item = &'a Bid>) -> Vec<f64> {
        let mut hits: BTreeMap<&str, f64> = self.counters.keys().map(|v| (v.as_str(), 0.0)).collect();
        let mut total = 0.0;
        for bid in window {
            total += 1.0;
            if let Some(hit) = bid.get(issue).and_then(|value| hits.get_mut(value)) {
                *hit += 1.0;
            }
        }
        let denominator = total + self.counters.len() as f64;
        hits.values().map(|hit| (1.0 + hit) / denominator).collect()
    }

    fn expected_utility(&self, frequencies: &[f64]) -> f64 {
        frequencies
            .iter()
            .zip(self.value_weights.values())
            .map(|(f, w)| f * w)
            .sum()
    }
}

/// Frequency model that compares consecutive windows of offers.
///
/// Every `window_size` offers the two latest windows are compared per issue
/// with a chi-square test. When at least one issue moved in a direction that
/// lowers the opponent's estimated utility, the issues that did not move are
/// weighted up. Only the last `2 * window_size` offers are kept.
pub struct FrequencyWindowModel {
    estimate: EstimatedPreference,
    issues: BTreeMap<String, IssueEstimator>,
    window: VecDeque<Bid>,
    offers_seen: usize,
    params: WindowParams,
}

impl FrequencyWindowModel {
    pub fn new(own: &Preference) -> Self {
        Self::with_params(own, WindowParams::default())
    }

    pub fn with_params(own: &Preference, params: WindowParams) -> Self {
        let estimate = EstimatedPreference::inverse_of(own);
        let issues = estimate
            .issues()
            .iter()
            .map(|issue| {
                let prior: BTreeMap<String, f64> = issue
                    .values()
                    .iter()
                    .map(|value| (value.clone(), estimate.value_weight(issue.name(), value)))
                    .collect();
                let estimator = IssueEstimator {
                    weight: estimate.issue_weight(issue.name()),
                    counters: prior.clone(),
                    value_weights: prior,
                };
                (issue.name().to_string(), estimator)
            })
            .collect();

        Self {
            estimate,
            issues,
            window: VecDeque::new(),
            offers_seen: 0,
            params: WindowParams {
                window_size: params.window_size.max(1),
                ..params
            },
        }
    }

    pub fn params(&self) -> &WindowParams {
        &self.params
    }

    /// Offers currently held for window comparison.
    pub fn buffered_offers(&self) -> usize {
        self.window.len()
    }

    fn compare_windows(&mut self, t: f64) {
        let size = self.params.window_size;
        let mut unchanged = Vec::new();
        let mut concession = false;

        for (name, estimator) in &self.issues {
            let previous = estimator.frequencies(name, self.window.iter().take(size));
            let current = estimator.frequencies(name, self.window.iter().skip(size));

            let p_value = chi_square_p_value(&previous, &current);
            if p_value > self.params.significance {
                unchanged.push(name.clone());
            } else if estimator.expected_utility(&current) < estimator.expected_utility(&previous) {
                concession = true;
            }
        }

        trace!(
            unchanged = unchanged.len(),
            concession,
            offers = self.offers_seen,
            "Compared offer windows"
        );

        if unchanged.len() != self.issues.len() && concession {
            let bump = self.params.alpha * (1.0 - t.powf(self.params.beta));
            for name in &unchanged {
                if let Some(estimator) = self.issues.get_mut(name) {
                    estimator.weight += bump;
                }
            }
        }

        let total: f64 = self.issues.values().map(|e| e.weight).sum();
        if total > 0.0 {
            for estimator in self.issues.values_mut() {
                estimator.weight /= total;
            }
        }
    }

    fn refresh(&mut self) {
        for (name, estimator) in &self.issues {
            self.estimate.set_issue_weight(name, estimator.weight);
            for (value, weight) in &estimator.value_weights {
                self.estimate.set_value_weight(name, value, *weight);
            }
        }
        self.estimate.normalize();
    }
}

impl OpponentModel for FrequencyWindowModel {
    fn name(&self) -> &str {
        NAME
    }

    fn update(&mut self, bid: &Bid, t: f64) {
        let t = t.clamp(0.0, 1.0);
        if t > self.params.freeze_after {
            return;
        }

        for (name, estimator) in self.issues.iter_mut() {
            if let Some(value) = bid.get(name) {
                estimator.observe(value, self.params.gamma);
            }
        }

        let size = self.params.window_size;
        self.offers_seen += 1;
        self.window.push_back(bid.without_utility());
        while self.window.len() > 2 * size {
            self.window.pop_front();
        }

        if self.offers_seen >= 2 * size && self.offers_seen % size == 0 {
            self.compare_windows(t);
        }
        self.refresh();
    }

    fn preference(&self) -> &EstimatedPreference {
        &self.estimate
    }
}

/// p-value of Pearson's chi-square test of `observed` against `expected`.
/// Categories with zero expectation are skipped; fewer than two categories
/// always count as unchanged.
fn chi_square_p_value(observed: &[f64], expected: &[f64]) -> f64 {
    let categories = observed.len().min(expected.len());
    if categories < 2 {
        return 1.0;
    }
    let statistic: f64 = observed
        .iter()
        .zip(expected)
        .filter(|(_, e)| **e > 0.0)
        .map(|(o, e)| (o - e) * (o - e) / e)
        .sum();
    let degrees = (categories - 1) as f64;
    upper_regularized_gamma(degrees / 2.0, statistic / 2.0)
}

const EPSILON: f64 = 1e-14;
const TINY: f64 = 1e-300;
const MAX_ITERATIONS: usize = 500;

/// Q(a, x) = Γ(a, x) / Γ(a) for a > 0.
fn upper_regularized_gamma(a: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 1.0;
    }
    let prefactor = (-x + a * x.ln() - ln_gamma(a)).exp();

    if x < a + 1.0 {
        // Series for the lower function.
        let mut term = 1.0 / a;
        let mut sum = term;
        let mut ap = a;
        for _ in 0..MAX_ITERATIONS {
            ap += 1.0;
            term *= x / ap;
            sum += term;
            if term.abs() < sum.abs() * EPSILON {
                break;
            }
        }
        (1.0 - sum * prefactor).clamp(0.0, 1.0)
    } else {
        // Continued fraction (modified Lentz).
        let mut b = x + 1.0 - a;
        let mut c = 1.0 / TINY;
        let mut d = 1.0 / b;
        let mut h = d;
        for i in 1..=MAX_ITERATIONS {
            let an = -(i as f64) * (i as f64 - a);
            b += 2.0;
            d = an * d + b;
            if d.abs() < TINY {
                d = TINY;
            }
            c = b + an / c;
            if c.abs() < TINY {
                c = TINY;
            }
            d = 1.0 / d;
            let delta = d * c;
            h *= delta;
            if (delta - 1.0).abs() < EPSILON {
                break;
            }
        }
        (prefactor * h).clamp(0.0, 1.0)
    }
}

/// Lanczos approximation, valid for x > 0.
fn ln_gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEFFICIENTS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];

    let x = x - 1.0;
    let t = x + G + 0.5;
    let series = COEFFICIENTS
        .iter()
        .enumerate()
        .skip(1)
        .fold(COEFFICIENTS[0], |acc, (i, c)| acc + c / (x + i as f64));
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}
