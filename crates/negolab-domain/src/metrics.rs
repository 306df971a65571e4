use serde::{Deserialize, Serialize};

use crate::estimated::EstimatedPreference;
use crate::preference::Preference;

/// How well an estimate reproduces a true preference over a whole domain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EstimationMetrics {
    pub rmse: f64,
    pub spearman: f64,
    pub kendall_tau: f64,
}

impl EstimationMetrics {
    /// Compare utilities of every bid in `truth`'s domain.
    pub fn evaluate(truth: &Preference, estimate: &EstimatedPreference) -> Self {
        let bids = truth.bids();
        let actual: Vec<f64> = bids.iter().map(|bid| truth.utility(bid)).collect();
        let estimated: Vec<f64> = bids.iter().map(|bid| estimate.utility(bid)).collect();

        Self {
            rmse: rmse(&actual, &estimated),
            spearman: spearman(&actual, &estimated),
            kendall_tau: kendall_tau(&actual, &estimated),
        }
    }
}

/// Root mean squared error. Extra elements of the longer slice are ignored.
pub fn rmse(actual: &[f64], estimated: &[f64]) -> f64 {
    let n = actual.len().min(estimated.len());
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = actual
        .iter()
        .zip(estimated)
        .map(|(a, e)| (a - e) * (a - e))
        .sum();
    (sum / n as f64).sqrt()
}

/// Spearman rank correlation with average ranks for ties. 0 when either
/// side has no variance.
pub fn spearman(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    pearson(&average_ranks(&xs[..n]), &average_ranks(&ys[..n]))
}

/// Kendall tau-b in O(n log n) (Knight's algorithm). 0 when either side is
/// constant.
pub fn kendall_tau(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| xs[i].total_cmp(&xs[j]).then(ys[i].total_cmp(&ys[j])));

    let total = pair_count(n as u64);
    let sorted_x: Vec<f64> = order.iter().map(|&i| xs[i]).collect();
    let x_ties = tied_pairs(&sorted_x);

    let mut joint_ties = 0;
    let mut run = 1_u64;
    for window in order.windows(2) {
        let (i, j) = (window[0], window[1]);
        if xs[i] == xs[j] && ys[i] == ys[j] {
            run += 1;
        } else {
            joint_ties += pair_count(run);
            run = 1;
        }
    }
    joint_ties += pair_count(run);

    let mut sorted_y: Vec<f64> = order.iter().map(|&i| ys[i]).collect();
    let swaps = sort_counting_swaps(&mut sorted_y);
    let y_ties = tied_pairs(&sorted_y);

    let denominator = ((total - x_ties) as f64 * (total - y_ties) as f64).sqrt();
    if denominator == 0.0 {
        return 0.0;
    }
    let numerator =
        total as f64 - x_ties as f64 - y_ties as f64 + joint_ties as f64 - 2.0 * swaps as f64;
    numerator / denominator
}

fn pair_count(n: u64) -> u64 {
    n * n.saturating_sub(1) / 2
}

/// Pairs of equal neighbours in an already sorted slice.
fn tied_pairs(sorted: &[f64]) -> u64 {
    let mut ties = 0;
    let mut run = 1_u64;
    for window in sorted.windows(2) {
        if window[0] == window[1] {
            run += 1;
        } else {
            ties += pair_count(run);
            run = 1;
        }
    }
    ties + pair_count(run)
}

/// Stable merge sort returning the number of strict inversions.
fn sort_counting_swaps(values: &mut [f64]) -> u64 {
    let n = values.len();
    if n < 2 {
        return 0;
    }
    let mid = n / 2;
    let mut swaps = sort_counting_swaps(&mut values[..mid]) + sort_counting_swaps(&mut values[mid..]);

    let mut merged = Vec::with_capacity(n);
    let (mut i, mut j) = (0, mid);
    while i < mid && j < n {
        if values[i] <= values[j] {
            merged.push(values[i]);
            i += 1;
        } else {
            merged.push(values[j]);
            swaps += (mid - i) as u64;
            j += 1;
        }
    }
    merged.extend_from_slice(&values[i..mid]);
    merged.extend_from_slice(&values[j..]);
    values.copy_from_slice(&merged);
    swaps
}

fn average_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| values[i].total_cmp(&values[j]));

    let mut ranks = vec![0.0; n];
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && values[order[end]] == values[order[start]] {
            end += 1;
        }
        let rank = (start + end - 1) as f64 / 2.0 + 1.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        start = end;
    }
    ranks
}

fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return 0.0;
    }
    cov / (var_x * var_y).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preference::tests::three_by_three;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn rmse_basics() {
        assert_eq!(rmse(&[0.5, 0.5], &[0.5, 0.5]), 0.0);
        assert!(close(rmse(&[1.0, 0.0], &[0.0, 0.0]), (0.5_f64).sqrt()));
        assert_eq!(rmse(&[], &[]), 0.0);
    }

    #[test]
    fn spearman_known_values() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!(close(spearman(&xs, &[5.0, 6.0, 7.0, 8.0, 7.0]), 8.0 / 95.0_f64.sqrt()));
        assert!(close(spearman(&xs, &[10.0, 20.0, 30.0, 40.0, 50.0]), 1.0));
        assert!(close(spearman(&xs, &[5.0, 4.0, 3.0, 2.0, 1.0]), -1.0));
        assert_eq!(spearman(&xs, &[1.0; 5]), 0.0);
    }

    #[test]
    fn kendall_known_values() {
        let xs = [12.0, 2.0, 1.0, 12.0, 2.0];
        let ys = [1.0, 4.0, 7.0, 1.0, 0.0];
        assert!(close(kendall_tau(&xs, &ys), -4.0 / 72.0_f64.sqrt()));

        let ascending = [1.0, 2.0, 3.0, 4.0];
        assert!(close(kendall_tau(&ascending, &[0.1, 0.2, 0.3, 0.4]), 1.0));
        assert!(close(kendall_tau(&ascending, &[0.4, 0.3, 0.2, 0.1]), -1.0));
        assert_eq!(kendall_tau(&ascending, &[0.3; 4]), 0.0);
    }

    #[test]
    fn kendall_matches_pairwise_count() {
        let xs = [0.3, 0.1, 0.9, 0.5, 0.5, 0.7, 0.2, 0.9];
        let ys = [0.2, 0.4, 0.8, 0.1, 0.6, 0.6, 0.3, 0.5];

        let mut concordant = 0.0_f64;
        let mut discordant = 0.0_f64;
        let mut x_only = 0.0_f64;
        let mut y_only = 0.0_f64;
        for i in 0..xs.len() {
            for j in (i + 1)..xs.len() {
                let dx = xs[i] - xs[j];
                let dy = ys[i] - ys[j];
                if dx == 0.0 && dy == 0.0 {
                    continue;
                } else if dx == 0.0 {
                    x_only += 1.0;
                } else if dy == 0.0 {
                    y_only += 1.0;
                } else if dx * dy > 0.0 {
                    concordant += 1.0;
                } else {
                    discordant += 1.0;
                }
            }
        }
        let expected: f64 = (concordant - discordant)
            / ((concordant + discordant + x_only) * (concordant + discordant + y_only)).sqrt();
        assert!(close(kendall_tau(&xs, &ys), expected));
    }

    #[test]
    fn exact_estimate_scores_perfectly() {
        let truth = three_by_three(0.6, [0.2, 1.0, 0.5], [1.0, 0.4, 0.0]);
        let mut estimate = EstimatedPreference::uniform(truth.issues());
        for issue in truth.issues() {
            estimate.set_issue_weight(issue.name(), truth.issue_weight(issue.name()));
            for value in issue.values() {
                estimate.set_value_weight(issue.name(), value, truth.value_weight(issue.name(), value));
            }
        }
        estimate.normalize();

        let metrics = EstimationMetrics::evaluate(&truth, &estimate);
        assert!(metrics.rmse < 1e-9);
        assert!(close(metrics.spearman, 1.0));
        assert!(close(metrics.kendall_tau, 1.0));
    }
}
