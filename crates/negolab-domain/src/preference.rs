use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use negolab_models::{Bid, Issue};
use rand::Rng;
use tracing::debug;

use crate::error::DomainError;
use crate::profile::ProfileDocument;

/// One party's private valuation over a multi-issue domain.
///
/// Weights are normalized at construction: issue weights sum to 1 and every
/// issue has at least one value with weight 1. The type has no mutators;
/// opponent estimates live in [`crate::EstimatedPreference`].
///
/// The full bid space is enumerated on first access to [`Preference::bids`]
/// and cached. Its size is the product of the issue value counts, so callers
/// that care about latency should force it up front (the domain catalog does).
#[derive(Debug, Clone)]
pub struct Preference {
    issues: Vec<Issue>,
    issue_weights: BTreeMap<String, f64>,
    value_weights: BTreeMap<String, BTreeMap<String, f64>>,
    reservation_value: f64,
    bids: OnceLock<Vec<Bid>>,
}

impl Preference {
    /// Read and validate a profile file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| DomainError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_json(&raw).map_err(|e| match e {
            DomainError::InvalidProfile(reason) => {
                DomainError::InvalidProfile(format!("{}: {reason}", path.display()))
            }
            other => other,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, DomainError> {
        let doc: ProfileDocument = serde_json::from_str(json)
            .map_err(|e| DomainError::InvalidProfile(format!("malformed profile JSON: {e}")))?;
        Self::from_document(doc)
    }

    pub fn from_document(doc: ProfileDocument) -> Result<Self, DomainError> {
        Self::from_weights(doc.issue_weights, doc.issues, doc.reservation_value)
    }

    /// Validate raw weights and normalize them.
    pub fn from_weights(
        issue_weights: BTreeMap<String, f64>,
        value_weights: BTreeMap<String, BTreeMap<String, f64>>,
        reservation_value: f64,
    ) -> Result<Self, DomainError> {
        if !(0.0..=1.0).contains(&reservation_value) {
            return Err(DomainError::InvalidProfile(format!(
                "reservation value {reservation_value} is outside [0, 1]"
            )));
        }
        if issue_weights.is_empty() {
            return Err(DomainError::InvalidProfile(
                "profile has no issues".to_string(),
            ));
        }
        if issue_weights.keys().ne(value_weights.keys()) {
            return Err(DomainError::InvalidProfile(
                "issue weights and issue values name different issues".to_string(),
            ));
        }

        let mut issue_total = 0.0;
        for (name, &weight) in &issue_weights {
            check_weight(name, weight)?;
            issue_total += weight;
        }
        if issue_total <= 0.0 {
            return Err(DomainError::InvalidProfile(
                "issue weights sum to zero".to_string(),
            ));
        }

        let mut issues = Vec::with_capacity(value_weights.len());
        let mut normalized_values = BTreeMap::new();
        for (name, values) in value_weights {
            if values.is_empty() {
                return Err(DomainError::InvalidProfile(format!(
                    "issue `{name}` has no values"
                )));
            }

            let mut max_weight = 0.0_f64;
            for (value, &weight) in &values {
                check_weight(&format!("{name}.{value}"), weight)?;
                max_weight = max_weight.max(weight);
            }
            if max_weight <= 0.0 {
                return Err(DomainError::InvalidProfile(format!(
                    "all values of issue `{name}` have zero weight"
                )));
            }

            issues.push(Issue::new(name.clone(), values.keys().cloned().collect()));
            normalized_values.insert(
                name,
                values
                    .into_iter()
                    .map(|(value, weight)| (value, weight / max_weight))
                    .collect(),
            );
        }

        let issue_weights = issue_weights
            .into_iter()
            .map(|(name, weight)| (name, weight / issue_total))
            .collect();

        Ok(Self {
            issues,
            issue_weights,
            value_weights: normalized_values,
            reservation_value,
            bids: OnceLock::new(),
        })
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn issue_weights(&self) -> &BTreeMap<String, f64> {
        &self.issue_weights
    }

    pub fn value_weights(&self) -> &BTreeMap<String, BTreeMap<String, f64>> {
        &self.value_weights
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

    /// Utility floor below which this party prefers no deal.
    pub fn reservation_value(&self) -> f64 {
        self.reservation_value
    }

    /// Number of distinct bids in the domain (saturating).
    pub fn domain_size(&self) -> usize {
        self.issues
            .iter()
            .fold(1_usize, |acc, issue| acc.saturating_mul(issue.len()))
    }

    /// Whether both preferences are defined over the same issues and values.
    pub fn same_domain(&self, other: &Preference) -> bool {
        self.issues.len() == other.issues.len()
            && self
                .issues
                .iter()
                .zip(other.issues.iter())
                .all(|(a, b)| a == b && a.values() == b.values())
    }

    /// Weighted sum of issue weight times value weight. Unknown issues or
    /// values contribute nothing.
    pub fn utility(&self, bid: &Bid) -> f64 {
        bid.iter()
            .map(|(issue, value)| self.issue_weight(issue) * self.value_weight(issue, value))
            .sum()
    }

    /// Check that `bid` assigns a known value to every issue and nothing else.
    pub fn validate_bid(&self, bid: &Bid) -> Result<(), DomainError> {
        if bid.len() != self.issues.len() {
            return Err(DomainError::InvalidBid(format!(
                "bid covers {} issues, domain has {}",
                bid.len(),
                self.issues.len()
            )));
        }
        for issue in &self.issues {
            match bid.get(issue.name()) {
                Some(value) if issue.contains(value) => {}
                Some(value) => {
                    return Err(DomainError::InvalidBid(format!(
                        "`{value}` is not a value of issue `{issue}`"
                    )))
                }
                None => {
                    return Err(DomainError::InvalidBid(format!(
                        "bid has no value for issue `{issue}`"
                    )))
                }
            }
        }
        Ok(())
    }

    /// All bids of the domain, sorted by utility descending. Ties keep
    /// enumeration order.
    pub fn bids(&self) -> &[Bid] {
        self.bids.get_or_init(|| self.enumerate())
    }

    pub fn is_enumerated(&self) -> bool {
        self.bids.get().is_some()
    }

    pub fn max_util_bid(&self) -> Bid {
        self.bids()[0].clone()
    }

    pub fn min_util_bid(&self) -> Bid {
        let bids = self.bids();
        bids[bids.len() - 1].clone()
    }

    /// The bid whose utility is closest to `target`.
    ///
    /// Targets above the best (below the worst) bid return the best (worst)
    /// bid. When `target` lies exactly halfway between two neighbours, the
    /// lower-utility neighbour (the one with the higher index in
    /// [`Preference::bids`]) is returned. When several bids have exactly the
    /// target utility, the first of them is returned. A NaN target returns
    /// the worst bid.
    pub fn bid_at(&self, target: f64) -> Bid {
        let bids = self.bids();
        let best = &bids[0];
        let worst = &bids[bids.len() - 1];

        if target.is_nan() {
            return worst.clone();
        }
        if target >= sorted_utility(best) {
            return best.clone();
        }
        if target <= sorted_utility(worst) {
            return worst.clone();
        }

        // First index whose utility is <= target; 1 <= idx <= len - 1 here.
        let idx = bids.partition_point(|bid| sorted_utility(bid) > target);
        let lower = &bids[idx];
        let upper = &bids[idx - 1];

        if target - sorted_utility(lower) <= sorted_utility(upper) - target {
            lower.clone()
        } else {
            upper.clone()
        }
    }

    /// Bids with utility in `[lower, upper]`, best first.
    ///
    /// Stops scanning as soon as utilities drop below `lower`.
    pub fn bids_in_range(&self, lower: f64, upper: f64) -> Vec<Bid> {
        let mut found = Vec::new();
        for bid in self.bids() {
            let utility = sorted_utility(bid);
            if utility < lower {
                break;
            }
            if utility <= upper {
                found.push(bid.clone());
            }
        }
        found
    }

    /// Bids with utility in `[target - below, target + above]`.
    pub fn bids_at(&self, target: f64, below: f64, above: f64) -> Vec<Bid> {
        self.bids_in_range(target - below, target + above)
    }

    /// A bid near a uniformly drawn utility in
    /// `[max(lower, reservation), min(upper, 1)]`.
    ///
    /// Inverted bounds are swapped and clamped once more; if they are still
    /// inverted the lower bound is used as the target.
    pub fn random_bid_in_range<R: Rng + ?Sized>(&self, lower: f64, upper: f64, rng: &mut R) -> Bid {
        let (mut lower, mut upper) = self.clamp_range(lower, upper);
        if lower > upper {
            (lower, upper) = self.clamp_range(upper, lower);
        }

        let target = if lower < upper {
            rng.gen_range(lower..=upper)
        } else {
            lower
        };
        self.bid_at(target)
    }

    fn clamp_range(&self, lower: f64, upper: f64) -> (f64, f64) {
        (lower.max(self.reservation_value), upper.min(1.0))
    }

    fn enumerate(&self) -> Vec<Bid> {
        let mut bids = vec![Bid::default()];
        for issue in &self.issues {
            let mut next = Vec::with_capacity(bids.len().saturating_mul(issue.len()));
            for value in issue.values() {
                for bid in &bids {
                    next.push(bid.with(issue.name(), value));
                }
            }
            bids = next;
        }

        let mut scored: Vec<Bid> = bids
            .into_iter()
            .map(|bid| {
                let utility = self.utility(&bid);
                bid.with_utility(utility)
            })
            .collect();
        scored.sort_by(|a, b| sorted_utility(b).total_cmp(&sorted_utility(a)));

        debug!(count = scored.len(), "Enumerated bid space");
        scored
    }
}

fn check_weight(label: &str, weight: f64) -> Result<(), DomainError> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(DomainError::InvalidProfile(format!(
            "weight of `{label}` must be a non-negative number, got {weight}"
        )));
    }
    Ok(())
}

fn sorted_utility(bid: &Bid) -> f64 {
    bid.utility().unwrap_or(0.0)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Two issues with three values each: nine outcomes.
    pub(crate) fn three_by_three(issue_a: f64, values_a: [f64; 3], values_b: [f64; 3]) -> Preference {
        let issue_weights = BTreeMap::from([
            ("price".to_string(), issue_a),
            ("delivery".to_string(), 1.0 - issue_a),
        ]);
        let value_weights = BTreeMap::from([
            (
                "price".to_string(),
                BTreeMap::from([
                    ("high".to_string(), values_a[0]),
                    ("low".to_string(), values_a[1]),
                    ("mid".to_string(), values_a[2]),
                ]),
            ),
            (
                "delivery".to_string(),
                BTreeMap::from([
                    ("fast".to_string(), values_b[0]),
                    ("normal".to_string(), values_b[1]),
                    ("slow".to_string(), values_b[2]),
                ]),
            ),
        ]);
        Preference::from_weights(issue_weights, value_weights, 0.0).unwrap()
    }

    /// One issue whose value weights are 0.0, 0.1, ... 1.0.
    fn ladder(reservation_value: f64) -> Preference {
        let values: BTreeMap<String, f64> = (0..=10)
            .map(|i| (format!("v{i:02}"), i as f64 / 10.0))
            .collect();
        Preference::from_weights(
            BTreeMap::from([("level".to_string(), 1.0)]),
            BTreeMap::from([("level".to_string(), values)]),
            reservation_value,
        )
        .unwrap()
    }

    fn single_issue(values: &[(&str, f64)]) -> Preference {
        Preference::from_weights(
            BTreeMap::from([("x".to_string(), 1.0)]),
            BTreeMap::from([(
                "x".to_string(),
                values
                    .iter()
                    .map(|(name, weight)| (name.to_string(), *weight))
                    .collect(),
            )]),
            0.0,
        )
        .unwrap()
    }

    #[test]
    fn weights_are_normalized() {
        let json = r#"{
            "reservationValue": 0.2,
            "issueWeights": {"price": 3.0, "delivery": 1.0},
            "issues": {
                "price": {"low": 4.0, "high": 2.0},
                "delivery": {"fast": 0.5, "slow": 0.25}
            }
        }"#;
        let pref = Preference::from_json(json).unwrap();

        let total: f64 = pref.issue_weights().values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!((pref.issue_weight("price") - 0.75).abs() < 1e-12);

        for values in pref.value_weights().values() {
            let max = values.values().cloned().fold(f64::MIN, f64::max);
            assert!((max - 1.0).abs() < 1e-12);
        }
        assert!((pref.value_weight("delivery", "slow") - 0.5).abs() < 1e-12);
        assert_eq!(pref.reservation_value(), 0.2);
    }

    #[test]
    fn rejects_malformed_profiles() {
        let cases = [
            r#"{"issueWeights": {"a": 1.0}, "issues": {"a": {}}}"#,
            r#"{"issueWeights": {"a": -1.0, "b": 2.0}, "issues": {"a": {"x": 1.0}, "b": {"y": 1.0}}}"#,
            r#"{"issueWeights": {"a": 1.0}, "issues": {"b": {"x": 1.0}}}"#,
            r#"{"issueWeights": {"a": 0.0}, "issues": {"a": {"x": 1.0}}}"#,
            r#"{"issueWeights": {"a": 1.0}, "issues": {"a": {"x": 0.0, "y": 0.0}}}"#,
            r#"{"reservationValue": 1.5, "issueWeights": {"a": 1.0}, "issues": {"a": {"x": 1.0}}}"#,
            r#"{"issueWeights": {}, "issues": {}}"#,
            r#"{"issueWeights": "#,
        ];
        for json in cases {
            let result = Preference::from_json(json);
            assert!(
                matches!(result, Err(DomainError::InvalidProfile(_))),
                "expected InvalidProfile for {json}, got {result:?}"
            );
        }
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let result = Preference::load("/nonexistent/profileA.json");
        assert!(matches!(result, Err(DomainError::Io { .. })));
    }

    #[test]
    fn enumeration_is_complete_and_sorted() {
        let pref = three_by_three(0.6, [0.2, 1.0, 0.5], [1.0, 0.4, 0.0]);
        assert!(!pref.is_enumerated());

        let bids = pref.bids();
        assert_eq!(bids.len(), 9);
        assert_eq!(pref.domain_size(), 9);
        assert!(pref.is_enumerated());

        let unique: std::collections::HashSet<_> = bids.iter().collect();
        assert_eq!(unique.len(), 9);

        for pair in bids.windows(2) {
            assert!(pair[0].utility().unwrap() >= pair[1].utility().unwrap());
        }
        assert_eq!(pref.max_util_bid(), Bid::from_pairs([("price", "low"), ("delivery", "fast")]));
        assert_eq!(pref.min_util_bid(), Bid::from_pairs([("price", "high"), ("delivery", "slow")]));
    }

    #[test]
    fn utility_is_reproducible_from_weights() {
        let pref = three_by_three(0.6, [0.2, 1.0, 0.5], [1.0, 0.4, 0.0]);
        for bid in pref.bids() {
            let expected: f64 = pref
                .issues()
                .iter()
                .map(|issue| {
                    let value = bid.get(issue.name()).unwrap();
                    pref.issue_weight(issue.name()) * pref.value_weight(issue.name(), value)
                })
                .sum();
            assert_eq!(pref.utility(bid), expected);
            assert_eq!(pref.utility(bid), pref.utility(&bid.without_utility()));
            assert_eq!(bid.utility(), Some(expected));
        }
    }

    #[test]
    fn bid_at_clamps_to_extremes() {
        let pref = three_by_three(0.6, [0.2, 1.0, 0.5], [1.0, 0.4, 0.0]);
        assert_eq!(pref.bid_at(2.0), pref.max_util_bid());
        assert_eq!(pref.bid_at(-1.0), pref.min_util_bid());
        assert_eq!(pref.bid_at(f64::INFINITY), pref.max_util_bid());
        assert_eq!(pref.bid_at(f64::NEG_INFINITY), pref.min_util_bid());
        assert_eq!(pref.bid_at(f64::NAN), pref.min_util_bid());
    }

    #[test]
    fn bid_at_returns_closest_achievable_utility() {
        let pref = three_by_three(0.55, [0.3, 1.0, 0.65], [1.0, 0.45, 0.1]);
        let utilities: Vec<f64> = pref.bids().iter().map(|b| b.utility().unwrap()).collect();

        for step in 0..=100 {
            let target = step as f64 / 100.0;
            let chosen = pref.utility(&pref.bid_at(target));
            let best_distance = utilities
                .iter()
                .map(|u| (u - target).abs())
                .fold(f64::INFINITY, f64::min);
            assert!(
                ((chosen - target).abs() - best_distance).abs() < 1e-12,
                "target {target}: chose {chosen}, best distance {best_distance}"
            );
        }
    }

    #[test]
    fn bid_at_roundtrips_unique_utilities() {
        let pref = three_by_three(0.55, [0.3, 1.0, 0.65], [1.0, 0.45, 0.1]);
        let bids = pref.bids();
        for bid in bids {
            let utility = bid.utility().unwrap();
            let duplicates = bids.iter().filter(|b| b.utility() == Some(utility)).count();
            if duplicates == 1 {
                assert_eq!(&pref.bid_at(utility), bid);
            }
        }
    }

    #[test]
    fn bid_at_tie_prefers_lower_utility_neighbour() {
        let pref = single_issue(&[("top", 1.0), ("middle", 0.5), ("bottom", 0.0)]);
        assert_eq!(pref.bid_at(0.75), Bid::from_pairs([("x", "middle")]));
        assert_eq!(pref.bid_at(0.25), Bid::from_pairs([("x", "bottom")]));
        assert_eq!(pref.bid_at(0.76), Bid::from_pairs([("x", "top")]));
    }

    #[test]
    fn bid_at_exact_duplicate_returns_first() {
        let pref = single_issue(&[("a", 1.0), ("b", 0.5), ("c", 0.5), ("d", 0.0)]);
        let first_half = pref
            .bids()
            .iter()
            .find(|b| b.utility() == Some(0.5))
            .cloned()
            .unwrap();
        assert_eq!(pref.bid_at(0.5), first_half);
    }

    #[test]
    fn bids_in_range_matches_filter() {
        let pref = three_by_three(0.55, [0.3, 1.0, 0.65], [1.0, 0.45, 0.1]);
        let found = pref.bids_in_range(0.3, 0.8);
        let expected: Vec<Bid> = pref
            .bids()
            .iter()
            .filter(|b| (0.3..=0.8).contains(&b.utility().unwrap()))
            .cloned()
            .collect();
        assert_eq!(found, expected);
        assert!(pref.bids_in_range(1.1, 2.0).is_empty());
        assert_eq!(pref.bids_at(0.5, 0.5, 0.5).len(), 9);
    }

    #[test]
    fn random_bid_respects_reservation_value() {
        let pref = ladder(0.6);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let bid = pref.random_bid_in_range(0.0, 1.0, &mut rng);
            assert!(pref.utility(&bid) >= 0.6 - 1e-9);
        }
    }

    #[test]
    fn random_bid_swaps_inverted_bounds() {
        let pref = ladder(0.0);
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let utility = pref.utility(&pref.random_bid_in_range(0.9, 0.7, &mut rng));
            assert!((0.7 - 1e-9..=0.9 + 1e-9).contains(&utility), "got {utility}");
        }
    }

    #[test]
    fn validate_bid_checks_coverage() {
        let pref = three_by_three(0.5, [1.0, 0.5, 0.0], [1.0, 0.5, 0.0]);
        let good = Bid::from_pairs([("price", "low"), ("delivery", "fast")]);
        assert!(pref.validate_bid(&good).is_ok());

        let missing = Bid::from_pairs([("price", "low")]);
        assert!(matches!(pref.validate_bid(&missing), Err(DomainError::InvalidBid(_))));

        let unknown = Bid::from_pairs([("price", "free"), ("delivery", "fast")]);
        assert!(pref.validate_bid(&unknown).is_err());

        let extra = Bid::from_pairs([("price", "low"), ("color", "red")]);
        assert!(pref.validate_bid(&extra).is_err());
    }
}
