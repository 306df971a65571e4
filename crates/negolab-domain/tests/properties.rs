//! Properties that hold for every well-formed pair of profiles.
//!
//! Domains are generated with one to three issues of one to four values,
//! with random raw weights for both sides.

use std::collections::BTreeMap;
use std::sync::Arc;

use negolab_domain::{BidSpace, Preference};
use proptest::prelude::*;

type RawProfile = (Vec<f64>, Vec<Vec<f64>>, f64);

fn raw_profile(shape: Vec<usize>) -> impl Strategy<Value = RawProfile> {
    let issues = shape.len();
    (
        prop::collection::vec(0.01_f64..10.0, issues),
        prop::collection::vec(prop::collection::vec(0.0_f64..10.0, 4), issues),
        0.0_f64..=1.0,
    )
        .prop_map(move |(issue_weights, mut value_weights, reservation)| {
            for (values, &n) in value_weights.iter_mut().zip(&shape) {
                values.truncate(n);
            }
            (issue_weights, value_weights, reservation)
        })
}

fn profile_pair() -> impl Strategy<Value = (RawProfile, RawProfile)> {
    prop::collection::vec(1_usize..=4, 1..=3)
        .prop_flat_map(|shape| (raw_profile(shape.clone()), raw_profile(shape)))
}

fn preference((issue_weights, value_weights, reservation): &RawProfile) -> Preference {
    let issues = issue_weights
        .iter()
        .enumerate()
        .map(|(i, &w)| (format!("issue{i}"), w))
        .collect();
    let values = value_weights
        .iter()
        .enumerate()
        .map(|(i, weights)| {
            let per_value = weights
                .iter()
                .enumerate()
                // Keep at least one value weight positive.
                .map(|(j, &w)| (format!("v{j}"), if j == 0 { w + 0.1 } else { w }))
                .collect::<BTreeMap<_, _>>();
            (format!("issue{i}"), per_value)
        })
        .collect();
    Preference::from_weights(issues, values, *reservation).unwrap()
}

proptest! {
    #[test]
    fn weights_are_normalized((raw, _) in profile_pair()) {
        let pref = preference(&raw);

        let total: f64 = pref.issue_weights().values().sum();
        prop_assert!((total - 1.0).abs() < 1e-9);

        for values in pref.value_weights().values() {
            let max = values.values().copied().fold(f64::MIN, f64::max);
            prop_assert_eq!(max, 1.0);
            prop_assert!(values.values().all(|w| (0.0..=1.0).contains(w)));
        }
    }

    #[test]
    fn utilities_are_bounded_and_sorted((raw, _) in profile_pair()) {
        let pref = preference(&raw);
        let bids = pref.bids();

        for bid in bids {
            let utility = pref.utility(bid);
            prop_assert!((-1e-9..=1.0 + 1e-9).contains(&utility));
            prop_assert_eq!(utility, pref.utility(&bid.without_utility()));
        }
        prop_assert!(bids
            .windows(2)
            .all(|w| pref.utility(&w[0]) >= pref.utility(&w[1])));
    }

    #[test]
    fn bid_at_is_closest(raw in profile_pair(), step in 0_u32..=100) {
        let pref = preference(&raw.0);
        let target = f64::from(step) / 100.0;

        let chosen = (pref.utility(&pref.bid_at(target)) - target).abs();
        let best = pref
            .bids()
            .iter()
            .map(|bid| (pref.utility(bid) - target).abs())
            .fold(f64::MAX, f64::min);
        prop_assert!(chosen <= best + 1e-12);
    }

    #[test]
    fn pareto_frontier_is_sound_and_complete((raw_a, raw_b) in profile_pair()) {
        let space = BidSpace::new(Arc::new(preference(&raw_a)), Arc::new(preference(&raw_b)))
            .unwrap();
        let points = space.points();
        let frontier = space.pareto();

        prop_assert!(!frontier.is_empty());
        for point in &frontier {
            prop_assert!(!points.iter().any(|other| other.dominates(point)));
        }
        for point in points {
            if !frontier.contains(point) {
                prop_assert!(points.iter().any(|other| other.dominates(point)));
            }
        }
    }

    #[test]
    fn nash_and_kalai_points_are_maximal((raw_a, raw_b) in profile_pair()) {
        let space = BidSpace::new(Arc::new(preference(&raw_a)), Arc::new(preference(&raw_b)))
            .unwrap();

        for point in space.points() {
            prop_assert!(point.nash_product() <= space.nash_score());
            prop_assert!(point.social_welfare() <= space.kalai_score());
        }
    }
}
