use std::sync::Arc;

use negolab_models::Bid;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DomainError;
use crate::preference::Preference;

/// An outcome in two-party utility space.
///
/// The bid is stored without a cached utility. A point without a bid is a
/// pure coordinate (no-deal outcomes, search centers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidPoint {
    bid: Option<Bid>,
    utility_a: f64,
    utility_b: f64,
}

impl BidPoint {
    pub fn new(bid: &Bid, utility_a: f64, utility_b: f64) -> Self {
        Self {
            bid: Some(bid.without_utility()),
            utility_a,
            utility_b,
        }
    }

    pub fn at(utility_a: f64, utility_b: f64) -> Self {
        Self {
            bid: None,
            utility_a,
            utility_b,
        }
    }

    pub fn bid(&self) -> Option<&Bid> {
        self.bid.as_ref()
    }

    pub fn utility_a(&self) -> f64 {
        self.utility_a
    }

    pub fn utility_b(&self) -> f64 {
        self.utility_b
    }

    pub fn with_utility_b(mut self, utility_b: f64) -> Self {
        self.utility_b = utility_b;
        self
    }

    pub fn nash_product(&self) -> f64 {
        self.utility_a * self.utility_b
    }

    pub fn social_welfare(&self) -> f64 {
        self.utility_a + self.utility_b
    }

    /// Euclidean distance in utility space.
    pub fn distance(&self, other: &BidPoint) -> f64 {
        let da = self.utility_a - other.utility_a;
        let db = self.utility_b - other.utility_b;
        (da * da + db * db).sqrt()
    }

    /// At least as good for both parties and strictly better for one.
    pub fn dominates(&self, other: &BidPoint) -> bool {
        self.utility_a >= other.utility_a
            && self.utility_b >= other.utility_b
            && (self.utility_a > other.utility_a || self.utility_b > other.utility_b)
    }
}

/// Points of `points` not dominated by any other point, in input order.
///
/// Pairwise check, O(n²). Points with identical coordinates do not dominate
/// each other, so both are kept.
pub fn pareto_frontier(points: &[BidPoint]) -> Vec<BidPoint> {
    points
        .iter()
        .filter(|candidate| !points.iter().any(|other| other.dominates(candidate)))
        .cloned()
        .collect()
}

/// Joint outcome space of two preferences over the same domain.
#[derive(Debug)]
pub struct BidSpace {
    preference_a: Arc<Preference>,
    preference_b: Arc<Preference>,
    points: Vec<BidPoint>,
    nash: usize,
    kalai: usize,
}

impl BidSpace {
    /// Score every bid for both sides, tracking the Nash and Kalai points in
    /// the same pass. The first maximum wins on ties.
    pub fn new(
        preference_a: Arc<Preference>,
        preference_b: Arc<Preference>,
    ) -> Result<Self, DomainError> {
        if !preference_a.same_domain(&preference_b) {
            return Err(DomainError::InvalidProfile(
                "profiles of a domain must share issues and values".to_string(),
            ));
        }

        let bids = preference_a.bids();
        let mut points: Vec<BidPoint> = Vec::with_capacity(bids.len());
        let mut nash = 0;
        let mut kalai = 0;

        for (idx, bid) in bids.iter().enumerate() {
            let point = BidPoint::new(bid, preference_a.utility(bid), preference_b.utility(bid));
            if idx > 0 {
                if point.nash_product() > points[nash].nash_product() {
                    nash = idx;
                }
                if point.social_welfare() > points[kalai].social_welfare() {
                    kalai = idx;
                }
            }
            points.push(point);
        }

        debug!(
            points = points.len(),
            nash_product = points[nash].nash_product(),
            social_welfare = points[kalai].social_welfare(),
            "Built bid space"
        );

        Ok(Self {
            preference_a,
            preference_b,
            points,
            nash,
            kalai,
        })
    }

    pub fn preference_a(&self) -> &Arc<Preference> {
        &self.preference_a
    }

    pub fn preference_b(&self) -> &Arc<Preference> {
        &self.preference_b
    }

    /// Every outcome, in side A's utility order.
    pub fn points(&self) -> &[BidPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Recomputed on every call. Cache the result (or use
    /// [`crate::ParetoCache`]) when it is needed repeatedly.
    pub fn pareto(&self) -> Vec<BidPoint> {
        pareto_frontier(&self.points)
    }

    pub fn nash_point(&self) -> &BidPoint {
        &self.points[self.nash]
    }

    pub fn kalai_point(&self) -> &BidPoint {
        &self.points[self.kalai]
    }

    pub fn nash_score(&self) -> f64 {
        self.nash_point().nash_product()
    }

    pub fn kalai_score(&self) -> f64 {
        self.kalai_point().social_welfare()
    }

    pub fn bid_point(&self, bid: &Bid) -> BidPoint {
        BidPoint::new(
            bid,
            self.preference_a.utility(bid),
            self.preference_b.utility(bid),
        )
    }

    pub fn nash_distance(&self, point: &BidPoint) -> f64 {
        point.distance(self.nash_point())
    }

    pub fn kalai_distance(&self, point: &BidPoint) -> f64 {
        point.distance(self.kalai_point())
    }

    pub fn nash_distance_of(&self, bid: &Bid) -> f64 {
        self.nash_distance(&self.bid_point(bid))
    }

    pub fn kalai_distance_of(&self, bid: &Bid) -> f64 {
        self.kalai_distance(&self.bid_point(bid))
    }
}
