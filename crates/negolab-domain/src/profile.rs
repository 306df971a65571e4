use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// On-disk description of one party's preferences over a domain.
///
/// ```json
/// {
///   "reservationValue": 0.3,
///   "issueWeights": {"price": 0.6, "delivery": 0.4},
///   "issues": {
///     "price": {"low": 1.0, "high": 0.0},
///     "delivery": {"fast": 1.0, "slow": 0.2}
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileDocument {
    #[serde(rename = "reservationValue", default)]
    pub reservation_value: f64,
    #[serde(rename = "issueWeights")]
    pub issue_weights: BTreeMap<String, f64>,
    /// Value weights per issue.
    pub issues: BTreeMap<String, BTreeMap<String, f64>>,
}
