use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// One complete assignment of values to the issues of a domain.
///
/// The cached utility is not part of identity: two bids with the same
/// issue/value mapping compare equal and hash the same whatever utility
/// each one carries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bid {
    values: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    utility: Option<f64>,
}

impl Bid {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self {
            values,
            utility: None,
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Value chosen for `issue`, if the bid covers it.
    pub fn get(&self, issue: &str) -> Option<&str> {
        self.values.get(issue).map(String::as_str)
    }

    /// Returns a copy extended with `issue = value`.
    pub fn with(&self, issue: &str, value: &str) -> Self {
        let mut values = self.values.clone();
        values.insert(issue.to_string(), value.to_string());
        Self::new(values)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn utility(&self) -> Option<f64> {
        self.utility
    }

    pub fn with_utility(mut self, utility: f64) -> Self {
        self.utility = Some(utility);
        self
    }

    pub fn without_utility(&self) -> Self {
        Self::new(self.values.clone())
    }
}

impl PartialEq for Bid {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl Eq for Bid {}

impl Hash for Bid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.values.hash(state);
    }
}

impl fmt::Display for Bid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (issue, value)) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{issue}: {value}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn utility_is_not_part_of_identity() {
        let a = Bid::from_pairs([("price", "low"), ("color", "red")]).with_utility(0.9);
        let b = Bid::from_pairs([("color", "red"), ("price", "low")]).with_utility(0.1);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn without_utility_clears_cache() {
        let bid = Bid::from_pairs([("price", "low")]).with_utility(0.5);
        assert_eq!(bid.utility(), Some(0.5));
        assert_eq!(bid.without_utility().utility(), None);
    }

    #[test]
    fn with_extends_copy() {
        let base = Bid::default();
        let extended = base.with("price", "low");
        assert!(base.is_empty());
        assert_eq!(extended.get("price"), Some("low"));
    }

    #[test]
    fn display_lists_pairs_in_issue_order() {
        let bid = Bid::from_pairs([("b", "2"), ("a", "1")]);
        assert_eq!(bid.to_string(), "{a: 1, b: 2}");
    }

    #[test]
    fn serde_skips_missing_utility() {
        let bid = Bid::from_pairs([("price", "low")]);
        let json = serde_json::to_string(&bid).unwrap();
        assert!(!json.contains("utility"));
        let parsed: Bid = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, bid);
    }
}
