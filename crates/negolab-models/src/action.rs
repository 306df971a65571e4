use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bid::Bid;

/// One of the two parties of a bilateral session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    A,
    B,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::A => "A",
            Side::B => "B",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision returned by an agent on its turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "bid", rename_all = "snake_case")]
pub enum Action {
    Offer(Bid),
    /// Accepts the most recent offer received from the opponent.
    Accept,
}

impl Action {
    pub fn is_accept(&self) -> bool {
        matches!(self, Action::Accept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_side_flips() {
        assert_eq!(Side::A.other(), Side::B);
        assert_eq!(Side::B.other(), Side::A);
    }

    #[test]
    fn action_json_shape() {
        let offer = Action::Offer(Bid::from_pairs([("price", "low")]));
        let json = serde_json::to_value(&offer).unwrap();
        assert_eq!(json["type"], "offer");
        assert_eq!(json["bid"]["values"]["price"], "low");

        let accept = serde_json::to_value(Action::Accept).unwrap();
        assert_eq!(accept["type"], "accept");
    }
}
