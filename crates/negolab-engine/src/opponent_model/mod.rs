pub mod classic;
pub mod window;

use std::fmt;
use std::sync::Arc;

use negolab_domain::{EstimatedPreference, EstimationMetrics, Preference};
use negolab_models::Bid;

pub use classic::ClassicFrequencyModel;
pub use window::FrequencyWindowModel;

/// Running estimate of the counterpart's hidden preference.
///
/// `update` is called once per received offer, in order, before the owning
/// agent sees the offer. Implementations must keep memory bounded and must
/// not panic on degenerate input.
pub trait OpponentModel: Send {
    fn name(&self) -> &str;

    fn update(&mut self, bid: &Bid, t: f64);

    /// Current estimate, normalized.
    fn preference(&self) -> &EstimatedPreference;

    /// Accuracy against the opponent's true preference over the whole domain.
    /// Only called after a session has ended.
    fn error_against(&self, truth: &Preference) -> EstimationMetrics {
        EstimationMetrics::evaluate(truth, self.preference())
    }
}

/// Builds a fresh model from the owning agent's own preference.
pub type OpponentModelFactory = Arc<dyn Fn(&Preference) -> Box<dyn OpponentModel> + Send + Sync>;

/// A named model factory, registered once per tournament.
#[derive(Clone)]
pub struct OpponentModelEntry {
    name: String,
    factory: OpponentModelFactory,
}

impl OpponentModelEntry {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Preference) -> Box<dyn OpponentModel> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    pub fn classic_frequency() -> Self {
        Self::new(classic::NAME, |own| Box::new(ClassicFrequencyModel::new(own)))
    }

    pub fn frequency_window() -> Self {
        Self::new(window::NAME, |own| Box::new(FrequencyWindowModel::new(own)))
    }

    /// Look up a built-in model by its registry name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            classic::NAME => Some(Self::classic_frequency()),
            window::NAME => Some(Self::frequency_window()),
            _ => None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instantiate(&self, own: &Preference) -> Box<dyn OpponentModel> {
        (self.factory)(own)
    }
}

impl fmt::Debug for OpponentModelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpponentModelEntry")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lookup() {
        assert_eq!(
            OpponentModelEntry::builtin("classic_frequency").map(|e| e.name().to_string()),
            Some("classic_frequency".to_string())
        );
        assert!(OpponentModelEntry::builtin("frequency_window").is_some());
        assert!(OpponentModelEntry::builtin("bayesian").is_none());
    }
}
