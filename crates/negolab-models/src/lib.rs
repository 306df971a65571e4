pub mod action;
pub mod bid;
pub mod config;
pub mod issue;
pub mod result_schema;
pub mod session;

pub use action::{Action, Side};
pub use bid::Bid;
pub use config::{DeadlineConfig, DomainsConfig, NegolabConfig, ResultsConfig, TournamentConfig};
pub use issue::Issue;
pub use session::{
    EstimatorReport, EventKind, OutcomeKind, SessionEvent, SessionOutcome, SessionResult,
};
