pub mod bid_space;
pub mod catalog;
pub mod error;
pub mod estimated;
pub mod metrics;
pub mod pareto_cache;
pub mod preference;
pub mod profile;

pub use bid_space::{pareto_frontier, BidPoint, BidSpace};
pub use catalog::{Domain, DomainCatalog};
pub use error::DomainError;
pub use estimated::EstimatedPreference;
pub use metrics::EstimationMetrics;
pub use pareto_cache::ParetoCache;
pub use preference::Preference;
pub use profile::ProfileDocument;
