use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    #[error("Invalid bid: {0}")]
    InvalidBid(String),

    #[error("IO error reading {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    #[error("Domain load failed: {0}")]
    Load(String),
}
