use std::fmt::Display;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything a session operation can fail with. None of these are fatal; callers surface
/// them as notices and keep their last known good state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed user input, rejected before any network call.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("no wallet connected")]
    NoSigner,

    /// A read-only query was rejected by the contract.
    #[error("query rejected: {0}")]
    Query(String),

    /// The dry run of a transaction reverted; nothing was submitted.
    #[error("dry run failed: {0}")]
    Simulation(String),

    /// A submitted transaction ended in error.
    #[error("transaction failed: {0}")]
    TransactionFailure(String),

    #[error("network error: {0}")]
    Network(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn network(err: impl Display) -> Self {
        Error::Network(err.to_string())
    }
}
