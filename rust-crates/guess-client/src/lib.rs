//! Contract session and state reconciliation for the on-chain guess-the-number game.
//!
//! A [`session::GameSession`] talks to one deployed contract for one signer through a
//! [`transport::ContractTransport`]. Transactions are tracked by a
//! [`monitor::TransactionMonitor`], and a [`poller`] worker folds polled game state into an
//! [`ledger::AttemptLedger`] that the UI reads through [`view::GameViewModel`].

pub mod config;
pub mod error;
pub mod ledger;
pub mod monitor;
pub mod notify;
pub mod poller;
pub mod session;
pub mod signer;
pub mod transport;
pub mod types;
pub mod view;

pub use error::{
    Error,
    Result,
};
