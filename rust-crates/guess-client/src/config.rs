use crate::types::ContractAddress;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_RPC_URL: &str = "wss://rpc1.paseo.popnetwork.xyz";
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0xD6Ad3e67e2514bED804acc45945A7a102C4c6Ae4";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(20);

/// Where a session connects and how often it polls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub rpc_url: String,
    pub contract_address: ContractAddress,
    pub poll_interval: Duration,
}

impl ClientConfig {
    /// `poll_interval` is clamped into the supported range.
    pub fn new(
        rpc_url: impl Into<String>,
        contract_address: ContractAddress,
        poll_interval: Duration,
    ) -> Self {
        let clamped = poll_interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
        if clamped != poll_interval {
            warn!(
                requested = ?poll_interval,
                using = ?clamped,
                "poll interval out of range; clamping"
            );
        }
        Self {
            rpc_url: rpc_url.into(),
            contract_address,
            poll_interval: clamped,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_RPC_URL,
            ContractAddress::default(),
            DEFAULT_POLL_INTERVAL,
        )
    }
}
