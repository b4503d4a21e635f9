//! Contract calls as seen by a session: read-only queries and signed submissions whose
//! lifecycle is reported as a stream of [`TxEvent`]s.

use crate::{
    Result,
    signer::Signer,
    types::{
        Address,
        TxHash,
    },
};
use futures::stream::BoxStream;
use serde::{
    Deserialize,
    Serialize,
};
use std::future::Future;

pub mod http;
pub mod local;

pub use http::HttpTransport;
pub use local::{
    LocalChain,
    LocalChainConfig,
};

/// Arguments of a contract message, executed on behalf of `origin`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub origin: Address,
    pub data: serde_json::Value,
}

impl CallRequest {
    pub fn new(origin: Address, data: serde_json::Value) -> Self {
        Self { origin, data }
    }
}

/// Outcome of a query or dry run. On failure `value` carries the revert reason.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl QueryResponse {
    pub fn ok(value: serde_json::Value) -> Self {
        Self {
            success: true,
            value,
        }
    }

    pub fn revert(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            value: serde_json::Value::String(reason.into()),
        }
    }

    /// Revert reason as display text.
    pub fn reason(&self) -> String {
        match &self.value {
            serde_json::Value::String(reason) => reason.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxEvent {
    Signed {
        tx_hash: TxHash,
    },
    Broadcasted {
        tx_hash: TxHash,
    },
    BestBlock {
        tx_hash: TxHash,
        block: u64,
        dispatch_error: Option<String>,
    },
    Finalized {
        tx_hash: TxHash,
        block: u64,
        dispatch_error: Option<String>,
    },
}

impl TxEvent {
    pub fn tx_hash(&self) -> TxHash {
        match self {
            TxEvent::Signed { tx_hash }
            | TxEvent::Broadcasted { tx_hash }
            | TxEvent::BestBlock { tx_hash, .. }
            | TxEvent::Finalized { tx_hash, .. } => *tx_hash,
        }
    }
}

/// Lifecycle of one submitted transaction. An `Err` item is terminal; the stream ending
/// after the last event means the transaction went through.
pub type TxEventStream = BoxStream<'static, Result<TxEvent>>;

pub trait ContractTransport: Send + Sync + 'static {
    fn query(
        &self,
        method: &str,
        request: &CallRequest,
    ) -> impl Future<Output = Result<QueryResponse>> + Send;

    fn submit(
        &self,
        method: &str,
        request: &CallRequest,
        signer: &dyn Signer,
    ) -> impl Future<Output = Result<TxEventStream>> + Send;
}

/// Bytes a signer commits to when submitting `method` with `request`.
pub fn signing_payload(method: &str, request: &CallRequest) -> Vec<u8> {
    let envelope = serde_json::json!({
        "method": method,
        "origin": request.origin,
        "data": request.data,
    });
    envelope.to_string().into_bytes()
}
