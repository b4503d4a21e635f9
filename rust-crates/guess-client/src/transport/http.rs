use super::{
    CallRequest,
    ContractTransport,
    QueryResponse,
    TxEvent,
    TxEventStream,
    signing_payload,
};
use crate::{
    Error,
    Result,
    signer::Signer,
    types::{
        ContractAddress,
        TxHash,
    },
};
use futures::{
    StreamExt,
    stream,
};
use reqwest::StatusCode;
use serde::{
    Deserialize,
    Serialize,
};
use std::time::Duration;
use tokio::time;
use tracing::{
    debug,
    warn,
};
use url::Url;

const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(2);
const MAX_STATUS_FAILURES: u32 = 5;

/// JSON gateway in front of the chain node.
///
/// The gateway is a separate service serving `/contracts/{address}/query`,
/// `/contracts/{address}/submit` and `/tx/{hash}`. A plain Substrate RPC endpoint such as
/// the default Paseo node does not serve these paths, so `rpc_url` must point at a gateway
/// deployment; requests against a bare node fail with `Error::Network`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    base_url: String,
    contract: ContractAddress,
    http: reqwest::Client,
    status_interval: Duration,
}

impl HttpTransport {
    /// `rpc_url` may use a websocket scheme; the gateway is reached over the matching HTTP
    /// scheme on the same host.
    pub fn new(rpc_url: &str, contract: ContractAddress) -> Result<Self> {
        let base_url = gateway_base(rpc_url)?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url,
            contract,
            http,
            status_interval: STATUS_POLL_INTERVAL,
        })
    }

    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn contract_url(&self, action: &str) -> String {
        format!("{}/contracts/{}/{action}", self.base_url, self.contract)
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        url: String,
        body: &B,
        what: &str,
    ) -> Result<R> {
        let res = self
            .http
            .post(url.as_str())
            .json(body)
            .send()
            .await
            .map_err(|e| Error::network(format!("gateway request failed: {e}")))?;
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .map_err(|e| Error::network(format!("failed to read gateway response: {e}")))?;
        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes);
            return Err(Error::Network(format!(
                "gateway responded with {status} when {what}: {body}"
            )));
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::network(format!("invalid gateway payload when {what}: {e}")))
    }
}

impl ContractTransport for HttpTransport {
    async fn query(&self, method: &str, request: &CallRequest) -> Result<QueryResponse> {
        let body = CallDto {
            method,
            origin: request.origin.as_str(),
            data: &request.data,
        };
        let what = format!("querying {method}");
        self.post(self.contract_url("query"), &body, &what).await
    }

    async fn submit(
        &self,
        method: &str,
        request: &CallRequest,
        signer: &dyn Signer,
    ) -> Result<TxEventStream> {
        let signature = signer.sign(&signing_payload(method, request));
        let body = SubmitDto {
            call: CallDto {
                method,
                origin: request.origin.as_str(),
                data: &request.data,
            },
            public_key: format!("0x{}", hex::encode(signer.public_key().as_bytes())),
            signature: signature.to_hex(),
        };
        let what = format!("submitting {method}");
        let receipt: SubmitReceiptDto =
            self.post(self.contract_url("submit"), &body, &what).await?;
        let tx_hash: TxHash = receipt.tx_hash.parse()?;
        debug!(%tx_hash, method, "transaction accepted by gateway");

        let poll = StatusPoll {
            http: self.http.clone(),
            url: format!("{}/tx/{tx_hash}", self.base_url),
            tx_hash,
            interval: self.status_interval,
            signed_sent: false,
            last: None,
            failures: 0,
            done: false,
        };
        let events = stream::unfold(poll, |mut poll| async move {
            let item = poll.next_event().await?;
            Some((item, poll))
        });
        Ok(events.boxed())
    }
}

#[derive(Serialize)]
struct CallDto<'a> {
    method: &'a str,
    origin: &'a str,
    data: &'a serde_json::Value,
}

#[derive(Serialize)]
struct SubmitDto<'a> {
    #[serde(flatten)]
    call: CallDto<'a>,
    public_key: String,
    signature: String,
}

#[derive(Deserialize)]
struct SubmitReceiptDto {
    tx_hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TxStatusKind {
    Pending,
    Broadcasted,
    InBlock,
    Finalized,
    Invalid,
    Dropped,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
struct TxStatusDto {
    status: TxStatusKind,
    #[serde(default)]
    block: Option<u64>,
    #[serde(default)]
    dispatch_error: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Map a gateway status to a stream item. `None` for statuses that carry no news.
fn status_to_event(tx_hash: TxHash, status: &TxStatusDto) -> Option<Result<TxEvent>> {
    let block = status.block.unwrap_or_default();
    let dispatch_error = status.dispatch_error.clone();
    match status.status {
        TxStatusKind::Pending => None,
        TxStatusKind::Broadcasted => Some(Ok(TxEvent::Broadcasted { tx_hash })),
        TxStatusKind::InBlock => Some(Ok(TxEvent::BestBlock {
            tx_hash,
            block,
            dispatch_error,
        })),
        TxStatusKind::Finalized => Some(Ok(TxEvent::Finalized {
            tx_hash,
            block,
            dispatch_error,
        })),
        TxStatusKind::Invalid | TxStatusKind::Dropped => {
            let reason = status
                .reason
                .clone()
                .unwrap_or_else(|| format!("transaction {tx_hash} was {:?}", status.status));
            Some(Err(Error::TransactionFailure(reason)))
        }
    }
}

fn is_terminal(item: &Result<TxEvent>) -> bool {
    matches!(item, Err(_) | Ok(TxEvent::Finalized { .. }))
}

struct StatusPoll {
    http: reqwest::Client,
    url: String,
    tx_hash: TxHash,
    interval: Duration,
    signed_sent: bool,
    last: Option<TxStatusDto>,
    failures: u32,
    done: bool,
}

impl StatusPoll {
    async fn next_event(&mut self) -> Option<Result<TxEvent>> {
        if self.done {
            return None;
        }
        if !self.signed_sent {
            self.signed_sent = true;
            return Some(Ok(TxEvent::Signed {
                tx_hash: self.tx_hash,
            }));
        }
        loop {
            time::sleep(self.interval).await;
            let status = match self.fetch().await {
                Ok(status) => status,
                Err(err) => {
                    self.failures += 1;
                    if self.failures >= MAX_STATUS_FAILURES {
                        self.done = true;
                        return Some(Err(err));
                    }
                    warn!(?err, tx_hash = %self.tx_hash, "failed to fetch tx status");
                    continue;
                }
            };
            self.failures = 0;
            if self.last.as_ref() == Some(&status) {
                continue;
            }
            let item = status_to_event(self.tx_hash, &status);
            self.last = Some(status);
            if let Some(item) = item {
                self.done = is_terminal(&item);
                return Some(item);
            }
        }
    }

    async fn fetch(&self) -> Result<TxStatusDto> {
        let res = self
            .http
            .get(self.url.as_str())
            .send()
            .await
            .map_err(|e| Error::network(format!("tx status request failed: {e}")))?;
        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(TxStatusDto {
                status: TxStatusKind::Pending,
                block: None,
                dispatch_error: None,
                reason: None,
            });
        }
        if !status.is_success() {
            let body = res
                .text()
                .await
                .unwrap_or_else(|_| "<unavailable body>".to_string());
            return Err(Error::Network(format!(
                "gateway responded with {status} when fetching tx status: {body}"
            )));
        }
        res.json()
            .await
            .map_err(|e| Error::network(format!("invalid tx status payload: {e}")))
    }
}

fn gateway_base(rpc_url: &str) -> Result<String> {
    let mut url = Url::parse(rpc_url)
        .map_err(|e| Error::validation(format!("invalid RPC URL {rpc_url:?}: {e}")))?;
    let scheme = match url.scheme() {
        "ws" | "http" => "http",
        "wss" | "https" => "https",
        other => {
            return Err(Error::validation(format!(
                "unsupported RPC URL scheme {other:?}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| Error::validation(format!("cannot rewrite scheme of {rpc_url:?}")))?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}
