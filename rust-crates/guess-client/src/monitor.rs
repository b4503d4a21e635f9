//! Drives one submitted transaction to a terminal state, keeping a single status notice up
//! to date and firing the completion callback only after the transaction went through.

use crate::{
    Error,
    notify::{
        Notice,
        NoticeHandle,
        NotificationSink,
    },
    transport::{
        TxEvent,
        TxEventStream,
    },
    types::TxHash,
};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{
    debug,
    info,
    warn,
};

pub const SUBMITTING: &str = "Submitting Transaction ...";
pub const SENT_SUCCESSFULLY: &str = "Transaction sent successfully";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxStage {
    Submitted,
    Signed,
    Broadcast,
    IncludedInBlock { block: u64 },
    Finalized { block: u64 },
    Completed,
    Failed(String),
}

impl TxStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStage::Completed | TxStage::Failed(_))
    }

    fn rank(&self) -> u8 {
        match self {
            TxStage::Submitted => 0,
            TxStage::Signed => 1,
            TxStage::Broadcast => 2,
            TxStage::IncludedInBlock { .. } => 3,
            TxStage::Finalized { .. } => 4,
            TxStage::Completed | TxStage::Failed(_) => 5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxOutcome {
    Completed { tx_hash: Option<TxHash> },
    Failed { tx_hash: Option<TxHash>, reason: String },
}

impl TxOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TxOutcome::Completed { .. })
    }
}

pub struct TransactionMonitor<F> {
    sink: Arc<dyn NotificationSink>,
    handle: NoticeHandle,
    stage: TxStage,
    tx_hash: Option<TxHash>,
    callback: Option<F>,
}

impl<F: FnOnce() + Send> TransactionMonitor<F> {
    /// Opens the status notice in the `Submitted` stage.
    pub fn new(sink: Arc<dyn NotificationSink>, on_complete: F) -> Self {
        let handle = sink.open(Notice::loading(SUBMITTING));
        Self {
            sink,
            handle,
            stage: TxStage::Submitted,
            tx_hash: None,
            callback: Some(on_complete),
        }
    }

    pub fn stage(&self) -> &TxStage {
        &self.stage
    }

    pub fn tx_hash(&self) -> Option<TxHash> {
        self.tx_hash
    }

    pub fn on_event(&mut self, event: TxEvent) {
        if self.stage.is_terminal() {
            debug!(?event, stage = ?self.stage, "ignoring event after terminal stage");
            return;
        }
        let tx_hash = event.tx_hash();
        self.tx_hash = Some(tx_hash);

        let (next, status) = match event {
            TxEvent::Signed { .. } => {
                (TxStage::Signed, format!("Signed tx with hash: {tx_hash}"))
            }
            TxEvent::Broadcasted { .. } => (
                TxStage::Broadcast,
                format!("Broadcasted tx with hash: {tx_hash}"),
            ),
            TxEvent::BestBlock {
                block,
                dispatch_error,
                ..
            } => {
                if let Some(reason) = dispatch_error {
                    debug!(%tx_hash, block, %reason, "dispatch error in best block");
                }
                (
                    TxStage::IncludedInBlock { block },
                    format!("Submitted tx with hash: {tx_hash} (block {block})"),
                )
            }
            TxEvent::Finalized {
                dispatch_error: Some(reason),
                ..
            } => {
                self.fail(reason);
                return;
            }
            TxEvent::Finalized {
                block,
                dispatch_error: None,
                ..
            } => (
                TxStage::Finalized { block },
                format!("Finalized tx with hash: {tx_hash} (block {block})"),
            ),
        };

        if next.rank() < self.stage.rank() {
            warn!(current = ?self.stage, received = ?next, %tx_hash, "ignoring stage regression");
            return;
        }
        debug!(%tx_hash, stage = ?next, "tx event");
        self.stage = next;
        self.sink.set(self.handle, Notice::loading(status));
    }

    pub fn on_error(&mut self, err: Error) {
        if self.stage.is_terminal() {
            debug!(?err, "ignoring error after terminal stage");
            return;
        }
        let reason = match err {
            Error::TransactionFailure(reason) => reason,
            other => other.to_string(),
        };
        self.fail(reason);
    }

    /// The event stream ended without error.
    pub fn on_complete(&mut self) {
        if self.stage.is_terminal() {
            return;
        }
        info!(tx_hash = ?self.tx_hash, "transaction completed");
        self.stage = TxStage::Completed;
        self.sink.set(self.handle, Notice::success(SENT_SUCCESSFULLY));
        if let Some(callback) = self.callback.take() {
            callback();
        }
    }

    fn fail(&mut self, reason: String) {
        warn!(tx_hash = ?self.tx_hash, %reason, "transaction failed");
        self.sink.set(
            self.handle,
            Notice::error(Error::TransactionFailure(reason.clone()).to_string()),
        );
        self.stage = TxStage::Failed(reason);
        self.callback = None;
    }

    pub fn outcome(&self) -> Option<TxOutcome> {
        match &self.stage {
            TxStage::Completed => Some(TxOutcome::Completed {
                tx_hash: self.tx_hash,
            }),
            TxStage::Failed(reason) => Some(TxOutcome::Failed {
                tx_hash: self.tx_hash,
                reason: reason.clone(),
            }),
            _ => None,
        }
    }

    /// Consume `events` until the transaction is completed or failed.
    pub async fn run(mut self, mut events: TxEventStream) -> TxOutcome {
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => self.on_event(event),
                Err(err) => self.on_error(err),
            }
            if self.stage.is_terminal() {
                break;
            }
        }
        self.on_complete();
        match self.outcome() {
            Some(outcome) => outcome,
            None => TxOutcome::Completed {
                tx_hash: self.tx_hash,
            },
        }
    }
}

/// Monitor `events` with a fresh status notice on `sink`.
pub async fn watch<F: FnOnce() + Send>(
    events: TxEventStream,
    sink: Arc<dyn NotificationSink>,
    on_complete: F,
) -> TxOutcome {
    TransactionMonitor::new(sink, on_complete).run(events).await
}
