//! One signer's view of the contract: validated commands that dry-run before they are signed
//! and submitted, plus the per-signer session cache.

use crate::{
    Error,
    Result,
    config::ClientConfig,
    monitor::{
        TransactionMonitor,
        TxOutcome,
    },
    notify::NotificationSink,
    signer::{
        PublicKey,
        Signer,
    },
    transport::{
        CallRequest,
        ContractTransport,
    },
    types::{
        Address,
        GameSnapshot,
    },
};
use serde_json::json;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        PoisonError,
    },
};
use tokio::task::JoinHandle;
use tracing::{
    debug,
    info,
    warn,
};

pub const GET_CURRENT_GAME: &str = "get_current_game";
pub const START_NEW_GAME: &str = "start_new_game";
pub const GUESS: &str = "guess";

pub struct GameSession<T> {
    transport: T,
    signer: Arc<dyn Signer>,
    origin: Address,
    sink: Arc<dyn NotificationSink>,
}

/// A submitted transaction whose monitor runs in the background. Dropping it does not cancel
/// the transaction.
pub struct PendingTx {
    task: JoinHandle<TxOutcome>,
}

impl PendingTx {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn outcome(self) -> TxOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) => TxOutcome::Failed {
                tx_hash: None,
                reason: format!("transaction monitor stopped: {err}"),
            },
        }
    }
}

impl<T: ContractTransport> GameSession<T> {
    pub fn new(
        transport: T,
        signer: Arc<dyn Signer>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let origin = signer.address();
        Self {
            transport,
            signer,
            origin,
            sink,
        }
    }

    pub fn origin(&self) -> &Address {
        &self.origin
    }

    pub fn signer(&self) -> &Arc<dyn Signer> {
        &self.signer
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn sink(&self) -> &Arc<dyn NotificationSink> {
        &self.sink
    }

    /// The signer's current game, `None` if it never started one.
    pub async fn current_game(&self) -> Result<Option<GameSnapshot>> {
        let request = CallRequest::new(self.origin.clone(), json!({}));
        let response = self.transport.query(GET_CURRENT_GAME, &request).await?;
        if !response.success {
            return Err(Error::Query(response.reason()));
        }
        serde_json::from_value(response.value).map_err(|e| {
            Error::Query(format!("unexpected {GET_CURRENT_GAME} payload: {e}"))
        })
    }

    pub async fn start_new_game<F>(&self, min: i64, max: i64, on_complete: F) -> Result<PendingTx>
    where
        F: FnOnce() + Send + 'static,
    {
        let (min_number, max_number) = validate_range(min, max)?;
        let data = json!({ "min_number": min_number, "max_number": max_number });
        self.send(START_NEW_GAME, data, on_complete).await
    }

    pub async fn make_guess<F>(&self, guess: i64, on_complete: F) -> Result<PendingTx>
    where
        F: FnOnce() + Send + 'static,
    {
        let guess = to_u32("guess", guess)?;
        self.send(GUESS, json!({ "guess": guess }), on_complete).await
    }

    async fn send<F>(
        &self,
        method: &'static str,
        data: serde_json::Value,
        on_complete: F,
    ) -> Result<PendingTx>
    where
        F: FnOnce() + Send + 'static,
    {
        let request = CallRequest::new(self.origin.clone(), data);

        debug!(method, origin = %self.origin.short(), "dry run");
        let dry_run = match self.transport.query(method, &request).await {
            Ok(response) => response,
            Err(err) => {
                self.sink.error(format!("Error when dry run tx {err}"));
                return Err(err);
            }
        };
        if !dry_run.success {
            let reason = dry_run.reason();
            warn!(method, %reason, "dry run rejected; not submitting");
            self.sink.error(format!("Error when dry run tx {reason}"));
            return Err(Error::Simulation(reason));
        }

        info!(method, origin = %self.origin.short(), "submitting tx");
        let mut monitor = TransactionMonitor::new(self.sink.clone(), on_complete);
        let events = match self
            .transport
            .submit(method, &request, self.signer.as_ref())
            .await
        {
            Ok(events) => events,
            Err(err) => {
                let failure = match err {
                    Error::TransactionFailure(_) => err,
                    other => Error::TransactionFailure(other.to_string()),
                };
                monitor.on_error(failure.clone());
                return Err(failure);
            }
        };
        let task = tokio::spawn(monitor.run(events));
        Ok(PendingTx { task })
    }
}

fn to_u32(field: &str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        Error::validation(format!(
            "{field} must be between 0 and {}, got {value}",
            u32::MAX
        ))
    })
}

fn validate_range(min: i64, max: i64) -> Result<(u32, u32)> {
    let min_number = to_u32("min", min)?;
    let max_number = to_u32("max", max)?;
    if min_number >= max_number {
        return Err(Error::validation(format!(
            "min ({min_number}) must be lower than max ({max_number})"
        )));
    }
    Ok((min_number, max_number))
}

/// Parse form input: digits only, surrounding whitespace ignored.
pub fn parse_number(input: &str) -> Result<i64> {
    let trimmed = input.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::validation(format!("{input:?} is not a positive number")));
    }
    trimmed
        .parse()
        .map_err(|_| Error::validation(format!("{trimmed} is too large")))
}

/// Opens one session per signer and hands the same one back on every later request.
pub struct SessionPool<T, C> {
    config: ClientConfig,
    sink: Arc<dyn NotificationSink>,
    connector: C,
    sessions: Mutex<HashMap<PublicKey, Arc<GameSession<T>>>>,
}

impl<T, C> SessionPool<T, C>
where
    T: ContractTransport,
    C: Fn(&ClientConfig) -> Result<T>,
{
    pub fn new(config: ClientConfig, sink: Arc<dyn NotificationSink>, connector: C) -> Self {
        Self {
            config,
            sink,
            connector,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session_for(&self, signer: Option<Arc<dyn Signer>>) -> Result<Arc<GameSession<T>>> {
        let signer = signer.ok_or(Error::NoSigner)?;
        let key = signer.public_key();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = sessions.get(&key) {
            return Ok(session.clone());
        }

        let transport = (self.connector)(&self.config)?;
        let session = Arc::new(GameSession::new(transport, signer, self.sink.clone()));
        info!(
            origin = %session.origin().short(),
            rpc_url = %self.config.rpc_url,
            contract = %self.config.contract_address,
            "opened game session"
        );
        sessions.insert(key, session.clone());
        Ok(session)
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        notify::{
            Notice,
            NotificationBoard,
        },
        signer::KeypairSigner,
        transport::{
            QueryResponse,
            TxEvent,
            TxEventStream,
        },
        types::TxHash,
    };
    use futures::{
        StreamExt,
        stream,
    };
    use std::sync::atomic::{
        AtomicUsize,
        Ordering,
    };

    #[derive(Clone, Default)]
    struct FakeTransport {
        calls: Arc<Mutex<Vec<String>>>,
        snapshot: Option<GameSnapshot>,
        revert: Option<String>,
        submit_error: Option<Error>,
    }

    impl FakeTransport {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ContractTransport for FakeTransport {
        async fn query(&self, method: &str, _request: &CallRequest) -> Result<QueryResponse> {
            self.calls.lock().unwrap().push(format!("query:{method}"));
            if method == GET_CURRENT_GAME {
                return Ok(QueryResponse::ok(serde_json::to_value(&self.snapshot).unwrap()));
            }
            Ok(match &self.revert {
                Some(reason) => QueryResponse::revert(reason.clone()),
                None => QueryResponse::ok(serde_json::Value::Null),
            })
        }

        async fn submit(
            &self,
            method: &str,
            _request: &CallRequest,
            _signer: &dyn Signer,
        ) -> Result<TxEventStream> {
            self.calls.lock().unwrap().push(format!("submit:{method}"));
            if let Some(err) = &self.submit_error {
                return Err(err.clone());
            }
            let tx_hash = TxHash::new([2u8; 32]);
            let events = vec![
                Ok(TxEvent::Signed { tx_hash }),
                Ok(TxEvent::Broadcasted { tx_hash }),
                Ok(TxEvent::Finalized {
                    tx_hash,
                    block: 1,
                    dispatch_error: None,
                }),
            ];
            Ok(stream::iter(events).boxed())
        }
    }

    fn session(transport: FakeTransport, board: &NotificationBoard) -> GameSession<FakeTransport> {
        GameSession::new(
            transport,
            Arc::new(KeypairSigner::dev_account("alice")),
            Arc::new(board.clone()),
        )
    }

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = calls.clone();
        (calls, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn start_new_game__inverted_range_fails_before_network() {
        // given
        let transport = FakeTransport::default();
        let session = session(transport.clone(), &NotificationBoard::new());
        let (calls, on_complete) = counter();

        // when
        let result = session.start_new_game(5, 3, on_complete).await;

        // then
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(transport.calls().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn make_guess__negative_or_oversized_fails_before_network() {
        // given
        let transport = FakeTransport::default();
        let session = session(transport.clone(), &NotificationBoard::new());

        // when
        let negative = session.make_guess(-1, || {}).await;
        let oversized = session.make_guess(i64::from(u32::MAX) + 1, || {}).await;

        // then
        assert!(matches!(negative, Err(Error::Validation(_))));
        assert!(matches!(oversized, Err(Error::Validation(_))));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn make_guess__failing_dry_run_is_never_submitted() {
        // given
        let transport = FakeTransport {
            revert: Some("GameOver".to_string()),
            ..FakeTransport::default()
        };
        let board = NotificationBoard::new();
        let session = session(transport.clone(), &board);
        let (calls, on_complete) = counter();

        // when
        let result = session.make_guess(42, on_complete).await;

        // then
        assert_eq!(result.err(), Some(Error::Simulation("GameOver".to_string())));
        assert_eq!(transport.calls(), vec!["query:guess".to_string()]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            board.notices(),
            vec![Notice::error("Error when dry run tx GameOver")]
        );
    }

    #[tokio::test]
    async fn make_guess__rejected_submission_fails_without_callback() {
        // given
        let transport = FakeTransport {
            submit_error: Some(Error::network("connection reset")),
            ..FakeTransport::default()
        };
        let board = NotificationBoard::new();
        let session = session(transport.clone(), &board);
        let (calls, on_complete) = counter();

        // when
        let result = session.make_guess(42, on_complete).await;

        // then
        assert_eq!(
            result.err(),
            Some(Error::TransactionFailure(
                "network error: connection reset".to_string()
            ))
        );
        assert_eq!(
            transport.calls(),
            vec!["query:guess".to_string(), "submit:guess".to_string()]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            board.notices(),
            vec![Notice::error(
                "transaction failed: network error: connection reset"
            )]
        );
    }

    #[tokio::test]
    async fn make_guess__dry_runs_then_submits_and_completes() {
        // given
        let transport = FakeTransport::default();
        let session = session(transport.clone(), &NotificationBoard::new());
        let (calls, on_complete) = counter();

        // when
        let pending = session.make_guess(42, on_complete).await.unwrap();
        let outcome = pending.outcome().await;

        // then
        assert!(outcome.is_completed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            transport.calls(),
            vec!["query:guess".to_string(), "submit:guess".to_string()]
        );
    }

    #[tokio::test]
    async fn current_game__decodes_snapshot_for_origin() {
        // given
        let snapshot = GameSnapshot {
            game_number: 2,
            min_number: 1,
            max_number: 50,
            attempt: 0,
            last_guess: None,
            last_clue: None,
        };
        let transport = FakeTransport {
            snapshot: Some(snapshot.clone()),
            ..FakeTransport::default()
        };
        let session = session(transport, &NotificationBoard::new());

        // when
        let game = session.current_game().await.unwrap();

        // then
        assert_eq!(game, Some(snapshot));
    }

    #[test]
    fn parse_number__accepts_only_digits() {
        assert_eq!(parse_number(" 42 ").unwrap(), 42);
        assert_eq!(parse_number("0").unwrap(), 0);
        for bad in ["", "  ", "-1", "+3", "4.2", "abc", "1e3"] {
            assert!(
                matches!(parse_number(bad), Err(Error::Validation(_))),
                "{bad:?} should be rejected"
            );
        }
        assert!(matches!(
            parse_number("99999999999999999999"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn session_for__memoizes_per_signer() {
        // given
        let opened = Arc::new(AtomicUsize::new(0));
        let count = opened.clone();
        let pool = SessionPool::new(
            ClientConfig::default(),
            Arc::new(NotificationBoard::new()),
            move |_: &ClientConfig| {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(FakeTransport::default())
            },
        );
        let alice: Arc<dyn Signer> = Arc::new(KeypairSigner::dev_account("alice"));
        let bob: Arc<dyn Signer> = Arc::new(KeypairSigner::dev_account("bob"));

        // when
        let first = pool.session_for(Some(alice.clone())).unwrap();
        let second = pool.session_for(Some(alice)).unwrap();
        let other = pool.session_for(Some(bob)).unwrap();

        // then
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(opened.load(Ordering::SeqCst), 2);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn session_for__without_signer_fails() {
        // given
        let pool = SessionPool::new(
            ClientConfig::default(),
            Arc::new(NotificationBoard::new()),
            |_: &ClientConfig| Ok(FakeTransport::default()),
        );

        // when
        let result = pool.session_for(None);

        // then
        assert!(matches!(result, Err(Error::NoSigner)));
        assert!(pool.is_empty());
    }
}
