//! In-process stand-in for the guess-the-number contract, used by `--local` mode and tests.
//!
//! Each origin has at most one game. A guess is executed when its transaction lands in a
//! block; the clue is published `clue_delay` after finalization, the way the deployed
//! contract resolves clues a few blocks later.

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
    signer::{
        Signer,
        verify,
    },
    types::{
        Address,
        Clue,
        GameSnapshot,
        TxHash,
    },
};
use futures::StreamExt;
use rand::{
    Rng,
    SeedableRng,
    rngs::StdRng,
};
use serde::Deserialize;
use sha2::{
    Digest,
    Sha256,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
    time::Duration,
};
use tokio::{
    sync::mpsc,
    time,
};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{
    debug,
    info,
};

pub const REVERT_INVALID_RANGE: &str = "InvalidRange";
pub const REVERT_NO_GAME: &str = "NoGame";
pub const REVERT_OUT_OF_RANGE: &str = "GuessOutOfRange";
pub const REVERT_GAME_OVER: &str = "GameOver";
pub const REVERT_CLUE_PENDING: &str = "ClueNotYetAvailable";

#[derive(Clone, Debug)]
pub struct LocalChainConfig {
    pub block_time: Duration,
    pub clue_delay: Duration,
    pub seed: u64,
}

impl Default for LocalChainConfig {
    fn default() -> Self {
        Self {
            block_time: Duration::from_millis(800),
            clue_delay: Duration::from_secs(2),
            seed: rand::random(),
        }
    }
}

#[derive(Clone)]
pub struct LocalChain {
    config: LocalChainConfig,
    state: Arc<Mutex<ChainState>>,
}

struct ChainState {
    rng: StdRng,
    games: HashMap<Address, LocalGame>,
    game_counter: u64,
    block: u64,
    nonce: u64,
    queries: usize,
    submissions: usize,
}

struct LocalGame {
    snapshot: GameSnapshot,
    secret: u32,
}

#[derive(Clone, Copy, Debug)]
enum Call {
    GetCurrentGame,
    StartNewGame { min_number: u32, max_number: u32 },
    Guess { guess: u32 },
}

#[derive(Deserialize)]
struct StartNewGameArgs {
    min_number: u32,
    max_number: u32,
}

#[derive(Deserialize)]
struct GuessArgs {
    guess: u32,
}

impl Call {
    fn decode(method: &str, data: &serde_json::Value) -> std::result::Result<Self, String> {
        let bad_args = |e: serde_json::Error| format!("DecodeArgs: {e}");
        match method {
            "get_current_game" => Ok(Call::GetCurrentGame),
            "start_new_game" => {
                let args: StartNewGameArgs =
                    serde_json::from_value(data.clone()).map_err(bad_args)?;
                Ok(Call::StartNewGame {
                    min_number: args.min_number,
                    max_number: args.max_number,
                })
            }
            "guess" => {
                let args: GuessArgs = serde_json::from_value(data.clone()).map_err(bad_args)?;
                Ok(Call::Guess { guess: args.guess })
            }
            other => Err(format!("UnknownMethod: {other}")),
        }
    }
}

impl Default for LocalChain {
    fn default() -> Self {
        Self::new(LocalChainConfig::default())
    }
}

impl LocalChain {
    pub fn new(config: LocalChainConfig) -> Self {
        let state = ChainState {
            rng: StdRng::seed_from_u64(config.seed),
            games: HashMap::new(),
            game_counter: 0,
            block: 0,
            nonce: 0,
            queries: 0,
            submissions: 0,
        };
        Self {
            config,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Queries served so far, dry runs included.
    pub fn query_count(&self) -> usize {
        self.lock().queries
    }

    pub fn submission_count(&self) -> usize {
        self.lock().submissions
    }

    pub fn block_number(&self) -> u64 {
        self.lock().block
    }

    /// The number `origin` is trying to find, if a game is running.
    pub fn secret_of(&self, origin: &Address) -> Option<u32> {
        self.lock().games.get(origin).map(|game| game.secret)
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn drive(
        self,
        call: Call,
        origin: Address,
        tx_hash: TxHash,
        events: mpsc::UnboundedSender<Result<TxEvent>>,
    ) {
        let block_time = self.config.block_time;
        // the receiver may be gone; the transaction still lands
        let _ = events.send(Ok(TxEvent::Signed { tx_hash }));
        time::sleep(block_time).await;
        let _ = events.send(Ok(TxEvent::Broadcasted { tx_hash }));
        time::sleep(block_time).await;

        let (block, outcome) = {
            let mut state = self.lock();
            state.block += 1;
            let block = state.block;
            (block, state.execute(call, &origin))
        };
        let dispatch_error = outcome.as_ref().err().cloned();
        debug!(%tx_hash, block, ?dispatch_error, "local transaction included");
        let _ = events.send(Ok(TxEvent::BestBlock {
            tx_hash,
            block,
            dispatch_error: dispatch_error.clone(),
        }));
        time::sleep(block_time).await;
        let _ = events.send(Ok(TxEvent::Finalized {
            tx_hash,
            block,
            dispatch_error,
        }));
        drop(events);

        if let Ok(Some(attempt)) = outcome {
            time::sleep(self.config.clue_delay).await;
            self.lock().publish_clue(&origin, attempt);
        }
    }
}

impl ChainState {
    fn check(&self, call: Call, origin: &Address) -> std::result::Result<(), String> {
        match call {
            Call::GetCurrentGame => Ok(()),
            Call::StartNewGame {
                min_number,
                max_number,
            } => {
                if min_number >= max_number {
                    return Err(REVERT_INVALID_RANGE.to_string());
                }
                Ok(())
            }
            Call::Guess { guess } => {
                let game = self
                    .games
                    .get(origin)
                    .ok_or_else(|| REVERT_NO_GAME.to_string())?;
                let snapshot = &game.snapshot;
                if snapshot.is_found() {
                    return Err(REVERT_GAME_OVER.to_string());
                }
                if snapshot.last_guess.is_some() && snapshot.last_clue.is_none() {
                    return Err(REVERT_CLUE_PENDING.to_string());
                }
                if guess < snapshot.min_number || guess > snapshot.max_number {
                    return Err(REVERT_OUT_OF_RANGE.to_string());
                }
                Ok(())
            }
        }
    }

    /// Apply `call`; a guess yields the attempt index whose clue is still to be published.
    fn execute(
        &mut self,
        call: Call,
        origin: &Address,
    ) -> std::result::Result<Option<u32>, String> {
        self.check(call, origin)?;
        match call {
            Call::GetCurrentGame => Ok(None),
            Call::StartNewGame {
                min_number,
                max_number,
            } => {
                self.game_counter += 1;
                let secret = self.rng.random_range(min_number..=max_number);
                let snapshot = GameSnapshot {
                    game_number: self.game_counter,
                    min_number,
                    max_number,
                    attempt: 0,
                    last_guess: None,
                    last_clue: None,
                };
                info!(origin = %origin.short(), game_number = self.game_counter, "local game started");
                self.games
                    .insert(origin.clone(), LocalGame { snapshot, secret });
                Ok(None)
            }
            Call::Guess { guess } => {
                let Some(game) = self.games.get_mut(origin) else {
                    return Err(REVERT_NO_GAME.to_string());
                };
                game.snapshot.attempt += 1;
                game.snapshot.last_guess = Some(guess);
                game.snapshot.last_clue = None;
                Ok(Some(game.snapshot.attempt))
            }
        }
    }

    fn publish_clue(&mut self, origin: &Address, attempt: u32) {
        let Some(game) = self.games.get_mut(origin) else {
            return;
        };
        let (Some(guess), true) = (game.snapshot.last_guess, game.snapshot.attempt == attempt)
        else {
            return;
        };
        let clue = match guess.cmp(&game.secret) {
            std::cmp::Ordering::Greater => Clue::TooHigh,
            std::cmp::Ordering::Less => Clue::TooLow,
            std::cmp::Ordering::Equal => Clue::Found,
        };
        debug!(origin = %origin.short(), attempt, ?clue, "local clue published");
        game.snapshot.last_clue = Some(clue);
    }

    fn current_game(&self, origin: &Address) -> Option<GameSnapshot> {
        self.games.get(origin).map(|game| game.snapshot.clone())
    }
}

impl ContractTransport for LocalChain {
    async fn query(&self, method: &str, request: &CallRequest) -> Result<QueryResponse> {
        let mut state = self.lock();
        state.queries += 1;
        let call = match Call::decode(method, &request.data) {
            Ok(call) => call,
            Err(reason) => return Ok(QueryResponse::revert(reason)),
        };
        if let Call::GetCurrentGame = call {
            let value = serde_json::to_value(state.current_game(&request.origin))
                .map_err(Error::network)?;
            return Ok(QueryResponse::ok(value));
        }
        Ok(match state.check(call, &request.origin) {
            Ok(()) => QueryResponse::ok(serde_json::Value::Null),
            Err(reason) => QueryResponse::revert(reason),
        })
    }

    async fn submit(
        &self,
        method: &str,
        request: &CallRequest,
        signer: &dyn Signer,
    ) -> Result<TxEventStream> {
        let payload = signing_payload(method, request);
        let signature = signer.sign(&payload);
        if !verify(&request.origin, &payload, &signature) {
            return Err(Error::TransactionFailure(format!(
                "bad signature for origin {}",
                request.origin
            )));
        }
        let call = Call::decode(method, &request.data).map_err(Error::TransactionFailure)?;

        let tx_hash = {
            let mut state = self.lock();
            state.submissions += 1;
            state.nonce += 1;
            let mut hasher = Sha256::new();
            hasher.update(&payload);
            hasher.update(state.nonce.to_le_bytes());
            let mut bytes = [0u8; 32];
            bytes.copy_from_slice(&hasher.finalize());
            TxHash::new(bytes)
        };

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.clone().drive(call, request.origin.clone(), tx_hash, tx));
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::signer::KeypairSigner;
    use futures::StreamExt;
    use serde_json::json;

    fn chain() -> LocalChain {
        LocalChain::new(LocalChainConfig {
            block_time: Duration::from_millis(10),
            clue_delay: Duration::from_millis(50),
            seed: 7,
        })
    }

    async fn current_game(chain: &LocalChain, origin: &Address) -> Option<GameSnapshot> {
        let response = chain
            .query("get_current_game", &CallRequest::new(origin.clone(), json!({})))
            .await
            .unwrap();
        serde_json::from_value(response.value).unwrap()
    }

    async fn send(
        chain: &LocalChain,
        signer: &KeypairSigner,
        method: &str,
        data: serde_json::Value,
    ) -> Vec<Result<TxEvent>> {
        let request = CallRequest::new(signer.address(), data);
        chain
            .submit(method, &request, signer)
            .await
            .unwrap()
            .collect()
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn query__unknown_origin_has_no_game() {
        // given
        let chain = chain();
        let alice = KeypairSigner::dev_account("alice");

        // when
        let game = current_game(&chain, &alice.address()).await;

        // then
        assert_eq!(game, None);
        assert_eq!(chain.query_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dry_run__reports_contract_reverts_without_mutating() {
        // given
        let chain = chain();
        let alice = KeypairSigner::dev_account("alice");
        let request = |data| CallRequest::new(alice.address(), data);

        // when
        let bad_range = chain
            .query("start_new_game", &request(json!({"min_number": 5, "max_number": 3})))
            .await
            .unwrap();
        let no_game = chain
            .query("guess", &request(json!({"guess": 1})))
            .await
            .unwrap();

        // then
        assert_eq!(bad_range, QueryResponse::revert(REVERT_INVALID_RANGE));
        assert_eq!(no_game, QueryResponse::revert(REVERT_NO_GAME));
        assert_eq!(chain.submission_count(), 0);
        assert_eq!(current_game(&chain, &alice.address()).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn submit__emits_lifecycle_then_ends() {
        // given
        let chain = chain();
        let alice = KeypairSigner::dev_account("alice");

        // when
        let events = send(
            &chain,
            &alice,
            "start_new_game",
            json!({"min_number": 1, "max_number": 10}),
        )
        .await;

        // then
        let events: Vec<_> = events.into_iter().map(Result::unwrap).collect();
        assert!(matches!(events[0], TxEvent::Signed { .. }));
        assert!(matches!(events[1], TxEvent::Broadcasted { .. }));
        assert!(matches!(
            events[2],
            TxEvent::BestBlock {
                dispatch_error: None,
                ..
            }
        ));
        assert!(matches!(
            events[3],
            TxEvent::Finalized {
                block: 1,
                dispatch_error: None,
                ..
            }
        ));
        assert_eq!(events.len(), 4);
        let game = current_game(&chain, &alice.address()).await.unwrap();
        assert_eq!(game.game_number, 1);
        assert_eq!((game.min_number, game.max_number), (1, 10));
        let secret = chain.secret_of(&alice.address()).unwrap();
        assert!((1..=10).contains(&secret));
    }

    #[tokio::test(start_paused = true)]
    async fn submit__reverting_call_is_reported_as_dispatch_error() {
        // given
        let chain = chain();
        let alice = KeypairSigner::dev_account("alice");

        // when
        let events = send(&chain, &alice, "guess", json!({"guess": 3})).await;

        // then
        assert_eq!(
            events.last().cloned().unwrap().unwrap(),
            TxEvent::Finalized {
                tx_hash: events[0].clone().unwrap().tx_hash(),
                block: 1,
                dispatch_error: Some(REVERT_NO_GAME.to_string()),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn guess__clue_is_published_after_delay() {
        // given
        let chain = chain();
        let alice = KeypairSigner::dev_account("alice");
        send(
            &chain,
            &alice,
            "start_new_game",
            json!({"min_number": 1, "max_number": 100}),
        )
        .await;
        let secret = chain.secret_of(&alice.address()).unwrap();

        // when
        send(&chain, &alice, "guess", json!({"guess": secret})).await;
        let pending = current_game(&chain, &alice.address()).await.unwrap();
        time::sleep(Duration::from_millis(60)).await;
        let resolved = current_game(&chain, &alice.address()).await.unwrap();

        // then
        assert_eq!(pending.attempt, 1);
        assert_eq!(pending.last_guess, Some(secret));
        assert_eq!(pending.last_clue, None);
        assert_eq!(resolved.last_clue, Some(Clue::Found));
        let after_win = chain
            .query(
                "guess",
                &CallRequest::new(alice.address(), json!({"guess": secret})),
            )
            .await
            .unwrap();
        assert_eq!(after_win, QueryResponse::revert(REVERT_GAME_OVER));
    }

    #[tokio::test(start_paused = true)]
    async fn games__are_kept_per_origin_with_global_numbering() {
        // given
        let chain = chain();
        let alice = KeypairSigner::dev_account("alice");
        let bob = KeypairSigner::dev_account("bob");
        let range = json!({"min_number": 1, "max_number": 10});

        // when
        send(&chain, &alice, "start_new_game", range.clone()).await;
        send(&chain, &bob, "start_new_game", range).await;

        // then
        let alice_game = current_game(&chain, &alice.address()).await.unwrap();
        let bob_game = current_game(&chain, &bob.address()).await.unwrap();
        assert_eq!(alice_game.game_number, 1);
        assert_eq!(bob_game.game_number, 2);
    }
}
