use crate::{
    Result,
    ledger::attempts_for_game,
    poller::{
        self,
        GameView,
        PollerHandle,
        RefreshKind,
    },
    session::{
        GameSession,
        PendingTx,
    },
    transport::ContractTransport,
    types::{
        Attempt,
        GameSnapshot,
    },
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::sync::watch;

/// Game state and commands for one connected account. Switching accounts means building a
/// new view model; the old poller stops when this one is dropped.
pub struct GameViewModel<T> {
    session: Arc<GameSession<T>>,
    poller: PollerHandle,
    view: watch::Receiver<GameView>,
}

impl<T: ContractTransport> GameViewModel<T> {
    pub fn new(session: Arc<GameSession<T>>, poll_interval: Duration) -> Self {
        let poller = poller::spawn(session.clone(), poll_interval);
        let view = poller.subscribe();
        Self {
            session,
            poller,
            view,
        }
    }

    pub fn session(&self) -> &Arc<GameSession<T>> {
        &self.session
    }

    pub fn view(&self) -> GameView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GameView> {
        self.poller.subscribe()
    }

    pub fn current_game(&self) -> Option<GameSnapshot> {
        self.view.borrow().current_game.clone()
    }

    /// Attempts of the current game only.
    pub fn attempts(&self) -> Vec<Attempt> {
        let view = self.view.borrow();
        match &view.current_game {
            Some(game) => attempts_for_game(&view.attempts, game.game_number),
            None => Vec::new(),
        }
    }

    /// Wait for the next published view; `false` once the poller is gone.
    pub async fn changed(&mut self) -> bool {
        self.view.changed().await.is_ok()
    }

    pub async fn start_new_game(&self, min: i64, max: i64) -> Result<PendingTx> {
        let on_complete = self.poller.refresher().callback(RefreshKind::Game);
        self.session.start_new_game(min, max, on_complete).await
    }

    pub async fn make_guess(&self, guess: i64) -> Result<PendingTx> {
        let on_complete = self.poller.refresher().callback(RefreshKind::Attempts);
        self.session.make_guess(guess, on_complete).await
    }

    pub fn refresh_now(&self) {
        self.poller.refresher().request(RefreshKind::Attempts);
    }

    pub async fn shutdown(self) {
        self.poller.shutdown().await;
    }
}
