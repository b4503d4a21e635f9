//! Background worker that owns a session's [`AttemptLedger`] and republishes the game view.
//!
//! Three triggers feed the same fold: the periodic timer, explicit refresh requests (sent by
//! transaction callbacks) and the initial load when the poller starts for a signer. Only the
//! worker touches the ledger, so folds never race each other.

use crate::{
    ledger::AttemptLedger,
    session::GameSession,
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
use tokio::{
    sync::{
        mpsc,
        watch,
    },
    task::JoinHandle,
    time::{
        self,
        Instant,
        MissedTickBehavior,
    },
};
use tracing::{
    debug,
    info,
    warn,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshKind {
    /// Reload the game and rebuild the ledger from scratch.
    Game,
    /// Fold the latest snapshot into the existing ledger.
    Attempts,
}

#[derive(Debug)]
enum PollCommand {
    Refresh(RefreshKind),
    Shutdown,
}

/// What the UI renders for one signer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GameView {
    pub current_game: Option<GameSnapshot>,
    pub attempts: Vec<Attempt>,
}

/// Cloneable trigger for out-of-band refreshes.
#[derive(Clone)]
pub struct Refresher {
    commands: mpsc::UnboundedSender<PollCommand>,
}

impl Refresher {
    pub fn request(&self, kind: RefreshKind) {
        if self.commands.send(PollCommand::Refresh(kind)).is_err() {
            debug!(?kind, "poller stopped; dropping refresh request");
        }
    }

    /// A transaction callback that requests `kind`.
    pub fn callback(&self, kind: RefreshKind) -> impl FnOnce() + Send + 'static {
        let refresher = self.clone();
        move || refresher.request(kind)
    }
}

pub struct PollerHandle {
    commands: mpsc::UnboundedSender<PollCommand>,
    view: watch::Receiver<GameView>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn refresher(&self) -> Refresher {
        Refresher {
            commands: self.commands.clone(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<GameView> {
        self.view.clone()
    }

    pub fn view(&self) -> GameView {
        self.view.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the worker and wait for it to exit.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(PollCommand::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(?err, "poller task ended abnormally");
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Start polling `session` every `interval`. The first load happens immediately.
pub fn spawn<T: ContractTransport>(
    session: Arc<GameSession<T>>,
    interval: Duration,
) -> PollerHandle {
    let (commands, receiver) = mpsc::unbounded_channel();
    let (publisher, view) = watch::channel(GameView::default());
    let task = tokio::spawn(poll_worker(session, interval, receiver, publisher));
    PollerHandle {
        commands,
        view,
        task: Some(task),
    }
}

async fn poll_worker<T: ContractTransport>(
    session: Arc<GameSession<T>>,
    interval: Duration,
    mut commands: mpsc::UnboundedReceiver<PollCommand>,
    publisher: watch::Sender<GameView>,
) {
    info!(origin = %session.origin().short(), ?interval, "poller started");
    let mut ledger = AttemptLedger::new();
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    refresh(&session, &mut ledger, &publisher, RefreshKind::Game).await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                refresh(&session, &mut ledger, &publisher, RefreshKind::Attempts).await;
            }
            command = commands.recv() => match command {
                Some(PollCommand::Refresh(kind)) => {
                    refresh(&session, &mut ledger, &publisher, kind).await;
                }
                Some(PollCommand::Shutdown) | None => break,
            },
        }
    }
    info!(origin = %session.origin().short(), "poller stopped");
}

async fn refresh<T: ContractTransport>(
    session: &GameSession<T>,
    ledger: &mut AttemptLedger,
    publisher: &watch::Sender<GameView>,
    kind: RefreshKind,
) {
    let snapshot = match session.current_game().await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(?err, ?kind, "failed to refresh game state; keeping last view");
            return;
        }
    };
    let changed = match kind {
        RefreshKind::Game => {
            *ledger = AttemptLedger::from_snapshot(snapshot.as_ref());
            true
        }
        RefreshKind::Attempts => ledger.observe(snapshot.as_ref()),
    };
    debug!(?kind, changed, attempts = ledger.attempts().len(), "refreshed game state");

    let next = GameView {
        current_game: snapshot,
        attempts: ledger.attempts().to_vec(),
    };
    publisher.send_if_modified(|current| {
        if *current == next {
            return false;
        }
        *current = next;
        true
    });
}
