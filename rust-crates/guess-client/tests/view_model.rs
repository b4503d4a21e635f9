#![allow(non_snake_case)]

use guess_client::{
    Error,
    notify::NotificationBoard,
    poller::GameView,
    session::GameSession,
    signer::{
        KeypairSigner,
        Signer,
    },
    transport::{
        LocalChain,
        LocalChainConfig,
    },
    types::Clue,
    view::GameViewModel,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::watch,
    time,
};

const POLL: Duration = Duration::from_secs(10);

fn local_chain() -> LocalChain {
    LocalChain::new(LocalChainConfig {
        block_time: Duration::from_millis(100),
        clue_delay: Duration::from_secs(1),
        seed: 42,
    })
}

fn view_model(chain: &LocalChain, account: &str) -> GameViewModel<LocalChain> {
    let signer: Arc<dyn Signer> = Arc::new(KeypairSigner::dev_account(account));
    let session = GameSession::new(chain.clone(), signer, Arc::new(NotificationBoard::new()));
    GameViewModel::new(Arc::new(session), POLL)
}

async fn wait_for(view: &mut watch::Receiver<GameView>, condition: impl FnMut(&GameView) -> bool) {
    time::timeout(Duration::from_secs(120), view.wait_for(condition))
        .await
        .expect("view did not reach expected state")
        .expect("poller stopped");
}

#[tokio::test(start_paused = true)]
async fn view_model__plays_a_full_game_against_local_chain() {
    // given
    let chain = local_chain();
    let model = view_model(&chain, "alice");
    let mut view = model.subscribe();
    let origin = model.session().origin().clone();
    time::sleep(Duration::from_millis(1)).await;
    assert_eq!(model.current_game(), None);

    // when a game is started
    let started = model.start_new_game(1, 100).await.unwrap();
    assert!(started.outcome().await.is_completed());
    wait_for(&mut view, |v| v.current_game.is_some()).await;

    // then
    let game = model.current_game().unwrap();
    assert_eq!((game.min_number, game.max_number), (1, 100));
    assert!(model.attempts().is_empty());

    // when a wrong guess lands
    let secret = chain.secret_of(&origin).unwrap();
    let wrong = if secret > 1 { secret - 1 } else { secret + 1 };
    let pending = model.make_guess(i64::from(wrong)).await.unwrap();
    assert!(pending.outcome().await.is_completed());
    wait_for(&mut view, |v| v.attempts.len() == 1).await;

    // then the clue shows up on a later poll, in place
    wait_for(&mut view, |v| v.attempts[0].clue.is_some()).await;
    let attempts = model.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].guess, wrong);
    let expected = if wrong > secret {
        Clue::TooHigh
    } else {
        Clue::TooLow
    };
    assert_eq!(attempts[0].clue, Some(expected));

    // when the right number is guessed
    let pending = model.make_guess(i64::from(secret)).await.unwrap();
    assert!(pending.outcome().await.is_completed());
    wait_for(&mut view, |v| {
        v.attempts.len() == 2 && v.attempts[1].clue == Some(Clue::Found)
    })
    .await;

    // then the game is over
    assert!(model.current_game().unwrap().is_found());
    let submissions = chain.submission_count();
    let result = model.make_guess(i64::from(secret)).await;
    assert!(matches!(result, Err(Error::Simulation(_))));
    assert_eq!(chain.submission_count(), submissions);
}

#[tokio::test(start_paused = true)]
async fn view_model__new_game_replaces_attempt_history() {
    // given
    let chain = local_chain();
    let model = view_model(&chain, "alice");
    let mut view = model.subscribe();
    let origin = model.session().origin().clone();
    model
        .start_new_game(1, 10)
        .await
        .unwrap()
        .outcome()
        .await;
    wait_for(&mut view, |v| v.current_game.is_some()).await;
    let secret = chain.secret_of(&origin).unwrap();
    model
        .make_guess(i64::from(secret))
        .await
        .unwrap()
        .outcome()
        .await;
    wait_for(&mut view, |v| v.attempts.len() == 1).await;
    let first_game = model.current_game().unwrap().game_number;

    // when
    model
        .start_new_game(20, 30)
        .await
        .unwrap()
        .outcome()
        .await;
    wait_for(&mut view, |v| {
        v.current_game
            .as_ref()
            .is_some_and(|g| g.game_number != first_game)
    })
    .await;

    // then
    assert!(model.attempts().is_empty());
    assert_eq!(model.current_game().unwrap().min_number, 20);
}

#[tokio::test(start_paused = true)]
async fn view_model__accounts_see_only_their_own_game() {
    // given
    let chain = local_chain();
    let alice = view_model(&chain, "alice");
    let mut alice_view = alice.subscribe();
    alice
        .start_new_game(1, 10)
        .await
        .unwrap()
        .outcome()
        .await;
    wait_for(&mut alice_view, |v| v.current_game.is_some()).await;

    // when
    let bob = view_model(&chain, "bob");
    time::sleep(Duration::from_millis(1)).await;

    // then
    assert_eq!(bob.current_game(), None);
    assert!(bob.attempts().is_empty());
    alice.shutdown().await;
    bob.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn view_model__invalid_input_never_reaches_chain() {
    // given
    let chain = local_chain();
    let model = view_model(&chain, "alice");
    time::sleep(Duration::from_millis(1)).await;
    let queries = chain.query_count();

    // when
    let inverted = model.start_new_game(5, 3).await;
    let negative = model.make_guess(-1).await;

    // then
    assert!(matches!(inverted, Err(Error::Validation(_))));
    assert!(matches!(negative, Err(Error::Validation(_))));
    assert_eq!(chain.query_count(), queries);
    assert_eq!(chain.submission_count(), 0);
}
