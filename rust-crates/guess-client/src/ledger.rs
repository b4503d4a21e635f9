//! Folding polled [`GameSnapshot`]s into an ordered, deduplicated attempt history.
//!
//! The contract only exposes the latest guess of the current game, so the history is built
//! up locally: every poll contributes at most one [`Attempt`], keyed by
//! `(game_number, attempt_index)`. Re-observing the same snapshot is a no-op and a clue that
//! arrives later replaces the pending entry in place.

use crate::types::{
    Attempt,
    GameSnapshot,
};
use tracing::debug;

/// Fold one snapshot into `ledger`.
///
/// Returns whether the ledger changed together with the resulting ledger. Snapshots with no
/// game, or with no guess yet, leave the ledger untouched.
pub fn fold(
    mut ledger: Vec<Attempt>,
    snapshot: Option<&GameSnapshot>,
) -> (bool, Vec<Attempt>) {
    let Some(candidate) = snapshot.and_then(Attempt::from_snapshot) else {
        return (false, ledger);
    };

    match ledger.iter().position(|a| a.key() == candidate.key()) {
        None => {
            ledger.push(candidate);
            (true, ledger)
        }
        Some(idx) if same_outcome(&ledger[idx], &candidate) => (false, ledger),
        Some(idx) => {
            ledger[idx] = candidate;
            (true, ledger)
        }
    }
}

/// Attempts belonging to `game_number`, in insertion order.
pub fn attempts_for_game(ledger: &[Attempt], game_number: u64) -> Vec<Attempt> {
    ledger
        .iter()
        .filter(|a| a.game_number == game_number)
        .cloned()
        .collect()
}

// absent clues compare equal
fn same_outcome(lhs: &Attempt, rhs: &Attempt) -> bool {
    lhs.guess == rhs.guess && lhs.clue == rhs.clue
}

/// Attempt history for one session.
///
/// The ledger follows a single game at a time: [`AttemptLedger::observe`] drops the history
/// as soon as a snapshot reports a different game number.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttemptLedger {
    game_number: Option<u64>,
    attempts: Vec<Attempt>,
}

impl AttemptLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh ledger seeded from one snapshot.
    pub fn from_snapshot(snapshot: Option<&GameSnapshot>) -> Self {
        let mut ledger = Self::new();
        ledger.observe(snapshot);
        ledger
    }

    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    pub fn current_game(&self) -> Option<u64> {
        self.game_number
    }

    pub fn attempts_for_game(&self, game_number: u64) -> Vec<Attempt> {
        attempts_for_game(&self.attempts, game_number)
    }

    /// Plain fold without the new-game reset.
    pub fn fold(&mut self, snapshot: Option<&GameSnapshot>) -> bool {
        let (updated, attempts) = fold(std::mem::take(&mut self.attempts), snapshot);
        self.attempts = attempts;
        updated
    }

    /// Fold `snapshot`, first discarding the history if it belongs to another game.
    pub fn observe(&mut self, snapshot: Option<&GameSnapshot>) -> bool {
        let game_number = snapshot.map(|s| s.game_number);
        if game_number == self.game_number {
            return self.fold(snapshot);
        }

        debug!(
            previous = ?self.game_number,
            current = ?game_number,
            dropped = self.attempts.len(),
            "game changed; resetting attempt ledger"
        );
        let had_attempts = !self.attempts.is_empty();
        self.reset();
        self.game_number = game_number;
        self.fold(snapshot) || had_attempts
    }

    pub fn reset(&mut self) {
        self.game_number = None;
        self.attempts.clear();
    }
}
