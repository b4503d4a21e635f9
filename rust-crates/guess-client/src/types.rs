use crate::{
    Error,
    Result,
    signer::PublicKey,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    str::FromStr,
};

/// Feedback for a guess. Wire names follow the contract: `Less` means the secret number is
/// less than the guess.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Clue {
    #[serde(rename = "Less")]
    TooHigh,
    #[serde(rename = "More")]
    TooLow,
    Found,
}

/// Contract state for the caller's current game, as returned by `get_current_game`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub game_number: u64,
    pub min_number: u32,
    pub max_number: u32,
    /// Guesses made so far in this game.
    pub attempt: u32,
    #[serde(default)]
    pub last_guess: Option<u32>,
    #[serde(default)]
    pub last_clue: Option<Clue>,
}

impl GameSnapshot {
    pub fn is_found(&self) -> bool {
        self.last_clue == Some(Clue::Found)
    }

    pub fn headline(&self) -> String {
        format!(
            "Game {} - Guess the number between {} and {}",
            self.game_number, self.min_number, self.max_number
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attempt {
    pub game_number: u64,
    pub attempt_index: u32,
    pub guess: u32,
    pub clue: Option<Clue>,
}

impl Attempt {
    /// The attempt a snapshot reports, if a guess has been made.
    pub fn from_snapshot(snapshot: &GameSnapshot) -> Option<Self> {
        let guess = snapshot.last_guess?;
        Some(Self {
            game_number: snapshot.game_number,
            attempt_index: snapshot.attempt,
            guess,
            clue: snapshot.last_clue,
        })
    }

    pub fn key(&self) -> (u64, u32) {
        (self.game_number, self.attempt_index)
    }

    pub fn describe(&self) -> String {
        let n = self.attempt_index;
        let g = self.guess;
        match self.clue {
            None => format!("Attempt {n} - Waiting for the result for number {g}"),
            Some(Clue::TooHigh) => format!("Attempt {n} - My number is less than {g}"),
            Some(Clue::TooLow) => format!("Attempt {n} - My number is more than {g}"),
            Some(Clue::Found) => {
                format!("Attempt {n} - Congrats, you found the number {g} !")
            }
        }
    }
}

/// Account address derived from a signer's public key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn from_public_key(key: &PublicKey) -> Self {
        Self(format!("0x{}", hex::encode(key.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Public key bytes, for addresses produced by [`Address::from_public_key`].
    pub fn public_key(&self) -> Option<PublicKey> {
        let raw = hex::decode(self.0.strip_prefix("0x")?).ok()?;
        let bytes: [u8; 32] = raw.try_into().ok()?;
        Some(PublicKey::from_bytes(bytes))
    }

    pub fn short(&self) -> String {
        if self.0.len() <= 14 {
            return self.0.clone();
        }
        format!("{}…{}", &self.0[..8], &self.0[self.0.len() - 6..])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 20-byte contract address, `0x`-prefixed hex.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContractAddress(String);

impl ContractAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The published guess-the-number deployment.
impl Default for ContractAddress {
    fn default() -> Self {
        Self(crate::config::DEFAULT_CONTRACT_ADDRESS.to_string())
    }
}

impl FromStr for ContractAddress {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .ok_or_else(|| Error::validation(format!("contract address {raw:?} must start with 0x")))?;
        if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::validation(format!(
                "contract address {raw:?} must be 20 bytes of hex"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for ContractAddress {
    type Error = Error;

    fn try_from(raw: String) -> Result<Self> {
        raw.parse()
    }
}

impl From<ContractAddress> for String {
    fn from(address: ContractAddress) -> Self {
        address.0
    }
}

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TxHash([u8; 32]);

impl TxHash {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for TxHash {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let digits = raw.strip_prefix("0x").unwrap_or(raw);
        let bytes = hex::decode(digits)
            .map_err(|e| Error::network(format!("malformed tx hash {raw:?}: {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::network(format!("tx hash {raw:?} is not 32 bytes")))?;
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn game_snapshot__decodes_contract_field_names_and_clue_wire_names() {
        // given
        let json = r#"{
            "game_number": 3,
            "min_number": 1,
            "max_number": 100,
            "attempt": 2,
            "last_guess": 50,
            "last_clue": "Less"
        }"#;

        // when
        let snapshot: GameSnapshot = serde_json::from_str(json).unwrap();

        // then
        assert_eq!(snapshot.last_clue, Some(Clue::TooHigh));
        assert_eq!(snapshot.attempt, 2);
        assert_eq!(
            snapshot.headline(),
            "Game 3 - Guess the number between 1 and 100"
        );
    }

    #[test]
    fn game_snapshot__missing_optionals_decode_as_absent() {
        // given
        let json = r#"{"game_number": 1, "min_number": 0, "max_number": 9, "attempt": 0}"#;

        // when
        let snapshot: GameSnapshot = serde_json::from_str(json).unwrap();

        // then
        assert_eq!(snapshot.last_guess, None);
        assert_eq!(snapshot.last_clue, None);
        assert!(Attempt::from_snapshot(&snapshot).is_none());
    }

    #[test]
    fn describe__renders_each_clue() {
        let mut attempt = Attempt {
            game_number: 1,
            attempt_index: 4,
            guess: 42,
            clue: None,
        };
        assert_eq!(
            attempt.describe(),
            "Attempt 4 - Waiting for the result for number 42"
        );
        attempt.clue = Some(Clue::TooHigh);
        assert_eq!(attempt.describe(), "Attempt 4 - My number is less than 42");
        attempt.clue = Some(Clue::TooLow);
        assert_eq!(attempt.describe(), "Attempt 4 - My number is more than 42");
        attempt.clue = Some(Clue::Found);
        assert_eq!(
            attempt.describe(),
            "Attempt 4 - Congrats, you found the number 42 !"
        );
    }

    #[test]
    fn contract_address__rejects_wrong_length_and_missing_prefix() {
        assert!(
            "0xD6Ad3e67e2514bED804acc45945A7a102C4c6Ae4"
                .parse::<ContractAddress>()
                .is_ok()
        );
        assert!(matches!(
            "D6Ad3e67e2514bED804acc45945A7a102C4c6Ae4".parse::<ContractAddress>(),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            "0xD6Ad".parse::<ContractAddress>(),
            Err(Error::Validation(_))
        ));
        assert_eq!(
            ContractAddress::default().as_str().parse::<ContractAddress>(),
            Ok(ContractAddress::default())
        );
    }

    #[test]
    fn tx_hash__parses_its_own_display() {
        // given
        let hash = TxHash::new([7u8; 32]);

        // when
        let parsed: TxHash = hash.to_string().parse().unwrap();

        // then
        assert_eq!(parsed, hash);
    }
}
