use crate::{
    Error,
    Result,
    types::Address,
};
use ed25519_dalek::{
    Signer as _,
    SigningKey,
    Verifier as _,
    VerifyingKey,
};
use sha2::{
    Digest,
    Sha256,
};
use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey(0x{})", hex::encode(self.0))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 64]);

impl Signature {
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

/// Signing capability of a connected wallet.
pub trait Signer: Send + Sync {
    fn public_key(&self) -> PublicKey;

    fn sign(&self, payload: &[u8]) -> Signature;

    fn address(&self) -> Address {
        Address::from_public_key(&self.public_key())
    }
}

/// Ed25519 keypair held in memory.
pub struct KeypairSigner {
    name: String,
    key: SigningKey,
}

impl KeypairSigner {
    pub fn from_seed(name: impl Into<String>, seed: [u8; 32]) -> Self {
        Self {
            name: name.into(),
            key: SigningKey::from_bytes(&seed),
        }
    }

    /// Build from decrypted keystore material, which must be a raw 32-byte secret.
    pub fn from_secret_bytes(name: impl Into<String>, secret: &[u8]) -> Result<Self> {
        let name = name.into();
        let seed: [u8; 32] = secret.try_into().map_err(|_| {
            Error::validation(format!(
                "wallet '{name}' holds {} bytes of key material, expected 32",
                secret.len()
            ))
        })?;
        Ok(Self::from_seed(name, seed))
    }

    /// Deterministic development account; the seed is the SHA-256 of the name.
    pub fn dev_account(name: &str) -> Self {
        let digest = Sha256::digest(name.as_bytes());
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&digest);
        Self::from_seed(name, seed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for KeypairSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeypairSigner")
            .field("name", &self.name)
            .field("public_key", &self.public_key())
            .finish()
    }
}

impl Signer for KeypairSigner {
    fn public_key(&self) -> PublicKey {
        PublicKey(self.key.verifying_key().to_bytes())
    }

    fn sign(&self, payload: &[u8]) -> Signature {
        Signature(self.key.sign(payload).to_bytes())
    }
}

/// Check `signature` over `payload` against the key behind `origin`.
pub fn verify(origin: &Address, payload: &[u8], signature: &Signature) -> bool {
    let Some(public_key) = origin.public_key() else {
        return false;
    };
    let Ok(verifying) = VerifyingKey::from_bytes(public_key.as_bytes()) else {
        return false;
    };
    let signature = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    verifying.verify(payload, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn dev_account__is_deterministic_per_name() {
        // given
        let alice = KeypairSigner::dev_account("alice");
        let alice_again = KeypairSigner::dev_account("alice");
        let bob = KeypairSigner::dev_account("bob");

        // then
        assert_eq!(alice.public_key(), alice_again.public_key());
        assert_ne!(alice.public_key(), bob.public_key());
        assert_eq!(alice.address().public_key(), Some(alice.public_key()));
    }

    #[test]
    fn verify__accepts_own_signature_and_rejects_other_origin() {
        // given
        let alice = KeypairSigner::dev_account("alice");
        let bob = KeypairSigner::dev_account("bob");
        let payload = b"guess 42";

        // when
        let signature = alice.sign(payload);

        // then
        assert!(verify(&alice.address(), payload, &signature));
        assert!(!verify(&bob.address(), payload, &signature));
        assert!(!verify(&alice.address(), b"guess 43", &signature));
    }

    #[test]
    fn from_secret_bytes__rejects_wrong_length() {
        // when
        let result = KeypairSigner::from_secret_bytes("short", &[1u8; 16]);

        // then
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
