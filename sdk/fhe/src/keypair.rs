use std::fmt;

use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{FheError, Result};

/// Ephemeral X25519 keypair the relayer re-encrypts decryption results to.
///
/// Both halves are kept as lowercase hex without prefix, which is also how
/// they are persisted alongside a cached decryption signature.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EphemeralKeypair {
    pub public_key: String,
    pub private_key: String,
}

impl EphemeralKeypair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random();
        let public = PublicKey::from(&secret);
        Self {
            public_key: hex::encode(public.as_bytes()),
            private_key: hex::encode(secret.to_bytes()),
        }
    }

    pub fn public_key_bytes(&self) -> Result<[u8; 32]> {
        decode_key(&self.public_key)
    }

    /// True when `public_key` is derived from `private_key`.
    pub fn is_consistent(&self) -> bool {
        match (decode_key(&self.private_key), decode_key(&self.public_key)) {
            (Ok(secret), Ok(public)) => {
                PublicKey::from(&StaticSecret::from(secret)).as_bytes() == &public
            }
            _ => false,
        }
    }
}

fn decode_key(text: &str) -> Result<[u8; 32]> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    let bytes = hex::decode(digits).map_err(|e| FheError::InvalidKey(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| FheError::InvalidKey(format!("expected 32 bytes, got {}", b.len())))
}

impl fmt::Debug for EphemeralKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeypair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}
