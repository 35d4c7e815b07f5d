use std::fmt;

use alloy_primitives::Address;
use securevault_fhe::UserDecryptAuth;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SignatureError};

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Non-empty, sorted, deduplicated contract addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContractSet(Vec<Address>);

impl ContractSet {
    pub fn new(addresses: impl IntoIterator<Item = Address>) -> Result<Self> {
        let mut addresses: Vec<Address> = addresses.into_iter().collect();
        addresses.sort();
        addresses.dedup();
        if addresses.is_empty() {
            return Err(SignatureError::EmptyContractSet);
        }
        Ok(Self(addresses))
    }

    pub fn single(address: Address) -> Self {
        Self(vec![address])
    }

    pub fn as_slice(&self) -> &[Address] {
        &self.0
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.0.binary_search(address).is_ok()
    }
}

/// Store key for a (user, contract set[, public key]) triple.
///
/// Addresses are lowercase hex so the key does not depend on checksum casing.
pub fn signature_cache_key(
    user: Address,
    contracts: &ContractSet,
    public_key: Option<&str>,
) -> String {
    let contracts = contracts
        .as_slice()
        .iter()
        .map(|a| format!("{a:#x}"))
        .collect::<Vec<_>>()
        .join(",");
    match public_key {
        Some(pk) => format!("decsig:{user:#x}:{contracts}:{pk}"),
        None => format!("decsig:{user:#x}:{contracts}"),
    }
}

/// Signed, time-bounded authorization to decrypt for one user and a set of
/// contracts. Never mutated; an unusable one is replaced.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptionSignature {
    pub public_key: String,
    pub private_key: String,
    pub signature: String,
    pub user_address: Address,
    pub contract_addresses: Vec<Address>,
    pub start_timestamp: u64,
    pub duration_days: u64,
}

impl DecryptionSignature {
    pub fn expires_at(&self) -> u64 {
        self.start_timestamp
            .saturating_add(self.duration_days.saturating_mul(SECONDS_PER_DAY))
    }

    /// `now` in `[start, start + days * 86400)`.
    pub fn is_time_valid(&self, now: u64) -> bool {
        now >= self.start_timestamp && now < self.expires_at()
    }

    pub fn covers(&self, contracts: &[Address]) -> bool {
        contracts
            .iter()
            .all(|c| self.contract_addresses.contains(c))
    }

    pub fn is_valid_for(&self, user: Address, contracts: &[Address], now: u64) -> bool {
        self.user_address == user && self.covers(contracts) && self.is_time_valid(now)
    }

    pub fn as_auth(&self) -> UserDecryptAuth<'_> {
        UserDecryptAuth {
            private_key: &self.private_key,
            public_key: &self.public_key,
            signature: &self.signature,
            contract_addresses: &self.contract_addresses,
            user_address: self.user_address,
            start_timestamp: self.start_timestamp,
            duration_days: self.duration_days,
        }
    }
}

impl fmt::Debug for DecryptionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionSignature")
            .field("public_key", &self.public_key)
            .field("signature", &self.signature)
            .field("user_address", &self.user_address)
            .field("contract_addresses", &self.contract_addresses)
            .field("start_timestamp", &self.start_timestamp)
            .field("duration_days", &self.duration_days)
            .finish_non_exhaustive()
    }
}
