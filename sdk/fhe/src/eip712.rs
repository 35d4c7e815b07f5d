//! EIP-712 payload authorizing a user decryption.
//!
//! The user signs this once; the signature plus the ephemeral keypair then
//! lets the relayer re-encrypt the listed contracts' ciphertexts for them.

use std::borrow::Cow;

use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_sol_types::{Eip712Domain, SolStruct, sol};

sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct UserDecryptRequestVerification {
        bytes publicKey;
        address[] contractAddresses;
        uint256 contractsChainId;
        uint256 startTimestamp;
        uint256 durationDays;
    }
}

pub const DOMAIN_NAME: &str = "Decryption";
pub const DOMAIN_VERSION: &str = "1";

/// Domain and message to be signed by the user's wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionTypedData {
    pub domain: Eip712Domain,
    pub message: UserDecryptRequestVerification,
}

impl DecryptionTypedData {
    /// `verifying_contract` is the decryption verifier the relayer checks against.
    pub fn new(
        chain_id: u64,
        verifying_contract: Address,
        public_key: &[u8],
        contracts: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> Self {
        let domain = Eip712Domain::new(
            Some(Cow::Borrowed(DOMAIN_NAME)),
            Some(Cow::Borrowed(DOMAIN_VERSION)),
            Some(U256::from(chain_id)),
            Some(verifying_contract),
            None,
        );
        let message = UserDecryptRequestVerification {
            publicKey: Bytes::copy_from_slice(public_key),
            contractAddresses: contracts.to_vec(),
            contractsChainId: U256::from(chain_id),
            startTimestamp: U256::from(start_timestamp),
            durationDays: U256::from(duration_days),
        };
        Self { domain, message }
    }

    /// Digest the wallet signs.
    pub fn signing_hash(&self) -> B256 {
        self.message.eip712_signing_hash(&self.domain)
    }

    pub fn chain_id(&self) -> u64 {
        u64::try_from(self.message.contractsChainId).unwrap_or(u64::MAX)
    }
}
