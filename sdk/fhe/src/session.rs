use std::collections::HashMap;

use alloy_primitives::Address;
use async_trait::async_trait;

use crate::eip712::DecryptionTypedData;
use crate::error::Result;
use crate::handle::Handle;
use crate::input::{EncryptedInput, EncryptedInputBuilder, InputRequest};
use crate::keypair::EphemeralKeypair;
use crate::value::ClearValue;

/// Decrypted values keyed by the handle they were requested for.
pub type DecryptResults = HashMap<Handle, ClearValue>;

/// A ciphertext handle and the contract that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleContractPair {
    pub handle: Handle,
    pub contract_address: Address,
}

/// Everything the relayer needs to authorize a user decryption.
#[derive(Debug, Clone, Copy)]
pub struct UserDecryptAuth<'a> {
    pub private_key: &'a str,
    pub public_key: &'a str,
    /// 0x-prefixed 65-byte ECDSA signature over the EIP-712 payload
    pub signature: &'a str,
    pub contract_addresses: &'a [Address],
    pub user_address: Address,
    pub start_timestamp: u64,
    pub duration_days: u64,
}

/// An initialized FHE client bound to one chain.
///
/// Obtained from session bootstrap and shared read-only afterwards.
#[async_trait]
pub trait FheSession: Send + Sync {
    fn chain_id(&self) -> u64;

    fn generate_keypair(&self) -> EphemeralKeypair {
        EphemeralKeypair::generate()
    }

    fn create_eip712(
        &self,
        public_key: &str,
        contract_addresses: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> Result<DecryptionTypedData>;

    async fn encrypt_input(&self, request: &InputRequest) -> Result<EncryptedInput>;

    async fn user_decrypt(
        &self,
        pairs: &[HandleContractPair],
        auth: &UserDecryptAuth<'_>,
    ) -> Result<DecryptResults>;
}

impl dyn FheSession {
    pub fn create_encrypted_input(
        &self,
        contract_address: Address,
        user_address: Address,
    ) -> EncryptedInputBuilder<'_> {
        EncryptedInputBuilder::new(self, contract_address, user_address)
    }
}
