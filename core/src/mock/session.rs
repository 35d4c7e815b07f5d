use alloy_primitives::{Address, Signature};
use async_trait::async_trait;
use securevault_fhe::{
    DecryptResults, DecryptionTypedData, EncryptedInput, EphemeralKeypair, FheError, FheSession,
    HandleContractPair, InputRequest, Result, UserDecryptAuth,
};
use securevault_signature::SECONDS_PER_DAY;

use super::coprocessor::MockCoprocessor;
use crate::bootstrap::NetworkConfig;

/// [`FheSession`] served by a [`MockCoprocessor`].
pub struct MockSession {
    coprocessor: MockCoprocessor,
    chain_id: u64,
    decryption_verifier: Address,
}

impl MockSession {
    pub fn new(coprocessor: MockCoprocessor, chain_id: u64, config: &NetworkConfig) -> Self {
        Self {
            coprocessor,
            chain_id,
            decryption_verifier: config.decryption_verifier().unwrap_or(Address::ZERO),
        }
    }

    fn now() -> u64 {
        u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
    }

    /// Signer, validity window and key pair checks of a decrypt request.
    fn authorize(&self, pairs: &[HandleContractPair], auth: &UserDecryptAuth<'_>) -> Result<()> {
        let typed = self.create_eip712(
            auth.public_key,
            auth.contract_addresses,
            auth.start_timestamp,
            auth.duration_days,
        )?;
        let raw = hex::decode(auth.signature.strip_prefix("0x").unwrap_or(auth.signature))
            .map_err(|e| FheError::Unauthorized(format!("malformed signature: {e}")))?;
        let signature = Signature::from_raw(&raw)
            .map_err(|e| FheError::Unauthorized(format!("malformed signature: {e}")))?;
        let signer = signature
            .recover_address_from_prehash(&typed.signing_hash())
            .map_err(|e| FheError::Unauthorized(format!("unrecoverable signature: {e}")))?;
        if signer != auth.user_address {
            return Err(FheError::Unauthorized(format!(
                "signature was made by {signer}, not {}",
                auth.user_address
            )));
        }

        let now = Self::now();
        let expires = auth
            .start_timestamp
            .saturating_add(auth.duration_days.saturating_mul(SECONDS_PER_DAY));
        if now < auth.start_timestamp || now >= expires {
            return Err(FheError::Unauthorized(
                "decryption signature outside its validity window".into(),
            ));
        }

        let keypair = EphemeralKeypair {
            public_key: auth.public_key.to_string(),
            private_key: auth.private_key.to_string(),
        };
        if !keypair.is_consistent() {
            return Err(FheError::InvalidKey(
                "public key does not match private key".into(),
            ));
        }

        if let Some(pair) = pairs
            .iter()
            .find(|p| !auth.contract_addresses.contains(&p.contract_address))
        {
            return Err(FheError::Unauthorized(format!(
                "contract {} not covered by the decryption signature",
                pair.contract_address
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl FheSession for MockSession {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn create_eip712(
        &self,
        public_key: &str,
        contract_addresses: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> Result<DecryptionTypedData> {
        let digits = public_key.strip_prefix("0x").unwrap_or(public_key);
        let public_key = hex::decode(digits).map_err(|e| FheError::InvalidKey(e.to_string()))?;
        Ok(DecryptionTypedData::new(
            self.chain_id,
            self.decryption_verifier,
            &public_key,
            contract_addresses,
            start_timestamp,
            duration_days,
        ))
    }

    async fn encrypt_input(&self, request: &InputRequest) -> Result<EncryptedInput> {
        self.coprocessor.encrypt(request)
    }

    async fn user_decrypt(
        &self,
        pairs: &[HandleContractPair],
        auth: &UserDecryptAuth<'_>,
    ) -> Result<DecryptResults> {
        self.authorize(pairs, auth)?;
        self.coprocessor.decrypt_for(pairs, auth.user_address)
    }
}
