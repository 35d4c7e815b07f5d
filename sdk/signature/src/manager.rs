use std::sync::Arc;

use log::{debug, info, warn};
use securevault_fhe::{EphemeralKeypair, FheSession};

use crate::error::{Result, SignatureError};
use crate::signature::{ContractSet, DecryptionSignature, signature_cache_key};
use crate::signer::{SignerError, TypedDataSigner};
use crate::store::StringStore;

pub const DEFAULT_DURATION_DAYS: u64 = 365;

fn system_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// Produces decryption signatures, reusing a stored one while it is valid.
pub struct DecryptionSignatureManager {
    store: Arc<dyn StringStore>,
    duration_days: u64,
    clock: fn() -> u64,
}

impl DecryptionSignatureManager {
    pub fn new(store: Arc<dyn StringStore>) -> Self {
        Self {
            store,
            duration_days: DEFAULT_DURATION_DAYS,
            clock: system_now,
        }
    }

    pub fn with_duration_days(mut self, days: u64) -> Self {
        self.duration_days = days;
        self
    }

    /// Replace the wall clock (unix seconds).
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn StringStore> {
        &self.store
    }

    pub fn duration_days(&self) -> u64 {
        self.duration_days
    }

    pub async fn load_or_sign(
        &self,
        session: &dyn FheSession,
        contracts: &ContractSet,
        signer: &dyn TypedDataSigner,
    ) -> Result<DecryptionSignature> {
        self.load_or_sign_with_keypair(session, contracts, signer, None)
            .await
    }

    /// With a caller keypair, its public key is part of the cache key and the
    /// keypair is used instead of a fresh one.
    pub async fn load_or_sign_with_keypair(
        &self,
        session: &dyn FheSession,
        contracts: &ContractSet,
        signer: &dyn TypedDataSigner,
        keypair: Option<&EphemeralKeypair>,
    ) -> Result<DecryptionSignature> {
        let user = signer.address();
        let key = signature_cache_key(user, contracts, keypair.map(|kp| kp.public_key.as_str()));
        let now = (self.clock)();

        if let Some(cached) = self.load_cached(&key).await {
            if cached.is_valid_for(user, contracts.as_slice(), now) {
                debug!("Reusing decryption signature for {key}");
                return Ok(cached);
            }
            debug!("Cached decryption signature for {key} no longer valid");
        }

        let keypair = match keypair {
            Some(kp) => kp.clone(),
            None => session.generate_keypair(),
        };
        let typed = session.create_eip712(
            &keypair.public_key,
            contracts.as_slice(),
            now,
            self.duration_days,
        )?;

        let signature = signer
            .sign_typed_data(&typed)
            .await
            .map_err(|e| match e {
                SignerError::Rejected(msg) => SignatureError::SigningRejected(msg),
                SignerError::Failed(msg) => SignatureError::SigningFailed(msg),
            })?;

        let record = DecryptionSignature {
            public_key: keypair.public_key,
            private_key: keypair.private_key,
            signature,
            user_address: user,
            contract_addresses: contracts.as_slice().to_vec(),
            start_timestamp: now,
            duration_days: self.duration_days,
        };

        self.save(&key, &record).await;
        info!(
            "Signed decryption authorization for {} contract(s), valid {} days",
            record.contract_addresses.len(),
            record.duration_days
        );
        Ok(record)
    }

    async fn load_cached(&self, key: &str) -> Option<DecryptionSignature> {
        let raw = match self.store.get_item(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Signature store read failed for {key}: {e}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!("Discarding unreadable signature cache entry {key}: {e}");
                None
            }
        }
    }

    async fn save(&self, key: &str, record: &DecryptionSignature) {
        let raw = match serde_json::to_string(record) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Could not serialize decryption signature: {e}");
                return;
            }
        };
        if let Err(e) = self.store.set_item(key, &raw).await {
            warn!("Signature store write failed for {key}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    use alloy_primitives::Address;
    use async_trait::async_trait;
    use securevault_fhe::{
        DecryptResults, DecryptionTypedData, EncryptedInput, FheError, HandleContractPair,
        InputRequest, UserDecryptAuth,
    };

    use super::*;
    use crate::signature::SECONDS_PER_DAY;
    use crate::signer::LocalWalletSigner;
    use crate::store::{InMemoryStringStore, StoreError};

    const T0: u64 = 1_700_000_000;
    static NOW: AtomicU64 = AtomicU64::new(T0);

    fn test_clock() -> u64 {
        NOW.load(Ordering::SeqCst)
    }

    fn fixed_clock() -> u64 {
        T0
    }

    struct TypedDataOnly;

    #[async_trait]
    impl FheSession for TypedDataOnly {
        fn chain_id(&self) -> u64 {
            31337
        }

        fn create_eip712(
            &self,
            public_key: &str,
            contract_addresses: &[Address],
            start_timestamp: u64,
            duration_days: u64,
        ) -> securevault_fhe::Result<DecryptionTypedData> {
            let pk = hex::decode(public_key).map_err(|e| FheError::InvalidKey(e.to_string()))?;
            Ok(DecryptionTypedData::new(
                31337,
                Address::repeat_byte(0xee),
                &pk,
                contract_addresses,
                start_timestamp,
                duration_days,
            ))
        }

        async fn encrypt_input(&self, _: &InputRequest) -> securevault_fhe::Result<EncryptedInput> {
            Err(FheError::Coprocessor("unused".into()))
        }

        async fn user_decrypt(
            &self,
            _: &[HandleContractPair],
            _: &UserDecryptAuth<'_>,
        ) -> securevault_fhe::Result<DecryptResults> {
            Err(FheError::Coprocessor("unused".into()))
        }
    }

    struct CountingSigner {
        inner: LocalWalletSigner,
        calls: AtomicUsize,
    }

    impl CountingSigner {
        fn new() -> Self {
            Self {
                inner: LocalWalletSigner::random(),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TypedDataSigner for CountingSigner {
        fn address(&self) -> Address {
            self.inner.address()
        }

        async fn sign_typed_data(&self, typed: &DecryptionTypedData) -> std::result::Result<String, SignerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.sign_typed_data(typed).await
        }
    }

    struct RefusingSigner(SignerError);

    #[async_trait]
    impl TypedDataSigner for RefusingSigner {
        fn address(&self) -> Address {
            Address::repeat_byte(0x42)
        }

        async fn sign_typed_data(&self, _: &DecryptionTypedData) -> std::result::Result<String, SignerError> {
            Err(self.0.clone())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl StringStore for BrokenStore {
        async fn get_item(&self, _: &str) -> std::result::Result<Option<String>, StoreError> {
            Err(StoreError::Io("disk gone".into()))
        }

        async fn set_item(&self, _: &str, _: &str) -> std::result::Result<(), StoreError> {
            Err(StoreError::Io("disk gone".into()))
        }

        async fn remove_item(&self, _: &str) -> std::result::Result<(), StoreError> {
            Ok(())
        }
    }

    fn contract() -> Address {
        Address::repeat_byte(0x10)
    }

    #[tokio::test]
    async fn test_second_call_returns_cached_signature() {
        let store = Arc::new(InMemoryStringStore::new());
        let manager = DecryptionSignatureManager::new(store.clone()).with_clock(fixed_clock);
        let signer = CountingSigner::new();
        let set = ContractSet::single(contract());

        let first = manager.load_or_sign(&TypedDataOnly, &set, &signer).await.unwrap();
        let second = manager.load_or_sign(&TypedDataOnly, &set, &signer).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(signer.calls(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(first.user_address, signer.address());
        assert_eq!(first.start_timestamp, T0);
        assert_eq!(first.duration_days, DEFAULT_DURATION_DAYS);
    }

    #[tokio::test]
    async fn test_expired_signature_is_replaced() {
        let store = Arc::new(InMemoryStringStore::new());
        let manager = DecryptionSignatureManager::new(store.clone())
            .with_duration_days(1)
            .with_clock(test_clock);
        let signer = CountingSigner::new();
        let set = ContractSet::single(contract());

        NOW.store(T0, Ordering::SeqCst);
        let first = manager.load_or_sign(&TypedDataOnly, &set, &signer).await.unwrap();

        NOW.store(T0 + SECONDS_PER_DAY, Ordering::SeqCst);
        let second = manager.load_or_sign(&TypedDataOnly, &set, &signer).await.unwrap();
        NOW.store(T0, Ordering::SeqCst);

        assert_eq!(signer.calls(), 2);
        assert_ne!(first.public_key, second.public_key);
        assert_eq!(second.start_timestamp, T0 + SECONDS_PER_DAY);
        // overwritten under the same key
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_entry_missing_requested_contract_is_replaced() {
        let store = Arc::new(InMemoryStringStore::new());
        let manager = DecryptionSignatureManager::new(store.clone()).with_clock(fixed_clock);
        let signer = CountingSigner::new();
        let set = ContractSet::single(contract());
        let key = signature_cache_key(signer.address(), &set, None);

        let stale = DecryptionSignature {
            public_key: "aa".repeat(32),
            private_key: "bb".repeat(32),
            signature: "0x00".into(),
            user_address: signer.address(),
            contract_addresses: vec![Address::repeat_byte(0x99)],
            start_timestamp: T0,
            duration_days: 365,
        };
        store
            .set_item(&key, &serde_json::to_string(&stale).unwrap())
            .await
            .unwrap();

        let fresh = manager.load_or_sign(&TypedDataOnly, &set, &signer).await.unwrap();
        assert_eq!(signer.calls(), 1);
        assert_eq!(fresh.contract_addresses, vec![contract()]);
        let persisted: DecryptionSignature =
            serde_json::from_str(&store.get_item(&key).await.unwrap().unwrap()).unwrap();
        assert_eq!(persisted, fresh);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let store = Arc::new(InMemoryStringStore::new());
        let manager = DecryptionSignatureManager::new(store.clone()).with_clock(fixed_clock);
        let signer = CountingSigner::new();
        let set = ContractSet::single(contract());
        let key = signature_cache_key(signer.address(), &set, None);
        store.set_item(&key, "{garbage").await.unwrap();

        manager.load_or_sign(&TypedDataOnly, &set, &signer).await.unwrap();
        assert_eq!(signer.calls(), 1);
        let _: DecryptionSignature =
            serde_json::from_str(&store.get_item(&key).await.unwrap().unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_signing_errors_are_classified() {
        let manager = DecryptionSignatureManager::new(Arc::new(InMemoryStringStore::new()));
        let set = ContractSet::single(contract());

        let rejected = RefusingSigner(SignerError::Rejected("denied".into()));
        let err = manager.load_or_sign(&TypedDataOnly, &set, &rejected).await.unwrap_err();
        assert_eq!(err, SignatureError::SigningRejected("denied".into()));

        let failed = RefusingSigner(SignerError::Failed("hw wallet unplugged".into()));
        let err = manager.load_or_sign(&TypedDataOnly, &set, &failed).await.unwrap_err();
        assert_eq!(err, SignatureError::SigningFailed("hw wallet unplugged".into()));
    }

    #[tokio::test]
    async fn test_store_failure_still_returns_signature() {
        let manager = DecryptionSignatureManager::new(Arc::new(BrokenStore)).with_clock(fixed_clock);
        let signer = CountingSigner::new();
        let set = ContractSet::single(contract());

        let sig = manager.load_or_sign(&TypedDataOnly, &set, &signer).await.unwrap();
        assert_eq!(sig.contract_addresses, vec![contract()]);
        manager.load_or_sign(&TypedDataOnly, &set, &signer).await.unwrap();
        assert_eq!(signer.calls(), 2);
    }

    #[tokio::test]
    async fn test_caller_keypair_is_used_and_keyed() {
        let store = Arc::new(InMemoryStringStore::new());
        let manager = DecryptionSignatureManager::new(store.clone()).with_clock(fixed_clock);
        let signer = CountingSigner::new();
        let set = ContractSet::single(contract());
        let keypair = EphemeralKeypair::generate();

        let sig = manager
            .load_or_sign_with_keypair(&TypedDataOnly, &set, &signer, Some(&keypair))
            .await
            .unwrap();
        assert_eq!(sig.public_key, keypair.public_key);
        assert_eq!(sig.private_key, keypair.private_key);

        let key = signature_cache_key(signer.address(), &set, Some(&keypair.public_key));
        assert!(store.get_item(&key).await.unwrap().is_some());
        assert_eq!(store.keys(), vec![key]);
    }
}
