use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy_primitives::{Address, Bytes, keccak256};
use async_trait::async_trait;
use securevault_fhe::{ChainProvider, ClearValue, Handle, ProviderError};

use super::coprocessor::MockCoprocessor;
use crate::vault::contract::{ContractError, TxHash, TxReceipt, VaultContract};

/// Age at which `isAdult` holds.
pub const ADULT_AGE: u64 = 18;

/// [`ChainProvider`] for a fixed chain id.
pub struct MockChain {
    chain_id: u64,
    rpc_url: Option<String>,
    queries: AtomicUsize,
}

impl MockChain {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            rpc_url: None,
            queries: AtomicUsize::new(0),
        }
    }

    pub fn with_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    /// Number of chain id requests served.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainProvider for MockChain {
    async fn chain_id(&self) -> Result<u64, ProviderError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.chain_id)
    }

    fn rpc_url(&self) -> Option<&str> {
        self.rpc_url.as_deref()
    }
}

#[derive(Debug, Clone, Copy)]
struct StoredIdentity {
    age: Handle,
    region: Handle,
    kyc: Handle,
}

#[derive(Default)]
struct Ledger {
    identities: HashMap<Address, StoredIdentity>,
    permissions: HashMap<Address, (Handle, Handle)>,
    receipts: HashMap<TxHash, TxReceipt>,
    block_number: u64,
    fail_next: Option<String>,
}

/// The identity vault contract, executed in process against a
/// [`MockCoprocessor`].
#[derive(Clone)]
pub struct MockVault {
    address: Address,
    coprocessor: MockCoprocessor,
    ledger: Arc<Mutex<Ledger>>,
}

impl MockVault {
    pub fn deploy(coprocessor: MockCoprocessor, address: Address) -> Self {
        Self {
            address,
            coprocessor,
            ledger: Arc::new(Mutex::new(Ledger::default())),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Contract handle whose calls come from `caller`.
    pub fn client(&self, caller: Address) -> MockVaultClient {
        MockVaultClient {
            vault: self.clone(),
            caller,
            submitted: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make the next write revert with `reason`.
    pub fn fail_next_transaction(&self, reason: impl Into<String>) {
        self.ledger().fail_next = Some(reason.into());
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn include(&self, ledger: &mut Ledger, caller: Address) -> TxHash {
        ledger.block_number += 1;
        let mut preimage = ledger.block_number.to_be_bytes().to_vec();
        preimage.extend_from_slice(caller.as_slice());
        let tx_hash = keccak256(preimage);
        ledger.receipts.insert(
            tx_hash,
            TxReceipt {
                tx_hash,
                block_number: ledger.block_number,
                success: true,
            },
        );
        tx_hash
    }

    fn revert_if_scheduled(ledger: &mut Ledger) -> Result<(), ContractError> {
        match ledger.fail_next.take() {
            Some(reason) => Err(ContractError::Reverted(reason)),
            None => Ok(()),
        }
    }

    fn external(
        &self,
        handle: Handle,
        proof: &Bytes,
        caller: Address,
    ) -> Result<ClearValue, ContractError> {
        self.coprocessor
            .verify_input(handle, proof, self.address, caller)
            .map_err(|e| ContractError::Reverted(e.to_string()))
    }

    fn write_identity(
        &self,
        caller: Address,
        identity: StoredIdentity,
        proof: &Bytes,
        must_exist: bool,
    ) -> Result<TxHash, ContractError> {
        let mut ledger = self.ledger();
        Self::revert_if_scheduled(&mut ledger)?;
        if must_exist && !ledger.identities.contains_key(&caller) {
            return Err(ContractError::Reverted("No identity data stored".into()));
        }
        for handle in [identity.age, identity.region, identity.kyc] {
            self.external(handle, proof, caller)?;
            self.coprocessor.allow(handle, caller);
        }
        ledger.identities.insert(caller, identity);
        Ok(self.include(&mut ledger, caller))
    }

    fn calculate_permissions(
        &self,
        caller: Address,
        allowed_region: Handle,
        proof: &Bytes,
    ) -> Result<TxHash, ContractError> {
        let mut ledger = self.ledger();
        Self::revert_if_scheduled(&mut ledger)?;
        let identity = *ledger
            .identities
            .get(&caller)
            .ok_or_else(|| ContractError::Reverted("No identity data stored".into()))?;

        let allowed = self.external(allowed_region, proof, caller)?;
        let value = |h: Handle| {
            self.coprocessor
                .value_for(h, self.address)
                .map_err(|e| ContractError::Reverted(e.to_string()))
        };
        let age = value(identity.age)?;
        let region = value(identity.region)?;

        let is_adult = age.as_u64().is_some_and(|a| a >= ADULT_AGE);
        let in_region = region.as_u64().is_some() && region.as_u64() == allowed.as_u64();

        let adult_handle = self.coprocessor.compute(ClearValue::Bool(is_adult), self.address);
        let region_handle = self.coprocessor.compute(ClearValue::Bool(in_region), self.address);
        self.coprocessor.allow(adult_handle, caller);
        self.coprocessor.allow(region_handle, caller);

        ledger
            .permissions
            .insert(caller, (adult_handle, region_handle));
        Ok(self.include(&mut ledger, caller))
    }
}

/// [`VaultContract`] bound to one caller of a [`MockVault`].
#[derive(Clone)]
pub struct MockVaultClient {
    vault: MockVault,
    caller: Address,
    submitted: Arc<AtomicUsize>,
}

impl MockVaultClient {
    pub fn caller(&self) -> Address {
        self.caller
    }

    /// Write transactions submitted through this client, including reverted ones.
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VaultContract for MockVaultClient {
    fn address(&self) -> Address {
        self.vault.address
    }

    async fn store_identity_data(
        &self,
        age: Handle,
        region: Handle,
        kyc: Handle,
        input_proof: &Bytes,
    ) -> Result<TxHash, ContractError> {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        let identity = StoredIdentity { age, region, kyc };
        self.vault
            .write_identity(self.caller, identity, input_proof, false)
    }

    async fn update_identity_data(
        &self,
        age: Handle,
        region: Handle,
        kyc: Handle,
        input_proof: &Bytes,
    ) -> Result<TxHash, ContractError> {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        let identity = StoredIdentity { age, region, kyc };
        self.vault
            .write_identity(self.caller, identity, input_proof, true)
    }

    async fn calculate_access_permissions_enc(
        &self,
        allowed_region: Handle,
        input_proof: &Bytes,
    ) -> Result<TxHash, ContractError> {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        self.vault
            .calculate_permissions(self.caller, allowed_region, input_proof)
    }

    async fn wait_for_inclusion(&self, tx: TxHash) -> Result<TxReceipt, ContractError> {
        tokio::task::yield_now().await;
        self.vault
            .ledger()
            .receipts
            .get(&tx)
            .copied()
            .ok_or(ContractError::UnknownTransaction(tx))
    }

    async fn get_my_identity_data(&self) -> Result<(Handle, Handle, Handle), ContractError> {
        Ok(self
            .vault
            .ledger()
            .identities
            .get(&self.caller)
            .map(|id| (id.age, id.region, id.kyc))
            .unwrap_or((Handle::ZERO, Handle::ZERO, Handle::ZERO)))
    }

    async fn get_my_last_permissions_enc(&self) -> Result<(Handle, Handle), ContractError> {
        Ok(self
            .vault
            .ledger()
            .permissions
            .get(&self.caller)
            .copied()
            .unwrap_or((Handle::ZERO, Handle::ZERO)))
    }

    async fn has_stored_data(&self, user: Address) -> Result<bool, ContractError> {
        Ok(self.vault.ledger().identities.contains_key(&user))
    }
}
