use std::collections::BTreeMap;

use alloy_primitives::{Address, B256, Bytes};
use async_trait::async_trait;
use log::warn;
use securevault_config::VaultConfig;
use securevault_fhe::Handle;
use thiserror::Error;

pub type TxHash = B256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub success: bool,
}

/// Chain-layer failures, passed through as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("execution reverted: {0}")]
    Reverted(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("unknown transaction {0}")]
    UnknownTransaction(TxHash),
}

/// Typed calls on the identity vault contract.
///
/// An instance is bound to the account it calls from; the `get_my_*` reads
/// answer for that account.
#[async_trait]
pub trait VaultContract: Send + Sync {
    fn address(&self) -> Address;

    async fn store_identity_data(
        &self,
        age: Handle,
        region: Handle,
        kyc: Handle,
        input_proof: &Bytes,
    ) -> Result<TxHash, ContractError>;

    async fn update_identity_data(
        &self,
        age: Handle,
        region: Handle,
        kyc: Handle,
        input_proof: &Bytes,
    ) -> Result<TxHash, ContractError>;

    async fn calculate_access_permissions_enc(
        &self,
        allowed_region: Handle,
        input_proof: &Bytes,
    ) -> Result<TxHash, ContractError>;

    /// Resolves once the transaction is included.
    async fn wait_for_inclusion(&self, tx: TxHash) -> Result<TxReceipt, ContractError>;

    /// (age, region, kyc)
    async fn get_my_identity_data(&self) -> Result<(Handle, Handle, Handle), ContractError>;

    /// (isAdult, isInRegion)
    async fn get_my_last_permissions_enc(&self) -> Result<(Handle, Handle), ContractError>;

    async fn has_stored_data(&self, user: Address) -> Result<bool, ContractError>;
}

/// Vault contract address per chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultDirectory {
    addresses: BTreeMap<u64, Address>,
}

impl VaultDirectory {
    pub fn new(addresses: BTreeMap<u64, Address>) -> Self {
        Self { addresses }
    }

    /// Entries that don't parse as an address are skipped.
    pub fn from_config(config: &VaultConfig) -> Self {
        let addresses = config
            .addresses_by_chain()
            .into_iter()
            .filter_map(|(chain, text)| match text.trim().parse::<Address>() {
                Ok(addr) => Some((chain, addr)),
                Err(e) => {
                    warn!("Ignoring vault address for chain {chain}: {e}");
                    None
                }
            })
            .collect();
        Self { addresses }
    }

    /// `None` for unknown chains and for the zero address.
    pub fn address_for(&self, chain_id: u64) -> Option<Address> {
        self.addresses
            .get(&chain_id)
            .copied()
            .filter(|a| *a != Address::ZERO)
    }

    pub fn insert(&mut self, chain_id: u64, address: Address) {
        self.addresses.insert(chain_id, address);
    }
}
