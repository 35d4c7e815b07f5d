//! End-to-end run against the simulated local chain.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, address};
use anyhow::Context;
use securevault_config::{HARDHAT_CHAIN_ID, SecureVaultConfig};
use securevault_core::bootstrap::{BootstrapSettings, SessionManager};
use securevault_core::mock::SimulatedNetwork;
use securevault_core::vault::{IdentityVault, VaultDirectory};
use securevault_core::Outcome;
use securevault_signature::{
    DecryptionSignatureManager, FileStringStore, InMemoryStringStore, LocalWalletSigner,
    StringStore, TypedDataSigner,
};

/// Address the first contract deployment on a fresh hardhat node lands at.
const DEFAULT_VAULT_ADDRESS: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");

#[derive(Debug, Clone)]
pub struct DemoOptions {
    pub age: u8,
    pub region: u8,
    pub kyc: bool,
    /// Defaults to the stored region
    pub allowed_region: Option<u8>,
    pub private_key: Option<String>,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            age: 25,
            region: 1,
            kyc: true,
            allowed_region: None,
            private_key: None,
        }
    }
}

pub async fn run_demo(config: &SecureVaultConfig, options: DemoOptions) -> anyhow::Result<()> {
    let chain_id = HARDHAT_CHAIN_ID;
    let vault_address = VaultDirectory::from_config(&config.vault)
        .address_for(chain_id)
        .unwrap_or(DEFAULT_VAULT_ADDRESS);

    println!("🔧 Simulated chain {} with vault {}", chain_id, vault_address);
    let network = SimulatedNetwork::new(chain_id, vault_address);

    let manager = SessionManager::new(network.context(BootstrapSettings::from_config(config)));
    manager.start(network.provider.clone());
    let session = manager
        .wait_ready()
        .await
        .context("FHEVM bootstrap failed")?;
    println!("✅ {} ({})", manager.status().label(), manager.last_step());

    let signer = Arc::new(match &options.private_key {
        Some(key) => LocalWalletSigner::from_hex(key)?,
        None => LocalWalletSigner::random(),
    });
    println!("🔑 Wallet {}", signer.address());

    let store: Arc<dyn StringStore> = match &config.decryption.store_path {
        Some(path) => {
            println!("📁 Decryption signatures kept in {}", path);
            Arc::new(FileStringStore::new(path))
        }
        None => Arc::new(InMemoryStringStore::new()),
    };
    let signatures = Arc::new(
        DecryptionSignatureManager::new(store).with_duration_days(config.decryption.duration_days),
    );

    let vault = IdentityVault::new(signatures)
        .with_session(session)
        .with_writer(Arc::new(network.vault.client(signer.address())))
        .with_signer(signer)
        .with_input_delay(Duration::from_millis(config.vault.input_delay_ms));

    println!(
        "🔐 Storing age={} region={} kyc={}...",
        options.age, options.region, options.kyc
    );
    let handles = match vault
        .store_identity_data(options.age, options.region, options.kyc)
        .await?
    {
        Outcome::Completed(handles) => handles,
        Outcome::Skipped => anyhow::bail!("store was skipped"),
    };
    println!("✅ {}", vault.status_message());
    for (name, handle) in [
        ("age", handles.age),
        ("region", handles.region),
        ("kyc", handles.kyc),
    ] {
        if let Some(handle) = handle {
            println!("   {:<7} {}", name, handle);
        }
    }

    let allowed = options.allowed_region.unwrap_or(options.region);
    println!("🔎 Verifying access for region {}...", allowed);
    let results = match vault.verify_access(allowed).await? {
        Outcome::Completed(results) => results,
        Outcome::Skipped => anyhow::bail!("verification was skipped"),
    };
    println!("✅ {}", vault.status_message());

    let show = |value: Option<bool>| match value {
        Some(true) => "yes",
        Some(false) => "no",
        None => "unknown",
    };
    println!("   isAdult:    {}", show(results.is_adult.map(|r| r.clear)));
    println!("   isInRegion: {}", show(results.is_region.map(|r| r.clear)));

    Ok(())
}
