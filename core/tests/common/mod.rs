#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::Address;
use async_trait::async_trait;
use securevault_core::bootstrap::{BootstrapSettings, acquire_session};
use securevault_core::mock::{MockVaultClient, SimulatedNetwork};
use securevault_core::poll::PollPolicy;
use securevault_core::vault::IdentityVault;
use securevault_fhe::{DecryptionTypedData, FheSession};
use securevault_signature::{
    DecryptionSignatureManager, InMemoryStringStore, LocalWalletSigner, SignerError,
    StringStore, TypedDataSigner,
};
use tokio_util::sync::CancellationToken;

pub const LOCAL_CHAIN: u64 = 31337;

pub fn vault_address() -> Address {
    "0x5FbDB2315678afecb367f032d93F642f64180aa3"
        .parse()
        .unwrap()
}

/// Default routing with a short poll budget.
pub fn fast_settings() -> BootstrapSettings {
    let mut settings = BootstrapSettings::default();
    settings.poll = PollPolicy::new(Duration::from_millis(5), 40);
    settings
}

/// Collects status steps in order.
#[derive(Clone, Default)]
pub struct StatusLog {
    steps: Arc<Mutex<Vec<String>>>,
}

impl StatusLog {
    pub fn sink(&self) -> impl Fn(&str) + Send + Sync + 'static {
        let steps = self.steps.clone();
        move |step: &str| steps.lock().unwrap().push(step.to_string())
    }

    pub fn steps(&self) -> Vec<String> {
        self.steps.lock().unwrap().clone()
    }
}

// ============================================================================
// Signers
// ============================================================================

/// Local wallet that counts signing prompts.
pub struct CountingSigner {
    inner: LocalWalletSigner,
    prompts: AtomicUsize,
}

impl CountingSigner {
    pub fn new() -> Self {
        Self {
            inner: LocalWalletSigner::random(),
            prompts: AtomicUsize::new(0),
        }
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TypedDataSigner for CountingSigner {
    fn address(&self) -> Address {
        self.inner.address()
    }

    async fn sign_typed_data(&self, typed: &DecryptionTypedData) -> Result<String, SignerError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        self.inner.sign_typed_data(typed).await
    }
}

/// Wallet whose user declines every signature request.
pub struct RejectingSigner {
    address: Address,
}

impl RejectingSigner {
    pub fn new() -> Self {
        Self {
            address: LocalWalletSigner::random().address(),
        }
    }
}

#[async_trait]
impl TypedDataSigner for RejectingSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_typed_data(&self, _: &DecryptionTypedData) -> Result<String, SignerError> {
        Err(SignerError::Rejected("User denied message signature".into()))
    }
}

// ============================================================================
// Vault fixture
// ============================================================================

/// A bootstrapped local chain plus a wallet and its vault client.
pub struct VaultFixture {
    pub network: SimulatedNetwork,
    pub session: Arc<dyn FheSession>,
    pub signer: Arc<CountingSigner>,
    pub store: Arc<dyn StringStore>,
    pub client: MockVaultClient,
}

impl VaultFixture {
    pub async fn new() -> Self {
        Self::with_store(Arc::new(InMemoryStringStore::new())).await
    }

    pub async fn with_store(store: Arc<dyn StringStore>) -> Self {
        let network = SimulatedNetwork::new(LOCAL_CHAIN, vault_address());
        let context = network.context(fast_settings());
        let session = acquire_session(
            &context,
            network.provider.clone(),
            &CancellationToken::new(),
            &|_: &str| {},
        )
        .await
        .expect("local bootstrap");

        let signer = Arc::new(CountingSigner::new());
        let client = network.vault.client(signer.address());
        Self {
            network,
            session,
            signer,
            store,
            client,
        }
    }

    pub fn signature_manager(&self) -> Arc<DecryptionSignatureManager> {
        Arc::new(DecryptionSignatureManager::new(self.store.clone()))
    }

    /// Orchestrator wired to the session, the signer and its vault client.
    pub fn vault(&self) -> IdentityVault {
        IdentityVault::new(self.signature_manager())
            .with_session(self.session.clone())
            .with_writer(Arc::new(self.client.clone()))
            .with_signer(self.signer.clone())
            .with_input_delay(Duration::ZERO)
    }
}
