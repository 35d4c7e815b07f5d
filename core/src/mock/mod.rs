//! Simulated coprocessor network for local chains and tests.

pub mod chain;
pub mod coprocessor;
pub mod relayer;
pub mod session;

use std::sync::Arc;

use alloy_primitives::Address;

use crate::bootstrap::{BootstrapContext, BootstrapSettings, RelayerSdk, SDK_GLOBAL_NAMES, SdkRegistry};

pub use chain::{ADULT_AGE, MockChain, MockVault, MockVaultClient};
pub use coprocessor::{MockCoprocessor, SIGNER_QUERY_FAILURE};
pub use relayer::LocalRelayerSdk;
pub use session::MockSession;

/// One local chain with the protocol contracts, a vault and an SDK that
/// becomes available once its script is injected.
pub struct SimulatedNetwork {
    pub chain_id: u64,
    pub coprocessor: MockCoprocessor,
    pub vault: MockVault,
    pub provider: Arc<MockChain>,
    pub registry: SdkRegistry,
}

impl SimulatedNetwork {
    pub fn new(chain_id: u64, vault_address: Address) -> Self {
        let coprocessor = MockCoprocessor::new();
        let vault = MockVault::deploy(coprocessor.clone(), vault_address);

        let sdk_coprocessor = coprocessor.clone();
        let registry = SdkRegistry::new().with_loader(move |_url| {
            let sdk = LocalRelayerSdk::new(sdk_coprocessor.clone()).with_local_network(chain_id);
            Ok(Some((
                SDK_GLOBAL_NAMES[0].to_string(),
                Arc::new(sdk) as Arc<dyn RelayerSdk>,
            )))
        });

        Self {
            chain_id,
            coprocessor,
            vault,
            provider: Arc::new(MockChain::new(chain_id)),
            registry,
        }
    }

    pub fn context(&self, settings: BootstrapSettings) -> BootstrapContext {
        BootstrapContext::new(
            Arc::new(self.registry.clone()),
            Arc::new(self.coprocessor.clone()),
            settings,
        )
    }
}
