use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use log::debug;
use securevault_fhe::{ChainProvider, FheSession, SdkError};

use super::coprocessor::MockCoprocessor;
use super::session::MockSession;
use crate::bootstrap::{NetworkConfig, RelayerSdk};

/// [`RelayerSdk`] answering from a local [`MockCoprocessor`].
pub struct LocalRelayerSdk {
    coprocessor: MockCoprocessor,
    networks: BTreeMap<u64, NetworkConfig>,
    well_known: Option<NetworkConfig>,
    dynamic_lookup: bool,
    init_calls: AtomicUsize,
}

impl LocalRelayerSdk {
    pub fn new(coprocessor: MockCoprocessor) -> Self {
        Self {
            coprocessor,
            networks: BTreeMap::new(),
            well_known: None,
            dynamic_lookup: true,
            init_calls: AtomicUsize::new(0),
        }
    }

    /// Serve the coprocessor's local configuration for `chain_id`.
    pub fn with_local_network(mut self, chain_id: u64) -> Self {
        let config = self.coprocessor.local_network_config(chain_id);
        self.networks.insert(chain_id, config);
        self
    }

    pub fn with_network(mut self, chain_id: u64, config: NetworkConfig) -> Self {
        self.networks.insert(chain_id, config);
        self
    }

    /// Bundled testnet configuration.
    pub fn with_well_known(mut self, config: NetworkConfig) -> Self {
        self.well_known = Some(config);
        self
    }

    /// Behave like an SDK build with no per-chain configuration lookup.
    pub fn without_dynamic_lookup(mut self) -> Self {
        self.dynamic_lookup = false;
        self
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelayerSdk for LocalRelayerSdk {
    async fn init_sdk(&self) -> Result<(), SdkError> {
        if self.init_calls.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err(SdkError::new("SDK already initialized"));
        }
        Ok(())
    }

    async fn fetch_network_config(&self, chain_id: u64) -> Result<Option<NetworkConfig>, SdkError> {
        if !self.dynamic_lookup {
            return Ok(None);
        }
        Ok(self.networks.get(&chain_id).cloned())
    }

    fn well_known_config(&self) -> Option<NetworkConfig> {
        self.well_known.clone()
    }

    async fn create_instance(
        &self,
        config: &NetworkConfig,
        provider: Arc<dyn ChainProvider>,
    ) -> Result<Arc<dyn FheSession>, SdkError> {
        if config.relayer_url.is_none() {
            return Err(SdkError::new("Invalid relayer url: missing from configuration"));
        }
        let chain_id = match config.chain_id {
            Some(id) => id,
            None => provider
                .chain_id()
                .await
                .map_err(|e| SdkError::new(e.to_string()))?,
        };
        self.coprocessor.ensure_protocol(config)?;
        debug!("Local relayer created instance for chain {chain_id}");
        Ok(Arc::new(MockSession::new(
            self.coprocessor.clone(),
            chain_id,
            config,
        )))
    }
}
