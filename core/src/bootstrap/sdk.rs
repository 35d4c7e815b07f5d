//! Relayer SDK capabilities and their in-process registry.
//!
//! The SDK is located by name in an [`SdkEnvironment`] rather than through
//! process-global state, so tests can hand bootstrap any environment they
//! like.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use alloy_primitives::Address;
use async_trait::async_trait;
use securevault_fhe::{ChainProvider, FheSession, SdkError};
use serde::{Deserialize, Serialize};

use crate::error::BootstrapError;

/// Names the SDK registers itself under, in lookup order.
pub const SDK_GLOBAL_NAMES: [&str; 2] = ["relayerSDK", "RelayerSDKBundle"];

/// Network configuration served by the relayer SDK.
///
/// Each protocol contract is accepted under both spellings the SDK has used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    #[serde(default, alias = "ACLAddress")]
    pub acl_contract_address: Option<Address>,
    #[serde(default, alias = "verifyingContractAddressInputVerification")]
    pub input_verifier_contract_address: Option<Address>,
    #[serde(default, alias = "kmsVerifierContractAddress")]
    pub kms_contract_address: Option<Address>,
    #[serde(default)]
    pub verifying_contract_address_decryption: Option<Address>,
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub gateway_chain_id: Option<u64>,
    #[serde(default)]
    pub relayer_url: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
}

/// The three protocol contracts a session cannot work without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolContracts {
    pub acl: Address,
    pub input_verifier: Address,
    pub kms: Address,
}

impl ProtocolContracts {
    pub fn all(&self) -> [Address; 3] {
        [self.acl, self.input_verifier, self.kms]
    }
}

impl NetworkConfig {
    /// Fails with `ConfigIncomplete` naming the first missing contract.
    pub fn protocol_contracts(&self) -> Result<ProtocolContracts, BootstrapError> {
        let acl = self
            .acl_contract_address
            .ok_or_else(|| BootstrapError::ConfigIncomplete("ACL contract address".into()))?;
        let input_verifier = self.input_verifier_contract_address.ok_or_else(|| {
            BootstrapError::ConfigIncomplete("InputVerifier contract address".into())
        })?;
        let kms = self
            .kms_contract_address
            .ok_or_else(|| BootstrapError::ConfigIncomplete("KMS contract address".into()))?;
        Ok(ProtocolContracts {
            acl,
            input_verifier,
            kms,
        })
    }

    /// Contract the decryption EIP-712 domain is bound to.
    pub fn decryption_verifier(&self) -> Option<Address> {
        self.verifying_contract_address_decryption
            .or(self.kms_contract_address)
    }
}

/// A loaded relayer SDK.
#[async_trait]
pub trait RelayerSdk: Send + Sync {
    /// May fail when called more than once.
    async fn init_sdk(&self) -> Result<(), SdkError>;

    /// `Ok(None)` when the SDK has no per-chain lookup.
    async fn fetch_network_config(&self, chain_id: u64) -> Result<Option<NetworkConfig>, SdkError>;

    /// Built-in configuration of the public testnet, when bundled.
    fn well_known_config(&self) -> Option<NetworkConfig>;

    async fn create_instance(
        &self,
        config: &NetworkConfig,
        provider: Arc<dyn ChainProvider>,
    ) -> Result<Arc<dyn FheSession>, SdkError>;
}

/// Builds sessions against a local simulated coprocessor.
#[async_trait]
pub trait SimulatedBackend: Send + Sync {
    /// `public` serves reads and `execution` serves the coprocessor queries.
    async fn create_session(
        &self,
        public: Arc<dyn ChainProvider>,
        execution: Arc<dyn ChainProvider>,
        config: &NetworkConfig,
        chain_id: u64,
    ) -> Result<Arc<dyn FheSession>, SdkError>;
}

/// Where the SDK script gets loaded and registers itself.
#[async_trait]
pub trait SdkEnvironment: Send + Sync {
    fn global(&self, name: &str) -> Option<Arc<dyn RelayerSdk>>;

    /// A script tag for `url` already exists.
    fn script_present(&self, url: &str) -> bool;

    async fn inject_script(&self, url: &str) -> Result<(), SdkError>;
}

/// First SDK registered under one of [`SDK_GLOBAL_NAMES`].
pub fn locate_sdk(env: &dyn SdkEnvironment) -> Option<Arc<dyn RelayerSdk>> {
    SDK_GLOBAL_NAMES.iter().find_map(|name| env.global(name))
}

/// Runs when a script is injected; may hand back an SDK to register.
pub type ScriptLoader =
    Arc<dyn Fn(&str) -> Result<Option<(String, Arc<dyn RelayerSdk>)>, SdkError> + Send + Sync>;

#[derive(Default)]
struct RegistryState {
    globals: HashMap<String, Arc<dyn RelayerSdk>>,
    scripts: Vec<String>,
}

/// In-process [`SdkEnvironment`].
///
/// Clones share state, so an SDK can be registered from another task while
/// bootstrap is polling.
#[derive(Clone, Default)]
pub struct SdkRegistry {
    state: Arc<RwLock<RegistryState>>,
    loader: Option<ScriptLoader>,
}

impl SdkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn(&str) -> Result<Option<(String, Arc<dyn RelayerSdk>)>, SdkError> + Send + Sync + 'static,
    {
        self.loader = Some(Arc::new(loader));
        self
    }

    pub fn register(&self, name: impl Into<String>, sdk: Arc<dyn RelayerSdk>) {
        self.state
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .globals
            .insert(name.into(), sdk);
    }

    pub fn unregister(&self, name: &str) {
        self.state
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .globals
            .remove(name);
    }

    /// Script URLs injected so far, in order.
    pub fn injected_scripts(&self) -> Vec<String> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .scripts
            .clone()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = state.globals.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for SdkRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkRegistry")
            .field("names", &self.names())
            .field("scripts", &self.injected_scripts())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SdkEnvironment for SdkRegistry {
    fn global(&self, name: &str) -> Option<Arc<dyn RelayerSdk>> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .globals
            .get(name)
            .cloned()
    }

    fn script_present(&self, url: &str) -> bool {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .scripts
            .iter()
            .any(|s| s == url)
    }

    async fn inject_script(&self, url: &str) -> Result<(), SdkError> {
        self.state
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .scripts
            .push(url.to_string());
        if let Some(loader) = &self.loader {
            if let Some((name, sdk)) = loader(url)? {
                self.register(name, sdk);
            }
        }
        Ok(())
    }
}
