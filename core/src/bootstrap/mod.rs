//! Session bootstrap
//!
//! Turns a chain provider into a ready [`FheSession`], either through the
//! remote relayer SDK or through a local simulated coprocessor.
//!
//! ```text
//! chain id ──┬── simulated ──▶ discover SDK ─▶ init ─▶ config ─▶ check contracts ─▶ SimulatedBackend
//!            ├── relayer ────▶ discover SDK ─▶ init ─▶ config ─▶ RelayerSdk::create_instance
//!            └── otherwise ──▶ UnsupportedChain
//! ```
//!
//! Every step checks the cancellation token first; after it fires nothing
//! else is injected or fetched.

pub mod sdk;
pub mod status;

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info};
use securevault_config::{HARDHAT_CHAIN_ID, SEPOLIA_CHAIN_ID, SecureVaultConfig};
use securevault_fhe::{ChainProvider, FheSession, SdkError};
use tokio_util::sync::CancellationToken;

use crate::error::BootstrapError;
use crate::poll::{PollError, PollPolicy, poll_until};

pub use sdk::{
    NetworkConfig, ProtocolContracts, RelayerSdk, SDK_GLOBAL_NAMES, ScriptLoader, SdkEnvironment,
    SdkRegistry, SimulatedBackend, locate_sdk,
};
pub use status::{BootstrapStatus, SessionManager};

// ============================================================================
// Settings
// ============================================================================

/// Chain routing and SDK discovery settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapSettings {
    pub sdk_url: String,
    /// Chains the relayer serves
    pub relayer_chains: Vec<u64>,
    /// Simulated chains and their RPC URLs
    pub mock_chains: BTreeMap<u64, String>,
    pub poll: PollPolicy,
}

impl BootstrapSettings {
    pub fn from_config(config: &SecureVaultConfig) -> Self {
        Self {
            sdk_url: config.relayer.sdk_cdn_url.clone(),
            relayer_chains: config.relayer.relayer_chains.clone(),
            mock_chains: config.chains.mock_chain_ids(),
            poll: PollPolicy::from_config(&config.relayer),
        }
    }

    /// The local hardhat chain is always simulated.
    pub fn is_simulated(&self, chain_id: u64) -> bool {
        chain_id == HARDHAT_CHAIN_ID || self.mock_chains.contains_key(&chain_id)
    }

    pub fn is_relayer_chain(&self, chain_id: u64) -> bool {
        self.relayer_chains.contains(&chain_id)
    }
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self::from_config(&SecureVaultConfig::default())
    }
}

/// Capabilities bootstrap runs against.
#[derive(Clone)]
pub struct BootstrapContext {
    pub environment: Arc<dyn SdkEnvironment>,
    pub simulator: Arc<dyn SimulatedBackend>,
    pub settings: BootstrapSettings,
}

impl BootstrapContext {
    pub fn new(
        environment: Arc<dyn SdkEnvironment>,
        simulator: Arc<dyn SimulatedBackend>,
        settings: BootstrapSettings,
    ) -> Self {
        Self {
            environment,
            simulator,
            settings,
        }
    }
}

// ============================================================================
// Acquire
// ============================================================================

/// Status notification sink. Purely informational.
pub type StatusSink<'a> = &'a (dyn Fn(&str) + Send + Sync);

fn report(on_status: StatusSink<'_>, step: &str) {
    info!("FHEVM: {step}");
    on_status(step);
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), BootstrapError> {
    if cancel.is_cancelled() {
        return Err(BootstrapError::Cancelled);
    }
    Ok(())
}

/// Produce a ready session for the provider's chain.
pub async fn acquire_session(
    ctx: &BootstrapContext,
    provider: Arc<dyn ChainProvider>,
    cancel: &CancellationToken,
    on_status: StatusSink<'_>,
) -> Result<Arc<dyn FheSession>, BootstrapError> {
    ensure_live(cancel)?;
    let chain_id = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(BootstrapError::Cancelled),
        id = provider.chain_id() => id?,
    };

    report(on_status, "Checking chain...");
    ensure_live(cancel)?;

    let session = if ctx.settings.is_simulated(chain_id) {
        report(on_status, "Initializing mock FHEVM...");
        simulated_path(ctx, provider, chain_id, cancel, on_status).await?
    } else if ctx.settings.is_relayer_chain(chain_id) {
        remote_path(ctx, provider, chain_id, cancel, on_status).await?
    } else {
        debug!("Chain {chain_id} is neither simulated nor served by the relayer");
        return Err(BootstrapError::UnsupportedChain(chain_id));
    };

    // a session finished after cancellation is dropped
    ensure_live(cancel)?;
    Ok(session)
}

async fn remote_path(
    ctx: &BootstrapContext,
    provider: Arc<dyn ChainProvider>,
    chain_id: u64,
    cancel: &CancellationToken,
    on_status: StatusSink<'_>,
) -> Result<Arc<dyn FheSession>, BootstrapError> {
    report(on_status, "Loading Relayer SDK...");
    let sdk = discover_sdk(ctx, cancel).await?;

    ensure_live(cancel)?;
    report(on_status, "Initializing SDK...");
    init_sdk(sdk.as_ref()).await;

    ensure_live(cancel)?;
    report(on_status, "Fetching configuration...");
    let config = match fetch_config(sdk.as_ref(), chain_id, cancel).await? {
        Some(config) => config,
        None => match sdk.well_known_config() {
            Some(config) if chain_id == SEPOLIA_CHAIN_ID => config,
            _ => return Err(BootstrapError::UnsupportedChain(chain_id)),
        },
    };

    ensure_live(cancel)?;
    report(on_status, "Creating FHEVM instance...");
    let created = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(BootstrapError::Cancelled),
        created = sdk.create_instance(&config, provider) => created,
    };
    created.map_err(rewrap_relayer_error)
}

async fn simulated_path(
    ctx: &BootstrapContext,
    provider: Arc<dyn ChainProvider>,
    chain_id: u64,
    cancel: &CancellationToken,
    on_status: StatusSink<'_>,
) -> Result<Arc<dyn FheSession>, BootstrapError> {
    ensure_live(cancel)?;
    report(on_status, "Loading Relayer SDK for mock...");
    let sdk = discover_sdk(ctx, cancel).await?;

    ensure_live(cancel)?;
    report(on_status, "Initializing SDK...");
    init_sdk(sdk.as_ref()).await;

    ensure_live(cancel)?;
    report(on_status, "Fetching metadata...");
    let config = match fetch_config(sdk.as_ref(), chain_id, cancel).await? {
        Some(config) => config,
        None => sdk.well_known_config().ok_or_else(|| {
            BootstrapError::Relayer(format!(
                "Unable to get configuration for chain ID: {chain_id}. Please ensure SDK is properly loaded."
            ))
        })?,
    };
    config.protocol_contracts()?;

    ensure_live(cancel)?;
    report(on_status, "Creating MockFhevmInstance...");
    let created = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(BootstrapError::Cancelled),
        created = ctx.simulator.create_session(provider.clone(), provider, &config, chain_id) => created,
    };
    let session = created.map_err(|e| rewrap_simulated_error(e, chain_id))?;
    report(on_status, "Mock FHEVM ready");
    Ok(session)
}

// ============================================================================
// Steps
// ============================================================================

/// Locate the relayer SDK, injecting its script when nothing provides it yet.
pub async fn discover_sdk(
    ctx: &BootstrapContext,
    cancel: &CancellationToken,
) -> Result<Arc<dyn RelayerSdk>, BootstrapError> {
    ensure_live(cancel)?;
    let env = ctx.environment.as_ref();
    if let Some(sdk) = locate_sdk(env) {
        debug!("Relayer SDK already loaded");
        return Ok(sdk);
    }

    let url = ctx.settings.sdk_url.as_str();
    if env.script_present(url) {
        debug!("Relayer SDK script already present, waiting for it to register");
    } else {
        ensure_live(cancel)?;
        debug!("Injecting Relayer SDK script {url}");
        env.inject_script(url)
            .await
            .map_err(|e| BootstrapError::ScriptLoad {
                url: url.to_string(),
                reason: e.message,
            })?;
    }

    poll_until(cancel, ctx.settings.poll, || locate_sdk(env))
        .await
        .map_err(|e| match e {
            PollError::Cancelled => BootstrapError::Cancelled,
            PollError::Exhausted { attempts } => BootstrapError::DiscoveryTimeout {
                attempts,
                url: url.to_string(),
            },
        })
}

/// Init failures are expected when the SDK was already initialized.
async fn init_sdk(sdk: &dyn RelayerSdk) {
    if let Err(e) = sdk.init_sdk().await {
        debug!("Ignoring SDK init failure: {e}");
    }
}

async fn fetch_config(
    sdk: &dyn RelayerSdk,
    chain_id: u64,
    cancel: &CancellationToken,
) -> Result<Option<NetworkConfig>, BootstrapError> {
    let fetched = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(BootstrapError::Cancelled),
        fetched = sdk.fetch_network_config(chain_id) => fetched,
    };
    fetched.map_err(|e| BootstrapError::Relayer(e.message))
}

fn rewrap_relayer_error(err: SdkError) -> BootstrapError {
    if err.mentions("relayer url") || err.mentions("public key") {
        BootstrapError::Relayer(format!(
            "Failed to initialize FHEVM: Relayer configuration error. \
             Please ensure you are using the correct network (Sepolia for production, localhost for mock). \
             Original error: {}",
            err.message
        ))
    } else {
        BootstrapError::Relayer(err.message)
    }
}

fn rewrap_simulated_error(err: SdkError, chain_id: u64) -> BootstrapError {
    if err.mentions("getCoprocessorSigners") || err.mentions("could not decode") {
        BootstrapError::Relayer(format!(
            "Failed to initialize MockFhevmInstance: Contract query failed. \
             Please ensure all FHEVM contracts (ACL, InputVerifier, KMS) are deployed on chain {chain_id}. \
             Original error: {}",
            err.message
        ))
    } else {
        BootstrapError::Relayer(err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_routing() {
        let mut config = SecureVaultConfig::default();
        config
            .chains
            .mock_chains
            .insert("1337".into(), "http://127.0.0.1:9545".into());
        let settings = BootstrapSettings::from_config(&config);

        assert!(settings.is_simulated(31337));
        assert!(settings.is_simulated(1337));
        assert!(!settings.is_simulated(SEPOLIA_CHAIN_ID));
        assert!(settings.is_relayer_chain(SEPOLIA_CHAIN_ID));
        assert!(!settings.is_relayer_chain(1));
    }

    #[test]
    fn test_hardhat_simulated_even_without_mock_entry() {
        let mut settings = BootstrapSettings::default();
        settings.mock_chains.clear();
        assert!(settings.is_simulated(HARDHAT_CHAIN_ID));
    }

    #[test]
    fn test_relayer_rewrap() {
        let err = rewrap_relayer_error(SdkError::new("Invalid public key"));
        let BootstrapError::Relayer(msg) = err else {
            panic!("expected relayer error");
        };
        assert!(msg.starts_with("Failed to initialize FHEVM: Relayer configuration error."));
        assert!(msg.ends_with("Original error: Invalid public key"));

        assert_eq!(
            rewrap_relayer_error(SdkError::new("timeout")),
            BootstrapError::Relayer("timeout".into())
        );
    }

    #[test]
    fn test_simulated_rewrap() {
        let err = rewrap_simulated_error(
            SdkError::new("could not decode result data (method=\"getCoprocessorSigners()\")"),
            31337,
        );
        let BootstrapError::Relayer(msg) = err else {
            panic!("expected relayer error");
        };
        assert!(msg.contains("deployed on chain 31337"));

        assert_eq!(
            rewrap_simulated_error(SdkError::new("boom"), 31337),
            BootstrapError::Relayer("boom".into())
        );
    }
}
