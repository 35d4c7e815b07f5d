//! SecureVault Configuration
//!
//! Shared configuration crate for the SecureVault client components.
//!
//! Handles loading configuration from:
//! 1. SV_CONFIG env var (explicit path)
//! 2. ./securevault.toml (current directory)
//! 3. ~/.securevault/securevault.toml (user home)
//!
//! Environment variables take precedence over TOML config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::{env, fs};

/// Global config instance for convenience access
pub static GLOBAL_CONFIG: OnceLock<SecureVaultConfig> = OnceLock::new();

const CONFIG_FILE_NAME: &str = "securevault.toml";
const CONFIG_DIR_NAME: &str = ".securevault";

// ============================================================================
// Default Constants
// ============================================================================

pub const DEFAULT_SDK_CDN_URL: &str =
    "https://cdn.zama.ai/relayer-sdk-js/0.2.0/relayer-sdk-js.umd.cjs";
/// Sepolia, the public testnet the relayer serves out of the box.
pub const SEPOLIA_CHAIN_ID: u64 = 11155111;
/// Local hardhat node; always served by the simulated coprocessor.
pub const HARDHAT_CHAIN_ID: u64 = 31337;
const DEFAULT_HARDHAT_RPC: &str = "http://localhost:8545";

const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 50;
const DEFAULT_SIGNATURE_DAYS: u64 = 365;
const DEFAULT_INPUT_DELAY_MS: u64 = 100;

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecureVaultConfig {
    #[serde(default)]
    pub relayer: RelayerConfig,
    #[serde(default)]
    pub chains: ChainsConfig,
    #[serde(default)]
    pub decryption: DecryptionConfig,
    #[serde(default)]
    pub vault: VaultConfig,
}

/// Remote relayer SDK discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayerConfig {
    #[serde(default = "default_sdk_cdn_url")]
    pub sdk_cdn_url: String,
    /// Chains for which the relayer offers a known configuration
    #[serde(default = "default_relayer_chains")]
    pub relayer_chains: Vec<u64>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: u32,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            sdk_cdn_url: DEFAULT_SDK_CDN_URL.into(),
            relayer_chains: default_relayer_chains(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            poll_max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
        }
    }
}

fn default_sdk_cdn_url() -> String {
    DEFAULT_SDK_CDN_URL.into()
}
fn default_relayer_chains() -> Vec<u64> {
    vec![SEPOLIA_CHAIN_ID]
}
fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_poll_max_attempts() -> u32 {
    DEFAULT_POLL_MAX_ATTEMPTS
}

/// Chains served by the simulated coprocessor.
///
/// TOML keys are strings, so the map is keyed by the decimal chain id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainsConfig {
    #[serde(default = "default_mock_chains")]
    pub mock_chains: BTreeMap<String, String>,
}

impl Default for ChainsConfig {
    fn default() -> Self {
        Self {
            mock_chains: default_mock_chains(),
        }
    }
}

fn default_mock_chains() -> BTreeMap<String, String> {
    BTreeMap::from([(HARDHAT_CHAIN_ID.to_string(), DEFAULT_HARDHAT_RPC.into())])
}

impl ChainsConfig {
    /// Mock chain ids with their RPC URLs. Unparseable keys are skipped.
    pub fn mock_chain_ids(&self) -> BTreeMap<u64, String> {
        parse_chain_keys(&self.mock_chains)
    }
}

/// Decryption signature settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptionConfig {
    #[serde(default = "default_signature_days")]
    pub duration_days: u64,
    /// Backing file for the signature cache. In-memory when unset.
    #[serde(default)]
    pub store_path: Option<String>,
}

impl Default for DecryptionConfig {
    fn default() -> Self {
        Self {
            duration_days: DEFAULT_SIGNATURE_DAYS,
            store_path: None,
        }
    }
}

fn default_signature_days() -> u64 {
    DEFAULT_SIGNATURE_DAYS
}

/// Vault contract settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default = "default_input_delay")]
    pub input_delay_ms: u64,
    /// Deployed vault contract address per chain id
    #[serde(default)]
    pub addresses: BTreeMap<String, String>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            input_delay_ms: DEFAULT_INPUT_DELAY_MS,
            addresses: BTreeMap::new(),
        }
    }
}

fn default_input_delay() -> u64 {
    DEFAULT_INPUT_DELAY_MS
}

impl VaultConfig {
    /// Vault addresses keyed by numeric chain id.
    pub fn addresses_by_chain(&self) -> BTreeMap<u64, String> {
        parse_chain_keys(&self.addresses)
    }
}

fn parse_chain_keys(map: &BTreeMap<String, String>) -> BTreeMap<u64, String> {
    map.iter()
        .filter_map(|(k, v)| match k.trim().parse::<u64>() {
            Ok(id) => Some((id, v.clone())),
            Err(_) => {
                log::warn!("Ignoring non-numeric chain id key: {}", k);
                None
            }
        })
        .collect()
}

// ============================================================================
// Override Helpers
// ============================================================================

/// Set field from a variable if present
fn var_string(lookup: &impl Fn(&str) -> Option<String>, key: &str, field: &mut String) {
    if let Some(v) = lookup(key) {
        *field = v;
    }
}

/// Set Option<String> from a variable if present
fn var_option_string(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    field: &mut Option<String>,
) {
    if let Some(v) = lookup(key) {
        *field = Some(v);
    }
}

/// Set field from a variable if present and parseable
fn var_parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    field: &mut T,
) {
    if let Some(v) = lookup(key) {
        if let Ok(parsed) = v.trim().parse() {
            *field = parsed;
        }
    }
}

/// Parse "11155111,8009" into chain ids
fn parse_chain_list(v: &str) -> Vec<u64> {
    v.split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect()
}

/// Parse "31337=http://localhost:8545,1337=http://..." into a chain map
fn parse_chain_map(v: &str) -> BTreeMap<String, String> {
    v.split(',')
        .filter_map(|entry| {
            let (id, url) = entry.split_once('=')?;
            let id = id.trim();
            id.parse::<u64>().ok()?;
            Some((id.to_string(), url.trim().to_string()))
        })
        .collect()
}

// ============================================================================
// Implementation
// ============================================================================

impl SecureVaultConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::parse_file(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::parse_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = env::var("SV_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        Self::default_config_path().filter(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Relayer
        var_string(&lookup, "SV_SDK_CDN_URL", &mut self.relayer.sdk_cdn_url);
        if let Some(v) = lookup("SV_RELAYER_CHAINS") {
            self.relayer.relayer_chains = parse_chain_list(&v);
        }
        var_parse(&lookup, "SV_POLL_INTERVAL_MS", &mut self.relayer.poll_interval_ms);
        var_parse(&lookup, "SV_POLL_MAX_ATTEMPTS", &mut self.relayer.poll_max_attempts);

        // Chains
        if let Some(v) = lookup("SV_MOCK_CHAINS") {
            self.chains.mock_chains = parse_chain_map(&v);
        }

        // Decryption
        var_parse(&lookup, "SV_SIGNATURE_DAYS", &mut self.decryption.duration_days);
        var_option_string(&lookup, "SV_SIGNATURE_STORE", &mut self.decryption.store_path);

        // Vault
        var_parse(&lookup, "SV_INPUT_DELAY_MS", &mut self.vault.input_delay_ms);
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        let mut sample = Self::default();
        sample.vault.addresses.insert(
            HARDHAT_CHAIN_ID.to_string(),
            "0x5FbDB2315678afecb367f032d93F642f64180aa3".into(),
        );
        toml::to_string_pretty(&sample).unwrap_or_default()
    }

    /// Get the global config instance, initializing it if necessary.
    ///
    /// Falls back to defaults if loading fails.
    pub fn global() -> &'static SecureVaultConfig {
        GLOBAL_CONFIG.get_or_init(|| {
            Self::load().unwrap_or_else(|e| {
                log::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            })
        })
    }

    /// Initialize the global config with a specific instance.
    ///
    /// Returns `Err(config)` if already initialized.
    pub fn set_global(config: SecureVaultConfig) -> Result<(), SecureVaultConfig> {
        GLOBAL_CONFIG.set(config)
    }
}
