use securevault_fhe::{FheError, ProviderError};
use securevault_signature::SignatureError;
use thiserror::Error;

use crate::vault::contract::ContractError;

/// Terminal failures of one bootstrap attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    #[error("FHEVM operation was cancelled")]
    Cancelled,

    #[error(
        "Unsupported chain ID: {0}. Please use Sepolia (11155111) or a configured local chain"
    )]
    UnsupportedChain(u64),

    #[error(
        "Relayer SDK not found after {attempts} attempts. Expected relayerSDK or RelayerSDKBundle. Please check if the CDN URL is accessible: {url}"
    )]
    DiscoveryTimeout { attempts: u32, url: String },

    #[error("Failed to load Relayer SDK script {url}: {reason}")]
    ScriptLoad { url: String, reason: String },

    #[error("Configuration missing {0}")]
    ConfigIncomplete(String),

    /// Instance creation or configuration fetch failed
    #[error("{0}")]
    Relayer(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Failures of an identity vault operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// Wallet, session or stored-data state does not allow the call
    #[error("{0}")]
    PreconditionNotMet(String),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("Transaction failed: {0}")]
    TransactionFailed(#[from] ContractError),

    #[error(transparent)]
    Fhe(#[from] FheError),
}

pub type Result<T> = std::result::Result<T, VaultError>;
