use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("RPC request failed: {0}")]
    Rpc(String),

    #[error("Provider not connected")]
    NotConnected,
}

/// Read access to the chain the wallet is connected to.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ProviderError>;

    /// RPC endpoint, when the provider is backed by one.
    fn rpc_url(&self) -> Option<&str> {
        None
    }
}
