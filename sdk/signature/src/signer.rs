use std::fmt;
use std::str::FromStr;

use alloy_primitives::Address;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use securevault_fhe::DecryptionTypedData;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    /// The key holder declined the request
    #[error("user rejected the request: {0}")]
    Rejected(String),

    #[error("{0}")]
    Failed(String),
}

/// A wallet able to sign EIP-712 decryption payloads.
#[async_trait]
pub trait TypedDataSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Returns the 65-byte signature as 0x-prefixed hex.
    async fn sign_typed_data(&self, typed: &DecryptionTypedData) -> Result<String, SignerError>;
}

/// Signer holding a secp256k1 key in process.
#[derive(Clone)]
pub struct LocalWalletSigner {
    inner: PrivateKeySigner,
}

impl LocalWalletSigner {
    pub fn random() -> Self {
        Self {
            inner: PrivateKeySigner::random(),
        }
    }

    /// Accepts the key with or without `0x`.
    pub fn from_hex(key: &str) -> Result<Self, SignerError> {
        let inner = PrivateKeySigner::from_str(key)
            .map_err(|e| SignerError::Failed(format!("invalid private key: {e}")))?;
        Ok(Self { inner })
    }
}

impl fmt::Debug for LocalWalletSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalWalletSigner")
            .field("address", &self.inner.address())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TypedDataSigner for LocalWalletSigner {
    fn address(&self) -> Address {
        self.inner.address()
    }

    async fn sign_typed_data(&self, typed: &DecryptionTypedData) -> Result<String, SignerError> {
        let hash = typed.signing_hash();
        let signature = self
            .inner
            .sign_hash_sync(&hash)
            .map_err(|e| SignerError::Failed(e.to_string()))?;
        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Signature;

    fn typed() -> DecryptionTypedData {
        DecryptionTypedData::new(
            31337,
            Address::repeat_byte(0x05),
            &[9u8; 32],
            &[Address::repeat_byte(0x01)],
            1_700_000_000,
            365,
        )
    }

    #[tokio::test]
    async fn test_signature_recovers_to_signer() {
        let signer = LocalWalletSigner::random();
        let typed = typed();
        let sig_hex = signer.sign_typed_data(&typed).await.unwrap();

        assert!(sig_hex.starts_with("0x"));
        let bytes = hex::decode(&sig_hex[2..]).unwrap();
        assert_eq!(bytes.len(), 65);

        let sig = Signature::from_raw(&bytes).unwrap();
        let recovered = sig.recover_address_from_prehash(&typed.signing_hash()).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn test_from_hex() {
        let key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let signer = LocalWalletSigner::from_hex(key).unwrap();
        assert_eq!(
            signer.address(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
                .parse::<Address>()
                .unwrap()
        );
        assert!(LocalWalletSigner::from_hex("nothex").is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let signer = LocalWalletSigner::random();
        let debug = format!("{:?}", signer);
        assert!(debug.contains("address"));
        assert!(!debug.contains("credential"));
    }
}
