use securevault_fhe::FheError;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// The wallet declined to sign
    #[error("Signing rejected: {0}")]
    SigningRejected(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Contract address set is empty")]
    EmptyContractSet,

    #[error("Signature store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fhe(#[from] FheError),
}

pub type Result<T> = std::result::Result<T, SignatureError>;
