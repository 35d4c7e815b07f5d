use thiserror::Error;

use crate::handle::Handle;

/// Errors raised by FHE session operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FheError {
    /// Handle text is not 32 bytes of hex
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Key material could not be decoded
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    /// Decrypted value has a shape no boolean/integer reading exists for
    #[error("Unsupported clear value: {0}")]
    UnsupportedClearValue(String),

    /// Encrypt was called on an input with no values
    #[error("Encrypted input has no values")]
    EmptyInput,

    /// Too many bits packed in a single input
    #[error("Encrypted input too large: {bits} bits (max {max})")]
    InputTooLarge { bits: u32, max: u32 },

    /// Decryption authorization was rejected
    #[error("Decryption not authorized: {0}")]
    Unauthorized(String),

    /// The coprocessor holds no ciphertext for this handle
    #[error("Unknown handle: {0}")]
    UnknownHandle(Handle),

    /// Any other coprocessor/relayer failure
    #[error("Coprocessor error: {0}")]
    Coprocessor(String),
}

/// Failure reported by a relayer SDK or simulated backend.
///
/// Only the message is meaningful; bootstrap inspects it to decide how to
/// present the failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SdkError {
    pub message: String,
}

impl SdkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Case-insensitive substring match on the message.
    pub fn mentions(&self, needle: &str) -> bool {
        self.message
            .to_ascii_lowercase()
            .contains(&needle.to_ascii_lowercase())
    }
}

impl From<FheError> for SdkError {
    fn from(err: FheError) -> Self {
        Self::new(err.to_string())
    }
}

/// Result type for FHE operations
pub type Result<T> = std::result::Result<T, FheError>;
