use alloy_primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};

use crate::error::{FheError, Result};
use crate::handle::Handle;
use crate::session::FheSession;
use crate::value::ClearValue;

/// Upper bound on the bits packed into a single encrypted input.
pub const MAX_INPUT_BITS: u32 = 2048;

/// One plaintext value queued for encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum InputValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
}

impl InputValue {
    pub fn bits(&self) -> u32 {
        match self {
            InputValue::Bool(_) => 2,
            InputValue::U8(_) => 8,
            InputValue::U16(_) => 16,
            InputValue::U32(_) => 32,
            InputValue::U64(_) => 64,
        }
    }

    pub fn to_clear(&self) -> ClearValue {
        match *self {
            InputValue::Bool(b) => ClearValue::Bool(b),
            InputValue::U8(v) => ClearValue::from(u64::from(v)),
            InputValue::U16(v) => ClearValue::from(u64::from(v)),
            InputValue::U32(v) => ClearValue::from(u64::from(v)),
            InputValue::U64(v) => ClearValue::from(v),
        }
    }
}

/// Values bound to a (contract, user) pair, ready to be encrypted.
///
/// The resulting proof is only accepted by `contract_address` when sent
/// from `user_address`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRequest {
    pub contract_address: Address,
    pub user_address: Address,
    pub values: Vec<InputValue>,
}

impl InputRequest {
    pub fn total_bits(&self) -> u32 {
        self.values.iter().map(InputValue::bits).sum()
    }

    /// Reject empty inputs and inputs over [`MAX_INPUT_BITS`].
    pub fn validate(&self) -> Result<()> {
        if self.values.is_empty() {
            return Err(FheError::EmptyInput);
        }
        let bits = self.total_bits();
        if bits > MAX_INPUT_BITS {
            return Err(FheError::InputTooLarge {
                bits,
                max: MAX_INPUT_BITS,
            });
        }
        Ok(())
    }
}

/// Ciphertext handles (in insertion order) plus the proof that binds them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedInput {
    pub handles: Vec<Handle>,
    pub input_proof: Bytes,
}

/// Accumulates typed values, then encrypts them through the session.
pub struct EncryptedInputBuilder<'a> {
    session: &'a dyn FheSession,
    request: InputRequest,
}

impl<'a> EncryptedInputBuilder<'a> {
    pub fn new(session: &'a dyn FheSession, contract_address: Address, user_address: Address) -> Self {
        Self {
            session,
            request: InputRequest {
                contract_address,
                user_address,
                values: Vec::new(),
            },
        }
    }

    pub fn add_bool(&mut self, value: bool) -> &mut Self {
        self.push(InputValue::Bool(value))
    }

    pub fn add8(&mut self, value: u8) -> &mut Self {
        self.push(InputValue::U8(value))
    }

    pub fn add16(&mut self, value: u16) -> &mut Self {
        self.push(InputValue::U16(value))
    }

    pub fn add32(&mut self, value: u32) -> &mut Self {
        self.push(InputValue::U32(value))
    }

    pub fn add64(&mut self, value: u64) -> &mut Self {
        self.push(InputValue::U64(value))
    }

    fn push(&mut self, value: InputValue) -> &mut Self {
        self.request.values.push(value);
        self
    }

    pub fn request(&self) -> &InputRequest {
        &self.request
    }

    /// Encrypt the accumulated values. One handle per value, same order.
    pub async fn encrypt(self) -> Result<EncryptedInput> {
        self.request.validate()?;
        let encrypted = self.session.encrypt_input(&self.request).await?;
        if encrypted.handles.len() != self.request.values.len() {
            return Err(FheError::Coprocessor(format!(
                "expected {} handles, got {}",
                self.request.values.len(),
                encrypted.handles.len()
            )));
        }
        Ok(encrypted)
    }
}
