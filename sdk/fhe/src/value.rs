use alloy_primitives::U256;
use serde_json::Value;

use crate::error::{FheError, Result};

/// A decrypted value as delivered by the decryption transport.
///
/// The relayer may encode the same boolean as a bool, an integer, or a
/// decimal string, so every shape is kept as its own case and read back
/// through [`ClearValue::as_bool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearValue {
    Bool(bool),
    Uint(U256),
    Int(i128),
    Text(String),
    /// The response had no entry for the requested handle
    Absent,
}

impl ClearValue {
    /// Boolean reading: zero, `"0"`, the empty string and absence are false.
    pub fn as_bool(&self) -> bool {
        match self {
            ClearValue::Bool(b) => *b,
            ClearValue::Uint(v) => !v.is_zero(),
            ClearValue::Int(v) => *v != 0,
            ClearValue::Text(s) => !s.is_empty() && s != "0",
            ClearValue::Absent => false,
        }
    }

    /// Integer reading, when the value is a non-negative integer that fits.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ClearValue::Bool(b) => Some(u64::from(*b)),
            ClearValue::Uint(v) => u64::try_from(*v).ok(),
            ClearValue::Int(v) => u64::try_from(*v).ok(),
            ClearValue::Text(s) => s.trim().parse().ok(),
            ClearValue::Absent => None,
        }
    }

    /// Decode a JSON primitive from the transport.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(ClearValue::Absent),
            Value::Bool(b) => Ok(ClearValue::Bool(*b)),
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Ok(ClearValue::Uint(U256::from(u)))
                } else if let Some(i) = n.as_i64() {
                    Ok(ClearValue::Int(i128::from(i)))
                } else {
                    match n.as_f64() {
                        Some(f) if f.fract() == 0.0 && f.is_finite() => Ok(ClearValue::Int(f as i128)),
                        _ => Err(FheError::UnsupportedClearValue(n.to_string())),
                    }
                }
            }
            Value::String(s) => Ok(ClearValue::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => {
                Err(FheError::UnsupportedClearValue(value.to_string()))
            }
        }
    }
}

impl From<bool> for ClearValue {
    fn from(value: bool) -> Self {
        ClearValue::Bool(value)
    }
}

impl From<u64> for ClearValue {
    fn from(value: u64) -> Self {
        ClearValue::Uint(U256::from(value))
    }
}
