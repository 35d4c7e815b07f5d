//! SecureVault FHE primitives
//!
//! Client-side view of the FHE coprocessor: opaque ciphertext handles, the
//! session capability used to encrypt inputs and decrypt results, and the
//! EIP-712 payload a user signs to authorize decryption.
//!
//! ```text
//! ┌──────────────┐  create_encrypted_input   ┌───────────────────┐
//! │   Client     │──────────────────────────▶│  EncryptedInput   │
//! │  (session)   │                           │  handles + proof  │
//! │              │◀──────────────────────────│                   │
//! │              │   user_decrypt(handles,   └───────────────────┘
//! │              │       signed EIP-712)
//! └──────────────┘
//! ```

pub mod eip712;
pub mod error;
pub mod handle;
pub mod input;
pub mod keypair;
pub mod provider;
pub mod session;
pub mod value;

pub use eip712::{DecryptionTypedData, UserDecryptRequestVerification};
pub use error::{FheError, Result, SdkError};
pub use handle::Handle;
pub use input::{EncryptedInput, EncryptedInputBuilder, InputRequest, InputValue, MAX_INPUT_BITS};
pub use keypair::EphemeralKeypair;
pub use provider::{ChainProvider, ProviderError};
pub use session::{DecryptResults, FheSession, HandleContractPair, UserDecryptAuth};
pub use value::ClearValue;
