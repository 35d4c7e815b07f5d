//! Decryption signatures
//!
//! A user signs one EIP-712 authorization per (user, contract set) and the
//! result is reused until it expires, so decrypts don't prompt the wallet
//! every time.
//!
//! ```text
//! load_or_sign ──▶ store.get_item(key) ──valid──▶ cached signature
//!                        │
//!                        └─miss/expired──▶ keypair ─▶ EIP-712 ─▶ sign ─▶ store.set_item
//! ```

pub mod error;
pub mod manager;
pub mod signature;
pub mod signer;
pub mod store;

pub use error::{Result, SignatureError};
pub use manager::{DEFAULT_DURATION_DAYS, DecryptionSignatureManager};
pub use signature::{ContractSet, DecryptionSignature, SECONDS_PER_DAY, signature_cache_key};
pub use signer::{LocalWalletSigner, SignerError, TypedDataSigner};
pub use store::{FileStringStore, InMemoryStringStore, StoreError, StringStore};
