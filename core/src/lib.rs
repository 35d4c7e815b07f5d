//! SecureVault client core
//!
//! ```text
//!  provider ──▶ bootstrap::acquire_session ──▶ FheSession
//!                   │  (simulated or relayer path,
//!                   │   cancellable SDK discovery)
//!                   ▼
//!             SessionManager (idle → loading → ready | error)
//!
//!  IdentityVault ──▶ encrypt input ──▶ VaultContract tx ──▶ await inclusion
//!        │                                                     │
//!        └──◀── decrypt (DecryptionSignatureManager) ◀── read handles
//! ```
//!
//! `mock` holds an in-process coprocessor, relayer SDK and vault contract
//! used for local chains and tests.

pub mod bootstrap;
pub mod error;
pub mod mock;
pub mod poll;
pub mod vault;

pub use bootstrap::{
    BootstrapContext, BootstrapSettings, BootstrapStatus, SessionManager, acquire_session,
};
pub use error::{BootstrapError, VaultError};
pub use poll::{PollError, PollPolicy, poll_until};
pub use vault::{IdentityVault, Outcome};
