//! Identity transaction orchestration
//!
//! [`IdentityVault`] sequences the client side of the identity vault:
//!
//! ```text
//! store:  encrypt(age, region, kyc) ─▶ storeIdentityData ─▶ wait ─▶ re-read handles
//! verify: load_or_sign ─▶ encrypt(region) ─▶ calculateAccessPermissionsEnc ─▶ wait
//!            ─▶ getMyLastPermissionsEnc ─▶ user_decrypt ─▶ (isAdult, isRegion)
//! ```
//!
//! At most one operation runs per instance. A call made while another is in
//! flight returns [`Outcome::Skipped`] without touching any state.

pub mod contract;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use alloy_primitives::Address;
use log::{debug, info, warn};
use securevault_fhe::{ClearValue, DecryptResults, FheSession, Handle, HandleContractPair};
use securevault_signature::{ContractSet, DecryptionSignatureManager, TypedDataSigner};

use crate::error::{Result, VaultError};
use contract::{ContractError, TxHash, VaultContract};

pub use contract::{TxReceipt, VaultDirectory};

pub const MSG_CONNECT_WALLET: &str = "Please connect your wallet to compute permissions";
pub const MSG_STORE_FIRST: &str = "Please store your identity data first before verifying access";
pub const MSG_SIGNATURE_FAILED: &str = "Unable to generate decryption signature. Please try again";
pub const MSG_STORED: &str = "Identity data stored successfully";
pub const MSG_UPDATED: &str = "Identity data updated successfully";
pub const MSG_VERIFIED: &str = "Verification completed successfully";

const DEFAULT_INPUT_DELAY: Duration = Duration::from_millis(100);

// ============================================================================
// Types
// ============================================================================

/// Cached ciphertext handles of the caller's identity record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityHandles {
    pub age: Option<Handle>,
    pub region: Option<Handle>,
    pub kyc: Option<Handle>,
}

impl IdentityHandles {
    /// Zero handles mean nothing is stored.
    pub fn from_triple((age, region, kyc): (Handle, Handle, Handle)) -> Self {
        let present = |h: Handle| (!h.is_zero()).then_some(h);
        Self {
            age: present(age),
            region: present(region),
            kyc: present(kyc),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.age.is_some() && self.region.is_some() && self.kyc.is_some()
    }
}

/// A decrypted boolean and the handle it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearBool {
    pub handle: Handle,
    pub clear: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecryptedResults {
    pub is_adult: Option<ClearBool>,
    pub is_region: Option<ClearBool>,
}

/// What a UI collaborator renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultSnapshot {
    pub contract_address: Option<Address>,
    pub handles: IdentityHandles,
    pub decrypted_results: DecryptedResults,
    pub status_message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<T> {
    Completed(T),
    /// Another operation was in flight, or session/contract/signer is missing
    Skipped,
}

impl<T> Outcome<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Skipped => None,
        }
    }
}

// ============================================================================
// Flight token
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flight {
    Idle,
    InFlight,
}

/// Puts the token back to `Idle` on drop, on every exit path.
struct FlightGuard<'a> {
    slot: &'a Mutex<Flight>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Flight::Idle;
    }
}

#[derive(Debug, Default)]
struct VaultState {
    handles: IdentityHandles,
    decrypted: DecryptedResults,
    message: String,
}

#[derive(Clone, Copy)]
enum IdentityWrite {
    Store,
    Update,
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct IdentityVault {
    session: Option<Arc<dyn FheSession>>,
    reader: Option<Arc<dyn VaultContract>>,
    writer: Option<Arc<dyn VaultContract>>,
    signer: Option<Arc<dyn TypedDataSigner>>,
    signatures: Arc<DecryptionSignatureManager>,
    input_delay: Duration,
    flight: Mutex<Flight>,
    state: Mutex<VaultState>,
}

impl IdentityVault {
    pub fn new(signatures: Arc<DecryptionSignatureManager>) -> Self {
        Self {
            session: None,
            reader: None,
            writer: None,
            signer: None,
            signatures,
            input_delay: DEFAULT_INPUT_DELAY,
            flight: Mutex::new(Flight::Idle),
            state: Mutex::new(VaultState::default()),
        }
    }

    pub fn with_session(mut self, session: Arc<dyn FheSession>) -> Self {
        self.session = Some(session);
        self
    }

    /// Read-only contract handle, used when no wallet is connected.
    pub fn with_reader(mut self, reader: Arc<dyn VaultContract>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Contract handle bound to the signer's account.
    pub fn with_writer(mut self, writer: Arc<dyn VaultContract>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn with_signer(mut self, signer: Arc<dyn TypedDataSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Pause before the first encrypted input is built.
    pub fn with_input_delay(mut self, delay: Duration) -> Self {
        self.input_delay = delay;
        self
    }

    pub fn contract_address(&self) -> Option<Address> {
        self.contract().map(|c| c.address())
    }

    pub fn handles(&self) -> IdentityHandles {
        self.state().handles
    }

    pub fn decrypted_results(&self) -> DecryptedResults {
        self.state().decrypted
    }

    pub fn status_message(&self) -> String {
        self.state().message.clone()
    }

    pub fn snapshot(&self) -> VaultSnapshot {
        let state = self.state();
        VaultSnapshot {
            contract_address: self.contract_address(),
            handles: state.handles,
            decrypted_results: state.decrypted,
            status_message: state.message.clone(),
        }
    }

    pub async fn store_identity_data(
        &self,
        age: u8,
        region: u8,
        kyc: bool,
    ) -> Result<Outcome<IdentityHandles>> {
        self.write_identity(age, region, kyc, IdentityWrite::Store)
            .await
    }

    /// Replace an existing record.
    pub async fn update_identity_data(
        &self,
        age: u8,
        region: u8,
        kyc: bool,
    ) -> Result<Outcome<IdentityHandles>> {
        self.write_identity(age, region, kyc, IdentityWrite::Update)
            .await
    }

    async fn write_identity(
        &self,
        age: u8,
        region: u8,
        kyc: bool,
        kind: IdentityWrite,
    ) -> Result<Outcome<IdentityHandles>> {
        let Some(_flight) = self.begin() else {
            debug!("Identity write ignored: another operation is in flight");
            return Ok(Outcome::Skipped);
        };
        let (Some(session), Some(writer), Some(signer)) =
            (&self.session, &self.writer, &self.signer)
        else {
            debug!("Identity write ignored: session, contract or signer missing");
            return Ok(Outcome::Skipped);
        };

        if !self.input_delay.is_zero() {
            tokio::time::sleep(self.input_delay).await;
        }

        let mut input = session.create_encrypted_input(writer.address(), signer.address());
        input.add8(age).add8(region).add_bool(kyc);
        let encrypted = input.encrypt().await.map_err(|e| self.fail(e.into()))?;
        let &[age_handle, region_handle, kyc_handle] = encrypted.handles.as_slice() else {
            return Err(self.fail(VaultError::PreconditionNotMet(
                "encrypted input returned an unexpected number of handles".into(),
            )));
        };

        let submitted = match kind {
            IdentityWrite::Store => {
                writer
                    .store_identity_data(age_handle, region_handle, kyc_handle, &encrypted.input_proof)
                    .await
            }
            IdentityWrite::Update => {
                writer
                    .update_identity_data(age_handle, region_handle, kyc_handle, &encrypted.input_proof)
                    .await
            }
        };
        let tx = submitted.map_err(|e| self.fail(e.into()))?;
        self.await_inclusion(writer.as_ref(), tx).await?;

        let message = match kind {
            IdentityWrite::Store => MSG_STORED,
            IdentityWrite::Update => MSG_UPDATED,
        };
        info!("{message} (tx {tx})");
        self.set_message(message);

        let handles = self.refresh_handles().await.map_err(|e| self.fail(e))?;
        Ok(Outcome::Completed(handles))
    }

    /// Compute (isAdult, isInRegion) on-chain and decrypt both.
    pub async fn verify_access(&self, allowed_region: u8) -> Result<Outcome<DecryptedResults>> {
        let Some(_flight) = self.begin() else {
            debug!("Access verification ignored: another operation is in flight");
            return Ok(Outcome::Skipped);
        };
        let (Some(session), Some(contract), Some(signer)) =
            (&self.session, self.contract(), &self.signer)
        else {
            debug!("Access verification ignored: session, contract or signer missing");
            return Ok(Outcome::Skipped);
        };
        let Some(writer) = &self.writer else {
            return Err(self.reject(MSG_CONNECT_WALLET));
        };
        if !self.handles().is_complete() {
            return Err(self.reject(MSG_STORE_FIRST));
        }

        let contract_address = contract.address();
        let user = signer.address();
        let signature = self
            .signatures
            .load_or_sign(
                session.as_ref(),
                &ContractSet::single(contract_address),
                signer.as_ref(),
            )
            .await
            .map_err(|e| {
                warn!("Decryption signature unavailable: {e}");
                self.set_message(MSG_SIGNATURE_FAILED);
                VaultError::Signature(e)
            })?;

        let mut input = session.create_encrypted_input(contract_address, user);
        input.add8(allowed_region);
        let encrypted = input.encrypt().await.map_err(|e| self.fail(e.into()))?;
        let &[region_handle] = encrypted.handles.as_slice() else {
            return Err(self.fail(VaultError::PreconditionNotMet(
                "encrypted input returned an unexpected number of handles".into(),
            )));
        };

        let tx = writer
            .calculate_access_permissions_enc(region_handle, &encrypted.input_proof)
            .await
            .map_err(|e| self.fail(e.into()))?;
        self.await_inclusion(writer.as_ref(), tx).await?;

        let (adult_handle, region_result) = writer
            .get_my_last_permissions_enc()
            .await
            .map_err(|e| self.fail(e.into()))?;

        let pairs = [
            HandleContractPair {
                handle: adult_handle,
                contract_address,
            },
            HandleContractPair {
                handle: region_result,
                contract_address,
            },
        ];
        let clear = session
            .user_decrypt(&pairs, &signature.as_auth())
            .await
            .map_err(|e| self.fail(e.into()))?;

        let results = DecryptedResults {
            is_adult: Some(clear_bool(&clear, adult_handle)),
            is_region: Some(clear_bool(&clear, region_result)),
        };
        {
            let mut state = self.state();
            state.decrypted = results;
            state.message = MSG_VERIFIED.to_string();
        }
        info!("{MSG_VERIFIED} (tx {tx})");
        Ok(Outcome::Completed(results))
    }

    /// Re-read the caller's identity handles, preferring the signer-bound
    /// contract. Without any contract the cache is returned unchanged.
    pub async fn refresh_handles(&self) -> Result<IdentityHandles> {
        let Some(contract) = self.contract() else {
            return Ok(self.handles());
        };
        let triple = contract.get_my_identity_data().await?;
        let handles = IdentityHandles::from_triple(triple);
        self.state().handles = handles;
        Ok(handles)
    }

    pub async fn has_stored_data(&self) -> Result<bool> {
        let (Some(contract), Some(signer)) = (self.contract(), &self.signer) else {
            return Err(VaultError::PreconditionNotMet(MSG_CONNECT_WALLET.into()));
        };
        Ok(contract.has_stored_data(signer.address()).await?)
    }

    // ------------------------------------------------------------------------

    fn contract(&self) -> Option<&Arc<dyn VaultContract>> {
        self.writer.as_ref().or(self.reader.as_ref())
    }

    fn begin(&self) -> Option<FlightGuard<'_>> {
        let mut flight = self.flight.lock().unwrap_or_else(|e| e.into_inner());
        match std::mem::replace(&mut *flight, Flight::InFlight) {
            Flight::Idle => Some(FlightGuard { slot: &self.flight }),
            Flight::InFlight => None,
        }
    }

    fn state(&self) -> MutexGuard<'_, VaultState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_message(&self, message: impl Into<String>) {
        self.state().message = message.into();
    }

    fn reject(&self, message: &str) -> VaultError {
        debug!("Precondition not met: {message}");
        self.set_message(message);
        VaultError::PreconditionNotMet(message.to_string())
    }

    fn fail(&self, err: VaultError) -> VaultError {
        warn!("Vault operation failed: {err}");
        self.set_message(err.to_string());
        err
    }

    async fn await_inclusion(&self, contract: &dyn VaultContract, tx: TxHash) -> Result<TxReceipt> {
        let receipt = contract
            .wait_for_inclusion(tx)
            .await
            .map_err(|e| self.fail(e.into()))?;
        if !receipt.success {
            return Err(self.fail(ContractError::Reverted(format!("transaction {tx} reverted")).into()));
        }
        debug!("Transaction {tx} included in block {}", receipt.block_number);
        Ok(receipt)
    }
}

fn clear_bool(clear: &DecryptResults, handle: Handle) -> ClearBool {
    ClearBool {
        handle,
        clear: clear
            .get(&handle)
            .map(ClearValue::as_bool)
            .unwrap_or(false),
    }
}
