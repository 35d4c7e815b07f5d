//! In-process stand-in for the FHE coprocessor.
//!
//! Ciphertexts are kept in clear behind their handles; what is modelled
//! faithfully is who may use a handle (input proofs, ACL) and who may
//! decrypt it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy_primitives::{Address, B256, Bytes, keccak256};
use async_trait::async_trait;
use securevault_fhe::{
    ChainProvider, ClearValue, DecryptResults, EncryptedInput, FheError, FheSession, Handle,
    HandleContractPair, InputRequest, SdkError,
};

use super::session::MockSession;
use crate::bootstrap::{NetworkConfig, SimulatedBackend};

/// Failure text the coprocessor-signer query produces against an address
/// with no contract deployed.
pub const SIGNER_QUERY_FAILURE: &str =
    "could not decode result data (method=\"getCoprocessorSigners()\", data=\"0x\")";

fn protocol_address(label: &str) -> Address {
    Address::from_word(keccak256(label.as_bytes()))
}

struct InputProof {
    contract: Address,
    user: Address,
    /// Handles not yet verified; the proof is dropped once this is empty
    pending: HashSet<Handle>,
}

#[derive(Default)]
struct CoprocessorState {
    ciphertexts: HashMap<Handle, ClearValue>,
    acl: HashMap<Handle, HashSet<Address>>,
    proofs: HashMap<B256, InputProof>,
    deployed: HashSet<Address>,
    nonce: u64,
}

impl CoprocessorState {
    fn next_handle(&mut self, salt: &[u8]) -> Handle {
        self.nonce += 1;
        let mut preimage = self.nonce.to_be_bytes().to_vec();
        preimage.extend_from_slice(salt);
        Handle(keccak256(preimage))
    }
}

/// Shared coprocessor. Clones see the same ciphertexts.
#[derive(Clone, Default)]
pub struct MockCoprocessor {
    state: Arc<Mutex<CoprocessorState>>,
}

impl MockCoprocessor {
    /// A coprocessor with the ACL, input verifier and KMS contracts deployed.
    pub fn new() -> Self {
        let coprocessor = Self::without_protocol();
        coprocessor.deploy_protocol();
        coprocessor
    }

    /// A coprocessor on a chain where nothing is deployed yet.
    pub fn without_protocol() -> Self {
        Self::default()
    }

    pub fn deploy_protocol(&self) {
        let config = Self::network_template();
        let mut state = self.state();
        for address in [
            config.acl_contract_address,
            config.input_verifier_contract_address,
            config.kms_contract_address,
        ]
        .into_iter()
        .flatten()
        {
            state.deployed.insert(address);
        }
    }

    fn network_template() -> NetworkConfig {
        NetworkConfig {
            acl_contract_address: Some(protocol_address("securevault.mock.acl")),
            input_verifier_contract_address: Some(protocol_address("securevault.mock.input-verifier")),
            kms_contract_address: Some(protocol_address("securevault.mock.kms")),
            verifying_contract_address_decryption: Some(protocol_address(
                "securevault.mock.decryption",
            )),
            ..Default::default()
        }
    }

    /// Configuration a local relayer serves for `chain_id`.
    pub fn local_network_config(&self, chain_id: u64) -> NetworkConfig {
        NetworkConfig {
            chain_id: Some(chain_id),
            gateway_chain_id: Some(chain_id),
            relayer_url: Some("http://localhost:3000".into()),
            network: Some(format!("local-{chain_id}")),
            ..Self::network_template()
        }
    }

    /// Fails like a coprocessor-signer query when any protocol contract of
    /// `config` is not deployed.
    pub fn ensure_protocol(&self, config: &NetworkConfig) -> Result<(), SdkError> {
        let contracts = [
            config.acl_contract_address,
            config.input_verifier_contract_address,
            config.kms_contract_address,
        ];
        let state = self.state();
        let all_deployed = contracts
            .iter()
            .all(|c| c.is_some_and(|addr| state.deployed.contains(&addr)));
        if all_deployed {
            Ok(())
        } else {
            Err(SdkError::new(SIGNER_QUERY_FAILURE))
        }
    }

    /// Encrypt a request into fresh handles and a proof bound to
    /// (contract, user).
    pub fn encrypt(&self, request: &InputRequest) -> Result<EncryptedInput, FheError> {
        request.validate()?;
        let mut state = self.state();
        let mut salt = request.contract_address.to_vec();
        salt.extend_from_slice(request.user_address.as_slice());

        let handles: Vec<Handle> = request
            .values
            .iter()
            .map(|value| {
                let handle = state.next_handle(&salt);
                state.ciphertexts.insert(handle, value.to_clear());
                handle
            })
            .collect();

        let mut preimage = salt;
        for handle in &handles {
            preimage.extend_from_slice(handle.as_bytes());
        }
        let proof = keccak256(preimage);
        state.proofs.insert(
            proof,
            InputProof {
                contract: request.contract_address,
                user: request.user_address,
                pending: handles.iter().copied().collect(),
            },
        );

        Ok(EncryptedInput {
            handles,
            input_proof: Bytes::copy_from_slice(proof.as_slice()),
        })
    }

    /// Accept an external handle inside `contract` called by `user`.
    ///
    /// On success the contract may use the handle. Each handle of a proof
    /// verifies once.
    pub fn verify_input(
        &self,
        handle: Handle,
        proof: &Bytes,
        contract: Address,
        user: Address,
    ) -> Result<ClearValue, FheError> {
        let key = B256::try_from(proof.as_ref())
            .map_err(|_| FheError::Unauthorized("malformed input proof".into()))?;
        let mut state = self.state();
        let bound = state
            .proofs
            .get(&key)
            .is_some_and(|p| p.contract == contract && p.user == user && p.pending.contains(&handle));
        if !bound {
            return Err(FheError::Unauthorized(format!(
                "input proof not valid for handle {handle}"
            )));
        }
        let value = state
            .ciphertexts
            .get(&handle)
            .cloned()
            .ok_or(FheError::UnknownHandle(handle))?;

        let spent = state.proofs.get_mut(&key).is_some_and(|p| {
            p.pending.remove(&handle);
            p.pending.is_empty()
        });
        if spent {
            state.proofs.remove(&key);
        }
        state.acl.entry(handle).or_default().insert(contract);
        Ok(value)
    }

    /// Clear value behind a handle, for homomorphic evaluation by `caller`.
    pub fn value_for(&self, handle: Handle, caller: Address) -> Result<ClearValue, FheError> {
        let state = self.state();
        if !state.acl.get(&handle).is_some_and(|allowed| allowed.contains(&caller)) {
            return Err(FheError::Unauthorized(format!(
                "{caller} may not use handle {handle}"
            )));
        }
        state
            .ciphertexts
            .get(&handle)
            .cloned()
            .ok_or(FheError::UnknownHandle(handle))
    }

    /// Store a computed result. Only `owner` may use it until others are allowed.
    pub fn compute(&self, result: ClearValue, owner: Address) -> Handle {
        let mut state = self.state();
        let handle = state.next_handle(owner.as_slice());
        state.ciphertexts.insert(handle, result);
        state.acl.entry(handle).or_default().insert(owner);
        handle
    }

    pub fn allow(&self, handle: Handle, account: Address) {
        self.state().acl.entry(handle).or_default().insert(account);
    }

    pub fn is_allowed(&self, handle: Handle, account: Address) -> bool {
        self.state()
            .acl
            .get(&handle)
            .is_some_and(|allowed| allowed.contains(&account))
    }

    /// Decrypt for `user`; both the user and the owning contract need access.
    pub fn decrypt_for(
        &self,
        pairs: &[HandleContractPair],
        user: Address,
    ) -> Result<DecryptResults, FheError> {
        let state = self.state();
        let mut results = DecryptResults::new();
        for pair in pairs {
            let allowed = state.acl.get(&pair.handle).is_some_and(|acl| {
                acl.contains(&user) && acl.contains(&pair.contract_address)
            });
            if !allowed {
                return Err(FheError::Unauthorized(format!(
                    "{user} is not allowed to decrypt {}",
                    pair.handle
                )));
            }
            let value = state
                .ciphertexts
                .get(&pair.handle)
                .cloned()
                .ok_or(FheError::UnknownHandle(pair.handle))?;
            results.insert(pair.handle, value);
        }
        Ok(results)
    }

    /// Input proofs with handles still to verify.
    pub fn open_proofs(&self) -> usize {
        self.state().proofs.len()
    }

    fn state(&self) -> MutexGuard<'_, CoprocessorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SimulatedBackend for MockCoprocessor {
    async fn create_session(
        &self,
        _public: Arc<dyn ChainProvider>,
        _execution: Arc<dyn ChainProvider>,
        config: &NetworkConfig,
        chain_id: u64,
    ) -> Result<Arc<dyn FheSession>, SdkError> {
        self.ensure_protocol(config)?;
        Ok(Arc::new(MockSession::new(self.clone(), chain_id, config)))
    }
}
