mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{LOCAL_CHAIN, StatusLog, fast_settings, vault_address};
use securevault_config::SEPOLIA_CHAIN_ID;
use securevault_core::bootstrap::{
    BootstrapContext, BootstrapStatus, NetworkConfig, RelayerSdk, SdkRegistry, SessionManager,
    acquire_session,
};
use securevault_core::mock::{LocalRelayerSdk, MockChain, MockCoprocessor, SimulatedNetwork};
use securevault_core::poll::PollPolicy;
use securevault_core::BootstrapError;
use securevault_fhe::SdkError;
use tokio_util::sync::CancellationToken;

fn context_with(registry: &SdkRegistry, coprocessor: &MockCoprocessor) -> BootstrapContext {
    BootstrapContext::new(
        Arc::new(registry.clone()),
        Arc::new(coprocessor.clone()),
        fast_settings(),
    )
}

fn preloaded(sdk: LocalRelayerSdk) -> SdkRegistry {
    let registry = SdkRegistry::new();
    registry.register("relayerSDK", Arc::new(sdk));
    registry
}

#[tokio::test]
async fn test_simulated_chain_reaches_ready() {
    let network = SimulatedNetwork::new(LOCAL_CHAIN, vault_address());
    let context = network.context(fast_settings());
    let log = StatusLog::default();
    let sink = log.sink();

    let session = acquire_session(
        &context,
        network.provider.clone(),
        &CancellationToken::new(),
        &sink,
    )
    .await
    .unwrap();

    assert_eq!(session.chain_id(), LOCAL_CHAIN);
    assert_eq!(
        network.registry.injected_scripts(),
        vec![context.settings.sdk_url.clone()]
    );
    assert_eq!(
        log.steps(),
        vec![
            "Checking chain...",
            "Initializing mock FHEVM...",
            "Loading Relayer SDK for mock...",
            "Initializing SDK...",
            "Fetching metadata...",
            "Creating MockFhevmInstance...",
            "Mock FHEVM ready",
        ]
    );
}

#[tokio::test]
async fn test_unsupported_chain_makes_no_sdk_calls() {
    let network = SimulatedNetwork::new(LOCAL_CHAIN, vault_address());
    let context = network.context(fast_settings());

    let result = acquire_session(
        &context,
        Arc::new(MockChain::new(1)),
        &CancellationToken::new(),
        &|_: &str| {},
    )
    .await;

    assert!(matches!(result, Err(BootstrapError::UnsupportedChain(1))));
    assert!(network.registry.injected_scripts().is_empty());
    assert!(network.registry.names().is_empty());
}

#[tokio::test]
async fn test_cancel_before_start_injects_nothing() {
    let network = SimulatedNetwork::new(LOCAL_CHAIN, vault_address());
    let context = network.context(fast_settings());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = acquire_session(&context, network.provider.clone(), &cancel, &|_: &str| {}).await;

    assert!(matches!(result, Err(BootstrapError::Cancelled)));
    assert!(network.registry.injected_scripts().is_empty());
    assert_eq!(network.provider.queries(), 0);
}

#[tokio::test]
async fn test_cancel_during_discovery_stops_polling() {
    // script loads but never registers an SDK
    let registry = SdkRegistry::new();
    let mut context = context_with(&registry, &MockCoprocessor::new());
    context.settings.poll = PollPolicy::new(Duration::from_millis(10), 10_000);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = acquire_session(
        &context,
        Arc::new(MockChain::new(LOCAL_CHAIN)),
        &cancel,
        &|_: &str| {},
    )
    .await;

    assert!(matches!(result, Err(BootstrapError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(registry.injected_scripts().len(), 1);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(registry.injected_scripts().len(), 1);
}

#[tokio::test]
async fn test_discovery_times_out() {
    let registry = SdkRegistry::new();
    let mut context = context_with(&registry, &MockCoprocessor::new());
    context.settings.poll = PollPolicy::new(Duration::from_millis(1), 5);

    let result = acquire_session(
        &context,
        Arc::new(MockChain::new(LOCAL_CHAIN)),
        &CancellationToken::new(),
        &|_: &str| {},
    )
    .await;

    match result {
        Err(BootstrapError::DiscoveryTimeout { attempts, url }) => {
            assert_eq!(attempts, 5);
            assert_eq!(url, context.settings.sdk_url);
        }
        other => panic!("expected discovery timeout, got {:?}", other.err()),
    }
}

#[tokio::test]
async fn test_script_load_failure() {
    let registry =
        SdkRegistry::new().with_loader(|_| Err(SdkError::new("net::ERR_NAME_NOT_RESOLVED")));
    let context = context_with(&registry, &MockCoprocessor::new());

    let result = acquire_session(
        &context,
        Arc::new(MockChain::new(LOCAL_CHAIN)),
        &CancellationToken::new(),
        &|_: &str| {},
    )
    .await;

    match result {
        Err(BootstrapError::ScriptLoad { reason, .. }) => {
            assert_eq!(reason, "net::ERR_NAME_NOT_RESOLVED")
        }
        other => panic!("expected script load failure, got {:?}", other.err()),
    }
}

#[tokio::test]
async fn test_sdk_registered_later_is_found() {
    let registry = SdkRegistry::new();
    let coprocessor = MockCoprocessor::new();
    let context = context_with(&registry, &coprocessor);

    let late = registry.clone();
    let sdk_coprocessor = coprocessor.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        let sdk = LocalRelayerSdk::new(sdk_coprocessor).with_local_network(LOCAL_CHAIN);
        late.register("RelayerSDKBundle", Arc::new(sdk) as Arc<dyn RelayerSdk>);
    });

    let session = acquire_session(
        &context,
        Arc::new(MockChain::new(LOCAL_CHAIN)),
        &CancellationToken::new(),
        &|_: &str| {},
    )
    .await
    .unwrap();
    assert_eq!(session.chain_id(), LOCAL_CHAIN);
}

#[tokio::test]
async fn test_loaded_sdk_is_not_injected_again_and_reinit_is_tolerated() {
    let coprocessor = MockCoprocessor::new();
    let sdk = Arc::new(LocalRelayerSdk::new(coprocessor.clone()).with_local_network(LOCAL_CHAIN));
    sdk.init_sdk().await.unwrap();

    let registry = SdkRegistry::new();
    registry.register("relayerSDK", sdk.clone());
    let context = context_with(&registry, &coprocessor);

    acquire_session(
        &context,
        Arc::new(MockChain::new(LOCAL_CHAIN)),
        &CancellationToken::new(),
        &|_: &str| {},
    )
    .await
    .unwrap();

    assert!(registry.injected_scripts().is_empty());
    assert_eq!(sdk.init_calls(), 2);
}

#[tokio::test]
async fn test_incomplete_config_rejected_on_simulated_path() {
    let coprocessor = MockCoprocessor::new();
    let mut config = coprocessor.local_network_config(LOCAL_CHAIN);
    config.kms_contract_address = None;
    let registry = preloaded(LocalRelayerSdk::new(coprocessor.clone()).with_network(LOCAL_CHAIN, config));

    let result = acquire_session(
        &context_with(&registry, &coprocessor),
        Arc::new(MockChain::new(LOCAL_CHAIN)),
        &CancellationToken::new(),
        &|_: &str| {},
    )
    .await;

    assert_eq!(
        result.err(),
        Some(BootstrapError::ConfigIncomplete("KMS contract address".into()))
    );
}

#[tokio::test]
async fn test_legacy_field_names_accepted() {
    let coprocessor = MockCoprocessor::new();
    let local = coprocessor.local_network_config(LOCAL_CHAIN);
    let legacy: NetworkConfig = serde_json::from_value(serde_json::json!({
        "ACLAddress": local.acl_contract_address,
        "verifyingContractAddressInputVerification": local.input_verifier_contract_address,
        "kmsVerifierContractAddress": local.kms_contract_address,
    }))
    .unwrap();
    let registry = preloaded(LocalRelayerSdk::new(coprocessor.clone()).with_network(LOCAL_CHAIN, legacy));

    let session = acquire_session(
        &context_with(&registry, &coprocessor),
        Arc::new(MockChain::new(LOCAL_CHAIN)),
        &CancellationToken::new(),
        &|_: &str| {},
    )
    .await
    .unwrap();
    assert_eq!(session.chain_id(), LOCAL_CHAIN);
}

#[tokio::test]
async fn test_undeployed_protocol_gets_deploy_guidance() {
    let coprocessor = MockCoprocessor::without_protocol();
    let registry = preloaded(LocalRelayerSdk::new(coprocessor.clone()).with_local_network(LOCAL_CHAIN));

    let result = acquire_session(
        &context_with(&registry, &coprocessor),
        Arc::new(MockChain::new(LOCAL_CHAIN)),
        &CancellationToken::new(),
        &|_: &str| {},
    )
    .await;

    match result {
        Err(BootstrapError::Relayer(msg)) => {
            assert!(msg.starts_with("Failed to initialize MockFhevmInstance: Contract query failed."));
            assert!(msg.contains("deployed on chain 31337"));
            assert!(msg.contains("getCoprocessorSigners"));
        }
        other => panic!("expected relayer error, got {:?}", other.err()),
    }
}

#[tokio::test]
async fn test_simulated_path_without_any_config() {
    let coprocessor = MockCoprocessor::new();
    let registry = preloaded(LocalRelayerSdk::new(coprocessor.clone()).without_dynamic_lookup());

    let result = acquire_session(
        &context_with(&registry, &coprocessor),
        Arc::new(MockChain::new(LOCAL_CHAIN)),
        &CancellationToken::new(),
        &|_: &str| {},
    )
    .await;

    assert!(matches!(
        result,
        Err(BootstrapError::Relayer(msg)) if msg.starts_with("Unable to get configuration for chain ID: 31337")
    ));
}

#[tokio::test]
async fn test_remote_path_falls_back_to_testnet_config() {
    let coprocessor = MockCoprocessor::new();
    let sepolia = coprocessor.local_network_config(SEPOLIA_CHAIN_ID);
    let registry = preloaded(
        LocalRelayerSdk::new(coprocessor.clone())
            .without_dynamic_lookup()
            .with_well_known(sepolia),
    );
    let log = StatusLog::default();
    let sink = log.sink();

    let session = acquire_session(
        &context_with(&registry, &coprocessor),
        Arc::new(MockChain::new(SEPOLIA_CHAIN_ID)),
        &CancellationToken::new(),
        &sink,
    )
    .await
    .unwrap();

    assert_eq!(session.chain_id(), SEPOLIA_CHAIN_ID);
    assert_eq!(
        log.steps(),
        vec![
            "Checking chain...",
            "Loading Relayer SDK...",
            "Initializing SDK...",
            "Fetching configuration...",
            "Creating FHEVM instance...",
        ]
    );
}

#[tokio::test]
async fn test_testnet_fallback_only_applies_to_sepolia() {
    let coprocessor = MockCoprocessor::new();
    let registry = preloaded(
        LocalRelayerSdk::new(coprocessor.clone())
            .without_dynamic_lookup()
            .with_well_known(coprocessor.local_network_config(SEPOLIA_CHAIN_ID)),
    );
    let mut context = context_with(&registry, &coprocessor);
    context.settings.relayer_chains.push(8009);

    let result = acquire_session(
        &context,
        Arc::new(MockChain::new(8009)),
        &CancellationToken::new(),
        &|_: &str| {},
    )
    .await;

    assert_eq!(result.err(), Some(BootstrapError::UnsupportedChain(8009)));
}

#[tokio::test]
async fn test_relayer_configuration_error_is_rewrapped() {
    let coprocessor = MockCoprocessor::new();
    let mut sepolia = coprocessor.local_network_config(SEPOLIA_CHAIN_ID);
    sepolia.relayer_url = None;
    let registry = preloaded(LocalRelayerSdk::new(coprocessor.clone()).with_network(SEPOLIA_CHAIN_ID, sepolia));

    let result = acquire_session(
        &context_with(&registry, &coprocessor),
        Arc::new(MockChain::new(SEPOLIA_CHAIN_ID)),
        &CancellationToken::new(),
        &|_: &str| {},
    )
    .await;

    match result {
        Err(BootstrapError::Relayer(msg)) => {
            assert!(msg.starts_with("Failed to initialize FHEVM: Relayer configuration error."));
            assert!(msg.ends_with("Original error: Invalid relayer url: missing from configuration"));
        }
        other => panic!("expected relayer error, got {:?}", other.err()),
    }
}

// ============================================================================
// SessionManager
// ============================================================================

#[tokio::test]
async fn test_manager_reaches_ready_and_keeps_session_for_same_chain() {
    let network = SimulatedNetwork::new(LOCAL_CHAIN, vault_address());
    let manager = SessionManager::new(network.context(fast_settings()));
    assert!(matches!(manager.status(), BootstrapStatus::Idle));

    manager.start(network.provider.clone());
    assert_eq!(manager.status().label(), "Initializing FHEVM");

    let session = manager.wait_ready().await.unwrap();
    assert_eq!(session.chain_id(), LOCAL_CHAIN);
    assert_eq!(manager.status().label(), "FHEVM Ready");
    assert_eq!(manager.last_step(), "Mock FHEVM ready");

    assert!(!manager.ensure_chain(LOCAL_CHAIN, network.provider.clone()));
    assert!(manager.session().is_some());
}

#[tokio::test]
async fn test_manager_chain_switch_discards_session() {
    let network = SimulatedNetwork::new(LOCAL_CHAIN, vault_address());
    let manager = SessionManager::new(network.context(fast_settings()));
    manager.start(network.provider.clone());
    manager.wait_ready().await.unwrap();

    assert!(manager.ensure_chain(1, Arc::new(MockChain::new(1))));
    assert!(manager.session().is_none());

    assert_eq!(
        manager.wait_ready().await.err(),
        Some(BootstrapError::UnsupportedChain(1))
    );
    assert_eq!(manager.status().label(), "FHEVM Error");
}

#[tokio::test]
async fn test_manager_cancel_ends_in_error() {
    let registry = SdkRegistry::new();
    let mut context = context_with(&registry, &MockCoprocessor::new());
    context.settings.poll = PollPolicy::new(Duration::from_millis(10), 10_000);
    let manager = SessionManager::new(context);

    manager.start(Arc::new(MockChain::new(LOCAL_CHAIN)));
    tokio::time::sleep(Duration::from_millis(30)).await;
    manager.cancel();

    assert_eq!(
        manager.wait_ready().await.err(),
        Some(BootstrapError::Cancelled)
    );
}

#[tokio::test]
async fn test_manager_restart_ignores_superseded_attempt() {
    let registry = SdkRegistry::new();
    let coprocessor = MockCoprocessor::new();
    let mut context = context_with(&registry, &coprocessor);
    context.settings.poll = PollPolicy::new(Duration::from_millis(10), 10_000);
    let manager = SessionManager::new(context);

    let first = manager.start(Arc::new(MockChain::new(LOCAL_CHAIN)));
    tokio::time::sleep(Duration::from_millis(30)).await;

    registry.register(
        "relayerSDK",
        Arc::new(LocalRelayerSdk::new(coprocessor.clone()).with_local_network(LOCAL_CHAIN)),
    );
    let second = manager.start(Arc::new(MockChain::new(LOCAL_CHAIN)));

    second.await.unwrap();
    first.await.unwrap();

    // the cancelled first attempt must not overwrite the ready status
    assert!(matches!(manager.status(), BootstrapStatus::Ready(_)));
    assert_eq!(manager.wait_ready().await.unwrap().chain_id(), LOCAL_CHAIN);
}
