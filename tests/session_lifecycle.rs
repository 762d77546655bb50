//! 会话生命周期集成测试
//!
//! 覆盖：网络解析、并发初始化、失败与重新初始化、reset、钱包事件中继

mod common;

use std::{
    sync::{atomic::Ordering, Arc},
    time::Duration,
};

use common::{harness, owner_a, owner_b, GatewayBehavior, MockGateway, MockWallet};
use sponsorcore::{
    domain::{
        network::{NetworkRegistry, BASE_SEPOLIA, ETHEREUM_SEPOLIA, POLYGON_AMOY},
        SessionStatus,
    },
    error::{CoreError, ErrorCode},
    service::{WalletEvent, WalletEventRelay},
};
use tokio::sync::{mpsc, Notify};

// ============ 网络解析 ============

#[test]
fn test_registry_resolves_every_supported_network() {
    let registry = NetworkRegistry::new();

    for network in registry.list_supported() {
        let resolved = registry.resolve(network.chain_id).unwrap();
        assert_eq!(resolved, network);
    }

    for id in [1u64, 56, 137, 80001, 84531] {
        assert_eq!(
            registry.resolve(id).unwrap_err(),
            CoreError::UnsupportedNetwork(id)
        );
    }
}

#[tokio::test]
async fn test_unsupported_network_fails_without_connecting() {
    let h = harness(MockGateway::new(GatewayBehavior::Confirm));
    let wallet = Arc::new(MockWallet::new(owner_a()));

    let err = h.manager.initialize(wallet.clone(), 1).await.unwrap_err();

    assert_eq!(err, CoreError::UnsupportedNetwork(1));
    assert_eq!(h.manager.status(), SessionStatus::Failed);
    assert_eq!(h.manager.last_error(), Some(CoreError::UnsupportedNetwork(1)));
    assert!(h.manager.session().is_none());
    assert_eq!(h.factory.connects.load(Ordering::SeqCst), 0);
    assert_eq!(wallet.signing_calls.load(Ordering::SeqCst), 0);
}

// ============ 初始化 ============

#[tokio::test]
async fn test_initialize_reaches_ready() {
    let h = harness(MockGateway::new(GatewayBehavior::Confirm));
    assert_eq!(h.manager.status(), SessionStatus::Uninitialized);

    let session = h
        .manager
        .initialize(MockWallet::new(owner_a()).into_handle(), BASE_SEPOLIA)
        .await
        .unwrap();

    assert_eq!(h.manager.status(), SessionStatus::Ready);
    assert_eq!(session.network().chain_id, BASE_SEPOLIA);
    assert_eq!(session.smart_account().owner, owner_a());
    assert!(!session.smart_account().deployed);
    assert_eq!(session.sponsor().policy_id(), common::TEST_POLICY);
    assert_eq!(*h.factory.connected_chains.lock().unwrap(), vec![BASE_SEPOLIA]);
}

#[tokio::test]
async fn test_concurrent_initialize_is_rejected() {
    let h = harness(MockGateway::new(GatewayBehavior::Confirm));
    let gate = Arc::new(Notify::new());
    let wallet = Arc::new(MockWallet::new(owner_a()).gated(gate.clone()));
    let entered = wallet.signing_entered.clone();

    let manager = h.manager.clone();
    let first_wallet = wallet.clone();
    let first = tokio::spawn(async move { manager.initialize(first_wallet, POLYGON_AMOY).await });

    entered.notified().await;
    assert_eq!(h.manager.status(), SessionStatus::Initializing);

    let second = h.manager.initialize(wallet.clone(), POLYGON_AMOY).await;
    assert_eq!(second.unwrap_err(), CoreError::AlreadyInitializing);
    assert_eq!(h.manager.status(), SessionStatus::Initializing);

    gate.notify_one();
    let session = first.await.unwrap().unwrap();

    assert_eq!(h.manager.status(), SessionStatus::Ready);
    assert_eq!(h.manager.session().unwrap().id(), session.id());
    assert_eq!(wallet.signing_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_initialize_can_be_retried() {
    let h = harness(MockGateway::new(GatewayBehavior::Confirm));

    let err = h
        .manager
        .initialize(MockWallet::new(owner_a()).failing_reads().into_handle(), POLYGON_AMOY)
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::DerivationFailed(_)));
    assert!(err.is_retryable());
    assert_eq!(h.manager.status(), SessionStatus::Failed);
    assert!(h.manager.session().is_none());

    let session = h
        .manager
        .initialize(MockWallet::new(owner_a()).into_handle(), POLYGON_AMOY)
        .await
        .unwrap();
    assert_eq!(h.manager.status(), SessionStatus::Ready);
    assert!(h.manager.last_error().is_none());
    assert!(session.is_ready());
}

#[tokio::test]
async fn test_incapable_wallet_fails() {
    let h = harness(MockGateway::new(GatewayBehavior::Confirm));

    let err = h
        .manager
        .initialize(MockWallet::new(owner_a()).incapable().into_handle(), POLYGON_AMOY)
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::WalletIncapable { chain_id, .. } if chain_id == POLYGON_AMOY));
    assert_eq!(h.manager.status(), SessionStatus::Failed);
    assert_eq!(h.factory.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_initialize_while_ready_requires_reset() {
    let h = harness(MockGateway::new(GatewayBehavior::Confirm));

    let first = h
        .manager
        .initialize(MockWallet::new(owner_a()).into_handle(), POLYGON_AMOY)
        .await
        .unwrap();

    // 换了钱包但网络相同，也不能复用旧钱包的会话
    let err = h
        .manager
        .initialize(MockWallet::new(owner_b()).into_handle(), POLYGON_AMOY)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        CoreError::AlreadyReady {
            active: POLYGON_AMOY,
            requested: POLYGON_AMOY
        }
    );

    let err = h
        .manager
        .initialize(MockWallet::new(owner_a()).into_handle(), ETHEREUM_SEPOLIA)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::AlreadyReady);

    assert_eq!(h.manager.status(), SessionStatus::Ready);
    assert_eq!(h.manager.session().unwrap().id(), first.id());
    assert_eq!(h.factory.connects.load(Ordering::SeqCst), 1);

    h.manager.reset();
    let second = h
        .manager
        .initialize(MockWallet::new(owner_b()).into_handle(), POLYGON_AMOY)
        .await
        .unwrap();
    assert_eq!(second.smart_account().owner, owner_b());
    assert!(!first.is_ready());
}

#[tokio::test]
async fn test_initialize_opens_one_read_client() {
    let h = harness(MockGateway::new(GatewayBehavior::Confirm));
    let wallet = Arc::new(MockWallet::new(owner_a()));

    h.manager.initialize(wallet.clone(), POLYGON_AMOY).await.unwrap();

    assert_eq!(wallet.read_client_calls.load(Ordering::SeqCst), 1);
    assert_eq!(wallet.signing_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_abandoned_initialize_still_completes() {
    let h = harness(MockGateway::new(GatewayBehavior::Confirm));
    let gate = Arc::new(Notify::new());
    let wallet = Arc::new(MockWallet::new(owner_a()).gated(gate.clone()));

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        h.manager.initialize(wallet.clone(), POLYGON_AMOY),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(h.manager.status(), SessionStatus::Initializing);

    gate.notify_one();
    for _ in 0..100 {
        if h.manager.status() != SessionStatus::Initializing {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(h.manager.status(), SessionStatus::Ready);
    assert_eq!(h.manager.session().unwrap().smart_account().owner, owner_a());
}

#[tokio::test]
async fn test_derivation_is_deterministic_across_sessions() {
    let first = harness(MockGateway::new(GatewayBehavior::Confirm));
    let second = harness(MockGateway::new(GatewayBehavior::Confirm));

    let a = first
        .manager
        .initialize(MockWallet::new(owner_a()).into_handle(), BASE_SEPOLIA)
        .await
        .unwrap();
    let b = second
        .manager
        .initialize(MockWallet::new(owner_a()).into_handle(), BASE_SEPOLIA)
        .await
        .unwrap();
    assert_eq!(a.smart_account().address, b.smart_account().address);
    assert_ne!(a.id(), b.id());

    first.manager.reset();
    let c = first
        .manager
        .initialize(MockWallet::new(owner_b()).into_handle(), BASE_SEPOLIA)
        .await
        .unwrap();
    assert_ne!(a.smart_account().address, c.smart_account().address);
}

// ============ reset ============

#[tokio::test]
async fn test_reset_discards_ready_session() {
    let h = harness(MockGateway::new(GatewayBehavior::Confirm));
    let session = h
        .manager
        .initialize(MockWallet::new(owner_a()).into_handle(), POLYGON_AMOY)
        .await
        .unwrap();

    h.manager.reset();

    assert_eq!(h.manager.status(), SessionStatus::Uninitialized);
    assert!(h.manager.session().is_none());
    assert!(!session.is_ready());
    assert_eq!(session.status(), SessionStatus::Uninitialized);

    // reset 在任意状态下都有效
    h.manager.reset();
    assert_eq!(h.manager.status(), SessionStatus::Uninitialized);
}

#[tokio::test]
async fn test_reset_during_initialize_invalidates_result() {
    let h = harness(MockGateway::new(GatewayBehavior::Confirm));
    let gate = Arc::new(Notify::new());
    let wallet = Arc::new(MockWallet::new(owner_a()).gated(gate.clone()));
    let entered = wallet.signing_entered.clone();

    let manager = h.manager.clone();
    let pending = tokio::spawn(async move { manager.initialize(wallet, POLYGON_AMOY).await });

    entered.notified().await;
    h.manager.reset();
    assert_eq!(h.manager.status(), SessionStatus::Uninitialized);

    gate.notify_one();
    let err = pending.await.unwrap().unwrap_err();

    assert_eq!(err, CoreError::SessionInvalidated);
    assert_eq!(h.manager.status(), SessionStatus::Uninitialized);
    assert!(h.manager.session().is_none());
}

// ============ 钱包事件 ============

#[tokio::test]
async fn test_wallet_events_reset_session() {
    let h = harness(MockGateway::new(GatewayBehavior::Confirm));
    let relay = WalletEventRelay::new(h.manager.clone());
    assert_eq!(relay.next_network(), POLYGON_AMOY);

    let session = h
        .manager
        .initialize(MockWallet::new(owner_a()).into_handle(), POLYGON_AMOY)
        .await
        .unwrap();

    let (tx, rx) = mpsc::channel(8);
    tx.send(WalletEvent::WalletNetworkChanged {
        chain_id: BASE_SEPOLIA,
    })
    .await
    .unwrap();
    drop(tx);

    relay.run(rx).await;

    assert_eq!(h.manager.status(), SessionStatus::Uninitialized);
    assert!(!session.is_ready());
    assert_eq!(relay.preferred_network(), Some(BASE_SEPOLIA));
    assert_eq!(relay.next_network(), BASE_SEPOLIA);

    let session = h
        .manager
        .initialize(MockWallet::new(owner_b()).into_handle(), relay.next_network())
        .await
        .unwrap();
    relay.handle(WalletEvent::WalletChanged);

    assert!(!session.is_ready());
    assert_eq!(h.manager.status(), SessionStatus::Uninitialized);
    assert_eq!(relay.preferred_network(), Some(BASE_SEPOLIA));
}
