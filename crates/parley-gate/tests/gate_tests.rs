// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subscription gate and cache behaviour against the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use parley_core::ParleyError;
use parley_core::platform::{KeyValueStore, MemoryStore};
use parley_gate::cache::{KEY_CUSTOMER_ID, KEY_SUBSCRIPTION_DATA};
use parley_gate::{
    BlockReason, CancelRequest, CreatedSubscription, Customer, GateDecision, GateState, Gated,
    HealthReport, NewCustomer, NewSubscription, PublicConfig, SubscriptionApi, SubscriptionCache,
    SubscriptionGate, SubscriptionRecord, SubscriptionService, SubscriptionStatus, CACHE_KEYS,
    DEFAULT_TTL,
};
use parley_test_utils::{FakeSubscriptionApi, ManualClock};

struct Fixture {
    api: Arc<FakeSubscriptionApi>,
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
    service: Arc<SubscriptionService>,
}

fn fixture() -> Fixture {
    let api = Arc::new(FakeSubscriptionApi::new());
    let clock = Arc::new(ManualClock::at_epoch());
    let store = Arc::new(MemoryStore::new());
    let cache = SubscriptionCache::new(store.clone(), clock.clone(), DEFAULT_TTL);
    let service = Arc::new(SubscriptionService::new(api.clone(), cache));
    Fixture {
        api,
        clock,
        store,
        service,
    }
}

#[tokio::test]
async fn cached_status_is_served_until_ttl_expires() {
    let f = fixture();
    f.api.set_status("cus_1", SubscriptionStatus::Active);

    let first = f.service.get_subscription_status("cus_1", true).await.unwrap();
    assert!(!first.from_cache);
    assert_eq!(f.api.status_calls(), 1);

    f.clock.advance(Duration::from_secs(4 * 60 + 59));
    let hit = f.service.get_subscription_status("cus_1", true).await.unwrap();
    assert!(hit.from_cache);
    assert_eq!(hit.cached_at, first.cached_at);
    assert_eq!(f.api.status_calls(), 1);

    f.clock.advance(Duration::from_secs(2));
    let refreshed = f.service.get_subscription_status("cus_1", true).await.unwrap();
    assert!(!refreshed.from_cache);
    assert_eq!(f.api.status_calls(), 2);
    assert!(refreshed.cached_at > first.cached_at);

    // The refreshed entry starts a new TTL window.
    let again = f.service.get_subscription_status("cus_1", true).await.unwrap();
    assert!(again.from_cache);
    assert_eq!(f.api.status_calls(), 2);
}

#[tokio::test]
async fn bypassing_the_cache_always_calls_the_backend() {
    let f = fixture();
    f.api.set_status("cus_1", SubscriptionStatus::Trialing);

    f.service.get_subscription_status("cus_1", false).await.unwrap();
    f.service.get_subscription_status("cus_1", false).await.unwrap();
    assert_eq!(f.api.status_calls(), 2);
}

#[tokio::test]
async fn network_failure_fails_closed() {
    let f = fixture();
    f.api.set_status("cus_1", SubscriptionStatus::Active);
    f.api.fail_with(Some("connection refused"));
    let gate = SubscriptionGate::new(f.service.clone());

    let state = gate.check_subscription(Some("cus_1")).await;

    assert!(matches!(state, GateState::Error(_)));
    assert!(!gate.has_access());
    assert!(gate.error().unwrap().contains("connection refused"));
    assert!(matches!(
        gate.decision(),
        GateDecision::Blocked(BlockReason::CheckFailed(_))
    ));
    let ran = gate.run_gated(|| async { "sent" }).await;
    assert!(matches!(ran, Gated::Blocked(BlockReason::CheckFailed(_))));
}

#[tokio::test]
async fn active_subscription_allows_gated_operation() {
    let f = fixture();
    f.api.set_status("cus_1", SubscriptionStatus::Active);
    let gate = SubscriptionGate::new(f.service.clone());

    assert!(matches!(gate.check_subscription(Some("cus_1")).await, GateState::Active(_)));
    assert_eq!(gate.decision(), GateDecision::Allowed);
    assert_eq!(gate.run_gated(|| async { 7 }).await, Gated::Ran(7));
    assert_eq!(
        f.store.get(KEY_CUSTOMER_ID).unwrap().as_deref(),
        Some("cus_1")
    );
}

#[tokio::test]
async fn past_due_is_blocked_with_its_status() {
    let f = fixture();
    f.api.set_status("cus_1", SubscriptionStatus::PastDue);
    let gate = SubscriptionGate::new(f.service.clone());

    gate.check_subscription(Some("cus_1")).await;
    assert_eq!(
        gate.decision(),
        GateDecision::Blocked(BlockReason::Inactive(SubscriptionStatus::PastDue))
    );
}

#[tokio::test]
async fn check_without_any_customer_settles_inactive_offline() {
    let f = fixture();
    let gate = SubscriptionGate::new(f.service.clone());

    assert_eq!(gate.check_subscription(None).await, GateState::Inactive(None));
    assert_eq!(f.api.total_calls(), 0);
}

#[tokio::test]
async fn mount_checks_only_when_a_customer_is_cached() {
    let f = fixture();
    let gate = SubscriptionGate::new(f.service.clone());
    assert_eq!(gate.mount().await, GateState::Unknown);
    assert_eq!(f.api.total_calls(), 0);

    f.api.set_status("cus_7", SubscriptionStatus::Trialing);
    f.service.cache().set_customer("cus_7", "g@example.com");
    let gate = SubscriptionGate::new(f.service.clone());
    assert!(matches!(gate.mount().await, GateState::Active(_)));
    assert_eq!(f.api.status_calls(), 1);
}

#[tokio::test]
async fn observers_are_notified_of_transitions() {
    let f = fixture();
    f.api.set_status("cus_1", SubscriptionStatus::Active);
    let gate = SubscriptionGate::new(f.service.clone());
    let mut rx = gate.subscribe();
    assert_eq!(*rx.borrow_and_update(), GateState::Unknown);

    gate.check_subscription(Some("cus_1")).await;
    assert!(rx.has_changed().unwrap());
    assert!(rx.borrow_and_update().has_access());
}

/// Backend whose status call blocks until released.
struct HeldApi {
    entered: tokio::sync::Notify,
    release: tokio::sync::Notify,
}

fn held_gate() -> (Arc<HeldApi>, Arc<MemoryStore>, Arc<SubscriptionGate>) {
    let api = Arc::new(HeldApi {
        entered: tokio::sync::Notify::new(),
        release: tokio::sync::Notify::new(),
    });
    let store = Arc::new(MemoryStore::new());
    let cache = SubscriptionCache::new(
        store.clone(),
        Arc::new(ManualClock::at_epoch()),
        DEFAULT_TTL,
    );
    let service = Arc::new(SubscriptionService::new(api.clone(), cache));
    (api, store, Arc::new(SubscriptionGate::new(service)))
}

fn assert_cache_empty(store: &MemoryStore) {
    for key in CACHE_KEYS {
        assert!(store.get(key).unwrap().is_none(), "{key} should be cleared");
    }
}

#[async_trait::async_trait]
impl SubscriptionApi for HeldApi {
    async fn create_customer(&self, _: &NewCustomer) -> Result<Customer, ParleyError> {
        Err(ParleyError::Internal("unused".into()))
    }
    async fn find_customer_by_email(&self, _: &str) -> Result<Option<Customer>, ParleyError> {
        Ok(None)
    }
    async fn create_subscription(
        &self,
        _: &NewSubscription,
    ) -> Result<CreatedSubscription, ParleyError> {
        Err(ParleyError::Internal("unused".into()))
    }
    async fn get_subscription_status(
        &self,
        customer_id: &str,
    ) -> Result<SubscriptionRecord, ParleyError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(SubscriptionRecord {
            status: SubscriptionStatus::Active,
            ..SubscriptionRecord::none(customer_id)
        })
    }
    async fn cancel_subscription(
        &self,
        _: &str,
        _: CancelRequest,
    ) -> Result<SubscriptionRecord, ParleyError> {
        Err(ParleyError::Internal("unused".into()))
    }
    async fn get_config(&self) -> Result<PublicConfig, ParleyError> {
        Err(ParleyError::Internal("unused".into()))
    }
    async fn health(&self) -> Result<HealthReport, ParleyError> {
        Err(ParleyError::Internal("unused".into()))
    }
}

#[tokio::test]
async fn protected_operations_wait_while_checking() {
    let (api, _store, gate) = held_gate();
    let mut rx = gate.subscribe();

    let task = tokio::spawn({
        let gate = gate.clone();
        async move { gate.check_subscription(Some("cus_1")).await }
    });
    rx.wait_for(|s| *s == GateState::Checking).await.unwrap();

    assert_eq!(gate.decision(), GateDecision::Loading);
    assert_eq!(gate.run_gated(|| async { 1 }).await, Gated::Loading);

    api.release.notify_one();
    assert!(matches!(task.await.unwrap(), GateState::Active(_)));
    assert_eq!(gate.decision(), GateDecision::Allowed);
}

#[tokio::test]
async fn clear_during_check_keeps_the_gate_closed() {
    let (api, store, gate) = held_gate();
    let task = tokio::spawn({
        let gate = gate.clone();
        async move { gate.check_subscription(Some("cus_1")).await }
    });
    api.entered.notified().await;
    assert_eq!(gate.state(), GateState::Checking);

    gate.clear_subscription_data();
    api.release.notify_one();

    assert_eq!(task.await.unwrap(), GateState::Unknown);
    assert_eq!(gate.state(), GateState::Unknown);
    assert!(!gate.has_access());
    assert_eq!(
        gate.decision(),
        GateDecision::Blocked(BlockReason::NoSubscription)
    );
    assert_cache_empty(&store);
}

#[tokio::test]
async fn cancel_during_check_does_not_restore_access() {
    let (api, store, gate) = held_gate();
    let task = tokio::spawn({
        let gate = gate.clone();
        async move { gate.check_subscription(Some("cus_1")).await }
    });
    api.entered.notified().await;

    // The held backend refuses the cancel, which still purges the cache.
    assert!(gate.service().cancel_subscription("sub_1", false).await.is_err());
    api.release.notify_one();

    assert_eq!(task.await.unwrap(), GateState::Unknown);
    assert!(!gate.has_access());
    assert_cache_empty(&store);
}

#[tokio::test]
async fn status_fetched_across_a_clear_is_not_cached() {
    let (api, store, gate) = held_gate();
    let service = gate.service().clone();
    let task = tokio::spawn({
        let service = service.clone();
        async move { service.get_subscription_status("cus_1", true).await }
    });
    api.entered.notified().await;

    service.clear_cache();
    api.release.notify_one();

    let lookup = task.await.unwrap().unwrap();
    assert!(lookup.stale);
    assert_eq!(lookup.record.status, SubscriptionStatus::Active);
    assert_cache_empty(&store);

    // The next fetch is cached as usual.
    let next = tokio::spawn(async move { service.get_subscription_status("cus_1", true).await });
    api.entered.notified().await;
    api.release.notify_one();
    assert!(!next.await.unwrap().unwrap().stale);
    assert!(store.get(KEY_SUBSCRIPTION_DATA).unwrap().is_some());
}

#[tokio::test]
async fn clear_resets_state_and_purges_cache() {
    let f = fixture();
    f.api.set_status("cus_1", SubscriptionStatus::Active);
    f.store.set("parley_session_id", "s-1").unwrap();
    let gate = SubscriptionGate::new(f.service.clone());
    gate.check_subscription(Some("cus_1")).await;

    gate.clear_subscription_data();

    assert_eq!(gate.state(), GateState::Unknown);
    for key in CACHE_KEYS {
        assert!(f.store.get(key).unwrap().is_none(), "{key} should be cleared");
    }
    assert_eq!(f.store.get("parley_session_id").unwrap().as_deref(), Some("s-1"));
}

#[tokio::test]
async fn cancel_clears_cache_even_on_failure() {
    let f = fixture();
    f.api.set_status("cus_1", SubscriptionStatus::Active);
    f.service.cache().set_customer("cus_1", "a@example.com");
    f.service.get_subscription_status("cus_1", true).await.unwrap();

    let record = f.service.cancel_subscription("sub_cus_1", false).await.unwrap();
    assert_eq!(record.status, SubscriptionStatus::Canceled);
    for key in CACHE_KEYS {
        assert!(f.store.get(key).unwrap().is_none());
    }

    f.service.cache().set_customer("cus_1", "a@example.com");
    f.api.fail_with(Some("timeout"));
    assert!(f.service.cancel_subscription("sub_cus_1", true).await.is_err());
    assert!(f.service.cached_customer_id().is_none());
    assert_eq!(f.api.cancel_calls(), 2);
}

#[tokio::test]
async fn customer_lookup_caches_identity_and_new_subscription_invalidates_status() {
    let f = fixture();
    let customer = f
        .service
        .create_customer(&NewCustomer {
            email: "ada@example.com".into(),
            name: Some("Ada".into()),
        })
        .await
        .unwrap();
    assert_eq!(f.service.cached_customer_id(), Some(customer.customer_id.clone()));
    assert_eq!(
        f.service.cache().customer_email().as_deref(),
        Some("ada@example.com")
    );

    f.service
        .get_subscription_status(&customer.customer_id, true)
        .await
        .unwrap();
    assert!(f.store.get(KEY_SUBSCRIPTION_DATA).unwrap().is_some());

    f.service
        .create_subscription(&NewSubscription {
            customer_id: customer.customer_id.clone(),
            price_id: "price_1".into(),
        })
        .await
        .unwrap();
    assert!(f.store.get(KEY_SUBSCRIPTION_DATA).unwrap().is_none());

    let lookup = f
        .service
        .get_subscription_status(&customer.customer_id, true)
        .await
        .unwrap();
    assert!(!lookup.from_cache);
    assert_eq!(lookup.record.status, SubscriptionStatus::Incomplete);

    f.service.clear_cache();
    let found = f
        .service
        .find_customer_by_email("ada@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(f.service.cached_customer_id(), Some(found.customer_id));
}
