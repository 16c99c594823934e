// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fail-closed access gate.
//!
//! ```text
//! Unknown ──check──▶ Checking ──▶ Active | Inactive | Error
//!    ▲                                        │
//!    └──────────── clear_subscription_data ───┘
//! ```
//!
//! `Error` grants no access. Observers can follow transitions through
//! [`SubscriptionGate::subscribe`]. A check only settles the gate if no
//! clear or newer check happened while it was in flight.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::model::{SubscriptionRecord, SubscriptionStatus};
use crate::service::SubscriptionService;

#[derive(Debug, Clone, PartialEq)]
pub enum GateState {
    /// No check has been made since start or the last clear.
    Unknown,
    Checking,
    Active(SubscriptionRecord),
    /// The customer has no usable subscription, or no customer is known.
    Inactive(Option<SubscriptionRecord>),
    /// The status could not be determined.
    Error(String),
}

impl GateState {
    pub fn has_access(&self) -> bool {
        matches!(self, GateState::Active(_))
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, GateState::Unknown | GateState::Checking)
    }
}

/// Why a protected operation was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// No customer is known and no check has succeeded.
    NoSubscription,
    /// The subscription exists but does not grant access.
    Inactive(SubscriptionStatus),
    /// Checking failed; access is denied until a check succeeds.
    CheckFailed(String),
}

/// What a protected operation should do right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Loading,
    /// Refuse and offer the upgrade path.
    Blocked(BlockReason),
    Allowed,
}

/// Outcome of [`SubscriptionGate::run_gated`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gated<T> {
    Loading,
    Blocked(BlockReason),
    Ran(T),
}

pub struct SubscriptionGate {
    service: Arc<SubscriptionService>,
    state: watch::Sender<GateState>,
    generation: AtomicU64,
}

impl SubscriptionGate {
    pub fn new(service: Arc<SubscriptionService>) -> Self {
        let (state, _) = watch::channel(GateState::Unknown);
        Self {
            service,
            state,
            generation: AtomicU64::new(0),
        }
    }

    pub fn service(&self) -> &Arc<SubscriptionService> {
        &self.service
    }

    pub fn state(&self) -> GateState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GateState> {
        self.state.subscribe()
    }

    /// Starts a check if a customer id is cached; otherwise stays `Unknown`.
    pub async fn mount(&self) -> GateState {
        if self.service.cached_customer_id().is_some() {
            self.check_subscription(None).await
        } else {
            debug!("no cached customer, gate stays unknown");
            self.state()
        }
    }

    /// Checks access for `customer_id`, or for the cached customer if `None`.
    ///
    /// A supplied id is remembered for later checks. Without any customer id
    /// the gate settles to `Inactive` without a network call. If the gate is
    /// cleared or checked again before this check finishes, its result is
    /// dropped and the current state is returned.
    pub async fn check_subscription(&self, customer_id: Option<&str>) -> GateState {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.settle(generation, GateState::Checking);

        let customer_id = match customer_id {
            Some(id) => {
                self.service.cache().set_customer_id(id);
                id.to_string()
            }
            None => match self.service.cached_customer_id() {
                Some(id) => id,
                None => return self.settle(generation, GateState::Inactive(None)),
            },
        };

        let next = match self.service.get_subscription_status(&customer_id, true).await {
            // The service cache was purged mid-flight, e.g. by a cancel.
            Ok(lookup) if lookup.stale => GateState::Unknown,
            Ok(lookup) if lookup.has_access() => GateState::Active(lookup.record),
            Ok(lookup) => GateState::Inactive(Some(lookup.record)),
            Err(e) => {
                warn!(%customer_id, error = %e, "subscription check failed, denying access");
                GateState::Error(e.to_string())
            }
        };
        self.settle(generation, next)
    }

    pub fn has_access(&self) -> bool {
        self.state.borrow().has_access()
    }

    /// The message of the last failed check, if the gate is in `Error`.
    pub fn error(&self) -> Option<String> {
        match &*self.state.borrow() {
            GateState::Error(message) => Some(message.clone()),
            _ => None,
        }
    }

    /// Resets to `Unknown` and purges the local cache. Checks still in
    /// flight are abandoned.
    pub fn clear_subscription_data(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.service.clear_cache();
        self.transition(GateState::Unknown);
    }

    pub fn decision(&self) -> GateDecision {
        match &*self.state.borrow() {
            GateState::Checking => GateDecision::Loading,
            GateState::Active(_) => GateDecision::Allowed,
            GateState::Unknown | GateState::Inactive(None) => {
                GateDecision::Blocked(BlockReason::NoSubscription)
            }
            GateState::Inactive(Some(record)) => {
                GateDecision::Blocked(BlockReason::Inactive(record.status))
            }
            GateState::Error(message) => {
                GateDecision::Blocked(BlockReason::CheckFailed(message.clone()))
            }
        }
    }

    /// Runs `op` only if access is currently granted.
    pub async fn run_gated<F, Fut, T>(&self, op: F) -> Gated<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        match self.decision() {
            GateDecision::Loading => Gated::Loading,
            GateDecision::Blocked(reason) => Gated::Blocked(reason),
            GateDecision::Allowed => Gated::Ran(op().await),
        }
    }

    /// Applies the result of check `generation` if it is still the latest.
    fn settle(&self, generation: u64, next: GateState) -> GateState {
        let mut previous = None;
        // The generation is compared under the watch lock, so a clear either
        // lands before this and wins, or after this and overwrites it.
        self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            let changed = *state != next;
            previous = Some(std::mem::replace(state, next.clone()));
            changed
        });
        match previous {
            Some(previous) => {
                self.log_transition(&previous, &next);
                next
            }
            None => {
                debug!(generation, "subscription check superseded, result dropped");
                self.state()
            }
        }
    }

    fn transition(&self, next: GateState) {
        let previous = self.state.send_replace(next.clone());
        self.log_transition(&previous, &next);
    }

    fn log_transition(&self, previous: &GateState, next: &GateState) {
        if previous != next {
            match next {
                GateState::Active(_) | GateState::Inactive(_) => {
                    info!(has_access = next.has_access(), "subscription gate settled")
                }
                _ => debug!(state = ?next, "subscription gate transition"),
            }
        }
    }
}
