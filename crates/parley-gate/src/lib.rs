// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subscription gating for the Parley session engine.
//!
//! - [`api`]: the typed subscription backend client
//! - [`cache`]: the TTL-bounded local cache
//! - [`service`]: backend calls with cache maintenance
//! - [`gate`]: the fail-closed access state machine

pub mod api;
pub mod cache;
pub mod gate;
pub mod model;
pub mod service;

pub use api::{HttpSubscriptionApi, SubscriptionApi};
pub use cache::{SubscriptionCache, CACHE_KEYS, DEFAULT_TTL};
pub use gate::{BlockReason, GateDecision, GateState, Gated, SubscriptionGate};
pub use model::{
    CancelRequest, CreatedSubscription, Customer, HealthReport, NewCustomer, NewSubscription,
    PublicConfig, SubscriptionRecord, SubscriptionStatus,
};
pub use service::{StatusLookup, SubscriptionService};
