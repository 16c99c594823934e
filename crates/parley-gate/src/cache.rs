// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local cache of the customer identity and subscription status.
//!
//! Backed by the [`KeyValueStore`] seam. Storage failures are logged and
//! treated as a miss; nothing here returns an error to the caller.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parley_core::platform::{Clock, KeyValueStore};
use parley_core::{CacheEntry, ParleyError};
use tracing::{debug, warn};

use crate::model::SubscriptionRecord;

pub const KEY_CUSTOMER_ID: &str = "parley_customer_id";
pub const KEY_CUSTOMER_EMAIL: &str = "parley_customer_email";
pub const KEY_SUBSCRIPTION_STATUS: &str = "parley_subscription_status";
pub const KEY_SUBSCRIPTION_DATA: &str = "parley_subscription_data";
pub const KEY_CACHE_TIMESTAMP: &str = "parley_cache_timestamp";

/// Every key owned by the subscription cache.
pub const CACHE_KEYS: [&str; 5] = [
    KEY_CUSTOMER_ID,
    KEY_CUSTOMER_EMAIL,
    KEY_SUBSCRIPTION_STATUS,
    KEY_SUBSCRIPTION_DATA,
    KEY_CACHE_TIMESTAMP,
];

/// Default lifetime of a cached status.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone)]
pub struct SubscriptionCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl SubscriptionCache {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn customer_id(&self) -> Option<String> {
        self.read(KEY_CUSTOMER_ID)
    }

    pub fn customer_email(&self) -> Option<String> {
        self.read(KEY_CUSTOMER_EMAIL)
    }

    pub fn set_customer_id(&self, customer_id: &str) {
        self.write(KEY_CUSTOMER_ID, customer_id);
    }

    pub fn set_customer(&self, customer_id: &str, email: &str) {
        self.write(KEY_CUSTOMER_ID, customer_id);
        self.write(KEY_CUSTOMER_EMAIL, email);
    }

    /// The cached record for `customer_id`, if one exists and is still fresh.
    pub fn status(&self, customer_id: &str) -> Option<CacheEntry<SubscriptionRecord>> {
        let raw = self.read(KEY_SUBSCRIPTION_DATA)?;
        let stamp = self.read(KEY_CACHE_TIMESTAMP)?;

        let record: SubscriptionRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "cached subscription record is corrupt, ignoring");
                return None;
            }
        };
        let cached_at = match DateTime::parse_from_rfc3339(&stamp) {
            Ok(t) => t.with_timezone(&Utc),
            Err(e) => {
                warn!(error = %e, "cache timestamp is corrupt, ignoring");
                return None;
            }
        };

        if record.customer_id != customer_id {
            debug!(cached = %record.customer_id, requested = %customer_id, "cached status belongs to another customer");
            return None;
        }

        let entry = CacheEntry::new(record, cached_at);
        if !entry.is_fresh(self.clock.now(), self.ttl) {
            debug!(%customer_id, cached_at = %cached_at, "cached status expired");
            return None;
        }
        Some(entry)
    }

    /// Stores `record` stamped with the current time.
    pub fn put_status(&self, record: &SubscriptionRecord) -> CacheEntry<SubscriptionRecord> {
        let entry = CacheEntry::new(record.clone(), self.clock.now());
        match serde_json::to_string(record) {
            Ok(raw) => {
                self.write(KEY_SUBSCRIPTION_STATUS, &record.status.to_string());
                self.write(KEY_SUBSCRIPTION_DATA, &raw);
                self.write(KEY_CACHE_TIMESTAMP, &entry.cached_at.to_rfc3339());
            }
            Err(e) => warn!(error = %e, "failed to encode subscription record for cache"),
        }
        entry
    }

    /// Drops the cached status but keeps the customer identity.
    pub fn invalidate_status(&self) {
        for key in [KEY_SUBSCRIPTION_STATUS, KEY_SUBSCRIPTION_DATA, KEY_CACHE_TIMESTAMP] {
            self.delete(key);
        }
    }

    /// Removes every cache key.
    pub fn clear(&self) {
        for key in CACHE_KEYS {
            self.delete(key);
        }
        debug!("subscription cache cleared");
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(e) => {
                log_store_error("read", key, &e);
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            log_store_error("write", key, &e);
        }
    }

    fn delete(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            log_store_error("remove", key, &e);
        }
    }
}

fn log_store_error(op: &str, key: &str, error: &ParleyError) {
    warn!(op, key, error = %error, "subscription cache storage failure, treating as miss");
}
