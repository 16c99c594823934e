// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Caching wrapper around [`SubscriptionApi`].

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use parley_core::ParleyError;
use tracing::{debug, info};

use crate::api::SubscriptionApi;
use crate::cache::SubscriptionCache;
use crate::model::{
    CancelRequest, CreatedSubscription, Customer, HealthReport, NewCustomer, NewSubscription,
    PublicConfig, SubscriptionRecord,
};

/// Result of a status lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLookup {
    pub record: SubscriptionRecord,
    /// When the record was fetched from the backend.
    pub cached_at: DateTime<Utc>,
    /// True when no network call was made.
    pub from_cache: bool,
    /// The cache was cleared while the request was in flight, so the record
    /// was not cached and may predate the clear.
    pub stale: bool,
}

impl StatusLookup {
    pub fn has_access(&self) -> bool {
        self.record.has_access()
    }
}

/// Subscription backend calls with the local cache kept consistent.
pub struct SubscriptionService {
    api: Arc<dyn SubscriptionApi>,
    cache: SubscriptionCache,
    /// Bumped whenever cached status is dropped. Held while writing status
    /// so a fetch cannot land between a clear and its bump.
    epoch: Mutex<u64>,
}

impl SubscriptionService {
    pub fn new(api: Arc<dyn SubscriptionApi>, cache: SubscriptionCache) -> Self {
        Self {
            api,
            cache,
            epoch: Mutex::new(0),
        }
    }

    pub fn cache(&self) -> &SubscriptionCache {
        &self.cache
    }

    pub fn cached_customer_id(&self) -> Option<String> {
        self.cache.customer_id()
    }

    /// Returns the subscription of `customer_id`.
    ///
    /// With `use_cache`, a fresh cached entry is returned unchanged and no
    /// request is made. Otherwise, or on a miss, the backend is asked and the
    /// cache is rewritten before returning, unless the cache was cleared
    /// while the request was in flight.
    pub async fn get_subscription_status(
        &self,
        customer_id: &str,
        use_cache: bool,
    ) -> Result<StatusLookup, ParleyError> {
        if use_cache && let Some(entry) = self.cache.status(customer_id) {
            debug!(%customer_id, cached_at = %entry.cached_at, "subscription status cache hit");
            return Ok(StatusLookup {
                record: entry.value,
                cached_at: entry.cached_at,
                from_cache: true,
                stale: false,
            });
        }

        let started = self.current_epoch();
        let record = self.api.get_subscription_status(customer_id).await?;

        let epoch = self.epoch.lock().unwrap_or_else(|e| e.into_inner());
        if *epoch != started {
            debug!(%customer_id, "subscription cache cleared during fetch, result not cached");
            return Ok(StatusLookup {
                record,
                cached_at: self.cache.now(),
                from_cache: false,
                stale: true,
            });
        }
        let entry = self.cache.put_status(&record);
        drop(epoch);

        debug!(%customer_id, status = %record.status, "subscription status fetched");
        Ok(StatusLookup {
            record: entry.value,
            cached_at: entry.cached_at,
            from_cache: false,
            stale: false,
        })
    }

    pub async fn create_customer(&self, customer: &NewCustomer) -> Result<Customer, ParleyError> {
        let created = self.api.create_customer(customer).await?;
        self.cache.set_customer(&created.customer_id, &created.email);
        info!(customer_id = %created.customer_id, "customer created");
        Ok(created)
    }

    pub async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>, ParleyError> {
        let found = self.api.find_customer_by_email(email).await?;
        if let Some(customer) = &found {
            self.cache.set_customer(&customer.customer_id, &customer.email);
        }
        Ok(found)
    }

    /// Creates a subscription. The cached status is dropped since it is now stale.
    pub async fn create_subscription(
        &self,
        subscription: &NewSubscription,
    ) -> Result<CreatedSubscription, ParleyError> {
        let created = self.api.create_subscription(subscription).await;
        self.drop_cached(|cache| cache.invalidate_status());
        let created = created?;
        info!(
            customer_id = %subscription.customer_id,
            subscription_id = %created.subscription_id,
            "subscription created"
        );
        Ok(created)
    }

    /// Cancels a subscription and clears the whole cache, whatever the outcome.
    pub async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> Result<SubscriptionRecord, ParleyError> {
        let result = self
            .api
            .cancel_subscription(subscription_id, CancelRequest { at_period_end })
            .await;
        self.clear_cache();
        let record = result?;
        info!(%subscription_id, at_period_end, "subscription cancelled");
        Ok(record)
    }

    pub async fn get_config(&self) -> Result<PublicConfig, ParleyError> {
        self.api.get_config().await
    }

    pub async fn health(&self) -> Result<HealthReport, ParleyError> {
        self.api.health().await
    }

    /// Removes every cache key. A status fetch still in flight will not
    /// write its result back.
    pub fn clear_cache(&self) {
        self.drop_cached(SubscriptionCache::clear);
    }

    fn current_epoch(&self) -> u64 {
        *self.epoch.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn drop_cached(&self, purge: impl FnOnce(&SubscriptionCache)) {
        let mut epoch = self.epoch.lock().unwrap_or_else(|e| e.into_inner());
        *epoch += 1;
        purge(&self.cache);
    }
}
