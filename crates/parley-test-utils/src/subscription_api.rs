// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory subscription backend.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parley_core::ParleyError;
use parley_gate::{
    CancelRequest, CreatedSubscription, Customer, HealthReport, NewCustomer, NewSubscription,
    PublicConfig, SubscriptionApi, SubscriptionRecord, SubscriptionStatus,
};

/// Fake backend holding customers and records in memory.
///
/// Every call is counted. [`fail_with`](Self::fail_with) makes all calls fail
/// with a network-style transport error until cleared.
#[derive(Default)]
pub struct FakeSubscriptionApi {
    records: Mutex<HashMap<String, SubscriptionRecord>>,
    customers: Mutex<Vec<Customer>>,
    failure: Mutex<Option<String>>,
    status_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    total_calls: AtomicUsize,
}

impl FakeSubscriptionApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the record returned for `record.customer_id`.
    pub fn set_record(&self, record: SubscriptionRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(record.customer_id.clone(), record);
    }

    /// Shorthand for a record with only a status.
    pub fn set_status(&self, customer_id: &str, status: SubscriptionStatus) {
        self.set_record(SubscriptionRecord {
            subscription_id: Some(format!("sub_{customer_id}")),
            status,
            ..SubscriptionRecord::none(customer_id)
        });
    }

    pub fn add_customer(&self, customer_id: &str, email: &str) {
        self.customers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Customer {
                customer_id: customer_id.into(),
                email: email.into(),
                name: None,
            });
    }

    pub fn fail_with(&self, message: Option<&str>) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = message.map(str::to_string);
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), ParleyError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        match self.failure.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            Some(message) => Err(ParleyError::transport(message.clone(), None)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SubscriptionApi for FakeSubscriptionApi {
    async fn create_customer(&self, customer: &NewCustomer) -> Result<Customer, ParleyError> {
        self.enter()?;
        let created = Customer {
            customer_id: format!("cus_{}", customer.email.replace(['@', '.'], "_")),
            email: customer.email.clone(),
            name: customer.name.clone(),
        };
        self.customers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(created.clone());
        Ok(created)
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>, ParleyError> {
        self.enter()?;
        Ok(self
            .customers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|c| c.email == email)
            .cloned())
    }

    async fn create_subscription(
        &self,
        subscription: &NewSubscription,
    ) -> Result<CreatedSubscription, ParleyError> {
        self.enter()?;
        let subscription_id = format!("sub_{}", subscription.customer_id);
        self.set_record(SubscriptionRecord {
            subscription_id: Some(subscription_id.clone()),
            status: SubscriptionStatus::Incomplete,
            price_id: Some(subscription.price_id.clone()),
            ..SubscriptionRecord::none(subscription.customer_id.clone())
        });
        Ok(CreatedSubscription {
            subscription_id,
            status: SubscriptionStatus::Incomplete,
            client_secret: Some("secret_test".into()),
        })
    }

    async fn get_subscription_status(
        &self,
        customer_id: &str,
    ) -> Result<SubscriptionRecord, ParleyError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.enter()?;
        Ok(self
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(customer_id)
            .cloned()
            .unwrap_or_else(|| SubscriptionRecord::none(customer_id)))
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        request: CancelRequest,
    ) -> Result<SubscriptionRecord, ParleyError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.enter()?;
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let record = records
            .values_mut()
            .find(|r| r.subscription_id.as_deref() == Some(subscription_id))
            .ok_or_else(|| ParleyError::transport("API returned 404 Not Found", Some(404)))?;
        if request.at_period_end {
            record.cancel_at_period_end = true;
        } else {
            record.status = SubscriptionStatus::Canceled;
        }
        Ok(record.clone())
    }

    async fn get_config(&self) -> Result<PublicConfig, ParleyError> {
        self.enter()?;
        Ok(PublicConfig {
            publishable_key: "pk_test".into(),
            price_id: Some("price_test".into()),
        })
    }

    async fn health(&self) -> Result<HealthReport, ParleyError> {
        self.enter()?;
        Ok(HealthReport {
            status: "ok".into(),
            version: None,
        })
    }
}
