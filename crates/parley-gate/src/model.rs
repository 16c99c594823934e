// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types of the subscription REST contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Billing state of a subscription.
///
/// Any status string the backend introduces later deserialises to `Unknown`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Incomplete,
    IncompleteExpired,
    Unpaid,
    Paused,
    #[default]
    #[serde(other)]
    Unknown,
}

impl SubscriptionStatus {
    /// Only active and trialing subscriptions grant access.
    pub fn has_access(self) -> bool {
        matches!(self, Self::Active | Self::Trialing)
    }
}

/// Subscription state of one customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub customer_id: String,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub current_period_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_period_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub price_id: Option<String>,
}

impl SubscriptionRecord {
    /// A record for a customer without any subscription.
    pub fn none(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            subscription_id: None,
            status: SubscriptionStatus::Unknown,
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: false,
            price_id: None,
        }
    }

    pub fn has_access(&self) -> bool {
        self.status.has_access()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Body of `POST /customers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Body of `POST /subscriptions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubscription {
    pub customer_id: String,
    pub price_id: String,
}

/// Response of `POST /subscriptions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedSubscription {
    pub subscription_id: String,
    #[serde(default)]
    pub status: SubscriptionStatus,
    /// Secret the payment form needs to confirm the first invoice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

/// Body of `POST /subscriptions/{id}/cancel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequest {
    /// Keep access until the end of the paid period instead of ending now.
    pub at_period_end: bool,
}

/// Response of `GET /config`: values the payment UI needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicConfig {
    pub publishable_key: String,
    #[serde(default)]
    pub price_id: Option<String>,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}
