// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed client for the subscription REST backend.

use std::time::Duration;

use async_trait::async_trait;
use parley_core::ParleyError;
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::model::{
    CancelRequest, CreatedSubscription, Customer, HealthReport, NewCustomer, NewSubscription,
    PublicConfig, SubscriptionRecord,
};

/// Operations of the subscription backend.
#[async_trait]
pub trait SubscriptionApi: Send + Sync {
    async fn create_customer(&self, customer: &NewCustomer) -> Result<Customer, ParleyError>;

    /// Returns `None` when no customer has this email.
    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>, ParleyError>;

    async fn create_subscription(
        &self,
        subscription: &NewSubscription,
    ) -> Result<CreatedSubscription, ParleyError>;

    async fn get_subscription_status(
        &self,
        customer_id: &str,
    ) -> Result<SubscriptionRecord, ParleyError>;

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        request: CancelRequest,
    ) -> Result<SubscriptionRecord, ParleyError>;

    async fn get_config(&self) -> Result<PublicConfig, ParleyError>;

    async fn health(&self) -> Result<HealthReport, ParleyError>;
}

/// [`SubscriptionApi`] over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpSubscriptionApi {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpSubscriptionApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ParleyError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ParleyError::Config(format!("invalid subscription API URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ParleyError::Config(format!(
                "subscription API URL '{base_url}' cannot be used as a base"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ParleyError::Transport {
                message: format!("failed to build HTTP client: {e}"),
                status: None,
                source: Some(Box::new(e)),
            })?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ParleyError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ParleyError::Config("subscription API URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn call<B, T>(&self, method: Method, url: Url, body: Option<&B>) -> Result<T, ParleyError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        match self.send(method, url, body).await? {
            Some(value) => Ok(value),
            None => Err(ParleyError::transport("API returned 404 Not Found", Some(404))),
        }
    }

    /// Like [`call`](Self::call), but maps 404 to `Ok(None)`.
    async fn send<B, T>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<Option<T>, ParleyError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(|e| ParleyError::Transport {
            message: format!("HTTP request failed: {e}"),
            status: None,
            source: Some(Box::new(e)),
        })?;

        let status = response.status();
        debug!(%method, path = url.path(), status = %status, "subscription API response");

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ParleyError::transport(
                format!("API returned {status}: {body}"),
                Some(status.as_u16()),
            ));
        }

        let text = response.text().await.map_err(|e| ParleyError::Transport {
            message: format!("failed to read response body: {e}"),
            status: Some(status.as_u16()),
            source: Some(Box::new(e)),
        })?;
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| ParleyError::Protocol(format!("unexpected response from {}: {e}", url.path())))
    }
}

#[async_trait]
impl SubscriptionApi for HttpSubscriptionApi {
    async fn create_customer(&self, customer: &NewCustomer) -> Result<Customer, ParleyError> {
        let url = self.endpoint(&["customers"])?;
        self.call(Method::POST, url, Some(customer)).await
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>, ParleyError> {
        let url = self.endpoint(&["customers", "by-email", email])?;
        self.send::<(), _>(Method::GET, url, None).await
    }

    async fn create_subscription(
        &self,
        subscription: &NewSubscription,
    ) -> Result<CreatedSubscription, ParleyError> {
        let url = self.endpoint(&["subscriptions"])?;
        self.call(Method::POST, url, Some(subscription)).await
    }

    async fn get_subscription_status(
        &self,
        customer_id: &str,
    ) -> Result<SubscriptionRecord, ParleyError> {
        let url = self.endpoint(&["subscriptions", customer_id, "status"])?;
        self.call::<(), _>(Method::GET, url, None).await
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        request: CancelRequest,
    ) -> Result<SubscriptionRecord, ParleyError> {
        let url = self.endpoint(&["subscriptions", subscription_id, "cancel"])?;
        self.call(Method::POST, url, Some(&request)).await
    }

    async fn get_config(&self) -> Result<PublicConfig, ParleyError> {
        let url = self.endpoint(&["config"])?;
        self.call::<(), _>(Method::GET, url, None).await
    }

    async fn health(&self) -> Result<HealthReport, ParleyError> {
        let url = self.endpoint(&["health"])?;
        self.call::<(), _>(Method::GET, url, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SubscriptionStatus;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(server: &MockServer) -> HttpSubscriptionApi {
        HttpSubscriptionApi::new(&format!("{}/api", server.uri()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn status_request_hits_customer_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/subscriptions/cus_1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "customer_id": "cus_1",
                "status": "trialing",
                "cancel_at_period_end": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let record = api(&server).get_subscription_status("cus_1").await.unwrap();
        assert_eq!(record.status, SubscriptionStatus::Trialing);
        assert!(record.has_access());
    }

    #[tokio::test]
    async fn find_by_email_escapes_and_maps_404_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/customers/by-email/a%2Fb@example.com"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let found = api(&server)
            .find_customer_by_email("a/b@example.com")
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn create_customer_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/customers"))
            .and(body_json(serde_json::json!({"email": "ada@example.com"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "customer_id": "cus_9",
                "email": "ada@example.com"
            })))
            .mount(&server)
            .await;

        let customer = api(&server)
            .create_customer(&NewCustomer {
                email: "ada@example.com".into(),
                name: None,
            })
            .await
            .unwrap();
        assert_eq!(customer.customer_id, "cus_9");
    }

    #[tokio::test]
    async fn server_error_is_transport_with_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = api(&server).health().await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, ParleyError::Transport { status: Some(503), .. }));
    }

    #[tokio::test]
    async fn malformed_body_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/config"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = api(&server).get_config().await.unwrap_err();
        assert!(matches!(err, ParleyError::Protocol(_)));
    }

    #[test]
    fn rejects_unusable_base_url() {
        assert!(matches!(
            HttpSubscriptionApi::new("not a url", Duration::from_secs(1)),
            Err(ParleyError::Config(_))
        ));
        assert!(matches!(
            HttpSubscriptionApi::new("mailto:billing@example.com", Duration::from_secs(1)),
            Err(ParleyError::Config(_))
        ));
    }
}
