// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP implementation of the event-stream transport.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parley_core::platform::{ByteStream, EventStreamTransport, StreamRequest};
use parley_core::ParleyError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Posts JSON and hands back the response body as a cancellable byte stream.
///
/// No overall request deadline is applied: a completion may legitimately
/// stream for minutes. Only the connect phase can be bounded.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(connect_timeout: Option<Duration>) -> Result<Self, ParleyError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder.build().map_err(|e| ParleyError::Transport {
            message: format!("failed to build HTTP client: {e}"),
            status: None,
            source: Some(Box::new(e)),
        })?;
        Ok(Self { client })
    }

    /// Wraps an existing client, sharing its connection pool.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventStreamTransport for HttpTransport {
    async fn open(
        &self,
        request: StreamRequest,
        cancel: CancellationToken,
    ) -> Result<ByteStream, ParleyError> {
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ParleyError::Cancelled),
            sent = builder.send() => sent.map_err(|e| ParleyError::Transport {
                message: format!("HTTP request failed: {e}"),
                status: None,
                source: Some(Box::new(e)),
            })?,
        };

        let status = response.status();
        debug!(status = %status, url = %request.url, "chat stream response received");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ParleyError::transport(
                format!("API returned {status}: {body}"),
                Some(status.as_u16()),
            ));
        }

        // The body ends as soon as the token fires; dropping it closes the connection.
        let body = response
            .bytes_stream()
            .take_until(cancel.cancelled_owned())
            .map(|chunk| {
                chunk.map_err(|e| ParleyError::Transport {
                    message: format!("stream read failed: {e}"),
                    status: None,
                    source: Some(Box::new(e)),
                })
            });
        Ok(Box::pin(body))
    }
}
