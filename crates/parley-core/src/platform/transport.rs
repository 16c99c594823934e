// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Network fetch seam for event-stream responses.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::ParleyError;

/// A response body delivered as raw chunks.
///
/// Chunk boundaries carry no meaning: a line or a multi-byte UTF-8 sequence
/// may be split across any number of chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ParleyError>> + Send>>;

/// A JSON `POST` whose response is read incrementally.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

/// Opens streaming HTTP requests.
#[async_trait]
pub trait EventStreamTransport: Send + Sync {
    /// Sends `request` and returns the response body once headers arrive.
    ///
    /// Implementations must map a non-success status to
    /// [`ParleyError::Transport`] carrying the status code, and must release
    /// the underlying connection promptly once `cancel` fires, whether or not
    /// the returned body is still being polled.
    async fn open(
        &self,
        request: StreamRequest,
        cancel: CancellationToken,
    ) -> Result<ByteStream, ParleyError>;
}
