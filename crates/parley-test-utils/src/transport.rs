// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted event-stream transport.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use parley_core::platform::{ByteStream, EventStreamTransport, StreamRequest};
use parley_core::ParleyError;

/// One queued answer to `open`.
pub enum ScriptedResponse {
    /// A 2xx response whose body is these chunks, then EOF.
    Chunks(Vec<Bytes>),
    /// A non-success status with a body.
    Status(u16, String),
    /// The request never reached the server.
    NetworkError(String),
    /// A 2xx response whose body is fed by the test through a channel.
    Channel(mpsc::UnboundedReceiver<Result<Bytes, ParleyError>>),
}

impl ScriptedResponse {
    pub fn chunks(chunks: Vec<Bytes>) -> Self {
        Self::Chunks(chunks)
    }

    pub fn status(code: u16, body: &str) -> Self {
        Self::Status(code, body.to_string())
    }

    /// A complete SSE body made of one `data:` line per fragment, then `[DONE]`.
    pub fn text(fragments: &[&str]) -> Self {
        let mut chunks: Vec<Bytes> = fragments
            .iter()
            .map(|f| {
                let payload = serde_json::json!({"choices": [{"delta": {"content": f}}]});
                Bytes::from(format!("data: {payload}\n\n"))
            })
            .collect();
        chunks.push(Bytes::from_static(b"data: [DONE]\n\n"));
        Self::Chunks(chunks)
    }
}

struct Opened {
    token: CancellationToken,
    alive: Arc<AtomicBool>,
}

/// Replays queued responses in FIFO order and records every request.
///
/// An empty queue answers with a network error.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<StreamRequest>>,
    opened: Mutex<Vec<Opened>>,
    overlapping: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: ScriptedResponse) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response);
    }

    /// Queues a channel-fed response and returns its sender.
    pub fn push_channel(&self) -> mpsc::UnboundedSender<Result<Bytes, ParleyError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push(ScriptedResponse::Channel(rx));
        tx
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of opens that happened while an earlier body was still alive
    /// and its token had not been cancelled.
    pub fn overlapping_opens(&self) -> usize {
        self.overlapping.load(Ordering::SeqCst)
    }

    /// Number of response bodies not yet dropped.
    pub fn live_bodies(&self) -> usize {
        self.opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|o| o.alive.load(Ordering::SeqCst))
            .count()
    }
}

#[async_trait]
impl EventStreamTransport for ScriptedTransport {
    async fn open(
        &self,
        request: StreamRequest,
        cancel: CancellationToken,
    ) -> Result<ByteStream, ParleyError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        let response = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        let body: ByteStream = match response {
            None => {
                return Err(ParleyError::transport("no scripted response", None));
            }
            Some(ScriptedResponse::NetworkError(message)) => {
                return Err(ParleyError::transport(message, None));
            }
            Some(ScriptedResponse::Status(code, body)) => {
                return Err(ParleyError::transport(
                    format!("API returned {code}: {body}"),
                    Some(code),
                ));
            }
            Some(ScriptedResponse::Chunks(chunks)) => {
                Box::pin(stream::iter(chunks.into_iter().map(Ok)))
            }
            Some(ScriptedResponse::Channel(rx)) => Box::pin(stream::unfold(rx, |mut rx| async {
                rx.recv().await.map(|item| (item, rx))
            })),
        };

        let alive = Arc::new(AtomicBool::new(true));
        {
            let mut opened = self.opened.lock().unwrap_or_else(|e| e.into_inner());
            if opened
                .iter()
                .any(|o| o.alive.load(Ordering::SeqCst) && !o.token.is_cancelled())
            {
                self.overlapping.fetch_add(1, Ordering::SeqCst);
            }
            opened.push(Opened {
                token: cancel.clone(),
                alive: alive.clone(),
            });
        }

        Ok(Box::pin(TrackedBody {
            inner: Box::pin(body.take_until(cancel.cancelled_owned())),
            alive,
        }))
    }
}

struct TrackedBody {
    inner: ByteStream,
    alive: Arc<AtomicBool>,
}

impl Stream for TrackedBody {
    type Item = Result<Bytes, ParleyError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for TrackedBody {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}
