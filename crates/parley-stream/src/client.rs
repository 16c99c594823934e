// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming chat client.
//!
//! [`StreamingChatClient`] turns a transcript into a lazy [`DeltaStream`]. The
//! request is only sent when the stream is first polled. A client owns at most
//! one live request: starting a new stream cancels the previous one before the
//! new request is issued, and a cancelled stream ends without yielding an error.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};
use std::task::{Context, Poll};

use futures::stream::{self, Stream, StreamExt};
use parley_core::platform::{ByteStream, EventStreamTransport, StreamRequest};
use parley_core::{
    ApplyReport, DeltaError, DeltaErrorKind, Message, ParleyError, Role, SessionId, StreamDelta,
    WidgetOptions,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::sse::{interpret_line, LineDecoder, SseLine};
use crate::types::{CompletionRequestBody, TENANT_HEADER};

/// Per-request settings sent alongside every user turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    /// Full URL of the streaming chat endpoint.
    pub endpoint: String,
    pub tenant_id: Option<String>,
    pub use_rag: bool,
    pub rag_top_k: u32,
    /// Log malformed stream lines at `warn` instead of `trace`.
    pub debug_protocol: bool,
}

impl ChatSettings {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            tenant_id: None,
            use_rag: true,
            rag_top_k: 5,
            debug_protocol: false,
        }
    }

    /// Copies the request-affecting options a config message actually set.
    ///
    /// Keys the host did not send, or sent with an unusable value, leave the
    /// settings alone. `tenantId: null` clears the tenant.
    pub fn apply_widget_options(&mut self, report: &ApplyReport) {
        for key in &report.applied {
            match key.as_str() {
                "tenantId" => self.tenant_id = report.options.tenant_id.clone(),
                "useRag" => self.use_rag = report.options.use_rag,
                "ragTopK" => self.rag_top_k = report.options.rag_top_k,
                _ => {}
            }
        }
    }

    /// `base` with its request-affecting fields taken from these settings.
    pub fn seed_widget_options(&self, base: &WidgetOptions) -> WidgetOptions {
        WidgetOptions {
            tenant_id: self.tenant_id.clone(),
            use_rag: self.use_rag,
            rag_top_k: self.rag_top_k,
            ..base.clone()
        }
    }
}

/// Client for the streaming chat endpoint.
pub struct StreamingChatClient {
    transport: Arc<dyn EventStreamTransport>,
    session_id: SessionId,
    settings: RwLock<ChatSettings>,
    current: Mutex<Option<CancellationToken>>,
}

impl StreamingChatClient {
    pub fn new(
        transport: Arc<dyn EventStreamTransport>,
        session_id: SessionId,
        settings: ChatSettings,
    ) -> Self {
        Self {
            transport,
            session_id,
            settings: RwLock::new(settings),
            current: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Returns a snapshot of the current settings.
    pub fn settings(&self) -> ChatSettings {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Mutates the settings used by subsequent requests.
    pub fn update_settings(&self, f: impl FnOnce(&mut ChatSettings)) {
        let mut settings = self.settings.write().unwrap_or_else(|e| e.into_inner());
        f(&mut settings);
    }

    /// Starts a completion for the last message of `messages`.
    ///
    /// Fails with [`ParleyError::Protocol`] before any network activity if the
    /// transcript is empty or does not end with a user turn. Any stream
    /// previously started by this client is cancelled.
    pub fn start(&self, messages: &[Message]) -> Result<DeltaStream, ParleyError> {
        let last = messages
            .last()
            .ok_or_else(|| ParleyError::Protocol("cannot start a completion without messages".into()))?;
        if last.role != Role::User {
            return Err(ParleyError::Protocol(format!(
                "last message must be a user turn, got {}",
                last.role
            )));
        }

        let settings = self.settings();
        let request = build_request(&settings, &self.session_id, &last.content)?;

        let token = CancellationToken::new();
        {
            let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(previous) = current.replace(token.clone())
                && !previous.is_cancelled()
            {
                previous.cancel();
                debug!(session_id = %self.session_id, "superseded in-flight completion");
            }
        }

        Ok(DeltaStream::open(
            self.transport.clone(),
            request,
            token,
            settings.debug_protocol,
        ))
    }

    /// Aborts the in-flight completion, if any. Its stream ends silently.
    pub fn cancel(&self) {
        let taken = self
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(token) = taken {
            token.cancel();
            debug!(session_id = %self.session_id, "completion cancelled");
        }
    }
}

fn build_request(
    settings: &ChatSettings,
    session_id: &SessionId,
    message: &str,
) -> Result<StreamRequest, ParleyError> {
    let body = CompletionRequestBody {
        message: message.to_string(),
        session_id: session_id.to_string(),
        use_rag: settings.use_rag,
        rag_top_k: settings.rag_top_k,
        use_history: true,
    };
    let body = serde_json::to_value(&body)
        .map_err(|e| ParleyError::Internal(format!("failed to encode chat request: {e}")))?;

    let mut headers = vec![
        ("Content-Type".to_string(), "application/json".to_string()),
        ("Accept".to_string(), "text/event-stream".to_string()),
    ];
    if let Some(tenant) = &settings.tenant_id {
        headers.push((TENANT_HEADER.to_string(), tenant.clone()));
    }

    Ok(StreamRequest {
        url: settings.endpoint.clone(),
        headers,
        body,
    })
}

/// A lazy, cancellable sequence of [`StreamDelta`]s for one request.
///
/// Yields non-terminal deltas in arrival order and then exactly one terminal
/// delta, unless cancelled, in which case it simply ends.
pub struct DeltaStream {
    inner: Pin<Box<dyn Stream<Item = StreamDelta> + Send>>,
    cancel: CancellationToken,
    accumulated: String,
}

impl DeltaStream {
    fn open(
        transport: Arc<dyn EventStreamTransport>,
        request: StreamRequest,
        cancel: CancellationToken,
        debug_protocol: bool,
    ) -> Self {
        let state = ReadState {
            transport,
            phase: Phase::Pending(request),
            decoder: LineDecoder::new(),
            pending: VecDeque::new(),
            cancel: cancel.clone(),
            debug_protocol,
        };
        Self {
            inner: Box::pin(stream::unfold(state, next_delta)),
            cancel,
            accumulated: String::new(),
        }
    }

    /// Text of every non-terminal delta yielded so far.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// Aborts this stream only.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Stream for DeltaStream {
    type Item = StreamDelta;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(delta)) => {
                if !delta.is_terminal() {
                    self.accumulated.push_str(&delta.content);
                }
                Poll::Ready(Some(delta))
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for DeltaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaStream")
            .field("accumulated", &self.accumulated)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

enum Phase {
    /// Request built but not yet sent.
    Pending(StreamRequest),
    /// Response headers received; reading the body.
    Reading(ByteStream),
    /// Body ended without `[DONE]`; buffered lines remain.
    Draining,
    Done,
}

struct ReadState {
    transport: Arc<dyn EventStreamTransport>,
    phase: Phase,
    decoder: LineDecoder,
    pending: VecDeque<String>,
    cancel: CancellationToken,
    debug_protocol: bool,
}

async fn next_delta(mut state: ReadState) -> Option<(StreamDelta, ReadState)> {
    loop {
        if state.cancel.is_cancelled() {
            return None;
        }

        while let Some(line) = state.pending.pop_front() {
            match interpret_line(&line) {
                SseLine::Ignored => {}
                SseLine::Noise(reason) => {
                    if state.debug_protocol {
                        warn!(%reason, "skipping malformed stream line");
                    } else {
                        trace!(%reason, "skipping malformed stream line");
                    }
                }
                SseLine::Content(text) => return Some((StreamDelta::text(text), state)),
                SseLine::Done => {
                    state.finish();
                    return Some((StreamDelta::done(), state));
                }
                SseLine::Error(message) => {
                    warn!(%message, "chat stream reported an error");
                    state.finish();
                    let error = DeltaError {
                        kind: DeltaErrorKind::Stream,
                        message,
                        status: None,
                    };
                    return Some((StreamDelta::failed(error), state));
                }
            }
        }

        match std::mem::replace(&mut state.phase, Phase::Done) {
            Phase::Done => return None,
            Phase::Draining => return Some((StreamDelta::done(), state)),
            Phase::Pending(request) => {
                let opened = tokio::select! {
                    biased;
                    _ = state.cancel.cancelled() => return None,
                    opened = state.transport.open(request, state.cancel.clone()) => opened,
                };
                match opened {
                    Ok(body) => state.phase = Phase::Reading(body),
                    Err(e) if e.is_cancelled() => return None,
                    Err(e) => {
                        warn!(error = %e, "chat request failed");
                        return Some((StreamDelta::failed(DeltaError::from(&e)), state));
                    }
                }
            }
            Phase::Reading(mut body) => {
                let next = tokio::select! {
                    biased;
                    _ = state.cancel.cancelled() => return None,
                    next = body.next() => next,
                };
                match next {
                    Some(Ok(chunk)) => {
                        let lines = state.decoder.push(&chunk);
                        state.pending.extend(lines);
                        state.phase = Phase::Reading(body);
                    }
                    Some(Err(e)) => {
                        if e.is_cancelled() || state.cancel.is_cancelled() {
                            return None;
                        }
                        warn!(error = %e, "chat stream interrupted");
                        return Some((StreamDelta::failed(DeltaError::from(&e)), state));
                    }
                    None => {
                        if let Some(tail) = state.decoder.finish() {
                            state.pending.push_back(tail);
                        }
                        debug!("chat stream ended without [DONE]");
                        state.phase = Phase::Draining;
                    }
                }
            }
        }
    }
}

impl ReadState {
    fn finish(&mut self) {
        self.phase = Phase::Done;
        self.pending.clear();
    }
}
