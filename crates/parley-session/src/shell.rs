// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The session shell: one engine composing chat, bridge, gate and window.
//!
//! The shell owns the transcript. User input goes through the optional
//! subscription gate, then to the [`StreamingChatClient`]; deltas are written
//! into an assistant placeholder as they arrive. Starting a turn supersedes
//! any turn still streaming, and a superseded or cancelled turn leaves no
//! assistant message behind.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::StreamExt;
use parley_bridge::{BridgeEvent, EmbeddingBridge};
use parley_core::{
    ApplyReport, DeltaError, Message, MessageId, ParleyError, SessionId, WidgetOptions,
};
use parley_gate::{GateDecision, SubscriptionGate};
use parley_stream::{DeltaStream, StreamingChatClient};
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chat::{ChatSession, TurnFailure};
use crate::window::{WidgetWindow, WindowSize};

/// Viewports narrower than this use [`Layout::Compact`].
pub const COMPACT_BREAKPOINT: u32 = 768;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Layout {
    #[default]
    Regular,
    Compact,
}

impl Layout {
    pub fn for_viewport_width(width: u32) -> Self {
        if width < COMPACT_BREAKPOINT {
            Layout::Compact
        } else {
            Layout::Regular
        }
    }
}

/// How one user turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed {
        message_id: MessageId,
        content: String,
    },
    /// The assistant message keeps whatever arrived before the failure.
    Failed {
        message_id: MessageId,
        error: DeltaError,
    },
    /// Cancelled or superseded; the placeholder was removed.
    Cancelled,
    /// The subscription gate refused the turn. Nothing was sent.
    Blocked(GateDecision),
}

impl TurnOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TurnOutcome::Completed { .. })
    }
}

/// Live transcript changes, for renderers that show text as it streams.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEvent {
    Delta { message_id: MessageId, text: String },
    /// A placeholder was dropped after cancellation.
    Discarded { message_id: MessageId },
    Cleared,
}

const UPDATE_CAPACITY: usize = 256;

enum TurnStart {
    Streaming(DeltaStream, MessageId),
    Refused(TurnOutcome),
}

struct ShellState {
    chat: ChatSession,
    options: WidgetOptions,
    focused: bool,
    page_visible: bool,
    viewport: Option<WindowSize>,
    layout: Layout,
}

pub struct SessionShell {
    client: StreamingChatClient,
    bridge: Arc<EmbeddingBridge>,
    gate: Option<Arc<SubscriptionGate>>,
    window: Mutex<WidgetWindow>,
    state: Mutex<ShellState>,
    updates: broadcast::Sender<TranscriptEvent>,
}

impl SessionShell {
    pub fn new(client: StreamingChatClient, bridge: Arc<EmbeddingBridge>, window: WidgetWindow) -> Self {
        let settings = client.settings();
        let chat = ChatSession::new(client.session_id().clone(), settings.tenant_id.clone());
        // Host patches start from the configured request flags, not the defaults.
        let options = settings.seed_widget_options(&bridge.options());
        bridge.set_options(options.clone());
        let state = ShellState {
            chat,
            options,
            focused: false,
            page_visible: true,
            viewport: None,
            layout: Layout::default(),
        };
        Self {
            client,
            bridge,
            gate: None,
            window: Mutex::new(window),
            state: Mutex::new(state),
            updates: broadcast::channel(UPDATE_CAPACITY).0,
        }
    }

    /// Requires an allowing gate decision before each turn.
    pub fn with_gate(mut self, gate: Arc<SubscriptionGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn session_id(&self) -> &SessionId {
        self.client.session_id()
    }

    pub fn bridge(&self) -> &Arc<EmbeddingBridge> {
        &self.bridge
    }

    pub fn gate(&self) -> Option<&Arc<SubscriptionGate>> {
        self.gate.as_ref()
    }

    /// Announces readiness to the host and runs the initial access check.
    pub async fn mount(&self) -> Result<(), ParleyError> {
        self.bridge.announce_ready()?;
        if let Some(gate) = &self.gate {
            gate.mount().await;
        }
        Ok(())
    }

    /// Receives transcript changes from now on. Slow receivers lose events.
    pub fn subscribe(&self) -> broadcast::Receiver<TranscriptEvent> {
        self.updates.subscribe()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().chat.messages().to_vec()
    }

    pub fn last_failure(&self) -> Option<TurnFailure> {
        self.lock().chat.last_failure().cloned()
    }

    pub fn options(&self) -> WidgetOptions {
        self.lock().options.clone()
    }

    pub fn layout(&self) -> Layout {
        self.lock().layout
    }

    pub fn viewport(&self) -> Option<WindowSize> {
        self.lock().viewport
    }

    pub fn is_focused(&self) -> bool {
        self.lock().focused
    }

    pub fn is_page_visible(&self) -> bool {
        self.lock().page_visible
    }

    /// Runs `f` against the widget window.
    pub fn with_window<R>(&self, f: impl FnOnce(&mut WidgetWindow) -> R) -> R {
        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut window)
    }

    /// Sends one user turn and waits for the assistant's answer.
    pub async fn send_message(&self, text: &str) -> Result<TurnOutcome, ParleyError> {
        match self.start_message(text)? {
            TurnStart::Streaming(stream, message_id) => Ok(self.drive(stream, message_id).await),
            TurnStart::Refused(outcome) => Ok(outcome),
        }
    }

    /// Re-sends the last user turn after a failed one.
    ///
    /// Any failure can be retried. The failed placeholder and its partial
    /// text are dropped first.
    pub async fn retry_last(&self) -> Result<TurnOutcome, ParleyError> {
        if let Some(blocked) = self.gate_check() {
            return Ok(blocked);
        }

        let (stream, message_id) = {
            let mut state = self.lock();
            let failure = state
                .chat
                .last_failure()
                .cloned()
                .ok_or_else(|| ParleyError::Protocol("no failed turn to retry".into()))?;
            state.chat.discard(&failure.message_id);
            debug!(
                session_id = %self.session_id(),
                kind = %failure.error.kind,
                transient = failure.error.is_retryable(),
                "retrying failed turn"
            );
            self.begin_turn(&mut state)?
        };
        Ok(self.drive(stream, message_id).await)
    }

    /// Stops the turn in progress, if any.
    pub fn cancel(&self) {
        self.client.cancel();
    }

    /// Empties the transcript and tells the host.
    pub fn clear_history(&self) -> Result<(), ParleyError> {
        self.client.cancel();
        self.lock().chat.clear();
        self.notify(TranscriptEvent::Cleared);
        info!(session_id = %self.session_id(), "conversation cleared");
        self.bridge.conversation_cleared()?;
        Ok(())
    }

    /// Closes the window and asks the host to hide the frame.
    pub fn close(&self) -> Result<(), ParleyError> {
        self.with_window(|w| w.close());
        self.lock().focused = false;
        self.bridge.close_widget()?;
        Ok(())
    }

    /// Asks the host to show its subscription page.
    pub fn request_upgrade(&self) -> Result<(), ParleyError> {
        let customer_id = self
            .gate
            .as_ref()
            .and_then(|g| g.service().cached_customer_id());
        let data = match customer_id {
            Some(id) => serde_json::json!({ "customerId": id }),
            None => serde_json::json!({}),
        };
        self.bridge.navigate_to_subscribe(data)?;
        Ok(())
    }

    /// Applies one decoded bridge event.
    ///
    /// `SEND_MESSAGE` runs a full turn and returns its outcome.
    pub async fn handle_event(&self, event: BridgeEvent) -> Result<Option<TurnOutcome>, ParleyError> {
        match event {
            BridgeEvent::InitConfig(report) => {
                self.apply_options(report, true);
                Ok(None)
            }
            BridgeEvent::UpdateConfig(report) => {
                self.apply_options(report, false);
                Ok(None)
            }
            BridgeEvent::SendMessage(text) => self.send_message(&text).await.map(Some),
            BridgeEvent::FocusRequest => {
                self.with_window(|w| w.open())?;
                self.lock().focused = true;
                debug!("focus requested by host");
                Ok(None)
            }
            BridgeEvent::PageVisible(visible) => {
                let mut state = self.lock();
                state.page_visible = visible;
                if !visible {
                    state.focused = false;
                }
                debug!(visible, "host page visibility changed");
                Ok(None)
            }
            BridgeEvent::WindowResize { width, height } => {
                let layout = Layout::for_viewport_width(width);
                let mut state = self.lock();
                state.viewport = Some(WindowSize { width, height });
                if state.layout != layout {
                    debug!(width, %layout, "layout changed");
                }
                state.layout = layout;
                Ok(None)
            }
        }
    }

    /// Processes bridge events until `cancel` fires or the bridge goes away.
    ///
    /// Turns start in the order their events arrive. Only the answers stream
    /// in the background, so config and focus updates are not held up by a
    /// long answer.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<BridgeEvent>,
        cancel: CancellationToken,
    ) {
        let mut turns = JoinSet::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(_) = turns.join_next(), if !turns.is_empty() => {}
                event = events.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        BridgeEvent::SendMessage(text) => match self.start_message(&text) {
                            Ok(TurnStart::Streaming(stream, message_id)) => {
                                let shell = self.clone();
                                turns.spawn(async move {
                                    let outcome = shell.drive(stream, message_id).await;
                                    debug!(?outcome, "host-initiated turn finished");
                                });
                            }
                            Ok(TurnStart::Refused(outcome)) => {
                                debug!(?outcome, "host-initiated turn finished");
                            }
                            Err(e) => warn!(error = %e, "host-initiated turn rejected"),
                        },
                        other => {
                            let kind = other.kind();
                            if let Err(e) = self.handle_event(other).await {
                                warn!(%kind, error = %e, "bridge event failed");
                            }
                        }
                    }
                }
            }
        }

        self.client.cancel();
        while turns.join_next().await.is_some() {}
        debug!(session_id = %self.session_id(), "session shell stopped");
    }

    /// Checks the gate, records the user message and starts its request.
    /// Never waits, so callers that must keep turn order can call it inline.
    fn start_message(&self, text: &str) -> Result<TurnStart, ParleyError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ParleyError::Protocol("message is empty".into()));
        }
        if let Some(blocked) = self.gate_check() {
            return Ok(TurnStart::Refused(blocked));
        }

        let mut state = self.lock();
        state.chat.clear_failure();
        state.chat.push_user(text);
        let (stream, message_id) = self.begin_turn(&mut state)?;
        Ok(TurnStart::Streaming(stream, message_id))
    }

    fn gate_check(&self) -> Option<TurnOutcome> {
        let gate = self.gate.as_ref()?;
        match gate.decision() {
            GateDecision::Allowed => None,
            decision => {
                info!(?decision, "turn refused by subscription gate");
                Some(TurnOutcome::Blocked(decision))
            }
        }
    }

    /// Starts a request for the transcript as it stands and adds the
    /// placeholder it will stream into. Supersedes any running turn.
    fn begin_turn(&self, state: &mut ShellState) -> Result<(DeltaStream, MessageId), ParleyError> {
        let history = state.chat.request_history();
        let stream = self.client.start(&history)?;
        let message_id = state.chat.push_placeholder();
        Ok((stream, message_id))
    }

    async fn drive(&self, mut stream: DeltaStream, message_id: MessageId) -> TurnOutcome {
        while let Some(delta) = stream.next().await {
            let mut state = self.lock();
            if stream.is_cancelled() {
                break;
            }
            if let Some(error) = delta.error {
                warn!(kind = %error.kind, error = %error.message, status = ?error.status, "assistant turn failed");
                state.chat.mark_failed(&message_id, error.clone());
                return TurnOutcome::Failed { message_id, error };
            }
            if delta.is_final {
                let content = state
                    .chat
                    .get(&message_id)
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                debug!(chars = content.len(), "assistant turn completed");
                return TurnOutcome::Completed {
                    message_id,
                    content,
                };
            }
            if !state.chat.append(&message_id, &delta.content) {
                // Cleared underneath us.
                break;
            }
            self.notify(TranscriptEvent::Delta {
                message_id: message_id.clone(),
                text: delta.content,
            });
        }

        if self.lock().chat.discard(&message_id).is_some() {
            self.notify(TranscriptEvent::Discarded { message_id });
        }
        debug!("assistant turn cancelled");
        TurnOutcome::Cancelled
    }

    fn apply_options(&self, report: ApplyReport, initial: bool) {
        self.client
            .update_settings(|settings| settings.apply_widget_options(&report));
        let mut state = self.lock();
        if report.applied.iter().any(|key| key == "tenantId") {
            state.chat.set_tenant_id(report.options.tenant_id.clone());
        }
        state.options = report.options;
        if initial {
            info!(applied = ?report.applied, "widget configured by host");
        } else {
            debug!(applied = ?report.applied, "widget options updated");
        }
    }

    fn notify(&self, event: TranscriptEvent) {
        // No receivers is fine.
        let _ = self.updates.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, ShellState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
