// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The embedding bridge: origin trust and message dispatch.
//!
//! ```text
//! NoTrustedOrigin ──first foreign message──▶ TrustedOrigin(origin)
//! ```
//!
//! Until an origin is trusted, outbound messages go to `*` (if allowed).
//! After that, every outbound message targets the trusted origin and
//! messages from any other foreign origin are dropped.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use parley_core::platform::{ParentWindow, TargetOrigin};
use parley_core::{EmbeddingMessage, ParleyError, WidgetOptions};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::protocol::{decode_event, BridgeEvent, InboundType, OutboundType};

/// A handler for a non-reserved message type.
pub type MessageHandler = Arc<dyn Fn(&serde_json::Value) -> Result<(), ParleyError> + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Origin of the embedded document itself. Messages from it never set trust.
    pub own_origin: Option<String>,
    /// Host origins allowed to become trusted. Empty trusts the first sender.
    pub allowed_origins: Vec<String>,
    /// Send to `*` while no origin is trusted. When false such sends fail.
    pub allow_wildcard_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustState {
    NoTrustedOrigin,
    TrustedOrigin(String),
}

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A reserved type, decoded and forwarded as a [`BridgeEvent`].
    Handled(InboundType),
    /// A registered custom handler ran successfully.
    Custom(String),
    /// No handler for this type; dropped.
    Unhandled(String),
    /// The sender's origin is not allowed.
    Rejected { origin: String },
    /// Not a `{type, data?}` envelope.
    Malformed,
    /// The payload could not be decoded or the handler failed. Logged only.
    Failed { kind: String, error: String },
}

pub struct EmbeddingBridge {
    window: Arc<dyn ParentWindow>,
    config: BridgeConfig,
    trust: RwLock<TrustState>,
    options: RwLock<WidgetOptions>,
    handlers: RwLock<HashMap<String, MessageHandler>>,
    events: mpsc::UnboundedSender<BridgeEvent>,
}

impl EmbeddingBridge {
    /// Creates a bridge and the receiver for its decoded events.
    pub fn new(
        window: Arc<dyn ParentWindow>,
        config: BridgeConfig,
    ) -> (Self, mpsc::UnboundedReceiver<BridgeEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        if config.allowed_origins.is_empty() {
            warn!("no origin allow-list configured, the first host to message this session will be trusted");
        }
        let bridge = Self {
            window,
            config,
            trust: RwLock::new(TrustState::NoTrustedOrigin),
            options: RwLock::new(WidgetOptions::default()),
            handlers: RwLock::new(HashMap::new()),
            events,
        };
        (bridge, rx)
    }

    pub fn trust_state(&self) -> TrustState {
        self.trust.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn trusted_origin(&self) -> Option<String> {
        match self.trust_state() {
            TrustState::TrustedOrigin(origin) => Some(origin),
            TrustState::NoTrustedOrigin => None,
        }
    }

    /// Current widget options as patched by config messages.
    pub fn options(&self) -> WidgetOptions {
        self.options.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replaces the options that later config messages are applied to.
    pub fn set_options(&self, options: WidgetOptions) {
        *self.options.write().unwrap_or_else(|e| e.into_inner()) = options;
    }

    /// Registers a handler for a non-reserved type, replacing any previous one.
    pub fn register_handler<F>(&self, kind: impl Into<String>, handler: F) -> Result<(), ParleyError>
    where
        F: Fn(&serde_json::Value) -> Result<(), ParleyError> + Send + Sync + 'static,
    {
        let kind = kind.into();
        if kind.parse::<InboundType>().is_ok() {
            return Err(ParleyError::Bridge(format!(
                "{kind} is a reserved message type"
            )));
        }
        debug!(%kind, "custom message handler registered");
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(kind, Arc::new(handler));
        Ok(())
    }

    pub fn unregister_handler(&self, kind: &str) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(kind)
            .is_some()
    }

    /// Handles one message received from `origin`. Never fails.
    pub fn handle_inbound(&self, origin: &str, raw: serde_json::Value) -> DispatchOutcome {
        if !self.accept_origin(origin) {
            return DispatchOutcome::Rejected {
                origin: origin.to_string(),
            };
        }

        let message = match EmbeddingMessage::from_value(raw) {
            Ok(message) => message,
            Err(e) => {
                debug!(%origin, error = %e, "dropping malformed control message");
                return DispatchOutcome::Malformed;
            }
        };

        match message.kind.parse::<InboundType>() {
            Ok(kind) => self.dispatch_reserved(kind, &message.data),
            Err(_) => self.dispatch_custom(message),
        }
    }

    fn accept_origin(&self, origin: &str) -> bool {
        if self.config.own_origin.as_deref() == Some(origin) {
            return true;
        }

        let mut trust = self.trust.write().unwrap_or_else(|e| e.into_inner());
        match &*trust {
            TrustState::TrustedOrigin(trusted) if trusted == origin => true,
            TrustState::TrustedOrigin(trusted) => {
                warn!(%origin, %trusted, "dropping message from untrusted origin");
                false
            }
            TrustState::NoTrustedOrigin => {
                if !self.config.allowed_origins.is_empty()
                    && !self.config.allowed_origins.iter().any(|o| o == origin)
                {
                    warn!(%origin, "dropping message from origin outside the allow-list");
                    return false;
                }
                info!(%origin, "host origin trusted");
                *trust = TrustState::TrustedOrigin(origin.to_string());
                true
            }
        }
    }

    fn dispatch_reserved(&self, kind: InboundType, data: &serde_json::Value) -> DispatchOutcome {
        let event = {
            let mut options = self.options.write().unwrap_or_else(|e| e.into_inner());
            match decode_event(kind, data, &options) {
                Ok(event) => {
                    if let BridgeEvent::InitConfig(report) | BridgeEvent::UpdateConfig(report) =
                        &event
                    {
                        if !report.ignored.is_empty() {
                            warn!(%kind, ignored = ?report.ignored, "ignoring unrecognised widget options");
                        }
                        *options = report.options.clone();
                    }
                    event
                }
                Err(e) => {
                    warn!(%kind, error = %e, "control message handler failed");
                    return DispatchOutcome::Failed {
                        kind: kind.to_string(),
                        error: e.to_string(),
                    };
                }
            }
        };

        if self.events.send(event).is_err() {
            debug!(%kind, "no session is listening for bridge events");
        }
        DispatchOutcome::Handled(kind)
    }

    fn dispatch_custom(&self, message: EmbeddingMessage) -> DispatchOutcome {
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&message.kind)
            .cloned();

        let Some(handler) = handler else {
            debug!(kind = %message.kind, "no handler for control message, dropping");
            return DispatchOutcome::Unhandled(message.kind);
        };

        match handler(&message.data) {
            Ok(()) => DispatchOutcome::Custom(message.kind),
            Err(e) => {
                warn!(kind = %message.kind, error = %e, "custom message handler failed");
                DispatchOutcome::Failed {
                    kind: message.kind,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Posts `{type, data}` to the host and returns the target used.
    pub fn send_to_parent(
        &self,
        kind: &str,
        data: serde_json::Value,
    ) -> Result<TargetOrigin, ParleyError> {
        let target = match self.trusted_origin() {
            Some(origin) => TargetOrigin::Origin(origin),
            None if self.config.allow_wildcard_fallback => {
                warn!(%kind, "no trusted host origin yet, posting to *");
                TargetOrigin::Wildcard
            }
            None => {
                return Err(ParleyError::Bridge(format!(
                    "cannot send {kind}: no trusted host origin"
                )));
            }
        };
        let message = EmbeddingMessage::new(kind, data);
        self.window.post_message(&message, &target)?;
        debug!(%kind, %target, "control message sent to host");
        Ok(target)
    }

    /// Tells whatever page hosts the frame that the session is loaded.
    ///
    /// Always targets `*`: the host's origin is not known until it replies.
    pub fn announce_ready(&self) -> Result<(), ParleyError> {
        let message = EmbeddingMessage::new(OutboundType::IframeReady.to_string(), serde_json::Value::Null);
        self.window.post_message(&message, &TargetOrigin::Wildcard)?;
        debug!("announced ready to host");
        Ok(())
    }

    pub fn close_widget(&self) -> Result<TargetOrigin, ParleyError> {
        self.send_outbound(OutboundType::CloseWidget, serde_json::Value::Null)
    }

    pub fn conversation_cleared(&self) -> Result<TargetOrigin, ParleyError> {
        self.send_outbound(OutboundType::ConversationCleared, serde_json::Value::Null)
    }

    /// Asks the host to open its subscription page. `data` may carry context
    /// such as the customer id.
    pub fn navigate_to_subscribe(
        &self,
        data: serde_json::Value,
    ) -> Result<TargetOrigin, ParleyError> {
        self.send_outbound(OutboundType::NavigateToSubscribe, data)
    }

    fn send_outbound(
        &self,
        kind: OutboundType,
        data: serde_json::Value,
    ) -> Result<TargetOrigin, ParleyError> {
        let name: &'static str = kind.into();
        self.send_to_parent(name, data)
    }
}
