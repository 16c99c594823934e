// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The transcript of one chat session.

use parley_core::{DeltaError, Message, MessageId, Role, SessionId};

/// The failure attached to an assistant message whose turn did not finish.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnFailure {
    pub message_id: MessageId,
    pub error: DeltaError,
}

/// Ordered, append-only transcript.
///
/// Assistant messages are created empty and filled in place as deltas arrive.
/// Only [`discard`](Self::discard) and [`clear`](Self::clear) remove messages.
#[derive(Debug, Clone)]
pub struct ChatSession {
    session_id: SessionId,
    tenant_id: Option<String>,
    messages: Vec<Message>,
    last_failure: Option<TurnFailure>,
}

impl ChatSession {
    pub fn new(session_id: SessionId, tenant_id: Option<String>) -> Self {
        Self {
            session_id,
            tenant_id,
            messages: Vec::new(),
            last_failure: None,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    pub fn set_tenant_id(&mut self, tenant_id: Option<String>) {
        self.tenant_id = tenant_id;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> MessageId {
        let message = Message::user(content);
        let id = message.id.clone();
        self.messages.push(message);
        id
    }

    /// Appends an empty assistant message to stream into.
    pub fn push_placeholder(&mut self) -> MessageId {
        let message = Message::assistant(String::new());
        let id = message.id.clone();
        self.messages.push(message);
        id
    }

    /// Appends text to a message. Returns false if the message is gone.
    pub fn append(&mut self, id: &MessageId, text: &str) -> bool {
        match self.find_mut(id) {
            Some(message) => {
                message.content.push_str(text);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Removes a message, typically a placeholder whose turn was cancelled.
    pub fn discard(&mut self, id: &MessageId) -> Option<Message> {
        let index = self.messages.iter().position(|m| &m.id == id)?;
        if self.last_failure.as_ref().is_some_and(|f| &f.message_id == id) {
            self.last_failure = None;
        }
        Some(self.messages.remove(index))
    }

    /// Records that the turn streaming into `id` failed. Partial content stays.
    pub fn mark_failed(&mut self, id: &MessageId, error: DeltaError) {
        self.last_failure = Some(TurnFailure {
            message_id: id.clone(),
            error,
        });
    }

    pub fn last_failure(&self) -> Option<&TurnFailure> {
        self.last_failure.as_ref()
    }

    pub fn clear_failure(&mut self) {
        self.last_failure = None;
    }

    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }

    /// The transcript to send: everything except empty assistant placeholders.
    pub fn request_history(&self) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| !(m.role == Role::Assistant && m.content.is_empty()))
            .cloned()
            .collect()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.last_failure = None;
    }

    fn find_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| &m.id == id)
    }
}
