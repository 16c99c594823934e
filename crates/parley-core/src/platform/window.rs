// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cross-document messaging seam (the embedded side's view of `postMessage`).

use tokio::sync::mpsc;

use crate::error::ParleyError;
use crate::types::EmbeddingMessage;

/// Where an outbound control message may be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetOrigin {
    /// `*`: any document currently hosting the frame may read the message.
    Wildcard,
    /// Only a document with exactly this origin may read the message.
    Origin(String),
}

impl std::fmt::Display for TargetOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetOrigin::Wildcard => f.write_str("*"),
            TargetOrigin::Origin(origin) => f.write_str(origin),
        }
    }
}

/// Posts envelopes to the parent document.
pub trait ParentWindow: Send + Sync {
    fn post_message(
        &self,
        message: &EmbeddingMessage,
        target: &TargetOrigin,
    ) -> Result<(), ParleyError>;
}

/// A parent window that forwards every posted envelope into a channel.
///
/// Used by in-process hosts (the CLI, native embedders) that read outbound
/// control messages from the receiving half.
#[derive(Debug, Clone)]
pub struct ChannelWindow {
    tx: mpsc::UnboundedSender<(EmbeddingMessage, TargetOrigin)>,
}

impl ChannelWindow {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(EmbeddingMessage, TargetOrigin)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ParentWindow for ChannelWindow {
    fn post_message(
        &self,
        message: &EmbeddingMessage,
        target: &TargetOrigin,
    ) -> Result<(), ParleyError> {
        self.tx
            .send((message.clone(), target.clone()))
            .map_err(|_| ParleyError::Bridge("parent window receiver dropped".into()))
    }
}
