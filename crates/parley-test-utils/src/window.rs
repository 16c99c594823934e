// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parent window double that records outbound control messages.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use parley_core::platform::{ParentWindow, TargetOrigin};
use parley_core::{EmbeddingMessage, ParleyError};

#[derive(Debug, Default)]
pub struct RecordingWindow {
    sent: Mutex<Vec<(EmbeddingMessage, TargetOrigin)>>,
    detached: AtomicBool,
}

impl RecordingWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every posted message with its target, oldest first.
    pub fn sent(&self) -> Vec<(EmbeddingMessage, TargetOrigin)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Message types in posting order.
    pub fn kinds(&self) -> Vec<String> {
        self.sent().into_iter().map(|(m, _)| m.kind).collect()
    }

    pub fn last(&self) -> Option<(EmbeddingMessage, TargetOrigin)> {
        self.sent().pop()
    }

    /// Makes subsequent posts fail as if the parent had gone away.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }
}

impl ParentWindow for RecordingWindow {
    fn post_message(
        &self,
        message: &EmbeddingMessage,
        target: &TargetOrigin,
    ) -> Result<(), ParleyError> {
        if self.detached.load(Ordering::SeqCst) {
            return Err(ParleyError::Bridge("parent window detached".into()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((message.clone(), target.clone()));
        Ok(())
    }
}
