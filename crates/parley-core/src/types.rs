// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the streaming client, the bridge, the gate, and the shell.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ParleyError;

/// Opaque identifier for a chat session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generates a fresh random session identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a message within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Author of a chat message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A single transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a user turn stamped with the current time.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an assistant turn stamped with the current time.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Classifies a terminal stream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeltaErrorKind {
    /// The request could not be delivered or the server answered with a failure status.
    Transport,
    /// The server reported an error inside the event stream.
    Stream,
}

/// Failure carried by a terminal [`StreamDelta`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaError {
    pub kind: DeltaErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl DeltaError {
    /// Transport failures get a retry affordance; stream errors are final answers.
    pub fn is_retryable(&self) -> bool {
        self.kind == DeltaErrorKind::Transport
    }
}

impl From<&ParleyError> for DeltaError {
    fn from(err: &ParleyError) -> Self {
        match err {
            ParleyError::Transport {
                message, status, ..
            } => DeltaError {
                kind: DeltaErrorKind::Transport,
                message: message.clone(),
                status: *status,
            },
            ParleyError::Stream(message) => DeltaError {
                kind: DeltaErrorKind::Stream,
                message: message.clone(),
                status: None,
            },
            other => DeltaError {
                kind: DeltaErrorKind::Transport,
                message: other.to_string(),
                status: None,
            },
        }
    }
}

/// One increment of an assistant response.
///
/// A stream yields any number of non-terminal deltas followed by exactly one
/// terminal delta: either `is_final` or `error` is set, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDelta {
    pub content: String,
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DeltaError>,
}

impl StreamDelta {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_final: false,
            error: None,
        }
    }

    pub fn done() -> Self {
        Self {
            content: String::new(),
            is_final: true,
            error: None,
        }
    }

    pub fn failed(error: DeltaError) -> Self {
        Self {
            content: String::new(),
            is_final: false,
            error: Some(error),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.is_final || self.error.is_some()
    }
}

/// A cross-document control message envelope: `{type, data?}`.
///
/// The sender's origin is not part of the envelope; the receiving side records
/// it out of band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl EmbeddingMessage {
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Parses an envelope from an arbitrary JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ParleyError> {
        serde_json::from_value(value)
            .map_err(|e| ParleyError::Protocol(format!("invalid control message envelope: {e}")))
    }
}

/// A cached value stamped with the time it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, cached_at: DateTime<Utc>) -> Self {
        Self { value, cached_at }
    }

    /// An entry is valid only while `now - cached_at < ttl`. A TTL too large
    /// to represent counts as expired.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return false;
        };
        now.signed_duration_since(self.cached_at) < ttl
    }
}
