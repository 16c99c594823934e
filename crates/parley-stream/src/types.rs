// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request and response types for the streaming chat endpoint.

use serde::{Deserialize, Serialize};

/// Header carrying the tenant identifier.
pub const TENANT_HEADER: &str = "X-Tenant-ID";

/// JSON body of a chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequestBody {
    /// The latest user turn. Earlier turns live server-side.
    pub message: String,
    pub session_id: String,
    pub use_rag: bool,
    pub rag_top_k: u32,
    /// Asks the backend to prepend the stored conversation for this session.
    pub use_history: bool,
}

/// One JSON payload from a `data:` line.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionChunk {
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

impl CompletionChunk {
    /// The server-reported error, if the payload carries a non-null `error`.
    ///
    /// Accepts both `{"error": "text"}` and `{"error": {"message": "text"}}`.
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(map) => Some(
                map.get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| serde_json::Value::Object(map.clone()).to_string()),
            ),
            other => Some(other.to_string()),
        }
    }

    /// The content fragment of the first choice.
    pub fn content(&self) -> Option<&str> {
        self.choices.first()?.delta.content.as_deref()
    }
}
