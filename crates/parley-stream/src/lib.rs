// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming chat completion client for the Parley session engine.
//!
//! Sends the latest user turn to the chat endpoint and turns the
//! `text/event-stream` response into ordered [`StreamDelta`](parley_core::StreamDelta)s.

pub mod client;
pub mod sse;
pub mod transport;
pub mod types;

pub use client::{ChatSettings, DeltaStream, StreamingChatClient};
pub use transport::HttpTransport;
