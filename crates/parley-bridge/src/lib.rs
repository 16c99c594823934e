// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cross-origin embedding bridge for the Parley session engine.
//!
//! Establishes which host origin the embedded session trusts and turns
//! `{type, data}` control messages into [`BridgeEvent`]s.

pub mod bridge;
pub mod protocol;

pub use bridge::{BridgeConfig, DispatchOutcome, EmbeddingBridge, MessageHandler, TrustState};
pub use protocol::{BridgeEvent, InboundType, OutboundType};
