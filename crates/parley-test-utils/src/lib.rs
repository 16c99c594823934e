// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Parley.
//!
//! Deterministic stand-ins for every platform seam, so that the engine can be
//! exercised without a network, a browser, or wall-clock time.
//!
//! # Components
//!
//! - [`ScriptedTransport`] - event-stream transport replaying queued responses
//! - [`RecordingWindow`] - parent window that captures outbound messages
//! - [`ManualClock`] - clock that only moves when told to
//! - [`FakeSubscriptionApi`] - in-memory subscription backend with call counters

pub mod clock;
pub mod subscription_api;
pub mod transport;
pub mod window;

pub use clock::ManualClock;
pub use subscription_api::FakeSubscriptionApi;
pub use transport::{ScriptedResponse, ScriptedTransport};
pub use window::RecordingWindow;
