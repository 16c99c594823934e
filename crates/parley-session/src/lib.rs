// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Parley session engine.
//!
//! [`SessionShell`] is the single engine both hosts run: it owns the
//! transcript, reacts to bridge events and drives the streaming client. The
//! supporting modules keep the window geometry, the session identity and
//! background job polling.

pub mod chat;
pub mod identity;
pub mod poller;
pub mod shell;
pub mod window;

pub use chat::{ChatSession, TurnFailure};
pub use identity::{load_or_create, scoped_store, SessionScope, KEY_SESSION_ID};
pub use poller::{JobPoller, JobState, JobStatus, JobStatusSource, PollHandle, PollOutcome, PollSettings};
pub use shell::{Layout, SessionShell, TranscriptEvent, TurnOutcome, COMPACT_BREAKPOINT};
pub use window::{WidgetWindow, WindowBounds, WindowSize, WindowState};
