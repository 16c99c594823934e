// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Platform seams the session engine runs against.
//!
//! The engine never touches the network, persistent storage, the parent
//! document, or wall-clock time directly. Hosts supply implementations of
//! these traits; tests supply deterministic doubles.

pub mod clock;
pub mod storage;
pub mod transport;
pub mod window;

pub use clock::{Clock, SystemClock};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use transport::{ByteStream, EventStreamTransport, StreamRequest};
pub use window::{ChannelWindow, ParentWindow, TargetOrigin};
