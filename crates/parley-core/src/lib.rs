// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Parley session engine.
//!
//! This crate provides the error taxonomy, the shared wire and transcript
//! types, the runtime widget options, and the platform seams (transport,
//! storage, parent window, clock) every other Parley crate is written against.

pub mod error;
pub mod platform;
pub mod types;
pub mod widget;

// Re-export key items at crate root for ergonomic imports.
pub use error::ParleyError;
pub use types::{
    CacheEntry, DeltaError, DeltaErrorKind, EmbeddingMessage, Message, MessageId, Role,
    SessionId, StreamDelta,
};
pub use widget::{ApplyReport, WidgetOptions, WidgetPosition, WidgetTheme};

/// Prefix shared by every key the engine writes to local storage.
pub const STORAGE_PREFIX: &str = "parley_";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_variants_construct() {
        let _config = ParleyError::Config("test".into());
        let _transport = ParleyError::transport("test", Some(500));
        let _protocol = ParleyError::Protocol("test".into());
        let _stream = ParleyError::Stream("test".into());
        let _cancelled = ParleyError::Cancelled;
        let _cache = ParleyError::Cache {
            message: "test".into(),
            source: None,
        };
        let _access = ParleyError::AccessCheck("test".into());
        let _bridge = ParleyError::Bridge("test".into());
        let _storage = ParleyError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _internal = ParleyError::Internal("test".into());
    }

    #[test]
    fn session_ids_are_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.clone(), a);
    }

    #[test]
    fn platform_traits_are_object_safe() {
        fn _transport(_: &dyn platform::EventStreamTransport) {}
        fn _store(_: &dyn platform::KeyValueStore) {}
        fn _window(_: &dyn platform::ParentWindow) {}
        fn _clock(_: &dyn platform::Clock) {}
    }
}
