// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session identity: a UUID kept in storage under `parley_session_id`.

use std::sync::Arc;

use parley_core::platform::{KeyValueStore, MemoryStore};
use parley_core::SessionId;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, warn};

pub const KEY_SESSION_ID: &str = "parley_session_id";

/// How long a session identity lives.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionScope {
    /// One identity per engine instance, never shared.
    Tab,
    /// One identity shared by every engine using the same store.
    #[default]
    Persistent,
}

/// Returns the storage that holds the identity for `scope`.
pub fn scoped_store(scope: SessionScope, shared: Arc<dyn KeyValueStore>) -> Arc<dyn KeyValueStore> {
    match scope {
        SessionScope::Tab => Arc::new(MemoryStore::new()),
        SessionScope::Persistent => shared,
    }
}

/// Reads the stored session id, creating and storing one if absent.
///
/// Storage failures fall back to a fresh, unsaved id.
pub fn load_or_create(store: &dyn KeyValueStore) -> SessionId {
    match store.get(KEY_SESSION_ID) {
        Ok(Some(id)) if !id.trim().is_empty() => {
            debug!(session_id = %id, "restored session identity");
            return SessionId(id);
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "could not read session identity, starting a new one"),
    }

    let id = SessionId::generate();
    if let Err(e) = store.set(KEY_SESSION_ID, id.as_str()) {
        warn!(error = %e, "could not persist session identity");
    }
    debug!(session_id = %id, "created session identity");
    id
}

/// Drops the stored identity so the next load creates a new one.
pub fn forget(store: &dyn KeyValueStore) {
    if let Err(e) = store.remove(KEY_SESSION_ID) {
        warn!(error = %e, "could not remove session identity");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistent_scope_shares_identity() {
        let shared: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let a = load_or_create(scoped_store(SessionScope::Persistent, shared.clone()).as_ref());
        let b = load_or_create(scoped_store(SessionScope::Persistent, shared.clone()).as_ref());
        assert_eq!(a, b);
        assert!(uuid_like(a.as_str()));
    }

    #[test]
    fn tab_scope_is_private() {
        let shared: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let a = load_or_create(scoped_store(SessionScope::Tab, shared.clone()).as_ref());
        let b = load_or_create(scoped_store(SessionScope::Tab, shared.clone()).as_ref());
        assert_ne!(a, b);
        assert!(shared.get(KEY_SESSION_ID).unwrap().is_none());
    }

    #[test]
    fn forget_rotates_identity() {
        let store = MemoryStore::new();
        let first = load_or_create(&store);
        forget(&store);
        assert_ne!(load_or_create(&store), first);
    }

    #[test]
    fn scope_parses_from_config_strings() {
        assert_eq!("tab".parse::<SessionScope>().unwrap(), SessionScope::Tab);
        assert_eq!(SessionScope::default().to_string(), "persistent");
    }

    fn uuid_like(s: &str) -> bool {
        s.len() == 36 && s.chars().filter(|c| *c == '-').count() == 4
    }
}
