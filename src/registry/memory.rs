//! In-memory registry used by unit tests

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::error::{KeyError, Result};
use crate::keys::{KeyId, KeyKind, RemoteKey};

use super::{NewKey, RemoteKeyRegistry};

#[derive(Default)]
pub struct MemoryRegistry {
    keys: RefCell<Vec<(KeyKind, RemoteKey)>>,
    next_id: Cell<u64>,
    /// Ids whose deletion fails with a remote error
    broken: RefCell<HashSet<String>>,
    /// Kinds whose listing fails with a remote error
    unreachable: RefCell<HashSet<KeyKind>>,
    /// Reject registrations whose title already exists
    pub reject_duplicates: bool,
    pub list_calls: Cell<usize>,
    pub register_calls: Cell<usize>,
    pub delete_calls: Cell<usize>,
    pub registered: RefCell<HashMap<String, NewKey>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(1),
            ..Default::default()
        }
    }

    /// Seed a key and return its id
    pub fn insert(&self, kind: KeyKind, title: &str, created_at: Option<DateTime<Utc>>) -> KeyId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.keys.borrow_mut().push((
            kind,
            RemoteKey {
                id: id.to_string(),
                title: title.to_string(),
                created_at,
                fingerprint: None,
                expires_at: None,
            },
        ));
        KeyId::new(kind, id.to_string())
    }

    pub fn break_deletion(&self, id: &KeyId) {
        self.broken.borrow_mut().insert(id.value().to_string());
    }

    pub fn make_unreachable(&self, kind: KeyKind) {
        self.unreachable.borrow_mut().insert(kind);
    }

    pub fn contains(&self, id: &KeyId) -> bool {
        self.keys
            .borrow()
            .iter()
            .any(|(kind, key)| *kind == id.kind() && key.id == id.value())
    }

    pub fn len(&self) -> usize {
        self.keys.borrow().len()
    }
}

impl RemoteKeyRegistry for MemoryRegistry {
    fn list(&self, kind: KeyKind) -> Result<Vec<RemoteKey>> {
        self.list_calls.set(self.list_calls.get() + 1);
        if self.unreachable.borrow().contains(&kind) {
            return Err(KeyError::remote(format!("Failed to list {} keys", kind), "connection refused"));
        }
        Ok(self
            .keys
            .borrow()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, key)| key.clone())
            .collect())
    }

    fn register(&self, key: &NewKey) -> Result<Option<KeyId>> {
        self.register_calls.set(self.register_calls.get() + 1);
        let duplicate = self
            .keys
            .borrow()
            .iter()
            .any(|(kind, existing)| *kind == key.kind && existing.title == key.title);
        if self.reject_duplicates && duplicate {
            return Err(KeyError::Conflict {
                kind: key.kind,
                title: key.title.clone(),
            });
        }
        let id = self.insert(key.kind, &key.title, Some(Utc::now()));
        self.registered
            .borrow_mut()
            .insert(id.value().to_string(), key.clone());
        Ok(Some(id))
    }

    fn delete(&self, id: &KeyId) -> Result<()> {
        self.delete_calls.set(self.delete_calls.get() + 1);
        if self.broken.borrow().contains(id.value()) {
            return Err(KeyError::remote(format!("Failed to delete {}", id), "HTTP 500"));
        }
        let mut keys = self.keys.borrow_mut();
        let before = keys.len();
        keys.retain(|(kind, key)| !(*kind == id.kind() && key.id == id.value()));
        if keys.len() == before {
            return Err(KeyError::NotFound { id: id.clone() });
        }
        Ok(())
    }
}
