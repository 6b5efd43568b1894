//! Merged view of SSH and GPG keys on the remote account

use std::cmp::Ordering;

use crate::error::Result;
use crate::keys::{KeyKind, KeyRecord};
use crate::registry::RemoteKeyRegistry;

/// Loads every key of both kinds from the remote registry
pub struct KeyInventory<'a> {
    registry: &'a dyn RemoteKeyRegistry,
}

impl<'a> KeyInventory<'a> {
    pub fn new(registry: &'a dyn RemoteKeyRegistry) -> Self {
        Self { registry }
    }

    /// All keys, managed or not, SSH listing first
    ///
    /// Fails as soon as either listing fails.
    pub fn load(&self) -> Result<Vec<KeyRecord>> {
        let mut records = Vec::new();
        for kind in KeyKind::ALL {
            let keys = self.registry.list(kind)?;
            tracing::debug!("Remote reported {} {} key(s)", keys.len(), kind);
            records.extend(keys.into_iter().map(|k| KeyRecord::from_remote(kind, k)));
        }
        Ok(records)
    }

    /// Managed keys in presentation order
    pub fn load_managed(&self) -> Result<Vec<KeyRecord>> {
        Ok(managed(self.load()?))
    }
}

/// Keep managed keys, oldest first, SSH before GPG on ties
///
/// Keys with no known creation time sort last.
pub fn managed(records: Vec<KeyRecord>) -> Vec<KeyRecord> {
    let mut managed: Vec<KeyRecord> = records.into_iter().filter(KeyRecord::is_managed).collect();
    managed.sort_by(presentation_order);
    managed
}

fn presentation_order(a: &KeyRecord, b: &KeyRecord) -> Ordering {
    let by_date = match (a.created_at, b.created_at) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_date
        .then_with(|| a.kind().cmp(&b.kind()))
        .then_with(|| a.title.cmp(&b.title))
}
