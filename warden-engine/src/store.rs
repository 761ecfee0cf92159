//! Push persistence seam.
//!
//! The engine only ever talks to a [`PushStore`]; writes are last-write-wins
//! upserts keyed by push id. [`MemoryStore`] is the in-process
//! implementation used by tests and embedders without a database.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::action::Action;
use crate::error::Error;

/// Filter for listing persisted pushes. `None` fields match anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct PushQuery {
    pub error: Option<bool>,
    pub blocked: Option<bool>,
    pub allow_push: Option<bool>,
    pub authorised: Option<bool>,
}

impl PushQuery {
    fn matches(&self, action: &Action) -> bool {
        self.error.map_or(true, |v| action.error == v)
            && self.blocked.map_or(true, |v| action.blocked == v)
            && self.allow_push.map_or(true, |v| action.allow_push == v)
            && self.authorised.map_or(true, |v| action.authorised == v)
    }
}

/// Storage for push records and their audit trail.
pub trait PushStore: Send + Sync {
    /// Fetch one push by id.
    fn get_push(&self, id: &str) -> Result<Option<Action>, Error>;

    /// List pushes matching the query.
    fn get_pushes(&self, query: &PushQuery) -> Result<Vec<Action>, Error>;

    /// Upsert the full record under its push id. Records without an id are
    /// rejected rather than silently keyed on the empty string.
    fn write_audit(&self, action: &Action) -> Result<(), Error>;

    /// Remove one push record. Removing an unknown id is not an error.
    fn delete_push(&self, id: &str) -> Result<(), Error>;
}

/// In-memory [`PushStore`] backed by a mutex-guarded map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<BTreeMap<String, Action>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Action>>, Error> {
        self.inner
            .lock()
            .map_err(|_| Error::Internal("push store lock poisoned".into()))
    }
}

impl PushStore for MemoryStore {
    fn get_push(&self, id: &str) -> Result<Option<Action>, Error> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn get_pushes(&self, query: &PushQuery) -> Result<Vec<Action>, Error> {
        Ok(self
            .lock()?
            .values()
            .filter(|action| query.matches(action))
            .cloned()
            .collect())
    }

    fn write_audit(&self, action: &Action) -> Result<(), Error> {
        if action.id.is_empty() {
            return Err(Error::Internal("audit record has no push id".into()));
        }
        self.lock()?.insert(action.id.clone(), action.clone());
        Ok(())
    }

    fn delete_push(&self, id: &str) -> Result<(), Error> {
        self.lock()?.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;
    use pretty_assertions::assert_eq;

    fn push(id: &str, blocked: bool) -> Action {
        let mut action = Action::new(ActionKind::Push, "org/repo", "url");
        action.id = id.to_owned();
        action.blocked = blocked;
        action
    }

    #[test]
    fn upsert_is_last_write_wins() {
        let store = MemoryStore::new();
        store.write_audit(&push("a__b", false)).unwrap();
        store.write_audit(&push("a__b", true)).unwrap();
        let loaded = store.get_push("a__b").unwrap().unwrap();
        assert!(loaded.blocked);
    }

    #[test]
    fn empty_id_is_rejected() {
        let store = MemoryStore::new();
        let err = store.write_audit(&push("", false)).unwrap_err();
        assert_eq!(err.kind(), crate::error::Kind::Internal);
    }

    #[test]
    fn queries_filter_on_flags() {
        let store = MemoryStore::new();
        store.write_audit(&push("a__b", true)).unwrap();
        store.write_audit(&push("c__d", false)).unwrap();
        let blocked = store
            .get_pushes(&PushQuery {
                blocked: Some(true),
                ..PushQuery::default()
            })
            .unwrap();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].id, "a__b");
        assert_eq!(store.get_pushes(&PushQuery::default()).unwrap().len(), 2);
    }

    #[test]
    fn deleting_an_unknown_id_is_fine() {
        let store = MemoryStore::new();
        store.delete_push("missing").unwrap();
    }
}
