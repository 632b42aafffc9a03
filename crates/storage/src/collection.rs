use std::{collections::BTreeMap, sync::Arc};

use bson::oid::ObjectId;
use eyre::{eyre, Result};
use model::session::Session;
use parking_lot::RwLock;

pub trait Record: Clone + Send + Sync + 'static {
    fn id(&self) -> ObjectId;
}

/// In-process table keyed by `_id`. Writes register their inverse in the
/// session journal, so an aborted transaction leaves the table untouched.
pub struct Collection<T> {
    name: &'static str,
    rows: Arc<RwLock<BTreeMap<ObjectId, T>>>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Collection {
            name: self.name,
            rows: self.rows.clone(),
        }
    }
}

impl<T: Record> Collection<T> {
    pub fn new(name: &'static str) -> Self {
        Collection {
            name,
            rows: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, id: ObjectId) -> Option<T> {
        self.rows.read().get(&id).cloned()
    }

    pub fn find_one(&self, filter: impl Fn(&T) -> bool) -> Option<T> {
        self.rows.read().values().find(|row| filter(row)).cloned()
    }

    pub fn find(&self, filter: impl Fn(&T) -> bool) -> Vec<T> {
        self.rows
            .read()
            .values()
            .filter(|row| filter(row))
            .cloned()
            .collect()
    }

    pub fn count(&self, filter: impl Fn(&T) -> bool) -> usize {
        self.rows.read().values().filter(|row| filter(row)).count()
    }

    pub fn insert(&self, session: &mut Session, row: T) -> Result<()> {
        let id = row.id();
        {
            let mut rows = self.rows.write();
            if rows.contains_key(&id) {
                return Err(eyre!("Duplicate key {} in {}", id, self.name));
            }
            rows.insert(id, row);
        }
        let rows = self.rows.clone();
        session.on_abort(move || {
            rows.write().remove(&id);
        });
        Ok(())
    }

    /// Applies `update` to the row and returns the updated copy, or `None`
    /// when there is no row with that id.
    pub fn update(
        &self,
        session: &mut Session,
        id: ObjectId,
        update: impl FnOnce(&mut T),
    ) -> Result<Option<T>> {
        let (previous, current) = {
            let mut rows = self.rows.write();
            let Some(row) = rows.get_mut(&id) else {
                return Ok(None);
            };
            let previous = row.clone();
            update(row);
            if row.id() != id {
                *row = previous;
                return Err(eyre!("Update must not change the key of {}", self.name));
            }
            (previous, row.clone())
        };
        let rows = self.rows.clone();
        session.on_abort(move || {
            rows.write().insert(id, previous);
        });
        Ok(Some(current))
    }

    pub fn delete(&self, session: &mut Session, id: ObjectId) -> Result<Option<T>> {
        let removed = self.rows.write().remove(&id);
        if let Some(row) = removed.clone() {
            let rows = self.rows.clone();
            session.on_abort(move || {
                rows.write().insert(id, row);
            });
        }
        Ok(removed)
    }
}
