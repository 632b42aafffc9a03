use std::sync::Arc;

use eyre::{bail, Result};
use log::warn;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Undo = Box<dyn FnOnce() + Send>;

/// Store session. Writes performed while a transaction is open are journaled
/// and rolled back on abort; the transaction holds the database-wide writer
/// lock until it commits or aborts.
pub struct Session {
    lock: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    journal: Vec<Undo>,
}

impl Session {
    pub fn new(lock: Arc<Mutex<()>>) -> Self {
        Session {
            lock,
            guard: None,
            journal: Vec::new(),
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.guard.is_some()
    }

    pub async fn start_transaction(&mut self) -> Result<()> {
        if self.in_transaction() {
            bail!("Transaction already in progress");
        }
        let guard = self.lock.clone().lock_owned().await;
        self.journal.clear();
        self.guard = Some(guard);
        Ok(())
    }

    pub async fn commit_transaction(&mut self) -> Result<()> {
        if !self.in_transaction() {
            bail!("No transaction started");
        }
        self.journal.clear();
        self.guard = None;
        Ok(())
    }

    pub async fn abort_transaction(&mut self) -> Result<()> {
        if !self.in_transaction() {
            bail!("No transaction started");
        }
        self.rollback();
        Ok(())
    }

    /// Registers the inverse of a write. Outside a transaction writes are final.
    pub fn on_abort(&mut self, undo: impl FnOnce() + Send + 'static) {
        if self.in_transaction() {
            self.journal.push(Box::new(undo));
        }
    }

    /// Marks the current journal position for [`Session::rollback_to`].
    pub fn savepoint(&self) -> usize {
        self.journal.len()
    }

    /// Undoes writes made after `savepoint`, keeping the transaction open.
    pub fn rollback_to(&mut self, savepoint: usize) {
        while self.journal.len() > savepoint {
            if let Some(undo) = self.journal.pop() {
                undo();
            }
        }
    }

    fn rollback(&mut self) {
        while let Some(undo) = self.journal.pop() {
            undo();
        }
        self.guard = None;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.in_transaction() {
            warn!("Session dropped inside a transaction, rolling back");
            self.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_abort_runs_journal_in_reverse() {
        let lock = Arc::new(Mutex::new(()));
        let mut session = Session::new(lock);
        let value = Arc::new(AtomicU32::new(0));

        session.start_transaction().await.unwrap();
        let v = value.clone();
        session.on_abort(move || {
            assert_eq!(v.load(Ordering::SeqCst), 2);
            v.store(1, Ordering::SeqCst);
        });
        let v = value.clone();
        session.on_abort(move || v.store(2, Ordering::SeqCst));
        session.abort_transaction().await.unwrap();

        assert_eq!(value.load(Ordering::SeqCst), 1);
        assert!(!session.in_transaction());
    }

    #[tokio::test]
    async fn test_rollback_to_savepoint() {
        let lock = Arc::new(Mutex::new(()));
        let mut session = Session::new(lock);
        let value = Arc::new(AtomicU32::new(0));

        session.start_transaction().await.unwrap();
        let v = value.clone();
        session.on_abort(move || v.store(100, Ordering::SeqCst));
        let savepoint = session.savepoint();
        let v = value.clone();
        session.on_abort(move || v.store(7, Ordering::SeqCst));
        session.rollback_to(savepoint);
        assert_eq!(value.load(Ordering::SeqCst), 7);
        assert!(session.in_transaction());

        session.commit_transaction().await.unwrap();
        assert_eq!(value.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn test_nested_transaction_is_rejected() {
        let lock = Arc::new(Mutex::new(()));
        let mut session = Session::new(lock);
        session.start_transaction().await.unwrap();
        assert!(session.start_transaction().await.is_err());
        session.commit_transaction().await.unwrap();
        assert!(session.commit_transaction().await.is_err());
    }

    #[tokio::test]
    async fn test_commit_releases_lock() {
        let lock = Arc::new(Mutex::new(()));
        let mut first = Session::new(lock.clone());
        let mut second = Session::new(lock);
        first.start_transaction().await.unwrap();
        first.commit_transaction().await.unwrap();
        second.start_transaction().await.unwrap();
        second.commit_transaction().await.unwrap();
    }
}
