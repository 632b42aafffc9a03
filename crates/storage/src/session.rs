use std::sync::Arc;

use model::session::Session;
use tokio::sync::Mutex;

/// Process-wide handle of the store. All transactions share one writer lock.
#[derive(Clone, Default)]
pub struct Db {
    tx_lock: Arc<Mutex<()>>,
}

impl Db {
    pub(crate) fn new() -> Self {
        Db::default()
    }

    pub async fn start_session(&self) -> Session {
        Session::new(self.tx_lock.clone())
    }
}
