use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// One lock per configuration entry: rebuilds of the same entry run one at a time.
#[derive(Default)]
pub struct EntryLocks(Mutex<HashMap<String, Arc<Mutex<()>>>>);

impl EntryLocks {
    /// Wait for the entry's lock.
    pub async fn lock(&self, entry_id: &str) -> OwnedMutexGuard<()> {
        let mut locks = self.0.lock().await;
        let lock = locks.entry(entry_id.to_owned()).or_default().clone();
        drop(locks);
        lock.lock_owned().await
    }
}
