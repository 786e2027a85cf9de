use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Change-notification hub for locally replicated tables.
///
/// Writers call [`TableWatcher::notify`] with the tables a commit touched;
/// every subscription registered for one of those tables runs its callback.
/// Callbacks receive no delta: they are expected to re-query and derive a
/// full snapshot, which keeps handlers idempotent under duplicated or
/// out-of-order notifications.
pub struct TableWatcher {
    next_id: AtomicU64,
    subs: Mutex<Vec<Subscription>>,
}

struct Subscription {
    id: u64,
    tables: BTreeSet<String>,
    callback: Arc<dyn Fn() + Send + Sync>,
}

impl TableWatcher {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subs: Mutex::new(Vec::new()),
        }
    }

    pub fn watch(&self, tables: &[&str], callback: impl Fn() + Send + Sync + 'static) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subs = self.subs.lock().unwrap_or_else(|e| e.into_inner());
        subs.push(Subscription {
            id,
            tables: tables.iter().map(|t| t.to_string()).collect(),
            callback: Arc::new(callback),
        });
        id
    }

    pub fn unwatch(&self, id: u64) {
        let mut subs = self.subs.lock().unwrap_or_else(|e| e.into_inner());
        subs.retain(|s| s.id != id);
    }

    pub fn notify(&self, tables: &[&str]) {
        // Clone the matching callbacks out of the lock before running them;
        // a callback may itself register or remove subscriptions.
        let matched: Vec<Arc<dyn Fn() + Send + Sync>> = {
            let subs = self.subs.lock().unwrap_or_else(|e| e.into_inner());
            subs.iter()
                .filter(|s| tables.iter().any(|t| s.tables.contains(*t)))
                .map(|s| Arc::clone(&s.callback))
                .collect()
        };
        for callback in matched {
            callback();
        }
    }
}

impl Default for TableWatcher {
    fn default() -> Self {
        Self::new()
    }
}
