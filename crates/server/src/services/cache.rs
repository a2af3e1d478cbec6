// Per-week snapshot cache: fast-path render while a fetch is in flight, and
// offline fallback when the store is unreachable. Entries are whole
// snapshots, replaced wholesale on every write; there is deliberately no
// merge path, because partial merges between stale and fresh snapshots are
// how block ids get mismatched.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::schedule::ScheduleSnapshot;

/// `None` caches the everyone-in-the-house snapshot; `Some(user)` caches a
/// single user's slice.
pub type CacheScope = Option<i64>;

#[derive(Clone, Default)]
pub struct WeekCache {
    entries: Arc<RwLock<HashMap<(String, CacheScope), ScheduleSnapshot>>>,
}

impl WeekCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advisory read: callers render this immediately but must still fetch
    /// and overwrite.
    pub async fn get(&self, week_key: &str, scope: CacheScope) -> Option<ScheduleSnapshot> {
        let entries = self.entries.read().await;
        entries.get(&(week_key.to_string(), scope)).cloned()
    }

    /// Full-replacement write-through after a successful fetch.
    pub async fn put(&self, week_key: &str, scope: CacheScope, snapshot: ScheduleSnapshot) {
        let mut entries = self.entries.write().await;
        entries.insert((week_key.to_string(), scope), snapshot);
    }

    /// Drop every scope's entry for a week after a mutation touched it.
    pub async fn invalidate_week(&self, week_key: &str) {
        let mut entries = self.entries.write().await;
        entries.retain(|(key, _), _| key != week_key);
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
