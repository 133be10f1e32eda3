use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::connection::ConnHandle;

/// `topic -> {connection}` registry, owned by the [`crate::server::Server`]
/// (not a process-wide singleton). Stores opaque [`ConnHandle`]s rather
/// than connections themselves — the registry never extends a
/// connection's lifetime; a closed connection's handle simply stops
/// resolving in the owning arena, and fan-out skips it.
#[derive(Default)]
pub struct TopicManager {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    topics: HashMap<String, HashSet<ConnHandle>>,
    by_conn: HashMap<ConnHandle, HashSet<String>>,
}

impl TopicManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: subscribing twice to the same `(topic, conn)` pair is a
    /// no-op the second time.
    pub fn add_topic(&self, topic: &str, conn: ConnHandle) {
        let mut inner = self.inner.lock();
        inner.topics.entry(topic.to_string()).or_default().insert(conn);
        inner.by_conn.entry(conn).or_default().insert(topic.to_string());
    }

    /// Removes one `(topic, conn)` pair. No-op if absent.
    pub fn remove_topic(&self, topic: &str, conn: ConnHandle) {
        let mut inner = self.inner.lock();
        if let Some(set) = inner.topics.get_mut(topic) {
            set.remove(&conn);
            if set.is_empty() {
                inner.topics.remove(topic);
            }
        }
        if let Some(set) = inner.by_conn.get_mut(&conn) {
            set.remove(topic);
            if set.is_empty() {
                inner.by_conn.remove(&conn);
            }
        }
    }

    /// Removes every `(topic, conn)` pair for `conn`. Called on connection
    /// teardown for any connection that was ever subscriber-tainted.
    pub fn remove_all_topic(&self, conn: ConnHandle) {
        let mut inner = self.inner.lock();
        let Some(topics) = inner.by_conn.remove(&conn) else { return };
        for topic in topics {
            if let Some(set) = inner.topics.get_mut(&topic) {
                set.remove(&conn);
                if set.is_empty() {
                    inner.topics.remove(&topic);
                }
            }
        }
    }

    /// Snapshot of the current subscriber set for `topic`, copied out from
    /// under the lock so fan-out I/O never happens while holding it.
    pub fn get_connections(&self, topic: &str) -> Vec<ConnHandle> {
        self.inner.lock().topics.get(topic).map(|s| s.iter().copied().collect()).unwrap_or_default()
    }

    /// Topics this connection currently occupies (used to resubscribe a
    /// client-visible mirror, or for diagnostics).
    pub fn topics_for(&self, conn: ConnHandle) -> Vec<String> {
        self.inner.lock().by_conn.get(&conn).map(|s| s.iter().cloned().collect()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(i: u64) -> ConnHandle {
        // Build distinct handles through a throwaway arena — ConnHandle has
        // no public constructor by design.
        let mut arena: slotmap::SlotMap<ConnHandle, ()> = slotmap::SlotMap::with_key();
        let mut last = arena.insert(());
        for _ in 0..i {
            last = arena.insert(());
        }
        last
    }

    #[test]
    fn subscribe_is_idempotent() {
        let mgr = TopicManager::new();
        let c = handle(0);
        mgr.add_topic("weather", c);
        mgr.add_topic("weather", c);
        assert_eq!(mgr.get_connections("weather").len(), 1);
    }

    #[test]
    fn remove_all_topic_clears_every_subscription() {
        let mgr = TopicManager::new();
        let c = handle(1);
        mgr.add_topic("weather", c);
        mgr.add_topic("news", c);
        mgr.remove_all_topic(c);
        assert!(mgr.get_connections("weather").is_empty());
        assert!(mgr.get_connections("news").is_empty());
    }

    #[test]
    fn unsubscribe_single_topic() {
        let mgr = TopicManager::new();
        let c = handle(2);
        mgr.add_topic("news", c);
        mgr.remove_topic("news", c);
        assert!(mgr.get_connections("news").is_empty());
    }
}
