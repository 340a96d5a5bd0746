//! Short-lived conversation memory for the agent endpoints.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::types::Message;

/// Default number of `(user, assistant)` pairs kept per session.
pub const DEFAULT_MAX_PAIRS: usize = 12;
/// Default number of sessions kept before the least recently used is evicted.
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// Storage for per-session history.
///
/// Implementations must be safe to share across request handlers. Concurrent
/// turns on the same session may interleave; each `remember` call is atomic.
pub trait SessionStore: Send + Sync {
    /// Prior messages for `session_id`, oldest first, alternating user/assistant.
    fn history(&self, session_id: &str) -> Vec<Message>;

    /// Appends one completed turn, dropping the oldest pairs beyond the cap.
    fn remember(&self, session_id: &str, user: &str, assistant: &str);
}

/// Shared session store handle.
pub type DynSessionStore = Arc<dyn SessionStore>;

/// In-process store: an LRU map of sessions, each capped to `max_pairs` turns.
pub struct InMemorySessionStore {
    sessions: Mutex<LruCache<String, Vec<Message>>>,
    max_pairs: usize,
}

impl InMemorySessionStore {
    /// Zero values fall back to one session / one pair.
    pub fn new(max_pairs: usize, max_sessions: usize) -> Self {
        let capacity = NonZeroUsize::new(max_sessions).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: Mutex::new(LruCache::new(capacity)),
            max_pairs: max_pairs.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAIRS, DEFAULT_MAX_SESSIONS)
    }
}

impl SessionStore for InMemorySessionStore {
    fn history(&self, session_id: &str) -> Vec<Message> {
        self.sessions
            .lock()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    fn remember(&self, session_id: &str, user: &str, assistant: &str) {
        let mut sessions = self.sessions.lock();
        let limit = self.max_pairs * 2;
        let history = sessions.get_or_insert_mut(session_id.to_string(), Vec::new);
        history.push(Message::user(user));
        history.push(Message::assistant(assistant));
        if history.len() > limit {
            let excess = history.len() - limit;
            history.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn history_is_empty_for_unknown_sessions() {
        let store = InMemorySessionStore::default();
        assert!(store.history("nope").is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn turns_are_appended_in_order() {
        let store = InMemorySessionStore::default();
        store.remember("s1", "q1", "a1");
        store.remember("s1", "q2", "a2");
        let history = store.history("s1");
        assert_eq!(
            history,
            vec![
                Message::user("q1"),
                Message::assistant("a1"),
                Message::user("q2"),
                Message::assistant("a2"),
            ]
        );
    }

    #[test]
    fn oldest_pairs_are_dropped_past_the_cap() {
        let store = InMemorySessionStore::default();
        for turn in 1..=13 {
            store.remember("s1", &format!("q{turn}"), &format!("a{turn}"));
        }
        let history = store.history("s1");
        assert_eq!(history.len(), 24);
        assert_eq!(history[0], Message::user("q2"));
        assert_eq!(history[23], Message::assistant("a13"));
        assert!(history
            .chunks(2)
            .all(|pair| pair[0].role == Role::User && pair[1].role == Role::Assistant));
    }

    #[test]
    fn least_recently_used_session_is_evicted() {
        let store = InMemorySessionStore::new(2, 2);
        store.remember("a", "q", "r");
        store.remember("b", "q", "r");
        // Touch "a" so "b" becomes the eviction candidate.
        let _ = store.history("a");
        store.remember("c", "q", "r");
        assert_eq!(store.len(), 2);
        assert!(store.history("b").is_empty());
        assert_eq!(store.history("a").len(), 2);
    }
}
