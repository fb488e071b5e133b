//! In-memory conversational state per session.
//!
//! Sessions live in a sharded concurrent map; each operation locks only the
//! shard holding its id, and never across model or database calls. There is
//! no persistence, so a restart forgets every session.
//!
//! Operations are atomic per call, not across calls. Two overlapping
//! requests for one session resolve `last_entity` by last writer wins.

use askdb_types::{history_text, Role, Turn};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct Session {
    turns: Vec<Turn>,
    last_entity: Option<String>,
    last_activity: DateTime<Utc>,
}

impl Session {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            turns: Vec::new(),
            last_entity: None,
            last_activity: now,
        }
    }

    /// Last activity never moves backwards.
    fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }
}

/// Point-in-time copy of one session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: String,
    pub turns: Vec<Turn>,
    pub last_entity: Option<String>,
    pub last_activity: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn history_text(&self) -> String {
        history_text(&self.turns)
    }
}

/// Thread-safe map from session id to conversational state.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the session, creating an empty one if needed.
    ///
    /// Every call counts as activity.
    pub fn get_or_create(&self, id: &str) -> SessionSnapshot {
        self.get_or_create_at(id, Utc::now())
    }

    pub fn get_or_create_at(&self, id: &str, now: DateTime<Utc>) -> SessionSnapshot {
        let mut entry = self.sessions.entry(id.to_string()).or_insert_with(|| {
            debug!(target: "askdb::session", "Creating session {}", id);
            Session::new(now)
        });
        entry.touch(now);
        SessionSnapshot {
            id: id.to_string(),
            turns: entry.turns.clone(),
            last_entity: entry.last_entity.clone(),
            last_activity: entry.last_activity,
        }
    }

    pub fn get_history(&self, id: &str) -> Vec<Turn> {
        self.get_or_create(id).turns
    }

    pub fn history_text(&self, id: &str) -> String {
        self.get_or_create(id).history_text()
    }

    pub fn get_last_entity(&self, id: &str) -> Option<String> {
        self.get_or_create(id).last_entity
    }

    /// Append a turn, creating the session lazily.
    pub fn append_turn(&self, id: &str, role: Role, content: &str) {
        let now = Utc::now();
        let mut entry = self
            .sessions
            .entry(id.to_string())
            .or_insert_with(|| Session::new(now));
        entry.touch(now);
        entry.turns.push(Turn {
            role,
            content: content.to_string(),
        });
    }

    /// Record the entity the conversation is about.
    ///
    /// Only applies to a live session; an evicted id is not brought back.
    /// Returns whether the session existed.
    pub fn set_last_entity(&self, id: &str, entity: &str) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut session) => {
                debug!(target: "askdb::session", "Session {} last entity -> {}", id, entity);
                session.last_entity = Some(entity.to_string());
                true
            }
            None => false,
        }
    }

    /// Evict sessions idle for longer than `timeout`.
    pub fn sweep(&self, timeout: Duration) -> usize {
        let timeout = chrono::Duration::from_std(timeout)
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        self.sweep_at(Utc::now(), timeout)
    }

    pub fn sweep_at(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> usize {
        let mut removed = 0usize;
        self.sessions.retain(|_, session| {
            let keep = now.signed_duration_since(session.last_activity) <= timeout;
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            info!(target: "askdb::session", "Removed {} expired sessions", removed);
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Forget every session. Used on shutdown.
    pub fn drain(&self) -> usize {
        let count = self.sessions.len();
        self.sessions.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let store = SessionStore::new();
        let first = store.get_or_create("s1");
        let second = store.get_or_create("s1");
        assert_eq!(store.len(), 1);
        assert!(second.last_activity >= first.last_activity);
        assert!(first.turns.is_empty());
        assert!(first.last_entity.is_none());
    }

    #[test]
    fn test_append_turn_creates_lazily_and_orders() {
        let store = SessionStore::new();
        store.append_turn("s1", Role::User, "show AB-123 orders");
        store.append_turn("s1", Role::Assistant, "Here are the results.");
        let history = store.get_history("s1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], Turn::user("show AB-123 orders"));
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(
            store.history_text("s1"),
            "show AB-123 orders\nHere are the results."
        );
    }

    #[test]
    fn test_set_last_entity_requires_existing_session() {
        let store = SessionStore::new();
        assert!(!store.set_last_entity("ghost", "AB-123"));
        assert!(!store.contains("ghost"));

        store.get_or_create("s1");
        assert!(store.set_last_entity("s1", "AB-123"));
        assert_eq!(store.get_last_entity("s1").as_deref(), Some("AB-123"));
    }

    #[test]
    fn test_last_activity_never_moves_backwards() {
        let store = SessionStore::new();
        let now = Utc::now();
        store.get_or_create_at("s1", now);
        let earlier = store.get_or_create_at("s1", now - chrono::Duration::seconds(30));
        assert_eq!(earlier.last_activity, now);
    }

    #[test]
    fn test_sweep_evicts_idle_sessions() {
        let store = SessionStore::new();
        let timeout = chrono::Duration::minutes(30);
        let epsilon = chrono::Duration::milliseconds(1);
        let t0 = Utc::now();

        store.get_or_create_at("idle", t0);
        store.get_or_create_at("recent", t0 + timeout - epsilon);

        let removed = store.sweep_at(t0 + timeout + epsilon, timeout);
        assert_eq!(removed, 1);
        assert!(!store.contains("idle"));
        assert!(store.contains("recent"));
    }

    #[test]
    fn test_evicted_session_is_forgotten() {
        let store = SessionStore::new();
        let t0 = Utc::now();
        store.get_or_create_at("s1", t0);
        store.set_last_entity("s1", "AB-123");
        store.sweep_at(t0 + chrono::Duration::hours(2), chrono::Duration::minutes(30));

        assert!(!store.set_last_entity("s1", "CD-456"));
        let fresh = store.get_or_create("s1");
        assert!(fresh.last_entity.is_none());
        assert!(fresh.turns.is_empty());
    }

    #[test]
    fn test_drain() {
        let store = SessionStore::new();
        store.get_or_create("a");
        store.get_or_create("b");
        assert_eq!(store.drain(), 2);
        assert!(store.is_empty());
    }

    // Not an invariant: overlapping writers to one session's entity race,
    // and whichever write lands last wins. Only the shape is checked.
    #[test]
    fn test_concurrent_entity_writes_last_writer_wins() {
        let store = Arc::new(SessionStore::new());
        store.get_or_create("shared");

        let handles: Vec<_> = ["AB-1", "CD-2", "EF-3", "GH-4"]
            .into_iter()
            .map(|entity| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.set_last_entity("shared", entity);
                        store.append_turn("shared", Role::User, entity);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = store.get_or_create("shared");
        assert_eq!(snapshot.turns.len(), 400);
        let entity = snapshot.last_entity.unwrap();
        assert!(["AB-1", "CD-2", "EF-3", "GH-4"].contains(&entity.as_str()));
    }
}
