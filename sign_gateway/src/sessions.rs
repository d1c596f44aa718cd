//! Per-session class history store.
//!
//! The map lock only guards membership. Each session carries its own mutex,
//! so requests for different sessions never wait on each other's history
//! updates, while the append-then-vote sequence for one session is atomic.
//! Removal marks the entry retired under that same mutex; a request that
//! looked the entry up just before removal notices and starts over with a
//! fresh session.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Mutex, RwLock};

use crate::smoothing::{stabilize, ClassHistory};
use crate::types::{PredictionResult, StabilizedResult};

#[derive(Debug)]
struct SessionEntry {
    history: ClassHistory,
    last_updated: Instant,
    retired: bool,
}

impl SessionEntry {
    fn new(now: Instant) -> Self {
        Self {
            history: ClassHistory::new(),
            last_updated: now,
            retired: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<SessionEntry>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, session_id: &str, now: Instant) -> Arc<Mutex<SessionEntry>> {
        if let Some(entry) = self.sessions.read().get(session_id) {
            return Arc::clone(entry);
        }
        let mut sessions = self.sessions.write();
        Arc::clone(
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(SessionEntry::new(now)))),
        )
    }

    /// Appends the prediction to the session's history and applies the
    /// stabilization rule, creating the session if needed.
    pub fn record(
        &self,
        session_id: &str,
        prediction: PredictionResult,
        now: Instant,
    ) -> StabilizedResult {
        loop {
            let entry = self.entry(session_id, now);
            let mut session = entry.lock();
            if session.retired {
                continue;
            }
            session.history.push(prediction.class_index);
            session.last_updated = now;
            return stabilize(&session.history, prediction);
        }
    }

    /// Drops a session. Unknown ids are a no-op. Returns whether one existed.
    pub fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().remove(session_id);
        match removed {
            Some(entry) => {
                entry.lock().retired = true;
                true
            }
            None => false,
        }
    }

    /// Removes every session idle for longer than `ttl`. Returns the count.
    pub fn evict_stale(&self, now: Instant, ttl: Duration) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, entry| {
            let mut session = entry.lock();
            let stale = now.saturating_duration_since(session.last_updated) > ttl;
            if stale {
                session.retired = true;
            }
            !stale
        });
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn history_len(&self, session_id: &str) -> Option<usize> {
        self.sessions
            .read()
            .get(session_id)
            .map(|entry| entry.lock().history.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smoothing::HIST_SIZE;
    use std::thread;

    fn pred(class_index: usize) -> PredictionResult {
        PredictionResult {
            label: "b".into(),
            confidence: 0.9,
            class_index,
            raw_probabilities: vec![0.1, 0.9],
        }
    }

    #[test]
    fn test_sessions_are_isolated() {
        let store = SessionStore::new();
        let now = Instant::now();
        store.record("a", pred(1), now);
        store.record("a", pred(1), now);
        let r = store.record("b", pred(1), now);
        assert_eq!(r.history_length, 1);
        assert_eq!(store.history_len("a"), Some(2));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_history_capped() {
        let store = SessionStore::new();
        let now = Instant::now();
        for i in 0..20 {
            let r = store.record("s", pred(i % 3), now);
            assert!(r.history_length <= HIST_SIZE);
        }
        assert_eq!(store.history_len("s"), Some(HIST_SIZE));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = SessionStore::new();
        assert!(!store.remove("missing"));
        store.record("s", pred(0), Instant::now());
        assert!(store.remove("s"));
        assert!(!store.remove("s"));
        let r = store.record("s", pred(0), Instant::now());
        assert_eq!(r.history_length, 1);
    }

    #[test]
    fn test_evicts_only_stale_sessions() {
        let store = SessionStore::new();
        let t0 = Instant::now();
        let ttl = Duration::from_secs(300);
        store.record("old", pred(0), t0);
        store.record("fresh", pred(0), t0 + Duration::from_secs(200));

        assert_eq!(store.evict_stale(t0 + Duration::from_secs(300), ttl), 0);
        assert_eq!(store.evict_stale(t0 + Duration::from_secs(301), ttl), 1);
        assert_eq!(store.history_len("old"), None);
        assert_eq!(store.history_len("fresh"), Some(1));
    }

    #[test]
    fn test_concurrent_appends_same_session() {
        let store = Arc::new(SessionStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let r = store.record("shared", pred(t), Instant::now());
                        assert!(r.history_length >= 1 && r.history_length <= HIST_SIZE);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.history_len("shared"), Some(HIST_SIZE));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_records_survive_concurrent_removal() {
        let store = Arc::new(SessionStore::new());
        let writers: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..5_000 {
                        let r = store.record("k", pred(t), Instant::now());
                        assert!((1..=HIST_SIZE).contains(&r.history_length));
                    }
                })
            })
            .collect();
        let remover = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..5_000 {
                    store.remove("k");
                }
            })
        };
        let sweeper = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..500 {
                    store.evict_stale(Instant::now(), Duration::ZERO);
                }
            })
        };
        for h in writers {
            h.join().unwrap();
        }
        remover.join().unwrap();
        sweeper.join().unwrap();

        assert!(store.len() <= 1);
        let r = store.record("k", pred(0), Instant::now());
        assert!((1..=HIST_SIZE).contains(&r.history_length));
        assert_eq!(store.len(), 1);
    }
}
