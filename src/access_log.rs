//! Bounded in-memory history of proxied fetches, served by `/api/logs`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Entries kept before the oldest is evicted.
pub const DEFAULT_CAPACITY: usize = 1000;

/// One proxied upstream fetch, as recorded after the response arrived.
#[derive(Debug, Clone, Serialize)]
pub struct AccessEntry {
    pub time: DateTime<Utc>,
    /// Client address as reported by X-Forwarded-For, when present.
    pub ip: Option<String>,
    pub method: String,
    pub status: u16,
    pub url: String,
    pub duration_ms: u64,
}

/// Shared ring buffer of recent [`AccessEntry`] values. Cloning is cheap and
/// all clones observe the same history.
#[derive(Debug, Clone)]
pub struct AccessLog {
    entries: Arc<Mutex<VecDeque<AccessEntry>>>,
    capacity: usize,
}

impl AccessLog {
    pub fn new(capacity: usize) -> Self {
        AccessLog {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Appends an entry, evicting the oldest once the buffer is full.
    pub fn push(&self, entry: AccessEntry) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Copy of the current history, oldest first.
    pub fn snapshot(&self) -> Vec<AccessEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AccessLog {
    fn default() -> Self {
        AccessLog::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str) -> AccessEntry {
        AccessEntry {
            time: Utc::now(),
            ip: Some("203.0.113.9".to_string()),
            method: "GET".to_string(),
            status: 200,
            url: url.to_string(),
            duration_ms: 12,
        }
    }

    #[test]
    fn test_push_and_snapshot() {
        let log = AccessLog::new(10);
        assert!(log.is_empty());
        log.push(entry("https://a.example/one"));
        log.push(entry("https://a.example/two"));
        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].url, "https://a.example/one");
        assert_eq!(snapshot[1].url, "https://a.example/two");
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let log = AccessLog::new(3);
        for i in 0..5 {
            log.push(entry(&format!("https://a.example/{}", i)));
        }
        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].url, "https://a.example/2");
        assert_eq!(snapshot[2].url, "https://a.example/4");
    }

    #[test]
    fn test_clones_share_history() {
        let log = AccessLog::new(10);
        let other = log.clone();
        log.push(entry("https://a.example/"));
        assert_eq!(other.len(), 1);
    }
}
