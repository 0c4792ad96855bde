//! Short-term memory of recently corrected events.
//!
//! Prevents re-entrant timestamp corrections within a cooldown window. This
//! is the only shared mutable map in the process: mutex-guarded, bounded by
//! its TTL.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

pub struct CorrectionCache {
    inner: Mutex<HashMap<i64, Instant>>,
    ttl: Duration,
}

impl Default for CorrectionCache {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }
}

impl CorrectionCache {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Record a correction for this event; expires after the TTL.
    pub fn note(&self, event_id: i64) {
        let mut map = self.inner.lock();
        let now = Instant::now();
        map.retain(|_, expires| *expires > now);
        map.insert(event_id, now + self.ttl);
    }

    /// True while the event is inside the cooldown window.
    pub fn recently_corrected(&self, event_id: i64) -> bool {
        let mut map = self.inner.lock();
        match map.get(&event_id) {
            Some(expires) if *expires > Instant::now() => true,
            Some(_) => {
                map.remove(&event_id);
                false
            }
            None => false,
        }
    }
}
