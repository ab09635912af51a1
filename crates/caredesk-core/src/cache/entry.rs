use chrono::{DateTime, Duration, Utc};

/// Freshness check shared by every namespace.
///
/// An entry is fresh while its age is strictly below the TTL. A timestamp in
/// the future (clock skew) counts as fresh.
pub fn is_stale(fetched_at: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    now - fetched_at >= ttl
}

/// A cached value for one (resource, team) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    /// An entry that was just confirmed by the server.
    pub fn fresh(value: T) -> Self {
        Self {
            value,
            fetched_at: Utc::now(),
        }
    }

    /// An entry the server has never confirmed, so the next read refetches.
    pub fn unconfirmed(value: T) -> Self {
        Self {
            value,
            fetched_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    pub fn is_stale(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        is_stale(self.fetched_at, ttl, now)
    }

    /// Push the entry past any TTL without touching the value.
    pub fn invalidate(&mut self) {
        self.fetched_at = DateTime::<Utc>::UNIX_EPOCH;
    }

    pub fn is_invalidated(&self) -> bool {
        self.fetched_at == DateTime::<Utc>::UNIX_EPOCH
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.fetched_at).num_minutes()
    }

    /// "just now", "5m ago", "2h ago", "1d ago". Hours and days round half
    /// up; a timestamp in the future reads as "just now".
    pub fn age_display(&self) -> String {
        const HOUR: i64 = 60;
        const DAY: i64 = 24 * HOUR;

        if self.is_invalidated() {
            return "invalidated".to_string();
        }

        match self.age_minutes() {
            m if m < 1 => "just now".to_string(),
            m if m < HOUR => format!("{}m ago", m),
            m if m < DAY => format!("{}h ago", round_half_up(m, HOUR)),
            m => format!("{}d ago", round_half_up(m, DAY)),
        }
    }
}

fn round_half_up(minutes: i64, unit: i64) -> i64 {
    (minutes + unit / 2) / unit
}
