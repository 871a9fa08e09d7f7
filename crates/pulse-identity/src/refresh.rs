//! When to refresh the cached ID token, and how hard to retry.

use crate::store::StoredSession;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Refresh schedule for [`crate::FirebaseIdentityClient`].
///
/// Only transient failures are retried. A rejected refresh token ends the
/// session immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Total attempts per refresh, including the first.
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Tokens are refreshed this long before their stated expiry.
    pub expiry_margin: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            expiry_margin: Duration::from_secs(60),
        }
    }
}

impl RefreshPolicy {
    /// Sleep before the attempt following failed attempt `attempt`
    /// (0-indexed). `None` once the attempts are used up.
    pub fn backoff_after(&self, attempt: u32) -> Option<Duration> {
        if attempt.saturating_add(1) >= self.attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt);
        Some(self.base_delay.saturating_mul(factor).min(self.max_delay))
    }

    /// True when the session's ID token is inside the expiry margin.
    pub fn needs_refresh(&self, session: &StoredSession, now: DateTime<Utc>) -> bool {
        chrono::Duration::from_std(self.expiry_margin)
            .ok()
            .and_then(|margin| session.expires_at.checked_sub_signed(margin))
            .map_or(true, |refresh_at| refresh_at <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_expiring_in(now: DateTime<Utc>, secs: i64) -> StoredSession {
        StoredSession {
            uid: "uid-1".to_string(),
            email: None,
            id_token: "id".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: now + chrono::Duration::seconds(secs),
        }
    }

    #[test]
    fn test_backoff_doubles_until_capped() {
        let policy = RefreshPolicy {
            attempts: 6,
            ..RefreshPolicy::default()
        };
        let delays: Vec<_> = (0..6).map(|a| policy.backoff_after(a)).collect();

        assert_eq!(
            delays,
            vec![
                Some(Duration::from_millis(500)),
                Some(Duration::from_millis(1000)),
                Some(Duration::from_millis(2000)),
                Some(Duration::from_millis(4000)),
                Some(Duration::from_millis(5000)),
                None,
            ]
        );
    }

    #[test]
    fn test_no_backoff_after_last_attempt() {
        let policy = RefreshPolicy::default();
        assert!(policy.backoff_after(1).is_some());
        assert_eq!(policy.backoff_after(2), None);

        let single = RefreshPolicy {
            attempts: 1,
            ..RefreshPolicy::default()
        };
        assert_eq!(single.backoff_after(0), None);
    }

    #[test]
    fn test_needs_refresh_inside_margin() {
        let now = Utc::now();
        let policy = RefreshPolicy::default();

        assert!(!policy.needs_refresh(&session_expiring_in(now, 120), now));
        assert!(policy.needs_refresh(&session_expiring_in(now, 30), now));
        assert!(policy.needs_refresh(&session_expiring_in(now, -5), now));

        let no_margin = RefreshPolicy {
            expiry_margin: Duration::ZERO,
            ..RefreshPolicy::default()
        };
        assert!(!no_margin.needs_refresh(&session_expiring_in(now, 30), now));
    }
}
