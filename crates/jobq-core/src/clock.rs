//! Wall-clock timestamps and retry backoff.
//!
//! Timestamps are fixed-width RFC 3339 UTC strings
//! (`2026-08-02T12:34:56.123456Z`), so `<=` on the raw strings is
//! equivalent to `<=` on the instants they denote. Every comparison in
//! the claim predicate relies on this.

use chrono::{Duration, Utc};

const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Retry delays are capped at one year so they stay addable to any timestamp.
const MAX_DELAY_SECS: i64 = 31_536_000;

pub fn now() -> String {
    Utc::now().format(TS_FORMAT).to_string()
}

/// Current time shifted by `secs` (negative values shift into the past).
pub fn now_plus(secs: i64) -> String {
    (Utc::now() + Duration::seconds(secs.clamp(-MAX_DELAY_SECS, MAX_DELAY_SECS)))
        .format(TS_FORMAT)
        .to_string()
}

/// A null timestamp means "immediately due".
pub fn is_due(t: Option<&str>, now: &str) -> bool {
    match t {
        None => true,
        Some(t) => t <= now,
    }
}

/// `base^attempts` seconds.
pub fn backoff_delay(base: i64, attempts: i64) -> i64 {
    let exp = attempts.clamp(0, 62) as u32;
    base.max(1).saturating_pow(exp).min(MAX_DELAY_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_fixed_width_and_ordered() {
        let a = now();
        let b = now_plus(5);
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert!(a.ends_with('Z'));
    }

    #[test]
    fn shifting_into_the_past() {
        let past = now_plus(-10);
        assert!(past < now());
    }

    #[test]
    fn due_semantics() {
        let t = now();
        assert!(is_due(None, &t));
        assert!(is_due(Some(&now_plus(-1)), &t));
        assert!(!is_due(Some(&now_plus(60)), &t));
        // boundary: t <= now counts as due
        assert!(is_due(Some(&t), &t));
    }

    #[test]
    fn backoff_grows_exponentially() {
        assert_eq!(backoff_delay(2, 0), 1);
        assert_eq!(backoff_delay(2, 1), 2);
        assert_eq!(backoff_delay(2, 3), 8);
        assert_eq!(backoff_delay(3, 2), 9);
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        assert_eq!(backoff_delay(2, 1_000), MAX_DELAY_SECS);
        // degenerate bases still yield a positive delay
        assert_eq!(backoff_delay(0, 5), 1);
        assert_eq!(backoff_delay(-3, 5), 1);
    }
}
