// Optimistic lock guard and modification timestamps.
//
// The client echoes the `modifiedAt` it last saw. An absent value skips the
// check entirely; a present one must equal the stored value exactly.
// Timestamps are kept at millisecond precision: that is what a JavaScript
// `Date` holds, so a browser that parses and re-serializes the value still
// echoes an equal token.

use chrono::{DateTime, Duration, SubsecRound, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDecision {
    Allow,
    Conflict,
}

pub fn check(stored: DateTime<Utc>, client_known: Option<DateTime<Utc>>) -> LockDecision {
    match client_known {
        None => LockDecision::Allow,
        Some(known) if known == stored => LockDecision::Allow,
        Some(_) => LockDecision::Conflict,
    }
}

pub fn truncate_to_millis(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp.trunc_subsecs(3)
}

/// The `modifiedAt` to store on a successful update. Always strictly after
/// `previous`, even when the wall clock has not advanced or went backwards.
pub fn next_modified_at(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = truncate_to_millis(now);
    if now > previous {
        now
    } else {
        truncate_to_millis(previous) + Duration::milliseconds(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn missing_client_timestamp_skips_the_check() {
        assert_eq!(check(ts("2025-01-01T00:00:00Z"), None), LockDecision::Allow);
    }

    #[test]
    fn equal_timestamps_allow() {
        let stored = ts("2025-01-01T00:00:00.123Z");
        assert_eq!(check(stored, Some(stored)), LockDecision::Allow);
    }

    #[test]
    fn older_and_newer_timestamps_both_conflict() {
        let stored = ts("2025-01-01T00:00:01Z");
        assert_eq!(check(stored, Some(ts("2025-01-01T00:00:00Z"))), LockDecision::Conflict);
        assert_eq!(check(stored, Some(ts("2025-01-01T00:00:02Z"))), LockDecision::Conflict);
    }

    #[test]
    fn truncation_keeps_milliseconds() {
        let precise = ts("2025-01-01T00:00:00.123456789Z");
        assert_eq!(truncate_to_millis(precise), ts("2025-01-01T00:00:00.123Z"));
    }

    #[test]
    fn issued_timestamps_survive_a_millisecond_round_trip() {
        let issued = next_modified_at(ts("2025-01-01T00:00:00Z"), ts("2025-01-01T00:00:05.879758Z"));
        let echoed = ts(&issued.to_rfc3339_opts(chrono::SecondsFormat::Millis, true));
        assert_eq!(check(issued, Some(echoed)), LockDecision::Allow);
    }

    #[test]
    fn next_modified_at_uses_clock_when_it_advanced() {
        let previous = ts("2025-01-01T00:00:00Z");
        let now = ts("2025-01-01T00:00:05.000000999Z");
        assert_eq!(next_modified_at(previous, now), ts("2025-01-01T00:00:05Z"));
    }

    #[test]
    fn next_modified_at_strictly_increases_when_clock_stalls() {
        let previous = ts("2025-01-01T00:00:05Z");
        assert_eq!(next_modified_at(previous, previous), ts("2025-01-01T00:00:05.001Z"));
        assert_eq!(
            next_modified_at(previous, ts("2025-01-01T00:00:00Z")),
            ts("2025-01-01T00:00:05.001Z")
        );
    }
}
