//! Human time-period strings (`24h`, `2d`, `1w`).

use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::{HealthError, HealthResult};

const HOUR_SECS: u64 = 60 * 60;

fn period_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)([hdw])$").expect("static period regex"))
}

/// Parse `<digits><h|d|w>` (case-insensitive) into a duration.
///
/// The empty string means "no time filter" and yields [`Duration::ZERO`].
pub fn parse_time_period(period: &str) -> HealthResult<Duration> {
    if period.is_empty() {
        return Ok(Duration::ZERO);
    }

    let invalid = || HealthError::InvalidTimePeriod {
        input: period.to_string(),
    };

    let lowered = period.to_lowercase();
    let caps = period_regex().captures(&lowered).ok_or_else(invalid)?;

    let value: u64 = caps[1].parse().map_err(|_| invalid())?;
    let unit_hours = match &caps[2] {
        "h" => 1,
        "d" => 24,
        "w" => 24 * 7,
        _ => return Err(invalid()),
    };

    value
        .checked_mul(unit_hours * HOUR_SECS)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}

/// Oldest instant still inside `period` counted back from `now`.
///
/// `None` when the period is zero or reaches past the representable range,
/// both of which mean "no lower bound".
pub fn cutoff(period: Duration, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if period.is_zero() {
        return None;
    }
    chrono::Duration::from_std(period)
        .ok()
        .and_then(|d| now.checked_sub_signed(d))
}

/// Parse an RFC 3339 timestamp as emitted by prow.
pub fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Whether `timestamp` falls inside `period` before `now`.
///
/// A zero period, a missing timestamp and an unparsable timestamp all count
/// as inside.
pub fn is_within_time_period(
    timestamp: Option<&str>,
    period: Duration,
    now: DateTime<Utc>,
) -> bool {
    let Some(cutoff) = cutoff(period, now) else {
        return true;
    };
    match timestamp.and_then(parse_timestamp) {
        Some(ts) => ts >= cutoff,
        None => true,
    }
}
