//! Parsing utilities for durations and one-shot instants.

use std::time::Duration;

use chrono::{DateTime, Days, Local, NaiveDateTime, NaiveTime, TimeZone, Utc};

use crate::error::{Error, Result};

/// Parse a human-friendly duration string.
///
/// Supported suffixes: `s` (seconds), `m` (minutes), `h` (hours), `d` (days).
/// Examples: `"30s"`, `"5m"`, `"2h"`, `"1d"`.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::invalid_schedule("empty duration string"));
    }

    let (num_str, suffix) = match input.find(|c: char| c.is_alphabetic()) {
        Some(i) => (&input[..i], &input[i..]),
        None => {
            return Err(Error::invalid_schedule(format!(
                "duration missing unit suffix (s/m/h/d): {input}"
            )));
        }
    };

    let value: u64 = num_str
        .parse()
        .map_err(|_| Error::invalid_schedule(format!("invalid number in duration: {num_str}")))?;
    if value == 0 {
        return Err(Error::invalid_schedule("duration must be > 0"));
    }

    let secs = match suffix {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3_600,
        "d" => value * 86_400,
        _ => {
            return Err(Error::invalid_schedule(format!(
                "unknown duration suffix: {suffix} (expected s/m/h/d)"
            )));
        }
    };

    Ok(Duration::from_secs(secs))
}

/// Resolve a one-shot time string to a UTC instant.
///
/// Formats are tried strictly in order: bare Unix-epoch seconds (all digits,
/// at least 10 of them), RFC 3339, `YYYY-MM-DDTHH:MM:SS` (local),
/// `YYYY-MM-DD HH:MM` (local), and bare `HH:MM` — today if that time is
/// still ahead of `now`, otherwise tomorrow, in local time.
///
/// `now` is a parameter so the calendar arithmetic is testable; production
/// callers pass `Local::now()`.
pub fn parse_one_shot_time(input: &str, now: DateTime<Local>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::invalid_schedule("empty one-shot time"));
    }

    if input.len() >= 10 && input.bytes().all(|b| b.is_ascii_digit()) {
        let secs: i64 = input
            .parse()
            .map_err(|_| Error::invalid_schedule(format!("epoch seconds out of range: {input}")))?;
        return DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| Error::invalid_schedule(format!("epoch seconds out of range: {input}")));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S") {
        return local_to_utc(naive, now);
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M") {
        return local_to_utc(naive, now);
    }

    if let Ok(time) = NaiveTime::parse_from_str(input, "%H:%M") {
        let mut date = now.date_naive();
        if date.and_time(time) <= now.naive_local() {
            date = date
                .checked_add_days(Days::new(1))
                .ok_or_else(|| Error::invalid_schedule("date out of range"))?;
        }
        return local_to_utc(date.and_time(time), now);
    }

    Err(Error::invalid_schedule(format!(
        "unrecognized one-shot time: {input}"
    )))
}

fn local_to_utc(naive: NaiveDateTime, now: DateTime<Local>) -> Result<DateTime<Utc>> {
    now.timezone()
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| Error::invalid_schedule(format!("time does not exist locally: {naive}")))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    /// Build a `DateTime<Local>` from a wall-clock reading, whatever the
    /// test machine's timezone is.
    fn local_now(naive: &str) -> DateTime<Local> {
        let naive = NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S").unwrap();
        Local.from_local_datetime(&naive).earliest().unwrap()
    }

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_minutes() {
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
    }

    #[test]
    fn test_parse_hours() {
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7_200));
    }

    #[test]
    fn test_parse_days() {
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("100").is_err());
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("10x").is_err());
    }

    #[test]
    fn test_epoch_seconds() {
        let dt = parse_one_shot_time("1700000000", Local::now()).unwrap();
        assert_eq!(dt, DateTime::from_timestamp(1_700_000_000, 0).unwrap());
    }

    #[test]
    fn test_short_digit_run_is_not_epoch() {
        // Nine digits falls through every format and is rejected, not
        // misread as an epoch.
        assert!(parse_one_shot_time("170000000", Local::now()).is_err());
    }

    #[test]
    fn test_rfc3339() {
        let dt = parse_one_shot_time("2026-01-12T18:00:00+01:00", Local::now()).unwrap();
        assert_eq!(dt, "2026-01-12T17:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[test]
    fn test_naive_datetime_is_local() {
        let now = Local::now();
        let dt = parse_one_shot_time("2026-01-12T18:00:00", now).unwrap();
        let expected = Local
            .from_local_datetime(
                &NaiveDateTime::parse_from_str("2026-01-12T18:00:00", "%Y-%m-%dT%H:%M:%S").unwrap(),
            )
            .earliest()
            .unwrap();
        assert_eq!(dt, expected.with_timezone(&Utc));
    }

    #[test]
    fn test_date_space_time_format() {
        let now = Local::now();
        let a = parse_one_shot_time("2026-01-12 18:00", now).unwrap();
        let b = parse_one_shot_time("2026-01-12T18:00:00", now).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_bare_time_still_ahead_resolves_today() {
        let now = local_now("2026-01-12T10:00:00");
        let dt = parse_one_shot_time("15:04", now).unwrap();
        let local = dt.with_timezone(&Local);
        assert_eq!(local.date_naive(), now.date_naive());
        assert_eq!(local.time(), NaiveTime::parse_from_str("15:04", "%H:%M").unwrap());
    }

    #[test]
    fn test_bare_time_already_past_resolves_tomorrow() {
        let now = local_now("2026-01-12T16:30:00");
        let dt = parse_one_shot_time("15:04", now).unwrap();
        let local = dt.with_timezone(&Local);
        assert_eq!(
            local.date_naive(),
            now.date_naive().checked_add_days(Days::new(1)).unwrap()
        );
        assert_eq!(local.time(), NaiveTime::parse_from_str("15:04", "%H:%M").unwrap());
    }

    #[test]
    fn test_unrecognized_rejected() {
        assert!(parse_one_shot_time("not a time", Local::now()).is_err());
        assert!(parse_one_shot_time("", Local::now()).is_err());
    }
}
