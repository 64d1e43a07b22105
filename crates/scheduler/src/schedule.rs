//! Trigger translation and next-run computation for recurring jobs.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::{
    error::{Error, Result},
    parse::parse_duration,
    types::JobType,
};

/// A schedule translated into a registrable recurring form.
///
/// One-shot (`at`) jobs never become a trigger; they take the dedicated
/// timer path in the service instead.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Cron expression, evaluated in UTC.
    Cron(Box<cron::Schedule>),
    /// Fixed interval.
    Every(Duration),
}

/// Translate a job's schedule string into a [`Trigger`].
///
/// `cron` jobs accept a 5-field expression or a named shorthand; `every`
/// jobs accept a bare duration, with an `@every ` prefix tolerated.
pub fn parse_trigger(kind: JobType, schedule: &str) -> Result<Trigger> {
    let schedule = schedule.trim();
    if schedule.is_empty() {
        return Err(Error::invalid_schedule("empty schedule"));
    }
    match kind {
        JobType::Every => {
            let spec = schedule
                .strip_prefix("@every")
                .map(str::trim)
                .unwrap_or(schedule);
            Ok(Trigger::Every(parse_duration(spec)?))
        }
        JobType::Cron => match schedule {
            "@hourly" => cron_trigger("0 * * * *"),
            "@daily" | "@midnight" => cron_trigger("0 0 * * *"),
            "@weekly" => cron_trigger("0 0 * * SUN"),
            "@monthly" => cron_trigger("0 0 1 * *"),
            "@yearly" | "@annually" => cron_trigger("0 0 1 1 *"),
            s if s.starts_with("@every") => {
                Ok(Trigger::Every(parse_duration(s["@every".len()..].trim())?))
            }
            expr => cron_trigger(expr),
        },
        JobType::At => Err(Error::invalid_schedule(
            "one-shot schedules have no recurring trigger",
        )),
    }
}

/// Compute the next UTC firing strictly after `after`.
///
/// `None` means the trigger is exhausted (a cron expression with no future
/// match, or an interval too large for the calendar).
pub fn next_run(trigger: &Trigger, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match trigger {
        Trigger::Cron(schedule) => schedule.after(&after).next(),
        Trigger::Every(interval) => {
            let step = chrono::Duration::from_std(*interval).ok()?;
            after.checked_add_signed(step)
        }
    }
}

fn cron_trigger(expr: &str) -> Result<Trigger> {
    let schedule = expr
        .parse::<cron::Schedule>()
        .or_else(|_| {
            // The `cron` crate wants 7 fields (sec min hour dom month dow
            // year); jobs supply the standard 5. Pad seconds and year.
            format!("0 {expr} *").parse::<cron::Schedule>()
        })
        .map_err(|e| Error::invalid_schedule(format!("invalid cron expression '{expr}': {e}")))?;
    Ok(Trigger::Cron(Box::new(schedule)))
}
