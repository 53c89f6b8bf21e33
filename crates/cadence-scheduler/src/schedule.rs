use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, TimeZone, Utc};

use crate::{
    error::{Result, SchedulerError},
    types::{IntervalUnit, Trigger},
};

/// Parse an interval spec into a [`Trigger`].
///
/// Accepted forms:
/// * `every <N> <unit>` where `N` is a positive integer and `unit` starts with
///   `minute`, `hour` or `day` (case-insensitive). Tokens after the unit are ignored.
/// * anything else is read as a daily wall-clock time, `HH:MM` or `HH:MM:SS`.
pub fn parse_interval(spec: &str) -> Result<Trigger> {
    let spec = spec.trim();
    if spec.starts_with("every") {
        parse_every(spec)
    } else {
        parse_time_of_day(spec).map(|time| Trigger::DailyAt { time })
    }
}

fn parse_every(spec: &str) -> Result<Trigger> {
    let parts: Vec<&str> = spec.split_whitespace().collect();
    if parts.len() < 3 {
        return Err(SchedulerError::TriggerParse(format!(
            "'{spec}' must look like 'every <N> minutes|hours|days'"
        )));
    }

    // The count is checked before the unit: "every x weeks" is a parse error.
    let value: u32 = parts[1].parse().map_err(|_| {
        SchedulerError::TriggerParse(format!("'{}' is not a positive integer", parts[1]))
    })?;
    if value == 0 {
        return Err(SchedulerError::TriggerParse(
            "interval must be at least 1".to_string(),
        ));
    }

    let unit_token = parts[2].to_lowercase();
    let unit = if unit_token.starts_with("minute") {
        IntervalUnit::Minutes
    } else if unit_token.starts_with("hour") {
        IntervalUnit::Hours
    } else if unit_token.starts_with("day") {
        IntervalUnit::Days
    } else {
        return Err(SchedulerError::UnsupportedUnit { unit: unit_token });
    };

    if interval_length(unit, value).is_none() {
        return Err(SchedulerError::TriggerParse(format!(
            "every {value} {unit} is too long"
        )));
    }

    Ok(Trigger::Interval { unit, value })
}

/// Strict `HH:MM[:SS]`: two digits per field, hour 00–23.
fn parse_time_of_day(spec: &str) -> Result<NaiveTime> {
    let invalid = || SchedulerError::TriggerParse(format!("'{spec}' is not a valid HH:MM time"));

    let fields: Vec<&str> = spec.split(':').collect();
    if !(2..=3).contains(&fields.len()) {
        return Err(invalid());
    }

    let mut values = [0u32; 3];
    for (slot, field) in values.iter_mut().zip(&fields) {
        if field.len() != 2 || !field.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        *slot = field.parse().map_err(|_| invalid())?;
    }

    let [hour, minute, second] = values;
    if hour > 23 || minute > 59 || second > 59 {
        return Err(invalid());
    }
    NaiveTime::from_hms_opt(hour, minute, second).ok_or_else(invalid)
}

/// Length of one interval period, or `None` if it cannot fit the calendar range.
fn interval_length(unit: IntervalUnit, value: u32) -> Option<Duration> {
    let value = i64::from(value);
    let period = match unit {
        IntervalUnit::Minutes => Duration::try_minutes(value),
        IntervalUnit::Hours => Duration::try_hours(value),
        IntervalUnit::Days => Duration::try_days(value),
    }?;
    // A period that overflows when added to the epoch could never fire.
    DateTime::from_timestamp(0, 0)?
        .checked_add_signed(period)
        .map(|_| period)
}

/// Compute the next UTC fire time for `trigger` strictly after `from`.
///
/// Daily times are wall-clock times in `zone`, resolved for each day so a
/// zone with DST keeps firing at the same local time. A result that would fall
/// past the representable range saturates to the far future (the task never fires).
pub fn compute_next_run<Tz: TimeZone>(
    trigger: &Trigger,
    from: DateTime<Utc>,
    zone: &Tz,
) -> DateTime<Utc> {
    match trigger {
        Trigger::Interval { unit, value } => interval_length(*unit, *value)
            .and_then(|period| from.checked_add_signed(period))
            .unwrap_or(DateTime::<Utc>::MAX_UTC),

        Trigger::DailyAt { time } => {
            let mut date = from.with_timezone(zone).date_naive();
            // today, then tomorrow; the day after covers a gap pushing tomorrow back
            for _ in 0..3 {
                if let Some(candidate) = resolve_local(zone, date.and_time(*time)) {
                    if candidate > from {
                        return candidate;
                    }
                }
                match date.succ_opt() {
                    Some(next) => date = next,
                    None => break,
                }
            }
            DateTime::<Utc>::MAX_UTC
        }
    }
}

/// Map a local wall-clock time to UTC. A repeated time takes its first
/// occurrence; a time skipped by a DST jump moves forward by an hour.
fn resolve_local<Tz: TimeZone>(zone: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    zone.from_local_datetime(&local)
        .earliest()
        .or_else(|| {
            let shifted = local.checked_add_signed(Duration::hours(1))?;
            zone.from_local_datetime(&shifted).earliest()
        })
        .map(|t| t.with_timezone(&Utc))
}
