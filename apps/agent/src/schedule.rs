//! Validation of 5-field cron schedules.
//!
//! Schedules arrive in the classic crontab layout
//! (`minute hour day-of-month month day-of-week`). Semantic checks are
//! delegated to the `cron` crate, which expects a leading seconds field and
//! numbers weekdays 1-7 starting at Sunday.

use crate::errors::ScheduleError;
use cron::Schedule;
use std::str::FromStr;
use tracing::debug;

pub const FIELD_COUNT: usize = 5;

pub fn validate(expr: &str) -> Result<(), ScheduleError> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != FIELD_COUNT {
        return Err(ScheduleError::Malformed(fields.len()));
    }
    let with_seconds = format!(
        "0 {} {} {} {} {}",
        fields[0],
        fields[1],
        fields[2],
        fields[3],
        shift_weekdays(fields[4])
    );
    Schedule::from_str(&with_seconds).map_err(|err| {
        debug!("schedule rejected by parser: {}", err);
        ScheduleError::Invalid
    })?;
    Ok(())
}

/// Maps crontab weekday numbers (0-7, Sunday is 0 and 7) onto the parser's
/// 1-7 range. Only acceptance matters here, so 7 stays 7. Step values,
/// named days and out-of-range numbers pass through untouched.
fn shift_weekdays(field: &str) -> String {
    field
        .split(',')
        .map(|item| match item.split_once('/') {
            Some((base, step)) => format!("{}/{}", shift_range(base), step),
            None => shift_range(item),
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn shift_range(base: &str) -> String {
    base.split('-').map(shift_day).collect::<Vec<_>>().join("-")
}

fn shift_day(token: &str) -> String {
    match token.parse::<u32>() {
        Ok(day) if day < 7 => (day + 1).to_string(),
        _ => token.to_string(),
    }
}
