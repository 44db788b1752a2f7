//! Next-run calculation from cron expressions.

use std::str::FromStr;

use chrono::{DateTime, Local};
use cron::Schedule;

use crate::error::SchedulerError;

/// Parse a 5-field cron expression (minute hour day-of-month month
/// day-of-week).
///
/// The `cron` crate wants a leading seconds field, so a 5-field expression
/// is pinned to second zero. Expressions that already carry 6 or 7 fields
/// are passed through untouched.
pub(crate) fn parse(expr: &str) -> Result<Schedule, SchedulerError> {
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };

    Schedule::from_str(&normalized).map_err(|source| SchedulerError::Recurrence {
        expr: expr.to_string(),
        source,
    })
}

/// Compute the first trigger instant strictly after `from`.
///
/// Times are evaluated in the host's local timezone; a schedule that can
/// never fire again reports an invalid expression.
pub fn next_after(expr: &str, from: DateTime<Local>) -> Result<DateTime<Local>, SchedulerError> {
    let schedule = parse(expr)?;
    schedule
        .after(&from)
        .next()
        .ok_or_else(|| SchedulerError::Recurrence {
            expr: expr.to_string(),
            source: cron::error::Error::from(cron::error::ErrorKind::Expression(
                "expression has no future trigger".to_string(),
            )),
        })
}
