// src/scheduler/cron.rs

//! Cron expressions for task triggering.
//!
//! Parsing and fire-time search come from the `cron` crate, which reads
//! Quartz-style expressions: `sec min hour day-of-month month day-of-week
//! [year]`, day-of-week 1-7 with 1 = Sunday. Five-field Unix expressions
//! (`min hour day-of-month month day-of-week`, day-of-week 0-7 with 0 and
//! 7 = Sunday) are rewritten into that form first.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, TimeZone, Utc};
use cron::Schedule;

use crate::errors::TierflowError;

#[derive(Debug, Clone)]
pub struct CronSchedule {
    expr: String,
    schedule: Schedule,
}

impl CronSchedule {
    /// The expression as written in configuration, trimmed.
    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// First fire time strictly after `after`.
    ///
    /// Times are wall-clock: no time zone or DST adjustment is applied.
    /// `None` when the expression never fires again.
    pub fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        self.schedule
            .after(&Utc.from_utc_datetime(&after))
            .next()
            .map(|t| t.naive_utc())
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

impl FromStr for CronSchedule {
    type Err = TierflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| TierflowError::InvalidCron {
            expr: s.to_string(),
            reason,
        };

        let normalized = to_quartz(s).map_err(invalid)?;
        let schedule = Schedule::from_str(&normalized).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            expr: s.trim().to_string(),
            schedule,
        })
    }
}

/// Rewrite `expr` into the 6/7-field form `cron::Schedule` parses.
fn to_quartz(expr: &str) -> Result<String, String> {
    let mut fields: Vec<String> = expr.split_whitespace().map(str::to_string).collect();

    match fields.len() {
        5 => {
            fields[4] = unix_day_of_week(&fields[4])?;
            fields.insert(0, "0".to_string());
        }
        6 | 7 => {}
        n => return Err(format!("expected 5, 6 or 7 fields, got {n}")),
    }

    // `?` means "no constraint" in the day fields.
    for idx in [3, 5] {
        if fields[idx] == "?" {
            fields[idx] = "*".to_string();
        }
    }

    Ok(fields.join(" "))
}

/// Renumber a Unix day-of-week field (Sunday = 0 or 7) to Sunday = 1.
/// Names and `*` are left as they are.
fn unix_day_of_week(field: &str) -> Result<String, String> {
    let items = field
        .split(',')
        .map(unix_day_item)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items.join(","))
}

fn unix_day_item(item: &str) -> Result<String, String> {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, format!("/{step}")),
        None => (item, String::new()),
    };
    let (lo, hi) = match range.split_once('-') {
        Some((lo, hi)) => (lo, Some(hi)),
        None => (range, None),
    };

    let Some(lo) = unix_day(lo)? else {
        return Ok(item.to_string());
    };
    let Some(hi) = hi else {
        return Ok(format!("{}{step}", lo % 7 + 1));
    };
    let Some(hi) = unix_day(hi)? else {
        return Ok(item.to_string());
    };

    match hi {
        7 if !step.is_empty() => Err(format!(
            "day-of-week range '{item}' with a step must end at 6"
        )),
        7 if lo == 7 => Ok("1".to_string()),
        // Sunday closes the range and becomes day 1.
        7 => Ok(format!("{}-7,1", lo + 1)),
        _ => Ok(format!("{}-{}{step}", lo % 7 + 1, hi + 1)),
    }
}

fn unix_day(token: &str) -> Result<Option<u32>, String> {
    match token.parse::<u32>() {
        Ok(n) if n <= 7 => Ok(Some(n)),
        Ok(n) => Err(format!("day-of-week {n} is out of range 0-7")),
        Err(_) => Ok(None),
    }
}
