/*!
Five-field schedule expressions.

Expressions use the classic `minute hour day-of-month month day-of-week` layout
and are evaluated in the host's local time zone. Parsing is delegated to the
`cron` crate, which expects a leading seconds field and numbers Sunday as 1, so
expressions are normalized before they reach it.
*/

use crate::{Result, SnapvaultError};
use chrono::{DateTime, Local, Utc};
use cron::Schedule;
use std::fmt;
use std::str::FromStr;

/// Daily at midnight, used when the settings carry no expression
pub const DEFAULT_SCHEDULE_EXPRESSION: &str = "0 0 * * *";

const FIELD_COUNT: usize = 5;
const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// A validated recurring schedule
#[derive(Debug, Clone)]
pub struct ScheduleExpression {
    source: String,
    schedule: Schedule,
}

impl ScheduleExpression {
    /// Parse and validate a 5-field expression
    ///
    /// # Errors
    /// * `SnapvaultError::Validation` - If the expression does not have exactly
    ///   five fields or any field is out of range
    ///
    /// # Example
    /// ```rust
    /// use snapvault_core::ScheduleExpression;
    ///
    /// assert!(ScheduleExpression::parse("30 2 * * 1-5").is_ok());
    /// assert!(ScheduleExpression::parse("every minute").is_err());
    /// ```
    pub fn parse(expression: &str) -> Result<Self> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != FIELD_COUNT {
            return Err(SnapvaultError::validation(format!(
                "schedule expression '{expression}' must have {FIELD_COUNT} fields \
                 (minute hour day-of-month month day-of-week), found {}",
                fields.len()
            )));
        }

        let day_of_week = normalize_day_of_week(fields[4]).map_err(|reason| {
            SnapvaultError::validation(format!(
                "invalid schedule expression '{expression}': {reason}"
            ))
        })?;
        let normalized = format!(
            "0 {} {} {} {} {}",
            fields[0], fields[1], fields[2], fields[3], day_of_week
        );

        let schedule = Schedule::from_str(&normalized).map_err(|e| {
            SnapvaultError::validation(format!("invalid schedule expression '{expression}': {e}"))
        })?;

        Ok(Self {
            source: fields.join(" "),
            schedule,
        })
    }

    /// The expression as written, with whitespace collapsed
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// First matching instant strictly after `after`
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&after.with_timezone(&Local))
            .next()
            .map(|at| at.with_timezone(&Utc))
    }

    /// The next `count` matching instants after `after`
    pub fn upcoming(&self, after: &DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule
            .after(&after.with_timezone(&Local))
            .take(count)
            .map(|at| at.with_timezone(&Utc))
            .collect()
    }
}

impl PartialEq for ScheduleExpression {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for ScheduleExpression {}

impl fmt::Display for ScheduleExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for ScheduleExpression {
    type Err = SnapvaultError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Rewrite numeric weekdays (0-7, Sunday = 0 or 7) as names
fn normalize_day_of_week(field: &str) -> std::result::Result<String, String> {
    let mut parts = Vec::new();

    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (part, None),
        };

        let rewritten = match range.split_once('-') {
            Some((start, end)) => {
                let start = weekday_name(start)?;
                // A range ending on 7 wraps onto Sunday, which sorts first in names
                if end.trim() == "7" && step.is_none() {
                    if start == "SUN" {
                        "*".to_string()
                    } else if start == "SAT" {
                        "SAT,SUN".to_string()
                    } else {
                        format!("{start}-SAT,SUN")
                    }
                } else if end.trim() == "7" {
                    return Err(format!("day-of-week range '{part}' cannot end on 7 with a step"));
                } else {
                    format!("{start}-{}", weekday_name(end)?)
                }
            }
            None => weekday_name(range)?,
        };

        match step {
            Some(step) => parts.push(format!("{rewritten}/{step}")),
            None => parts.push(rewritten),
        }
    }

    Ok(parts.join(","))
}

fn weekday_name(atom: &str) -> std::result::Result<String, String> {
    match atom.parse::<usize>() {
        Ok(day) if day <= 7 => Ok(WEEKDAYS[day % 7].to_string()),
        Ok(day) => Err(format!("day-of-week {day} is out of range 0-7")),
        Err(_) => Ok(atom.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike, Weekday};

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_default_expression_is_valid() {
        let expression = ScheduleExpression::parse(DEFAULT_SCHEDULE_EXPRESSION).unwrap();
        let next = expression
            .next_after(&local(2026, 5, 10, 13, 0))
            .unwrap()
            .with_timezone(&Local);
        assert_eq!((next.day(), next.hour(), next.minute()), (11, 0, 0));
    }

    #[test]
    fn test_every_minute_fires_on_next_minute() {
        let expression = ScheduleExpression::parse("* * * * *").unwrap();
        let start = local(2026, 5, 10, 13, 0) + chrono::Duration::seconds(30);

        let upcoming = expression.upcoming(&start, 3);
        assert_eq!(upcoming.len(), 3);
        assert_eq!(upcoming[0], local(2026, 5, 10, 13, 1));
        assert_eq!(upcoming[1], local(2026, 5, 10, 13, 2));
    }

    #[test]
    fn test_next_after_is_strictly_later() {
        let expression = ScheduleExpression::parse("*/15 * * * *").unwrap();
        let at = local(2026, 5, 10, 13, 15);
        assert_eq!(expression.next_after(&at).unwrap(), local(2026, 5, 10, 13, 30));
    }

    #[test]
    fn test_numeric_weekdays_use_sunday_zero() {
        // 2026-05-10 is a Sunday
        let expression = ScheduleExpression::parse("0 9 * * 1-5").unwrap();
        let next = expression
            .next_after(&local(2026, 5, 9, 12, 0))
            .unwrap()
            .with_timezone(&Local);
        assert_eq!(next.weekday(), Weekday::Mon);

        let sunday = ScheduleExpression::parse("0 9 * * 0").unwrap();
        let seven = ScheduleExpression::parse("0 9 * * 7").unwrap();
        let from = local(2026, 5, 6, 0, 0);
        assert_eq!(sunday.next_after(&from), seven.next_after(&from));
        assert_eq!(
            sunday.next_after(&from).unwrap().with_timezone(&Local).weekday(),
            Weekday::Sun
        );
    }

    #[test]
    fn test_weekday_range_ending_on_seven_includes_sunday() {
        let expression = ScheduleExpression::parse("0 9 * * 6-7").unwrap();
        let days: Vec<Weekday> = expression
            .upcoming(&local(2026, 5, 4, 0, 0), 2)
            .into_iter()
            .map(|at| at.with_timezone(&Local).weekday())
            .collect();
        assert_eq!(days, vec![Weekday::Sat, Weekday::Sun]);
    }

    #[test]
    fn test_rejects_malformed_expressions() {
        for bad in [
            "",
            "every minute",
            "* * * *",
            "0 0 * * * *",
            "61 * * * *",
            "0 25 * * *",
            "0 0 32 * *",
            "0 0 * 13 *",
            "0 0 * * 8",
        ] {
            let err = ScheduleExpression::parse(bad).unwrap_err();
            assert!(err.is_validation(), "'{bad}' gave {err}");
        }
    }

    #[test]
    fn test_source_is_whitespace_normalized() {
        let expression: ScheduleExpression = "  0   2 * *  * ".parse().unwrap();
        assert_eq!(expression.as_str(), "0 2 * * *");
        assert_eq!(expression, ScheduleExpression::parse("0 2 * * *").unwrap());
    }
}
