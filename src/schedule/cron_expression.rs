use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use chrono::{DateTime, Datelike, Timelike, Utc};

use super::{
    description,
    field::{CronField, FieldKind},
    CronError,
};

/// Most trigger times [`CronExpression::upcoming`] lists in one call.
pub const MAX_UPCOMING: usize = 100;

const DAYS_IN_MONTH: [u32; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// A validated cron expression.
///
/// Field parsing and validation happen here so that failures carry a precise
/// reason; trigger computation is delegated to [`cron::Schedule`].
#[derive(Debug, Clone)]
pub struct CronExpression {
    source: String,
    has_seconds: bool,
    second: CronField,
    minute: CronField,
    hour: CronField,
    day_of_month: CronField,
    month: CronField,
    day_of_week: CronField,
    schedule: cron::Schedule,
}

impl CronExpression {
    pub fn parse(expression: &str) -> Result<Self, CronError> {
        let tokens: Vec<&str> = expression.split_whitespace().collect();

        let (has_seconds, second_token, rest) = match tokens.len() {
            0 => return Err(CronError::Empty),
            5 => (false, "0", &tokens[..]),
            6 => (true, tokens[0], &tokens[1..]),
            count => return Err(CronError::FieldCount(count)),
        };

        let second = CronField::parse(FieldKind::Second, second_token)?;
        let minute = CronField::parse(FieldKind::Minute, rest[0])?;
        let hour = CronField::parse(FieldKind::Hour, rest[1])?;
        let day_of_month = CronField::parse(FieldKind::DayOfMonth, rest[2])?;
        let month = CronField::parse(FieldKind::Month, rest[3])?;
        let day_of_week = CronField::parse(FieldKind::DayOfWeek, rest[4])?;

        if !day_of_month.is_unrestricted() && !day_of_week.is_unrestricted() {
            return Err(CronError::ConflictingDayFields);
        }
        ensure_day_is_reachable(&day_of_month, &month)?;

        let normalized = [
            &second,
            &minute,
            &hour,
            &day_of_month,
            &month,
            &day_of_week,
        ]
        .iter()
        .map(|field| field.schedule_token())
        .collect::<Vec<_>>()
        .join(" ");

        let schedule = cron::Schedule::from_str(&normalized)
            .map_err(|e| CronError::Unsupported(e.to_string()))?;

        Ok(Self {
            source: tokens.join(" "),
            has_seconds,
            second,
            minute,
            hour,
            day_of_month,
            month,
            day_of_week,
            schedule,
        })
    }

    /// The first matching instant strictly after `after`.
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(after).next()
    }

    /// The next `count` matching instants, capped at [`MAX_UPCOMING`].
    pub fn upcoming(&self, after: &DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule
            .after(after)
            .take(count.min(MAX_UPCOMING))
            .collect()
    }

    /// Whether `instant` (at whole-second precision) satisfies every field.
    pub fn matches(&self, instant: &DateTime<Utc>) -> bool {
        self.second.contains(instant.second())
            && self.minute.contains(instant.minute())
            && self.hour.contains(instant.hour())
            && self.day_of_month.contains(instant.day())
            && self.month.contains(instant.month())
            && self
                .day_of_week
                .contains(instant.weekday().num_days_from_sunday())
    }

    pub fn describe(&self) -> String {
        description::describe(self)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub const fn has_seconds(&self) -> bool {
        self.has_seconds
    }

    pub const fn seconds(&self) -> &CronField {
        &self.second
    }

    pub const fn minutes(&self) -> &CronField {
        &self.minute
    }

    pub const fn hours(&self) -> &CronField {
        &self.hour
    }

    pub const fn days_of_month(&self) -> &CronField {
        &self.day_of_month
    }

    pub const fn months(&self) -> &CronField {
        &self.month
    }

    pub const fn days_of_week(&self) -> &CronField {
        &self.day_of_week
    }
}

fn ensure_day_is_reachable(day_of_month: &CronField, month: &CronField) -> Result<(), CronError> {
    if day_of_month.is_unrestricted() {
        return Ok(());
    }

    let longest_month = month
        .values()
        .iter()
        .filter_map(|month| DAYS_IN_MONTH.get(*month as usize - 1))
        .copied()
        .max()
        .unwrap_or(31);

    match day_of_month.values().first() {
        Some(first_day) if *first_day > longest_month => {
            Err(CronError::ImpossibleDate(*first_day))
        }
        _ => Ok(()),
    }
}

impl FromStr for CronExpression {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for CronExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
